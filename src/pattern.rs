//! Glob patterns over tree paths
//!
//! A pattern is compiled once into an anchored regex plus per-segment
//! information used to prune tree walks:
//!
//! - `*` matches within one segment, `?` matches one character
//! - `**` matches across segments; a segment that is exactly `**` also
//!   matches zero segments, so `a/**/z` matches `a/z`
//! - `[...]` character classes and `\x` escapes (not on Windows)
//! - `.` segments are dropped and `..` pops the previous segment

use crate::error::PatternError;
use crate::path_utils;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Compiled glob pattern
#[derive(Debug, Clone)]
pub struct FilePattern {
	pattern: String,
	is_absolute: bool,
	regex: Regex,
	regexp_parts: Vec<Regex>,
	exact_parts: Vec<Option<String>>,
	has_double_star: bool,
	normalized: String,
}

/// One compiled pattern segment
#[derive(Debug, Clone)]
struct Segment {
	regexp: String,
	exact: Option<String>,
	has_double_star: bool,
	bare_double_star: bool,
}

impl FilePattern {
	pub fn new(pattern: &str) -> Result<Self, PatternError> {
		let is_absolute = path_utils::is_absolute(pattern);
		let mut has_double_star = false;
		let mut full: Vec<Segment> = Vec::new();
		let mut normalized: Vec<&str> = Vec::new();
		let mut regexp_parts = Vec::new();
		let mut exact_parts = Vec::new();

		for part in path_utils::split(pattern) {
			let segment = compile_segment(part);
			if segment.has_double_star {
				has_double_star = true;
			}

			match segment.exact.as_deref() {
				Some("") | Some(".") => continue,
				Some("..") => {
					if is_absolute && normalized.is_empty() {
						continue;
					}
					if let Some(previous) = full.last() {
						if previous.has_double_star {
							return Err(PatternError::DotDotOverDoubleStar {
								pattern: pattern.to_string(),
							});
						}
						full.pop();
						normalized.pop();
						if !has_double_star {
							regexp_parts.pop();
							exact_parts.pop();
						}
						continue;
					}
					// A relative pattern may start with `..`; keep it literally.
				}
				_ => {}
			}

			if !has_double_star {
				let anchored = format!("^{}$", segment.regexp);
				regexp_parts.push(compile_regex(pattern, &anchored)?);
				exact_parts.push(segment.exact.clone());
			}
			full.push(segment);
			normalized.push(part);
		}

		let regex = compile_regex(pattern, &full_regex(&full))?;
		let mut normalized = path_utils::join(&normalized);
		if is_absolute {
			normalized = format!("/{}", normalized);
		}

		Ok(FilePattern {
			pattern: pattern.to_string(),
			is_absolute,
			regex,
			regexp_parts,
			exact_parts,
			has_double_star,
			normalized,
		})
	}

	/// This pattern as matched against a tree from its root: a relative
	/// pattern gets a leading `/`, an absolute one is shared as is
	pub fn rooted(self: &Arc<Self>) -> Arc<FilePattern> {
		if self.is_absolute {
			return Arc::clone(self);
		}
		// Rooting only adds a separator, so the pattern still compiles.
		match FilePattern::new(&format!("/{}", self.pattern)) {
			Ok(rooted) => Arc::new(rooted),
			Err(_) => Arc::clone(self),
		}
	}

	/// The pattern as written
	pub fn as_str(&self) -> &str {
		&self.pattern
	}

	pub fn is_absolute(&self) -> bool {
		self.is_absolute
	}

	/// Pattern with `.` and `..` segments resolved
	pub fn normalized_pattern(&self) -> &str {
		&self.normalized
	}

	/// Whether `path` itself matches
	pub fn matches(&self, path: &str) -> bool {
		if path_utils::is_absolute(path) != self.is_absolute {
			return false;
		}
		let path = path.strip_prefix('/').unwrap_or(path);
		self.regex.is_match(path)
	}

	/// Whether anything below `path` could match
	pub fn could_match_children(&self, path: &str) -> bool {
		if path.is_empty() {
			return false;
		}
		if path_utils::is_absolute(path) != self.is_absolute {
			return false;
		}
		let path = path.strip_prefix('/').unwrap_or(path);
		let path_parts = path_utils::split(path);

		if self.regexp_parts.len() <= path_parts.len() && !self.has_double_star {
			return false;
		}
		path_parts
			.iter()
			.zip(self.regexp_parts.iter())
			.all(|(part, regexp)| regexp.is_match(part))
	}

	/// Literal name of the only child of `path` that could match, if known
	pub fn exact_child_name_under(&self, path: &str) -> Option<&str> {
		let path = path.strip_prefix('/').unwrap_or(path);
		let depth = path_utils::split(path).len();
		self.exact_parts.get(depth).and_then(|part| part.as_deref())
	}

	/// The single path this pattern can match, if it has no wildcards
	pub fn exact_path(&self) -> Option<String> {
		if self.has_double_star {
			return None;
		}
		let mut parts = Vec::with_capacity(self.exact_parts.len());
		for part in &self.exact_parts {
			parts.push(part.as_deref()?);
		}
		let joined = path_utils::join(&parts);
		if self.is_absolute {
			Some(format!("/{}", joined))
		} else {
			Some(joined)
		}
	}
}

impl fmt::Display for FilePattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.pattern)
	}
}

fn compile_regex(pattern: &str, regex: &str) -> Result<Regex, PatternError> {
	Regex::new(regex).map_err(|e| PatternError::InvalidRegex {
		pattern: pattern.to_string(),
		message: e.to_string(),
	})
}

/// Join segment regexes; a bare `**` in the middle absorbs its separator
fn full_regex(segments: &[Segment]) -> String {
	let mut result = String::from("^");
	for (index, segment) in segments.iter().enumerate() {
		let last = index + 1 == segments.len();
		if segment.bare_double_star && !last {
			result.push_str("(?:.*/)?");
			continue;
		}
		result.push_str(&segment.regexp);
		if !last {
			result.push('/');
		}
	}
	result.push('$');
	result
}

fn push_literal(c: char, regexp: &mut String, exact: &mut Option<String>) {
	let mut buf = [0u8; 4];
	regexp.push_str(&regex::escape(c.encode_utf8(&mut buf)));
	if let Some(exact) = exact.as_mut() {
		exact.push(c);
	}
}

fn compile_segment(segment: &str) -> Segment {
	let chars: Vec<char> = segment.chars().collect();
	let mut regexp = String::new();
	let mut exact = Some(String::new());
	let mut has_double_star = false;
	let mut i = 0;

	while i < chars.len() {
		let c = chars[i];
		match c {
			'*' if chars.get(i + 1) == Some(&'*') => {
				exact = None;
				has_double_star = true;
				regexp.push_str(".*");
				i += 2;
			}
			'*' => {
				exact = None;
				regexp.push_str("[^/]*");
				i += 1;
			}
			'?' => {
				exact = None;
				regexp.push('.');
				i += 1;
			}
			'\\' if cfg!(not(windows)) && i + 1 < chars.len() => {
				push_literal(chars[i + 1], &mut regexp, &mut exact);
				i += 2;
			}
			'[' if cfg!(not(windows)) => match class_end(&chars, i) {
				Some(end) => {
					exact = None;
					regexp.extend(&chars[i..=end]);
					i = end + 1;
				}
				None => {
					push_literal(c, &mut regexp, &mut exact);
					i += 1;
				}
			},
			_ => {
				push_literal(c, &mut regexp, &mut exact);
				i += 1;
			}
		}
	}

	Segment { regexp, exact, has_double_star, bare_double_star: segment == "**" }
}

/// Index of the `]` closing a non-empty class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
	let offset = chars[start + 1..].iter().position(|&c| c == ']')?;
	if offset == 0 {
		None
	} else {
		Some(start + 1 + offset)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn p(pattern: &str) -> FilePattern {
		FilePattern::new(pattern).unwrap()
	}

	#[test]
	fn test_literal_segment() {
		let pattern = p("abc/def");
		assert!(pattern.matches("abc/def"));
		assert!(!pattern.matches("/abc/def"));
		assert_eq!(pattern.exact_path().as_deref(), Some("abc/def"));
		assert_eq!(pattern.exact_child_name_under(""), Some("abc"));
		assert_eq!(pattern.exact_child_name_under("abc"), Some("def"));
		assert_eq!(pattern.exact_child_name_under("abc/def"), None);
	}

	#[test]
	fn test_regex_metacharacters_are_literal() {
		let pattern = p("/a.b+c(d)");
		assert!(pattern.matches("/a.b+c(d)"));
		assert!(!pattern.matches("/axb+c(d)"));
	}

	#[cfg(not(windows))]
	#[test]
	fn test_escapes_and_classes() {
		let pattern = p("/a\\*b");
		assert!(pattern.matches("/a*b"));
		assert!(!pattern.matches("/axb"));
		assert_eq!(pattern.exact_path().as_deref(), Some("/a*b"));

		let pattern = p("/x[ab]y");
		assert!(pattern.matches("/xay"));
		assert!(pattern.matches("/xby"));
		assert!(!pattern.matches("/xcy"));
		assert_eq!(pattern.exact_path(), None);
	}

	#[test]
	fn test_bare_double_star_matches_zero_segments() {
		let pattern = p("a/**/z");
		assert!(pattern.matches("a/z"));
		assert!(pattern.matches("a/b/z"));
		assert!(pattern.matches("a/b/c/z"));
		assert!(!pattern.matches("ab/z"));
		assert!(!pattern.matches("a/zz"));
	}

	#[test]
	fn test_single_star_stays_in_one_segment() {
		let pattern = p("a/*/z");
		assert!(pattern.matches("a/b/z"));
		assert!(!pattern.matches("a/b/c/z"));
		assert!(!pattern.matches("a/z"));
	}

	#[test]
	fn test_literal_pattern_matches_only_its_normalized_path() {
		for literal in &["/roles/web.json", "/cookbooks/app/./recipes/../metadata.rb", "data_bags/users/alice.json"] {
			let pattern = p(literal);
			let normalized = pattern.normalized_pattern().to_string();
			assert_eq!(pattern.exact_path(), Some(normalized.clone()));
			assert!(pattern.matches(&normalized));
			assert!(!pattern.matches(&format!("{}x", normalized)));
			assert!(!pattern.matches(&format!("{}/x", normalized)));
		}
	}

	#[test]
	fn test_full_match_has_no_children_without_trailing_wildcards() {
		let cases: &[(&str, &str)] = &[
			("/roles/web.json", "/roles/web.json"),
			("/roles/*.json", "/roles/db.json"),
			("/cookbooks/*", "/cookbooks/app"),
			("/a/?/c", "/a/b/c"),
		];
		for (pattern, path) in cases {
			let pattern = p(pattern);
			assert!(pattern.matches(path), "{} should match {}", pattern, path);
			assert!(!pattern.could_match_children(path), "{} should not look below {}", pattern, path);
		}
		// A double star keeps going
		assert!(p("/cookbooks/**").could_match_children("/cookbooks/app"));
	}

	#[test]
	fn test_rooted_relative_pattern() {
		let pattern = Arc::new(p("*"));
		let rooted = pattern.rooted();
		assert!(rooted.is_absolute());
		assert!(rooted.matches("/x.json"));
		assert_eq!(rooted.as_str(), "/*");

		let absolute = Arc::new(p("/roles"));
		assert!(Arc::ptr_eq(&absolute.rooted(), &absolute));
	}

	#[test]
	fn test_dot_segments() {
		let pattern = p("/abc/./def/../ghi");
		assert_eq!(pattern.normalized_pattern(), "/abc/ghi");
		assert_eq!(pattern.exact_path().as_deref(), Some("/abc/ghi"));
		assert!(pattern.matches("/abc/ghi"));
	}

	#[test]
	fn test_dotdot_at_root_is_ignored() {
		let pattern = p("/../abc");
		assert_eq!(pattern.normalized_pattern(), "/abc");
	}

	#[test]
	fn test_dotdot_over_double_star_fails() {
		assert!(matches!(
			FilePattern::new("/abc/**/.."),
			Err(PatternError::DotDotOverDoubleStar { .. })
		));
	}

	#[test]
	fn test_empty_path_has_no_children() {
		assert!(!p("**").could_match_children(""));
	}
}

// vim: ts=4
