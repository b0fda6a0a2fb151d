//! Helpers for `/`-separated tree paths

/// Split a path into its non-empty segments
pub fn split(path: &str) -> Vec<&str> {
	path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Join segments with a single `/`, collapsing duplicate separators.
///
/// A leading empty segment makes the result absolute, mirroring how
/// `join(["", "a"])` reads.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
	let mut result = String::new();
	for (index, part) in parts.iter().enumerate() {
		let part = part.as_ref();
		if index == 0 {
			result.push_str(part.trim_end_matches('/'));
			if part.starts_with('/') && result.is_empty() {
				result.push('/');
			}
			continue;
		}
		let part = part.trim_matches('/');
		if part.is_empty() {
			continue;
		}
		if !result.ends_with('/') {
			result.push('/');
		}
		result.push_str(part);
	}
	result
}

/// Child path under `parent`; the root is `/`
pub fn child_path(parent: &str, name: &str) -> String {
	if parent.ends_with('/') {
		format!("{}{}", parent, name)
	} else {
		format!("{}/{}", parent, name)
	}
}

pub fn is_absolute(path: &str) -> bool {
	path.starts_with('/')
}

/// Path of `path` relative to `ancestor`, `None` if it is not below it
pub fn relative_to<'a>(path: &'a str, ancestor: &str) -> Option<&'a str> {
	let ancestor = ancestor.trim_end_matches('/');
	if ancestor.is_empty() {
		return Some(path.trim_start_matches('/'));
	}
	let rest = path.strip_prefix(ancestor)?;
	if rest.is_empty() {
		Some("")
	} else {
		rest.strip_prefix('/')
	}
}

/// Last segment of a path (`""` for the root)
pub fn basename(path: &str) -> &str {
	path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_split_drops_empty_segments() {
		assert_eq!(split("/a//b/"), vec!["a", "b"]);
		assert!(split("/").is_empty());
		assert!(split("").is_empty());
	}

	#[test]
	fn test_join() {
		assert_eq!(join(&["a", "b", "c"]), "a/b/c");
		assert_eq!(join(&["", "a/b"]), "/a/b");
		assert_eq!(join(&["a/", "/b"]), "a/b");
		assert_eq!(join::<&str>(&[]), "");
	}

	#[test]
	fn test_child_path() {
		assert_eq!(child_path("/", "roles"), "/roles");
		assert_eq!(child_path("/roles", "x.json"), "/roles/x.json");
	}

	#[test]
	fn test_relative_to() {
		assert_eq!(relative_to("/cookbooks/a/b", "/cookbooks"), Some("a/b"));
		assert_eq!(relative_to("/cookbooksx", "/cookbooks"), None);
		assert_eq!(relative_to("/cookbooks", "/cookbooks"), Some(""));
		assert_eq!(relative_to("/a/b", "/"), Some("a/b"));
	}
}

// vim: ts=4
