//! `chefignore` files: glob patterns hiding cookbook files
//!
//! One glob per line, `#` starts a comment. Globs follow `fnmatch` rules
//! without path awareness, so `*.swp` also hides `recipes/default.rb.swp`.

use crate::logging::*;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::io;
use std::path::Path;

/// File name looked up in a cookbook or cookbooks directory
pub const CHEFIGNORE_FILE: &str = "chefignore";

#[derive(Debug, Clone)]
pub struct Chefignore {
	patterns: Vec<String>,
	set: GlobSet,
}

impl Chefignore {
	/// Patterns from `<dir>/chefignore`; a missing file ignores nothing
	pub fn load(dir: &Path) -> Self {
		let path = dir.join(CHEFIGNORE_FILE);
		match fs::read_to_string(&path) {
			Ok(text) => Chefignore::parse(&text),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Chefignore::empty(),
			Err(e) => {
				warn!("Ignoring unreadable {}: {}", path.display(), e);
				Chefignore::empty()
			}
		}
	}

	pub fn empty() -> Self {
		Chefignore { patterns: Vec::new(), set: GlobSet::empty() }
	}

	/// Parse the contents of a chefignore file; invalid globs are skipped
	pub fn parse(text: &str) -> Self {
		let mut patterns = Vec::new();
		let mut builder = GlobSetBuilder::new();
		for line in text.lines() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			match Glob::new(line) {
				Ok(glob) => {
					builder.add(glob);
					patterns.push(line.to_string());
				}
				Err(e) => warn!("Skipping chefignore pattern {}: {}", line, e),
			}
		}
		let set = builder.build().unwrap_or_else(|e| {
			warn!("Failed to build chefignore set: {}", e);
			GlobSet::empty()
		});
		Chefignore { patterns, set }
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	pub fn is_empty(&self) -> bool {
		self.patterns.is_empty()
	}

	/// Whether a `/`-separated path relative to the ignore file's directory is hidden
	pub fn is_ignored(&self, relative_path: &str) -> bool {
		!self.patterns.is_empty() && self.set.is_match(relative_path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_comments_and_blanks_skipped() {
		let ignore = Chefignore::parse("# editor files\n\n*.swp\n  README*  \n");
		assert_eq!(ignore.patterns(), &["*.swp".to_string(), "README*".to_string()]);
	}

	#[test]
	fn test_star_crosses_directories() {
		let ignore = Chefignore::parse("*.swp\n");
		assert!(ignore.is_ignored("recipes/default.rb.swp"));
		assert!(ignore.is_ignored("app/recipes/default.rb.swp"));
		assert!(!ignore.is_ignored("recipes/default.rb"));
	}

	#[test]
	fn test_load_missing_file_is_empty() {
		let dir = TempDir::new().unwrap();
		let ignore = Chefignore::load(dir.path());
		assert!(ignore.is_empty());
		assert!(!ignore.is_ignored("anything"));

		fs::write(dir.path().join(CHEFIGNORE_FILE), "spec/*\n").unwrap();
		assert!(Chefignore::load(dir.path()).is_ignored("spec/foo_spec.rb"));
	}
}

// vim: ts=4
