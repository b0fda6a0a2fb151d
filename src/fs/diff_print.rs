//! Render diff results as text

use super::diff::{diff_pairs, DiffKind, DiffResult};
use super::lister::list_pairs;
use super::{Content, EntryRef, TreeEntry};
use crate::callbacks::Reporter;
use crate::error::FsError;
use crate::parallel::Parallelizer;
use crate::pattern::FilePattern;
use serde_json::Value;
use similar::TextDiff;
use std::path::Path;
use std::sync::Arc;

/// How much of each difference to print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
	/// Changed paths only
	NameOnly,
	/// `A`/`D`/`M`/`T`, a tab, then the path
	NameStatus,
	/// Unified diffs
	Patch,
}

impl OutputMode {
	fn wants_content(self) -> bool {
		self == OutputMode::Patch
	}
}

/// Print the differences between `old_root` and `new_root`.
///
/// `filter` keeps only the listed change letters (`A`dded, `D`eleted,
/// `M`odified, `T`ype changed). Every rendered chunk goes to
/// `reporter.output`. Returns true if anything failed or nothing matched.
pub fn diff_print(
	pattern: &Arc<FilePattern>,
	old_root: &EntryRef,
	new_root: &EntryRef,
	depth: Option<usize>,
	mode: OutputMode,
	filter: Option<&str>,
	reporter: &dyn Reporter,
	parallelizer: &Arc<Parallelizer>,
) -> bool {
	let (pairs, listing_errors) = list_pairs(pattern, old_root, new_root, parallelizer).partition();
	let found_match = !pairs.is_empty();
	let mut error = false;
	for e in listing_errors {
		error |= report_error(e, reporter);
	}

	for result in diff_pairs(pairs, depth, mode.wants_content(), parallelizer) {
		match result {
			DiffResult::Change { kind, old, new, old_value, new_value } => {
				if let Some(text) = render(kind, &old, &new, &old_value, &new_value, mode, filter) {
					reporter.output(&text);
				}
			}
			DiffResult::Error(e) => error |= report_error(e, reporter),
		}
	}

	if !found_match {
		reporter.error(&format!("{}: No such file or directory on remote or local", pattern));
		error = true;
	}
	error
}

/// Refusals are reported but do not fail the diff
fn report_error(e: FsError, reporter: &dyn Reporter) -> bool {
	match e {
		FsError::OperationNotAllowed { .. } => {
			reporter.error(&format!("{}.", e));
			false
		}
		e => {
			reporter.error(&e.to_string());
			true
		}
	}
}

fn letter(kind: DiffKind) -> Option<char> {
	match kind {
		DiffKind::CommonSubdirectories => None,
		DiffKind::DirectoryToFile | DiffKind::FileToDirectory => Some('T'),
		DiffKind::Deleted => Some('D'),
		DiffKind::Added => Some('A'),
		DiffKind::Modified => Some('M'),
	}
}

/// Text for one change, `None` when filtered out or silent in this mode
pub fn render(
	kind: DiffKind,
	old: &EntryRef,
	new: &EntryRef,
	old_value: &Content,
	new_value: &Content,
	mode: OutputMode,
	filter: Option<&str>,
) -> Option<String> {
	let old_path = old.path_for_printing();
	let mut new_path = new.path_for_printing();

	let letter = match letter(kind) {
		Some(letter) => letter,
		None if mode == OutputMode::Patch => return Some(format!("Common subdirectories: {}", new_path)),
		None => return None,
	};
	if let Some(filter) = filter {
		if !filter.contains(letter) {
			return None;
		}
	}
	if kind == DiffKind::Deleted {
		// A deleted `x.rb` shows up as missing `x.json`; keep the real extension.
		let old_ext = Path::new(&old_path).extension().map(|e| e.to_os_string());
		let new_ext = Path::new(&new_path).extension().map(|e| e.to_os_string());
		if old_ext != new_ext {
			if let Some(ext) = old_ext {
				new_path = format!("{}.{}", new_path, ext.to_string_lossy());
			}
		}
	}

	match mode {
		OutputMode::NameOnly => return Some(new_path),
		OutputMode::NameStatus => return Some(format!("{}\t{}", letter, new_path)),
		OutputMode::Patch => {}
	}

	let text = match kind {
		DiffKind::DirectoryToFile => {
			format!("File {} is a directory while file {} is a regular file", old_path, new_path)
		}
		DiffKind::FileToDirectory => {
			format!("File {} is a regular file while file {} is a directory", old_path, new_path)
		}
		DiffKind::Deleted => match old_value.as_bytes() {
			Some(old_bytes) => format!(
				"diff --knife {} {}\ndeleted file\n{}",
				old_path,
				new_path,
				diff_text(&old_path, "/dev/null", old_bytes, b"")
			),
			None => format!("Only in {}: {}", parent_for_printing(old.as_ref()), old.name()),
		},
		DiffKind::Added => match new_value.as_bytes() {
			Some(new_bytes) => format!(
				"diff --knife {} {}\nnew file\n{}",
				old_path,
				new_path,
				diff_text("/dev/null", &new_path, b"", new_bytes)
			),
			None => format!("Only in {}: {}", parent_for_printing(new.as_ref()), new.name()),
		},
		DiffKind::Modified => format!(
			"diff --knife {} {}\n{}",
			old_path,
			new_path,
			diff_text(
				&old_path,
				&new_path,
				old_value.as_bytes().unwrap_or_default(),
				new_value.as_bytes().unwrap_or_default()
			)
		),
		DiffKind::CommonSubdirectories => return None,
	};
	Some(text.trim_end_matches('\n').to_string())
}

fn parent_for_printing(entry: &dyn TreeEntry) -> String {
	entry.parent().map(|parent| parent.path_for_printing()).unwrap_or_else(|| "/".to_string())
}

/// Unified diff of two values; JSON documents are compared key-sorted
pub fn diff_text(old_path: &str, new_path: &str, old_value: &[u8], new_value: &[u8]) -> String {
	let (old_text, new_text) = match (canonical_json(old_value), canonical_json(new_value)) {
		(Some(old), Some(new)) => (old, new),
		_ => (
			String::from_utf8_lossy(old_value).into_owned(),
			String::from_utf8_lossy(new_value).into_owned(),
		),
	};
	let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str());
	diff.unified_diff().header(old_path, new_path).to_string()
}

/// Pretty JSON with sorted keys, `None` for empty or non-JSON input
fn canonical_json(bytes: &[u8]) -> Option<String> {
	if bytes.is_empty() {
		return None;
	}
	let value: Value = serde_json::from_slice(bytes).ok()?;
	// serde_json maps are ordered by key unless `preserve_order` is on.
	let mut text = serde_json::to_string_pretty(&value).ok()?;
	text.push('\n');
	Some(text)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::CollectingReporter;
	use crate::fs::memory::MemoryEntry;

	fn print(mode: OutputMode, filter: Option<&str>) -> CollectingReporter {
		let old = MemoryEntry::new_root();
		let new = MemoryEntry::new_root();
		old.add_file("roles/gone.json", b"{}").unwrap();
		old.add_file("roles/web.json", b"{\"name\":\"web\"}").unwrap();
		new.add_file("roles/web.json", b"{\"name\":\"web2\"}").unwrap();
		new.add_file("roles/new.json", b"{}").unwrap();

		let reporter = CollectingReporter::new();
		let old: EntryRef = old;
		let new: EntryRef = new;
		let pattern = Arc::new(FilePattern::new("/roles").unwrap());
		let error = diff_print(&pattern, &old, &new, None, mode, filter, &reporter, &Arc::new(Parallelizer::synchronous()));
		assert!(!error);
		reporter
	}

	#[test]
	fn test_name_status() {
		let reporter = print(OutputMode::NameStatus, None);
		assert_eq!(
			reporter.outputs(),
			vec!["D\t/roles/gone.json", "M\t/roles/web.json", "A\t/roles/new.json"]
		);
	}

	#[test]
	fn test_filter() {
		let reporter = print(OutputMode::NameOnly, Some("A"));
		assert_eq!(reporter.outputs(), vec!["/roles/new.json"]);
	}

	#[test]
	fn test_patch_has_knife_header() {
		let reporter = print(OutputMode::Patch, Some("M"));
		let patch = &reporter.outputs()[0];
		assert!(patch.starts_with("diff --knife /roles/web.json /roles/web.json\n"));
		assert!(patch.contains("-  \"name\": \"web\""));
		assert!(patch.contains("+  \"name\": \"web2\""));
	}
}

// vim: ts=4
