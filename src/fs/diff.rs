//! Classify the differences between two trees

use super::lister::list_pairs;
use super::{child_pairs, compare, read_content, Content, EntryRef, TreeEntry};
use crate::error::{FsError, FsResult, Operation};
use crate::parallel::{ParallelOptions, Parallelizer};
use crate::pattern::FilePattern;
use std::fmt;
use std::sync::Arc;

/// What changed between the old and the new side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
	/// Both are directories and the depth limit stops here
	CommonSubdirectories,
	DirectoryToFile,
	FileToDirectory,
	/// Only the old side has it
	Deleted,
	/// Only the new side has it
	Added,
	Modified,
}

pub enum DiffResult {
	Change {
		kind: DiffKind,
		old: EntryRef,
		new: EntryRef,
		old_value: Content,
		new_value: Content,
	},
	/// The pair could not be compared
	Error(FsError),
}

impl DiffResult {
	fn change(kind: DiffKind, old: &EntryRef, new: &EntryRef, old_value: Content, new_value: Content) -> Self {
		DiffResult::Change { kind, old: Arc::clone(old), new: Arc::clone(new), old_value, new_value }
	}

	pub fn kind(&self) -> Option<DiffKind> {
		match self {
			DiffResult::Change { kind, .. } => Some(*kind),
			DiffResult::Error(_) => None,
		}
	}

	/// Display path of the changed entry
	pub fn display_path(&self) -> Option<String> {
		match self {
			DiffResult::Change { new, .. } => Some(new.display_path()),
			DiffResult::Error(_) => None,
		}
	}
}

impl fmt::Debug for DiffResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DiffResult::Change { kind, old, new, .. } => {
				write!(f, "{:?}({} -> {})", kind, old.path(), new.path())
			}
			DiffResult::Error(e) => write!(f, "Error({})", e),
		}
	}
}

/// Differences between everything matching `pattern` under both roots.
///
/// Unchanged pairs, and pairs where the missing side could not hold the
/// entry anyway, are left out. With `want_content` the values of added,
/// deleted and modified files are read.
pub fn diff(
	pattern: &Arc<FilePattern>,
	old_root: &EntryRef,
	new_root: &EntryRef,
	depth: Option<usize>,
	want_content: bool,
	parallelizer: &Arc<Parallelizer>,
) -> Vec<DiffResult> {
	let (pairs, errors) = list_pairs(pattern, old_root, new_root, parallelizer).partition();
	let mut results: Vec<DiffResult> = errors.into_iter().map(DiffResult::Error).collect();
	results.extend(diff_pairs(pairs, depth, want_content, parallelizer));
	results
}

/// Diff each pair in parallel, keeping pair order
pub fn diff_pairs(
	pairs: Vec<(EntryRef, EntryRef)>,
	depth: Option<usize>,
	want_content: bool,
	parallelizer: &Arc<Parallelizer>,
) -> Vec<DiffResult> {
	let task_parallelizer = Arc::clone(parallelizer);
	let mut results = Vec::new();
	let per_pair = parallelizer.parallelize(pairs, ParallelOptions::default(), move |(old, new)| {
		diff_entries(&old, &new, depth, want_content, &task_parallelizer)
	});
	for pair_results in per_pair {
		match pair_results {
			Ok(pair_results) => results.extend(pair_results),
			Err(e) => results.push(DiffResult::Error(FsError::OperationFailed {
				path: "/".to_string(),
				operation: Operation::Read,
				message: e.to_string(),
			})),
		}
	}
	results
}

/// Differences between one old and one new entry
pub fn diff_entries(
	old: &EntryRef,
	new: &EntryRef,
	depth: Option<usize>,
	want_content: bool,
	parallelizer: &Arc<Parallelizer>,
) -> Vec<DiffResult> {
	match try_diff_entries(old, new, depth, want_content, parallelizer) {
		Ok(results) => results,
		Err(e) => vec![DiffResult::Error(e)],
	}
}

fn try_diff_entries(
	old: &EntryRef,
	new: &EntryRef,
	depth: Option<usize>,
	want_content: bool,
	parallelizer: &Arc<Parallelizer>,
) -> FsResult<Vec<DiffResult>> {
	use Content::NotRead;

	if old.is_dir() {
		if new.is_dir() {
			if depth == Some(0) {
				return Ok(vec![DiffResult::change(DiffKind::CommonSubdirectories, old, new, NotRead, NotRead)]);
			}
			let pairs = child_pairs(old, new)?;
			return Ok(diff_pairs(pairs, depth.map(|d| d.saturating_sub(1)), want_content, parallelizer));
		}
		if new.exists() {
			return Ok(vec![DiffResult::change(DiffKind::DirectoryToFile, old, new, NotRead, NotRead)]);
		}
		if parent_accepts(new.as_ref(), old.name(), true) {
			return Ok(vec![DiffResult::change(DiffKind::Deleted, old, new, NotRead, NotRead)]);
		}
		return Ok(Vec::new());
	}

	if new.is_dir() {
		if old.exists() {
			return Ok(vec![DiffResult::change(DiffKind::FileToDirectory, old, new, NotRead, NotRead)]);
		}
		if parent_accepts(old.as_ref(), new.name(), true) {
			return Ok(vec![DiffResult::change(DiffKind::Added, old, new, NotRead, NotRead)]);
		}
		return Ok(Vec::new());
	}

	let comparison = compare(old.as_ref(), new.as_ref())?;
	if comparison.same {
		return Ok(Vec::new());
	}
	let (mut old_value, mut new_value) = (comparison.a_value, comparison.b_value);
	let old_exists = exists_given(old.as_ref(), &old_value);
	let new_exists = exists_given(new.as_ref(), &new_value);

	if !old_exists && !parent_accepts(old.as_ref(), new.name(), false) {
		return Ok(Vec::new());
	}
	if !new_exists && !parent_accepts(new.as_ref(), old.name(), false) {
		return Ok(Vec::new());
	}

	if want_content {
		if old_value == NotRead {
			old_value = read_content(old.as_ref())?;
		}
		if new_value == NotRead {
			new_value = read_content(new.as_ref())?;
		}
	}

	let kind = if !old_exists {
		DiffKind::Added
	} else if !new_exists {
		DiffKind::Deleted
	} else {
		DiffKind::Modified
	};
	Ok(vec![DiffResult::change(kind, old, new, old_value, new_value)])
}

fn exists_given(entry: &dyn TreeEntry, value: &Content) -> bool {
	match value {
		Content::Missing => false,
		Content::Value(_) => true,
		Content::NotRead => entry.exists(),
	}
}

/// Whether the parent of the missing `entry` could hold `name`
fn parent_accepts(entry: &dyn TreeEntry, name: &str, is_dir: bool) -> bool {
	entry.parent().map(|parent| parent.can_have_child(name, is_dir)).unwrap_or(false)
}


// vim: ts=4
