//! One-way copy: make the destination tree look like the source
//!
//! Every matching pair is handled on the parallelizer. Failures are reported
//! through the [`Reporter`] and folded into a single error flag; one bad
//! entry never stops its siblings.

use super::lister::list_pairs;
use super::{child_pairs, compare, EntryRef};
use crate::callbacks::Reporter;
use crate::error::{FsError, FsResult, NotAllowedReason};
use crate::logging::*;
use crate::parallel::Parallelizer;
use crate::pattern::FilePattern;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a copy treats differences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
	/// Delete destination entries the source does not have
	pub purge: bool,

	/// Overwrite files even when they compare equal
	pub force: bool,

	/// Only report what would change
	pub dry_run: bool,

	/// Compare files before copying; when off, existing files are left alone
	pub diff: bool,
}

impl Default for SyncOptions {
	fn default() -> Self {
		SyncOptions { purge: false, force: false, dry_run: false, diff: true }
	}
}

struct CopyRun {
	options: SyncOptions,
	reporter: Arc<dyn Reporter>,
	parallelizer: Arc<Parallelizer>,
}

impl CopyRun {
	fn output(&self, line: String) {
		debug!("{}", line);
		self.reporter.output(&line);
	}

	/// Report a failed entry; true when it counts as an error
	fn handle_error(&self, error: FsError) -> bool {
		match &error {
			FsError::RubyFile { .. }
			| FsError::OperationNotAllowed { reason: NotAllowedReason::DefaultEnvironment, .. } => {
				self.reporter.warn(&format!("{}.", error));
				false
			}
			_ => {
				self.reporter.error(&error.to_string());
				true
			}
		}
	}
}

/// Copy everything matching `pattern` from `src_root` onto `dest_root`.
///
/// `depth` limits recursion below each matched entry (`None` is unlimited).
/// Returns true if anything failed.
pub fn copy_to(
	pattern: &Arc<FilePattern>,
	src_root: &EntryRef,
	dest_root: &EntryRef,
	depth: Option<usize>,
	options: &SyncOptions,
	reporter: &Arc<dyn Reporter>,
	parallelizer: &Arc<Parallelizer>,
) -> bool {
	let run = Arc::new(CopyRun {
		options: *options,
		reporter: Arc::clone(reporter),
		parallelizer: Arc::clone(parallelizer),
	});

	let (pairs, listing_errors) = list_pairs(pattern, src_root, dest_root, parallelizer).partition();
	let mut error = false;
	for e in listing_errors {
		error |= run.handle_error(e);
	}

	let found = !pairs.is_empty();
	let failed = Arc::new(AtomicBool::new(false));
	let task_run = Arc::clone(&run);
	let task_failed = Arc::clone(&failed);
	let panics = parallelizer.parallel_do(pairs, move |(src, dest)| {
		let dest_parent = match get_or_create_parent(&task_run, &dest) {
			Ok(parent) => parent,
			Err(e) => {
				if task_run.handle_error(e) {
					task_failed.store(true, Ordering::SeqCst);
				}
				return;
			}
		};
		if copy_entries(&task_run, &src, &dest, dest_parent.as_ref(), depth) {
			task_failed.store(true, Ordering::SeqCst);
		}
	});
	for panic in panics {
		reporter.error(&panic.to_string());
		error = true;
	}

	if !found && pattern.exact_path().is_some() {
		reporter.error(&format!("{}: No such file or directory on remote or local", pattern));
		error = true;
	}
	error || failed.load(Ordering::SeqCst)
}

/// Parent of `entry`, creating missing ancestors top-down first
fn get_or_create_parent(run: &Arc<CopyRun>, entry: &EntryRef) -> FsResult<Option<EntryRef>> {
	let parent = match entry.parent() {
		Some(parent) => parent,
		None => return Ok(None),
	};
	if parent.exists() {
		return Ok(Some(parent));
	}

	let parent_path = parent.path_for_printing();
	let grandparent = get_or_create_parent(run, &parent)?;
	if run.options.dry_run {
		run.output(format!("Would create {}", parent_path));
		return Ok(Some(parent));
	}
	let grandparent = match grandparent {
		Some(grandparent) => grandparent,
		None => return Ok(Some(parent)),
	};
	let created = grandparent.create_child(parent.name(), None)?;
	run.output(format!("Created {}", parent_path));
	Ok(Some(created))
}

fn copy_entries(
	run: &Arc<CopyRun>,
	src: &EntryRef,
	dest: &EntryRef,
	dest_parent: Option<&EntryRef>,
	depth: Option<usize>,
) -> bool {
	match try_copy_entries(run, src, dest, dest_parent, depth) {
		Ok(error) => error,
		Err(e) => run.handle_error(e),
	}
}

fn try_copy_entries(
	run: &Arc<CopyRun>,
	src: &EntryRef,
	dest: &EntryRef,
	dest_parent: Option<&EntryRef>,
	depth: Option<usize>,
) -> FsResult<bool> {
	let options = &run.options;
	let dest_path = dest.path_for_printing();

	if !src.exists() {
		if !options.purge || !dest.exists() {
			return Ok(false);
		}
		// Only purge what a copy from the source could have produced.
		let copyable = src.parent().map(|p| p.can_have_child(dest.name(), dest.is_dir())).unwrap_or(false);
		if !copyable {
			run.output(format!("Not deleting extra entry {} (the source cannot hold it)", dest_path));
		} else if options.dry_run {
			run.output(format!("Would delete {}", dest_path));
		} else {
			match dest.delete(true) {
				Ok(()) => run.output(format!("Deleted extra entry {} (purge is on)", dest_path)),
				Err(FsError::NotFound { .. }) => {
					run.output(format!("Entry {} does not exist. Nothing to do. (purge is on)", dest_path))
				}
				Err(e) => return Err(e),
			}
		}
		return Ok(false);
	}

	if !dest.exists() {
		let parent = match dest_parent {
			Some(parent) => parent,
			None => return Ok(false),
		};
		if !parent.can_have_child(src.name(), src.is_dir()) {
			return Ok(false);
		}

		if let Some(fast) = parent.fast_create() {
			if options.dry_run {
				run.output(format!("Would create {}", dest_path));
			} else {
				fast.create_child_from(src)?;
				run.output(format!("Created {}", dest_path));
			}
			return Ok(false);
		}

		if src.is_dir() {
			let new_dir = if options.dry_run {
				run.output(format!("Would create {}", dest_path));
				parent.child(src.name())
			} else {
				let created = parent.create_child(src.name(), None)?;
				run.output(format!("Created {}", dest_path));
				created
			};
			if depth != Some(0) {
				let pairs = src
					.children()?
					.into_iter()
					.map(|child| {
						let dest_child = new_dir.child(child.name());
						(child, dest_child)
					})
					.collect();
				return Ok(copy_children(run, pairs, new_dir, next_depth(depth)));
			}
		} else if options.dry_run {
			run.output(format!("Would create {}", dest_path));
		} else {
			let content = src.read()?;
			let child = parent.create_child(src.name(), Some(&content))?;
			run.output(format!("Created {}", child.path_for_printing()));
		}
		return Ok(false);
	}

	if let Some(fast) = dest.fast_copy() {
		if options.force || !compare(src.as_ref(), dest.as_ref())?.same {
			if options.dry_run {
				run.output(format!("Would update {}", dest_path));
			} else {
				fast.copy_from(src, options)?;
				run.output(format!("Updated {}", dest_path));
			}
		}
		return Ok(false);
	}

	match (src.is_dir(), dest.is_dir()) {
		(true, true) => {
			if depth != Some(0) {
				let pairs = child_pairs(src, dest)?;
				return Ok(copy_children(run, pairs, Arc::clone(dest), next_depth(depth)));
			}
		}
		(true, false) => run.reporter.error(&format!(
			"File {} is a directory while file {} is a regular file",
			src.path_for_printing(),
			dest_path
		)),
		(false, true) => run.reporter.error(&format!(
			"File {} is a regular file while file {} is a directory",
			src.path_for_printing(),
			dest_path
		)),
		(false, false) => {
			if !options.diff {
				return Ok(false);
			}
			let known_value = if options.force {
				None
			} else {
				let comparison = compare(src.as_ref(), dest.as_ref())?;
				if comparison.same {
					return Ok(false);
				}
				comparison.a_value.as_bytes().map(|bytes| bytes.to_vec())
			};
			if options.dry_run {
				run.output(format!("Would update {}", dest_path));
			} else {
				let content = match known_value {
					Some(content) => content,
					None => src.read()?,
				};
				dest.write(&content)?;
				run.output(format!("Updated {}", dest_path));
			}
		}
	}
	Ok(false)
}

/// Copy child pairs in parallel; true if any failed
fn copy_children(
	run: &Arc<CopyRun>,
	pairs: Vec<(EntryRef, EntryRef)>,
	parent: EntryRef,
	depth: Option<usize>,
) -> bool {
	let failed = Arc::new(AtomicBool::new(false));
	let task_run = Arc::clone(run);
	let task_failed = Arc::clone(&failed);
	let panics = run.parallelizer.parallel_do(pairs, move |(src, dest)| {
		if copy_entries(&task_run, &src, &dest, Some(&parent), depth) {
			task_failed.store(true, Ordering::SeqCst);
		}
	});
	for panic in &panics {
		run.reporter.error(&panic.to_string());
	}
	!panics.is_empty() || failed.load(Ordering::SeqCst)
}

fn next_depth(depth: Option<usize>) -> Option<usize> {
	depth.map(|d| d.saturating_sub(1))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::CollectingReporter;
	use crate::fs::memory::MemoryEntry;
	use crate::fs::TreeEntry;

	fn run(pattern: &str, src: &Arc<MemoryEntry>, dest: &Arc<MemoryEntry>, options: SyncOptions) -> (bool, Arc<CollectingReporter>) {
		let reporter = Arc::new(CollectingReporter::new());
		let pattern = Arc::new(FilePattern::new(pattern).unwrap());
		let src: EntryRef = src.clone();
		let dest: EntryRef = dest.clone();
		let as_reporter: Arc<dyn Reporter> = reporter.clone();
		let error = copy_to(&pattern, &src, &dest, None, &options, &as_reporter, &Arc::new(Parallelizer::synchronous()));
		(error, reporter)
	}

	#[test]
	fn test_creates_missing_parents() {
		let src = MemoryEntry::new_root();
		let dest = MemoryEntry::new_root();
		src.add_file("cookbooks/app/recipes/default.rb", b"log 'hi'").unwrap();

		let (error, reporter) = run("/cookbooks/app/recipes/default.rb", &src, &dest, SyncOptions::default());
		assert!(!error);
		assert_eq!(dest.child("cookbooks").child("app").child("recipes").children().unwrap().len(), 1);
		assert_eq!(reporter.outputs()[0], "Created /cookbooks");
	}

	#[test]
	fn test_dry_run_changes_nothing() {
		let src = MemoryEntry::new_root();
		let dest = MemoryEntry::new_root();
		src.add_file("roles/web.json", b"{}").unwrap();
		let options = SyncOptions { dry_run: true, ..SyncOptions::default() };
		let (error, reporter) = run("/**", &src, &dest, options);
		assert!(!error);
		assert!(dest.children().unwrap().is_empty());
		assert!(reporter.outputs().iter().all(|line| line.starts_with("Would create")));
	}

	#[test]
	fn test_missing_exact_path_is_an_error() {
		let src = MemoryEntry::new_root();
		let dest = MemoryEntry::new_root();
		let (error, reporter) = run("/roles/nope.json", &src, &dest, SyncOptions::default());
		assert!(error);
		assert_eq!(reporter.errors(), vec!["/roles/nope.json: No such file or directory on remote or local"]);
	}
}

// vim: ts=4
