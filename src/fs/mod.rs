//! Tree abstraction shared by every backend
//!
//! A tree is made of [`TreeEntry`] values addressed by `/`-separated paths.
//! Backends: [`local`] (a repository on disk), [`remote`] (a server behind
//! [`remote::ServerApi`]), [`memory`] (staging and tests) and the
//! [`nonexistent`] placeholder returned for missing children.
//!
//! The generic algorithms live next to the trait: listing by pattern
//! ([`lister`]), diffing ([`diff`], [`diff_print`]) and one-way copy
//! ([`copy`]).

pub mod children_cache;
pub mod copy;
pub mod data_handler;
pub mod diff;
pub mod diff_print;
pub mod lister;
pub mod local;
pub mod memory;
pub mod nonexistent;
pub mod remote;
pub mod repository;

use crate::error::{FsError, FsResult};
use crate::path_utils;
use std::sync::Arc;

pub use copy::{copy_to, SyncOptions};
pub use diff::{diff, DiffResult};
pub use lister::{child_pairs, list, list_pairs, Lister, PairLister};
pub use nonexistent::NonexistentEntry;

/// Shared handle to a tree entry
pub type EntryRef = Arc<dyn TreeEntry>;

/// Content of an entry as seen by a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
	/// Not read yet
	NotRead,
	/// The entry does not exist
	Missing,
	/// Bytes read from the entry
	Value(Vec<u8>),
}

impl Content {
	pub fn is_missing(&self) -> bool {
		*self == Content::Missing
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Content::Value(bytes) => Some(bytes),
			_ => None,
		}
	}
}

/// Result of asking one entry to compare itself against another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareOutcome {
	Same { ours: Content, theirs: Content },
	Different { ours: Content, theirs: Content },
	/// This backend cannot tell cheaply
	Unknown,
}

/// Node in a tree.
///
/// Implementations are cheap handles; identity is the path. `child()` never
/// fails: a name that does not exist yields a [`NonexistentEntry`].
pub trait TreeEntry: Send + Sync {
	fn name(&self) -> &str;

	fn parent(&self) -> Option<EntryRef>;

	/// Full tree path; the root is `/`
	fn path(&self) -> String {
		match self.parent() {
			Some(parent) => path_utils::child_path(&parent.path(), self.name()),
			None => "/".to_string(),
		}
	}

	/// Path used for pattern matching and pairing across trees
	fn display_path(&self) -> String {
		self.path()
	}

	/// Path shown to users (a file path for disk entries)
	fn path_for_printing(&self) -> String {
		self.display_path()
	}

	fn is_dir(&self) -> bool;

	fn exists(&self) -> bool;

	fn children(&self) -> FsResult<Vec<EntryRef>>;

	fn child(&self, name: &str) -> EntryRef;

	/// Whether a child of that name and type could live here
	fn can_have_child(&self, name: &str, is_dir: bool) -> bool;

	/// Create a file (`Some(content)`) or directory (`None`)
	fn create_child(&self, name: &str, content: Option<&[u8]>) -> FsResult<EntryRef>;

	fn read(&self) -> FsResult<Vec<u8>>;

	fn write(&self, content: &[u8]) -> FsResult<()>;

	fn delete(&self, recurse: bool) -> FsResult<()>;

	/// Cheap comparison, when the backend has one
	fn compare_to(&self, _other: &dyn TreeEntry) -> CompareOutcome {
		CompareOutcome::Unknown
	}

	/// Content checksum, when the backend knows it without reading
	fn checksum(&self) -> Option<String> {
		None
	}

	/// Capability to create a child mirroring a whole source subtree
	fn fast_create(&self) -> Option<&dyn FastCreate> {
		None
	}

	/// Capability to replace this entry from a source subtree in one step
	fn fast_copy(&self) -> Option<&dyn FastCopy> {
		None
	}

	/// Access to the upload sentinel, for cookbook directories on disk
	fn uploaded_version(&self) -> Option<&dyn UploadedVersion> {
		None
	}
}

/// Directory that creates a complete child from another tree's entry
pub trait FastCreate: Send + Sync {
	fn create_child_from(&self, source: &EntryRef) -> FsResult<EntryRef>;
}

/// Entry that updates itself from another tree's entry
pub trait FastCopy: Send + Sync {
	fn copy_from(&self, source: &EntryRef, options: &SyncOptions) -> FsResult<()>;
}

/// Cookbook directory remembering the manifest it was uploaded with.
///
/// The sentinel is not a child entry: listings, diffs and copies never see it.
pub trait UploadedVersion: Send + Sync {
	/// Sentinel contents, `None` when the cookbook was never uploaded
	fn read_uploaded_version(&self) -> FsResult<Option<Vec<u8>>>;

	/// Write the sentinel, creating the cookbook directory if needed
	fn write_uploaded_version(&self, content: &[u8]) -> FsResult<()>;
}

/// Walk up to the root of `entry`'s tree
pub fn root_of(entry: &EntryRef) -> EntryRef {
	let mut current = Arc::clone(entry);
	while let Some(parent) = current.parent() {
		current = parent;
	}
	current
}

/// Resolve `path` relative to `entry`; a leading `/` starts at the root
pub fn resolve_path(entry: &EntryRef, path: &str) -> EntryRef {
	let mut result = if path_utils::is_absolute(path) { root_of(entry) } else { Arc::clone(entry) };
	for part in path_utils::split(path) {
		result = result.child(part);
	}
	result
}

/// Read an entry, mapping NotFound to [`Content::Missing`]
pub fn read_content(entry: &dyn TreeEntry) -> FsResult<Content> {
	match entry.read() {
		Ok(bytes) => Ok(Content::Value(bytes)),
		Err(FsError::NotFound { .. }) => Ok(Content::Missing),
		Err(e) => Err(e),
	}
}

/// Outcome of [`compare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
	pub same: bool,
	pub a_value: Content,
	pub b_value: Content,
}

/// Compare two entries, cheapest way first.
///
/// Asks `a`, then `b`; if neither backend can tell, reads both sides.
pub fn compare(a: &dyn TreeEntry, b: &dyn TreeEntry) -> FsResult<Comparison> {
	let (same, mut a_value, mut b_value) = match a.compare_to(b) {
		CompareOutcome::Same { ours, theirs } => (Some(true), ours, theirs),
		CompareOutcome::Different { ours, theirs } => (Some(false), ours, theirs),
		CompareOutcome::Unknown => match b.compare_to(a) {
			CompareOutcome::Same { ours, theirs } => (Some(true), theirs, ours),
			CompareOutcome::Different { ours, theirs } => (Some(false), theirs, ours),
			CompareOutcome::Unknown => (None, Content::NotRead, Content::NotRead),
		},
	};

	let same = match same {
		Some(same) => same,
		None => {
			if a_value == Content::NotRead {
				a_value = read_content(a)?;
			}
			if b_value == Content::NotRead {
				b_value = read_content(b)?;
			}
			a_value == b_value
		}
	};
	Ok(Comparison { same, a_value, b_value })
}


// vim: ts=4
