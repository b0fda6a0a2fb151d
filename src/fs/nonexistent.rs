//! Placeholder for a child that does not exist

use super::{EntryRef, TreeEntry};
use crate::error::{FsError, FsResult};
use crate::path_utils;
use std::sync::Arc;

/// Entry returned by `child()` for names that are not there.
///
/// It keeps its parent so the missing entry can be created later, and
/// answers every read with `NotFound`.
#[derive(Clone)]
pub struct NonexistentEntry {
	name: String,
	path: String,
	parent: EntryRef,
}

impl NonexistentEntry {
	pub fn new(name: &str, parent: EntryRef) -> Self {
		let path = path_utils::child_path(&parent.path(), name);
		NonexistentEntry { name: name.to_string(), path, parent }
	}

	pub fn new_ref(name: &str, parent: EntryRef) -> EntryRef {
		Arc::new(NonexistentEntry::new(name, parent))
	}

	fn not_found(&self) -> FsError {
		FsError::NotFound { path: self.path.clone() }
	}
}

impl TreeEntry for NonexistentEntry {
	fn name(&self) -> &str {
		&self.name
	}

	fn parent(&self) -> Option<EntryRef> {
		Some(Arc::clone(&self.parent))
	}

	fn path(&self) -> String {
		self.path.clone()
	}

	fn display_path(&self) -> String {
		path_utils::child_path(&self.parent.display_path(), &self.name)
	}

	fn path_for_printing(&self) -> String {
		path_utils::child_path(&self.parent.path_for_printing(), &self.name)
	}

	fn is_dir(&self) -> bool {
		false
	}

	fn exists(&self) -> bool {
		false
	}

	fn children(&self) -> FsResult<Vec<EntryRef>> {
		Err(self.not_found())
	}

	fn child(&self, name: &str) -> EntryRef {
		NonexistentEntry::new_ref(name, Arc::new(self.clone()))
	}

	fn can_have_child(&self, _name: &str, _is_dir: bool) -> bool {
		false
	}

	fn create_child(&self, _name: &str, _content: Option<&[u8]>) -> FsResult<EntryRef> {
		Err(self.not_found())
	}

	fn read(&self) -> FsResult<Vec<u8>> {
		Err(self.not_found())
	}

	fn write(&self, _content: &[u8]) -> FsResult<()> {
		Err(self.not_found())
	}

	fn delete(&self, _recurse: bool) -> FsResult<()> {
		Err(self.not_found())
	}
}

// vim: ts=4
