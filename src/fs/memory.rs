//! In-memory tree, used to stage uploads and in tests

use super::{EntryRef, NonexistentEntry, TreeEntry};
use crate::error::{FsError, FsResult};
use crate::path_utils;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

enum NodeKind {
	Dir(RwLock<Vec<Arc<MemoryNode>>>),
	File(RwLock<Vec<u8>>),
}

struct MemoryNode {
	name: String,
	path: String,
	// Directories own their children; the way up is weak.
	parent: Weak<MemoryNode>,
	kind: NodeKind,
	removed: AtomicBool,
}

impl MemoryNode {
	fn new(name: &str, parent: Option<&Arc<MemoryNode>>, content: Option<&[u8]>) -> Arc<Self> {
		let (path, parent) = match parent {
			Some(parent) => (path_utils::child_path(&parent.path, name), Arc::downgrade(parent)),
			None => ("/".to_string(), Weak::new()),
		};
		let kind = match content {
			Some(bytes) => NodeKind::File(RwLock::new(bytes.to_vec())),
			None => NodeKind::Dir(RwLock::new(Vec::new())),
		};
		Arc::new(MemoryNode {
			name: name.to_string(),
			path,
			parent,
			kind,
			removed: AtomicBool::new(false),
		})
	}

	fn find(&self, name: &str) -> Option<Arc<MemoryNode>> {
		match &self.kind {
			NodeKind::Dir(children) => children.read().iter().find(|c| c.name == name).cloned(),
			NodeKind::File(_) => None,
		}
	}

	fn mark_removed(&self) {
		self.removed.store(true, Ordering::SeqCst);
		if let NodeKind::Dir(children) = &self.kind {
			for child in children.read().iter() {
				child.mark_removed();
			}
		}
	}
}

/// Handle to a node of an in-memory tree.
///
/// Keep the root handle alive: nodes only hold weak references upwards.
#[derive(Clone)]
pub struct MemoryEntry {
	node: Arc<MemoryNode>,
}

impl MemoryEntry {
	pub fn new_root() -> Arc<MemoryEntry> {
		Arc::new(MemoryEntry { node: MemoryNode::new("", None, None) })
	}

	fn wrap(node: Arc<MemoryNode>) -> Arc<MemoryEntry> {
		Arc::new(MemoryEntry { node })
	}

	/// Create a directory and any missing parents
	pub fn add_dir(&self, path: &str) -> FsResult<Arc<MemoryEntry>> {
		let mut current = Arc::clone(&self.node);
		for part in path_utils::split(path) {
			current = match current.find(part) {
				Some(existing) => existing,
				None => insert_child(&current, part, None)?,
			};
		}
		Ok(MemoryEntry::wrap(current))
	}

	/// Create (or replace) a file and any missing parent directories
	pub fn add_file(&self, path: &str, content: &[u8]) -> FsResult<Arc<MemoryEntry>> {
		let parts = path_utils::split(path);
		let (name, dirs) = match parts.split_last() {
			Some(split) => split,
			None => return Err(FsError::TypeMismatch { path: self.node.path.clone(), expected_dir: false }),
		};
		let parent = self.add_dir(&dirs.join("/"))?;
		if let Some(existing) = parent.node.find(name) {
			let entry = MemoryEntry::wrap(existing);
			entry.write(content)?;
			return Ok(entry);
		}
		Ok(MemoryEntry::wrap(insert_child(&parent.node, name, Some(content))?))
	}
}

fn insert_child(parent: &Arc<MemoryNode>, name: &str, content: Option<&[u8]>) -> FsResult<Arc<MemoryNode>> {
	let children = match &parent.kind {
		NodeKind::Dir(children) => children,
		NodeKind::File(_) => {
			return Err(FsError::TypeMismatch { path: parent.path.clone(), expected_dir: true })
		}
	};
	let mut children = children.write();
	if children.iter().any(|c| c.name == name) {
		return Err(FsError::AlreadyExists { path: path_utils::child_path(&parent.path, name) });
	}
	let node = MemoryNode::new(name, Some(parent), content);
	let index = children.iter().position(|c| c.name.as_str() > name).unwrap_or(children.len());
	children.insert(index, Arc::clone(&node));
	Ok(node)
}

impl TreeEntry for MemoryEntry {
	fn name(&self) -> &str {
		&self.node.name
	}

	fn parent(&self) -> Option<EntryRef> {
		self.node.parent.upgrade().map(|node| MemoryEntry::wrap(node) as EntryRef)
	}

	fn path(&self) -> String {
		self.node.path.clone()
	}

	fn is_dir(&self) -> bool {
		matches!(self.node.kind, NodeKind::Dir(_))
	}

	fn exists(&self) -> bool {
		!self.node.removed.load(Ordering::SeqCst)
	}

	fn children(&self) -> FsResult<Vec<EntryRef>> {
		if !self.exists() {
			return Err(FsError::NotFound { path: self.path() });
		}
		match &self.node.kind {
			NodeKind::Dir(children) => Ok(children
				.read()
				.iter()
				.map(|node| MemoryEntry::wrap(Arc::clone(node)) as EntryRef)
				.collect()),
			NodeKind::File(_) => Err(FsError::TypeMismatch { path: self.path(), expected_dir: true }),
		}
	}

	fn child(&self, name: &str) -> EntryRef {
		match self.node.find(name) {
			Some(node) => MemoryEntry::wrap(node) as EntryRef,
			None => NonexistentEntry::new_ref(name, Arc::new(self.clone())),
		}
	}

	fn can_have_child(&self, _name: &str, _is_dir: bool) -> bool {
		self.is_dir()
	}

	fn create_child(&self, name: &str, content: Option<&[u8]>) -> FsResult<EntryRef> {
		if !self.exists() {
			return Err(FsError::NotFound { path: self.path() });
		}
		Ok(MemoryEntry::wrap(insert_child(&self.node, name, content)?))
	}

	fn read(&self) -> FsResult<Vec<u8>> {
		if !self.exists() {
			return Err(FsError::NotFound { path: self.path() });
		}
		match &self.node.kind {
			NodeKind::File(bytes) => Ok(bytes.read().clone()),
			NodeKind::Dir(_) => Err(FsError::TypeMismatch { path: self.path(), expected_dir: false }),
		}
	}

	fn write(&self, content: &[u8]) -> FsResult<()> {
		if !self.exists() {
			return Err(FsError::NotFound { path: self.path() });
		}
		match &self.node.kind {
			NodeKind::File(bytes) => {
				*bytes.write() = content.to_vec();
				Ok(())
			}
			NodeKind::Dir(_) => Err(FsError::TypeMismatch { path: self.path(), expected_dir: false }),
		}
	}

	fn delete(&self, recurse: bool) -> FsResult<()> {
		if !self.exists() {
			return Err(FsError::NotFound { path: self.path() });
		}
		if self.is_dir() && !recurse {
			return Err(FsError::MustDeleteRecursively { path: self.path() });
		}
		let parent = match self.node.parent.upgrade() {
			Some(parent) => parent,
			None => {
				return Err(FsError::OperationFailed {
					path: self.path(),
					operation: crate::error::Operation::Delete,
					message: "cannot delete the root".to_string(),
				})
			}
		};
		if let NodeKind::Dir(children) = &parent.kind {
			children.write().retain(|c| !Arc::ptr_eq(c, &self.node));
		}
		self.node.mark_removed();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_add_file_creates_parents() {
		let root = MemoryEntry::new_root();
		root.add_file("cookbooks/app/recipes/default.rb", b"x").unwrap();
		let recipes = super::super::resolve_path(&(root.clone() as EntryRef), "/cookbooks/app/recipes");
		assert!(recipes.is_dir());
		assert_eq!(recipes.children().unwrap().len(), 1);
		assert_eq!(recipes.path(), "/cookbooks/app/recipes");
	}

	#[test]
	fn test_children_sorted_by_name() {
		let root = MemoryEntry::new_root();
		root.add_file("b", b"").unwrap();
		root.add_file("a", b"").unwrap();
		let names: Vec<String> = root.children().unwrap().iter().map(|c| c.name().to_string()).collect();
		assert_eq!(names, vec!["a", "b"]);
	}

	#[test]
	fn test_delete_requires_recurse_for_dirs() {
		let root = MemoryEntry::new_root();
		let dir = root.add_dir("d").unwrap();
		assert!(matches!(dir.delete(false), Err(FsError::MustDeleteRecursively { .. })));
		dir.delete(true).unwrap();
		assert!(!dir.exists());
		assert!(!root.child("d").exists());
	}
}

// vim: ts=4
