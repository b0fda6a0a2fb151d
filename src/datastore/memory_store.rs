//! In-memory key/value store
//!
//! Holds what has no place in a repository: sandboxes, uploaded file
//! contents keyed by checksum, and the built-in `_default` environment.

use crate::error::DataStoreError;
use crate::fs::data_handler::{to_pretty_json, ObjectKind};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

enum Node {
	Dir(BTreeMap<String, Node>),
	Data(Vec<u8>),
}

fn owned(path: &[&str]) -> Vec<String> {
	path.iter().map(|s| s.to_string()).collect()
}

fn not_found(path: &[&str]) -> DataStoreError {
	DataStoreError::NotFound { path: owned(path) }
}

pub struct MemoryStore {
	root: RwLock<Node>,
}

impl Default for MemoryStore {
	fn default() -> Self {
		MemoryStore::new()
	}
}

impl MemoryStore {
	/// Empty store
	pub fn empty() -> Self {
		MemoryStore { root: RwLock::new(Node::Dir(BTreeMap::new())) }
	}

	/// Store with `sandboxes`, `file_store/checksums` and the `_default`
	/// environment in place
	pub fn new() -> Self {
		let store = MemoryStore::empty();
		let mut default_env = ObjectKind::Environment.default_object("_default");
		if let Value::Object(map) = &mut default_env {
			map.insert("description".into(), Value::String("The default Chef environment".into()));
		}
		// The store is empty, so none of these can collide.
		let _ = store.create_dir(&[], "sandboxes", false);
		let _ = store.create_dir(&["file_store"], "checksums", true);
		let _ = store.create(&["environments"], "_default", &to_pretty_json(&default_env), true);
		store
	}

	fn with_dir<T, F>(&self, path: &[&str], create_parents: bool, f: F) -> Result<T, DataStoreError>
	where
		F: FnOnce(&mut BTreeMap<String, Node>) -> Result<T, DataStoreError>,
	{
		let mut root = self.root.write();
		let mut current = &mut *root;
		for (i, part) in path.iter().enumerate() {
			let children = match current {
				Node::Dir(children) => children,
				Node::Data(_) => return Err(not_found(&path[..i])),
			};
			if !children.contains_key(*part) {
				if !create_parents {
					return Err(not_found(&path[..=i]));
				}
				children.insert(part.to_string(), Node::Dir(BTreeMap::new()));
			}
			current = match children.get_mut(*part) {
				Some(node) => node,
				None => return Err(not_found(&path[..=i])),
			};
		}
		match current {
			Node::Dir(children) => f(children),
			Node::Data(_) => Err(not_found(path)),
		}
	}

	fn split<'a, 'b>(path: &'a [&'b str]) -> Result<(&'a [&'b str], &'b str), DataStoreError> {
		match path.split_last() {
			Some((name, parent)) => Ok((parent, *name)),
			None => Err(not_found(path)),
		}
	}

	pub fn create_dir(&self, path: &[&str], name: &str, create_parents: bool) -> Result<(), DataStoreError> {
		self.with_dir(path, create_parents, |children| {
			if children.contains_key(name) {
				let mut full = owned(path);
				full.push(name.to_string());
				return Err(DataStoreError::AlreadyExists { path: full });
			}
			children.insert(name.to_string(), Node::Dir(BTreeMap::new()));
			Ok(())
		})
	}

	pub fn create(&self, path: &[&str], name: &str, data: &[u8], create_parents: bool) -> Result<(), DataStoreError> {
		self.with_dir(path, create_parents, |children| {
			if children.contains_key(name) {
				let mut full = owned(path);
				full.push(name.to_string());
				return Err(DataStoreError::AlreadyExists { path: full });
			}
			children.insert(name.to_string(), Node::Data(data.to_vec()));
			Ok(())
		})
	}

	pub fn get(&self, path: &[&str]) -> Result<Vec<u8>, DataStoreError> {
		let (parent, name) = MemoryStore::split(path)?;
		self.with_dir(parent, false, |children| match children.get(name) {
			Some(Node::Data(data)) => Ok(data.clone()),
			_ => Err(not_found(path)),
		})
	}

	/// Create or replace the value at `path`
	pub fn set(&self, path: &[&str], data: &[u8], create_parents: bool) -> Result<(), DataStoreError> {
		let (parent, name) = MemoryStore::split(path)?;
		self.with_dir(parent, create_parents, |children| {
			if let Some(Node::Dir(_)) = children.get(name) {
				return Err(DataStoreError::InvalidData { path: owned(path), message: "is a directory".into() });
			}
			children.insert(name.to_string(), Node::Data(data.to_vec()));
			Ok(())
		})
	}

	pub fn delete(&self, path: &[&str]) -> Result<(), DataStoreError> {
		let (parent, name) = MemoryStore::split(path)?;
		self.with_dir(parent, false, |children| match children.get(name) {
			Some(Node::Data(_)) => {
				children.remove(name);
				Ok(())
			}
			_ => Err(not_found(path)),
		})
	}

	pub fn delete_dir(&self, path: &[&str], recursive: bool) -> Result<(), DataStoreError> {
		let (parent, name) = MemoryStore::split(path)?;
		self.with_dir(parent, false, |children| match children.get(name) {
			Some(Node::Dir(grandchildren)) => {
				if !recursive && !grandchildren.is_empty() {
					return Err(DataStoreError::InvalidData {
						path: owned(path),
						message: "directory is not empty".into(),
					});
				}
				children.remove(name);
				Ok(())
			}
			_ => Err(not_found(path)),
		})
	}

	/// Names directly under `path`, sorted
	pub fn list(&self, path: &[&str]) -> Result<Vec<String>, DataStoreError> {
		self.with_dir(path, false, |children| Ok(children.keys().cloned().collect()))
	}

	pub fn exists(&self, path: &[&str]) -> bool {
		self.get(path).is_ok()
	}

	pub fn exists_dir(&self, path: &[&str]) -> bool {
		self.list(path).is_ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_preloaded_default_environment() {
		let store = MemoryStore::new();
		let env: Value = serde_json::from_slice(&store.get(&["environments", "_default"]).unwrap()).unwrap();
		assert_eq!(env["name"], "_default");
		assert!(store.exists_dir(&["sandboxes"]));
		assert!(store.exists_dir(&["file_store", "checksums"]));
	}

	#[test]
	fn test_create_conflicts_and_set_replaces() {
		let store = MemoryStore::new();
		store.create(&["sandboxes"], "sb1", b"{}", false).unwrap();
		match store.create(&["sandboxes"], "sb1", b"{}", false) {
			Err(DataStoreError::AlreadyExists { path }) => assert_eq!(path, vec!["sandboxes", "sb1"]),
			other => panic!("unexpected {:?}", other),
		}
		store.set(&["sandboxes", "sb1"], b"{\"done\":true}", false).unwrap();
		assert_eq!(store.get(&["sandboxes", "sb1"]).unwrap(), b"{\"done\":true}");
		assert_eq!(store.list(&["sandboxes"]).unwrap(), vec!["sb1"]);
	}

	#[test]
	fn test_missing_parents() {
		let store = MemoryStore::empty();
		assert!(store.set(&["a", "b", "c"], b"x", false).is_err());
		store.set(&["a", "b", "c"], b"x", true).unwrap();
		assert!(store.exists(&["a", "b", "c"]));
		assert!(store.delete_dir(&["a"], false).is_err());
		store.delete_dir(&["a"], true).unwrap();
		assert!(!store.exists_dir(&["a"]));
	}
}

// vim: ts=4
