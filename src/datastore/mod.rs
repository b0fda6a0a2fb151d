//! Key/value store over a repository tree
//!
//! [`ChefFsDataStore`] answers a server's storage calls (`get`, `set`,
//! `list`, ...) from a repository laid out the way users keep it on disk.
//! Paths are store paths (`["data", "users", "alice"]`); [`paths`] maps them
//! to tree paths. What a repository cannot hold (sandboxes, uploaded file
//! contents, the `_default` environment) lives in a [`MemoryStore`].
//!
//! Cookbooks need the most translation: a store read of
//! `cookbooks/<name>/<version>` synthesizes the manifest from the files on
//! disk, and a store write stages the referenced file contents and copies
//! them into the cookbook directory. Cookbook artifacts go through the same
//! path, keyed by identifier instead of version.

pub mod memory_store;
pub mod paths;

pub use memory_store::MemoryStore;

use crate::callbacks::{LogReporter, Reporter};
use crate::config::{Config, RepoMode};
use crate::cookbook::manifest::{checksum_bytes, CookbookMetadata, CookbookVersion};
use crate::error::{DataStoreError, FsError, FsResult, Operation};
use crate::fs::data_handler::{object_name, to_pretty_json};
use crate::fs::memory::MemoryEntry;
use crate::fs::repository::split_name_version;
use crate::fs::{copy_to, resolve_path, EntryRef, SyncOptions};
use crate::logging::*;
use crate::parallel::Parallelizer;
use crate::path_utils;
use crate::pattern::FilePattern;
use paths::{always_exists, owned, to_store_segments, to_tree_segments, uses_memory_store};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub type StoreResult<T> = Result<T, DataStoreError>;

const ARTIFACTS: &str = "cookbook_artifacts";

/// Repository shape the store serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataStoreOptions {
	pub repo_mode: RepoMode,
	pub versioned_cookbooks: bool,
}

impl DataStoreOptions {
	pub fn from_config(config: &Config) -> Self {
		DataStoreOptions { repo_mode: config.repo_mode, versioned_cookbooks: config.versioned_cookbooks }
	}
}

pub struct ChefFsDataStore {
	root: EntryRef,
	memory_store: MemoryStore,
	parallelizer: Arc<Parallelizer>,
	options: DataStoreOptions,
}

impl ChefFsDataStore {
	pub fn new(root: EntryRef, parallelizer: Arc<Parallelizer>, options: DataStoreOptions) -> Self {
		ChefFsDataStore { root, memory_store: MemoryStore::new(), parallelizer, options }
	}

	pub fn root(&self) -> &EntryRef {
		&self.root
	}

	pub fn memory_store(&self) -> &MemoryStore {
		&self.memory_store
	}

	pub fn description(&self) -> String {
		format!("Reading and writing data to {}", self.root.path_for_printing())
	}

	fn is_org(&self) -> bool {
		self.options.repo_mode.is_org()
	}

	// ========================================================================
	// PATH MAPPING
	// ========================================================================

	fn tree_segments(&self, path: &[&str]) -> StoreResult<Vec<String>> {
		to_tree_segments(path, self.options.versioned_cookbooks, |name| self.single_cookbook_version(name))
	}

	fn tree_path(&self, path: &[&str]) -> StoreResult<String> {
		Ok(format!("/{}", self.tree_segments(path)?.join("/")))
	}

	fn store_path(&self, tree_path: &str) -> Vec<String> {
		to_store_segments(tree_path, self.options.versioned_cookbooks, |name| self.single_cookbook_version(name))
	}

	/// Express tree errors in store space
	fn map_error(&self, e: FsError) -> DataStoreError {
		match e {
			FsError::NotFound { path } => DataStoreError::NotFound { path: self.store_path(&path) },
			FsError::AlreadyExists { path } => DataStoreError::AlreadyExists { path: self.store_path(&path) },
			e => DataStoreError::Fs(e),
		}
	}

	fn entry(&self, path: &[&str]) -> StoreResult<EntryRef> {
		Ok(resolve_path(&self.root, &self.tree_path(path)?))
	}

	/// Directory at tree `segments`, created on demand when `create` is
	/// set (top-level directories are always created)
	fn get_dir(&self, segments: &[String], create: bool) -> StoreResult<EntryRef> {
		let entry = resolve_path(&self.root, &format!("/{}", segments.join("/")));
		if entry.exists() {
			return Ok(entry);
		}
		match segments.split_last() {
			Some((name, parent)) if create || segments.len() == 1 => {
				let parent = self.get_dir(parent, create)?;
				parent.create_child(name, None).map_err(|e| self.map_error(e))
			}
			_ => Err(DataStoreError::NotFound { path: self.store_path(&entry.path()) }),
		}
	}

	fn with_parent_dir(&self, path: &[&str], create_parents: bool) -> StoreResult<(EntryRef, String)> {
		let segments = self.tree_segments(path)?;
		match segments.split_last() {
			Some((name, parent)) => Ok((self.get_dir(parent, create_parents)?, name.clone())),
			None => Err(DataStoreError::NotFound { path: owned(path) }),
		}
	}

	fn get_json(&self, tree_path: &str, default: Value) -> StoreResult<Value> {
		match resolve_path(&self.root, tree_path).read() {
			Ok(bytes) => self.parse_json(tree_path, &bytes),
			Err(e) if e.is_not_found() => Ok(default),
			Err(e) => Err(self.map_error(e)),
		}
	}

	fn parse_json(&self, tree_path: &str, bytes: &[u8]) -> StoreResult<Value> {
		serde_json::from_slice(bytes).map_err(|e| DataStoreError::InvalidData {
			path: self.store_path(tree_path),
			message: e.to_string(),
		})
	}

	/// Read-modify-write a JSON file; a missing file starts from `default`
	/// and is only created if the update changed it
	fn update_json<F>(&self, tree_path: &str, default: Value, create_parents: bool, update: F) -> StoreResult<()>
	where
		F: FnOnce(Value) -> StoreResult<Value>,
	{
		let entry = resolve_path(&self.root, tree_path);
		match entry.read() {
			Ok(bytes) => {
				let input = self.parse_json(tree_path, &bytes)?;
				let output = update(input.clone())?;
				if output != input {
					entry.write(&to_pretty_json(&output)).map_err(|e| self.map_error(e))?;
				}
				Ok(())
			}
			Err(e) if e.is_not_found() => {
				let output = update(default.clone())?;
				if output == default {
					return Ok(());
				}
				let segments: Vec<String> = path_utils::split(tree_path).iter().map(|s| s.to_string()).collect();
				let (name, parent) = match segments.split_last() {
					Some(split) => split,
					None => return Err(DataStoreError::NotFound { path: Vec::new() }),
				};
				let parent = self.get_dir(parent, create_parents)?;
				parent.create_child(name, Some(&to_pretty_json(&output))).map_err(|e| self.map_error(e))?;
				Ok(())
			}
			Err(e) => Err(self.map_error(e)),
		}
	}

	// ========================================================================
	// STORE OPERATIONS
	// ========================================================================

	pub fn create_dir(&self, path: &[&str], name: &str, create_parents: bool) -> StoreResult<()> {
		if uses_memory_store(path) {
			return self.memory_store.create_dir(path, name, create_parents);
		}
		let full = with_name(path, name);
		let (parent, child_name) = self.with_parent_dir(&full, create_parents)?;
		parent.create_child(&child_name, None).map_err(|e| self.map_error(e))?;
		Ok(())
	}

	pub fn create(&self, path: &[&str], name: &str, data: &[u8], create_parents: bool) -> StoreResult<()> {
		if uses_memory_store(path) {
			return self.memory_store.create(path, name, data, create_parents);
		}
		let full = with_name(path, name);
		match path {
			// The cookbook appears when its first version is written.
			["cookbooks"] | ["cookbook_artifacts"] => Ok(()),
			["policy_groups", group, "policies"] => {
				let revision = parse_lenient(data);
				self.update_json(&self.tree_path(&["policy_groups", *group])?, json!({}), create_parents, |mut value| {
					let policies = policies_mut(&mut value).ok_or_else(|| invalid(&full, "policy group is not an object"))?;
					if policies.contains_key(name) {
						return Err(DataStoreError::AlreadyExists { path: owned(&full) });
					}
					policies.insert(name.to_string(), json!({ "revision_id": revision }));
					Ok(value)
				})
			}
			["users"] if self.is_org() => self.update_json("/members.json", json!([]), create_parents, |members| {
				if member_names(&members).iter().any(|m| m == name) {
					return Err(DataStoreError::AlreadyExists { path: owned(&full) });
				}
				let mut list = members.as_array().cloned().unwrap_or_default();
				list.push(json!({ "user": { "username": name } }));
				Ok(Value::Array(list))
			}),
			["association_requests"] if self.is_org() => {
				self.update_json("/invitations.json", json!([]), create_parents, |invitations| {
					if invitation_names(&invitations).iter().any(|m| m == name) {
						return Err(DataStoreError::AlreadyExists { path: owned(&full) });
					}
					let mut list = invitations.as_array().cloned().unwrap_or_default();
					list.push(json!({ "username": name }));
					Ok(Value::Array(list))
				})
			}
			_ => {
				let (parent, child_name) = self.with_parent_dir(&full, create_parents)?;
				parent.create_child(&child_name, Some(data)).map_err(|e| self.map_error(e))?;
				Ok(())
			}
		}
	}

	/// Value at `path`; cookbook manifests point file URLs at `base_uri`
	pub fn get(&self, path: &[&str], base_uri: &str) -> StoreResult<Vec<u8>> {
		if uses_memory_store(path) {
			return self.memory_store.get(path);
		}
		match path {
			["file_store", "repo", rest @ ..] => {
				let entry = resolve_path(&self.root, &format!("/{}", rest.join("/")));
				entry.read().map_err(|e| self.map_error(e))
			}
			["policy_groups", group, "policies", policy] => {
				let value = self.get_json(&self.tree_path(&["policy_groups", *group])?, json!({}))?;
				match value.get("policies").and_then(|p| p.get(*policy)).and_then(|p| p.get("revision_id")) {
					Some(revision) => Ok(to_pretty_json(revision)),
					None => Err(DataStoreError::NotFound { path: owned(path) }),
				}
			}
			["users", name] if self.is_org() => {
				let members = self.get_json("/members.json", json!([]))?;
				if member_names(&members).iter().any(|m| m == name) {
					Ok(b"{}".to_vec())
				} else {
					Err(DataStoreError::NotFound { path: owned(path) })
				}
			}
			["association_requests", name] if self.is_org() => {
				let invitations = self.get_json("/invitations.json", json!([]))?;
				if invitation_names(&invitations).iter().any(|m| m == name) {
					Ok(b"{}".to_vec())
				} else {
					Err(DataStoreError::NotFound { path: owned(path) })
				}
			}
			[collection @ ("cookbooks" | "cookbook_artifacts"), name, version] => {
				Ok(to_pretty_json(&self.cookbook_manifest(collection, name, version, base_uri)?))
			}
			_ => self.entry(path)?.read().map_err(|e| self.map_error(e)),
		}
	}

	pub fn set(&self, path: &[&str], data: &[u8], create_parents: bool) -> StoreResult<()> {
		if uses_memory_store(path) {
			return self.memory_store.set(path, data, create_parents);
		}
		match path {
			[collection @ ("cookbooks" | "cookbook_artifacts"), name, version] => {
				self.write_cookbook(collection, name, version, data)
			}
			["policy_groups", group, "policies", policy] => {
				let revision = parse_lenient(data);
				self.update_json(&self.tree_path(&["policy_groups", *group])?, json!({}), create_parents, |mut value| {
					let policies = policies_mut(&mut value).ok_or_else(|| invalid(path, "policy group is not an object"))?;
					policies.insert(policy.to_string(), json!({ "revision_id": revision }));
					Ok(value)
				})
			}
			_ => {
				let (parent, name) = self.with_parent_dir(path, create_parents)?;
				let child = parent.child(&name);
				let result = if child.exists() {
					child.write(data)
				} else {
					parent.create_child(&name, Some(data)).map(|_| ())
				};
				result.map_err(|e| self.map_error(e))
			}
		}
	}

	pub fn delete(&self, path: &[&str]) -> StoreResult<()> {
		if uses_memory_store(path) {
			return self.memory_store.delete(path);
		}
		match path {
			["policy_groups", group, "policies", policy] => {
				self.update_json(&self.tree_path(&["policy_groups", *group])?, json!({}), false, |mut value| {
					let removed = policies_mut(&mut value).and_then(|policies| policies.remove(*policy));
					match removed {
						Some(_) => Ok(value),
						None => Err(DataStoreError::NotFound { path: owned(path) }),
					}
				})
			}
			["users", name] if self.is_org() => self.update_json("/members.json", json!([]), false, |members| {
				remove_named(members, &member_names, name).ok_or_else(|| DataStoreError::NotFound { path: owned(path) })
			}),
			["association_requests", name] if self.is_org() => {
				self.update_json("/invitations.json", json!([]), false, |invitations| {
					remove_named(invitations, &invitation_names, name)
						.ok_or_else(|| DataStoreError::NotFound { path: owned(path) })
				})
			}
			_ => {
				let recurse = matches!(path, ["cookbooks", _, _, ..] | ["cookbook_artifacts", _, _, ..]);
				self.entry(path)?.delete(recurse).map_err(|e| self.map_error(e))
			}
		}
	}

	pub fn delete_dir(&self, path: &[&str], recursive: bool) -> StoreResult<()> {
		if uses_memory_store(path) {
			return self.memory_store.delete_dir(path, recursive);
		}
		match path {
			["policies", policy] => {
				let policies = self.entry(&["policies"])?;
				let mut found = false;
				for revision in policies.children().map_err(|e| self.map_error(e))? {
					if policy_name(revision.name()) == Some(*policy) {
						revision.delete(false).map_err(|e| self.map_error(e))?;
						found = true;
					}
				}
				if found {
					Ok(())
				} else {
					Err(DataStoreError::NotFound { path: owned(path) })
				}
			}
			_ => self.entry(path)?.delete(recursive).map_err(|e| self.map_error(e)),
		}
	}

	/// Names under `path`, in store form
	pub fn list(&self, path: &[&str]) -> StoreResult<Vec<String>> {
		if uses_memory_store(path) {
			return self.memory_store.list(path);
		}
		match path {
			["policies"] => {
				let names: BTreeSet<String> = self
					.children_or_empty(&["policies"])?
					.iter()
					.filter_map(|child| policy_name(child.name()).map(String::from))
					.collect();
				Ok(names.into_iter().collect())
			}
			["policies", policy, "revisions"] => {
				let revisions: Vec<String> = self
					.children_or_empty(&["policies"])?
					.iter()
					.filter_map(|child| split_name_version(object_name(child.name())))
					.filter(|(name, _)| name == policy)
					.map(|(_, revision)| revision.to_string())
					.collect();
				if revisions.is_empty() {
					return Err(DataStoreError::NotFound { path: owned(path) });
				}
				Ok(revisions)
			}
			["policy_groups", _] => {
				if !self.entry(path)?.exists() {
					return Err(DataStoreError::NotFound { path: owned(path) });
				}
				Ok(vec!["policies".to_string()])
			}
			["policy_groups", group, "policies"] => {
				let entry = self.entry(&["policy_groups", *group])?;
				let bytes = entry.read().map_err(|e| self.map_error(e))?;
				let value = self.parse_json(&entry.path(), &bytes)?;
				Ok(value.get("policies").and_then(Value::as_object).map(|p| p.keys().cloned().collect()).unwrap_or_default())
			}
			["cookbooks"] if !self.options.versioned_cookbooks => {
				Ok(self.children_or_empty(path)?.iter().map(|c| c.name().to_string()).collect())
			}
			["cookbooks"] | ["cookbook_artifacts"] => {
				let names: BTreeSet<String> = self
					.children_or_empty(path)?
					.iter()
					.filter_map(|c| split_name_version(c.name()).map(|(name, _)| name.to_string()))
					.collect();
				Ok(names.into_iter().collect())
			}
			[collection @ "cookbook_artifacts", name] => self.versions_of(collection, name),
			[collection @ "cookbooks", name] => {
				if self.options.versioned_cookbooks {
					return self.versions_of(collection, name);
				}
				let dir = resolve_path(&self.root, &path_utils::child_path("/cookbooks", name));
				if !dir.exists() {
					return Err(DataStoreError::NotFound { path: owned(path) });
				}
				Ok(vec![self.single_cookbook_version(name)?])
			}
			["users"] if self.is_org() => Ok(member_names(&self.get_json("/members.json", json!([]))?)),
			["association_requests"] if self.is_org() => {
				Ok(invitation_names(&self.get_json("/invitations.json", json!([]))?))
			}
			_ => {
				let mut names: Vec<String> = self
					.children_or_empty(path)?
					.iter()
					.filter_map(|child| self.store_path(&child.path()).pop())
					.collect();
				names.sort();
				Ok(names)
			}
		}
	}

	/// Versions (or identifiers) of `name` among `<name>-<version>` directories
	fn versions_of(&self, collection: &str, name: &str) -> StoreResult<Vec<String>> {
		let versions: Vec<String> = self
			.children_or_empty(&[collection])?
			.iter()
			.filter_map(|c| split_name_version(c.name()))
			.filter(|(cookbook, _)| *cookbook == name)
			.map(|(_, version)| version.to_string())
			.collect();
		if versions.is_empty() {
			return Err(DataStoreError::NotFound { path: owned(&[collection, name]) });
		}
		Ok(versions)
	}

	/// Children of the entry at `path`; base directories list as empty
	fn children_or_empty(&self, path: &[&str]) -> StoreResult<Vec<EntryRef>> {
		match self.entry(path)?.children() {
			Ok(children) => Ok(children),
			Err(e) if e.is_not_found() && always_exists(path) => Ok(Vec::new()),
			Err(e) => Err(self.map_error(e)),
		}
	}

	pub fn exists(&self, path: &[&str]) -> bool {
		if uses_memory_store(path) {
			return self.memory_store.exists(path);
		}
		match path {
			["policy_groups", group, "policies", policy] => self
				.tree_path(&["policy_groups", *group])
				.and_then(|tree_path| self.get_json(&tree_path, json!({})))
				.map(|value| value.get("policies").and_then(|p| p.get(*policy)).is_some())
				.unwrap_or(false),
			["users", _] | ["association_requests", _] if self.is_org() => self.get(path, "").is_ok(),
			_ => always_exists(path) || self.entry(path).map(|entry| entry.exists()).unwrap_or(false),
		}
	}

	pub fn exists_dir(&self, path: &[&str]) -> bool {
		if uses_memory_store(path) {
			return self.memory_store.exists_dir(path);
		}
		match path {
			["cookbooks", name] | ["cookbook_artifacts", name] | ["policies", name] => {
				self.list(&path[..1]).map(|names| names.iter().any(|n| n == name)).unwrap_or(false)
			}
			["policy_groups", group, "policies"] => self.exists_dir(&["policy_groups", *group]),
			_ => self.entry(path).map(|entry| entry.exists()).unwrap_or(false),
		}
	}

	// ========================================================================
	// COOKBOOKS
	// ========================================================================

	/// Version of `cookbooks/<name>` in a single-version repository.
	///
	/// Sources are the upload sentinel, `metadata.json` and `metadata.rb`;
	/// they must agree. With none of them the version is `0.0.0`.
	pub fn single_cookbook_version(&self, name: &str) -> StoreResult<String> {
		let dir = resolve_path(&self.root, &path_utils::child_path("/cookbooks", name));
		let mut versions = BTreeSet::new();

		if let Some(sentinel) = dir.uploaded_version() {
			if let Ok(Some(bytes)) = sentinel.read_uploaded_version() {
				let value: Option<Value> = serde_json::from_slice(&bytes).ok();
				let metadata = value.as_ref().and_then(|v| v.get("metadata"));
				if let Some(version) = metadata.and_then(|m| CookbookMetadata::from_value(m).version) {
					versions.insert(version);
				}
			}
		}
		if let Ok(bytes) = dir.child("metadata.json").read() {
			if let Some(version) = CookbookMetadata::from_json(&bytes).and_then(|m| m.version) {
				versions.insert(version);
			}
		}
		if let Ok(bytes) = dir.child("metadata.rb").read() {
			if let Some(version) = CookbookMetadata::from_ruby(&String::from_utf8_lossy(&bytes)).version {
				versions.insert(version);
			}
		}

		let mut versions: Vec<String> = versions.into_iter().collect();
		match versions.len() {
			0 => Ok("0.0.0".to_string()),
			1 => Ok(versions.remove(0)),
			_ => Err(DataStoreError::AmbiguousCookbookVersion { cookbook: name.to_string(), versions }),
		}
	}

	fn cookbook_dir_name(&self, collection: &str, name: &str, version: &str) -> String {
		if collection == ARTIFACTS || self.options.versioned_cookbooks {
			format!("{}-{}", name, version)
		} else {
			name.to_string()
		}
	}

	/// Manifest for the cookbook version, built from the files on disk.
	///
	/// For an artifact `version` is the identifier, and the version comes
	/// from the metadata.
	fn cookbook_manifest(&self, collection: &str, name: &str, version: &str, base_uri: &str) -> StoreResult<Value> {
		let store_path = [collection, name, version];
		let dir = self.entry(&store_path)?;
		if !dir.exists() {
			return Err(DataStoreError::NotFound { path: owned(&store_path) });
		}
		let dir_name = self.cookbook_dir_name(collection, name, version);

		let mut manifest = CookbookVersion::new(name, version);
		let sentinel = match dir.uploaded_version() {
			Some(sentinel) => sentinel.read_uploaded_version().map_err(|e| self.map_error(e))?,
			None => None,
		};
		match sentinel.and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok()) {
			Some(sentinel) => {
				if let Some(metadata) = sentinel.get("metadata").filter(|m| m.is_object()) {
					manifest.metadata = metadata.clone();
				}
				manifest.frozen = sentinel.get("frozen?").and_then(Value::as_bool).unwrap_or(false);
			}
			None => {
				if let Ok(bytes) = dir.child("metadata.json").read() {
					if let Ok(metadata) = serde_json::from_slice::<Value>(&bytes) {
						manifest.metadata = metadata;
					}
				}
			}
		}

		let mut files = Vec::new();
		cookbook_files(&dir, "", &mut files).map_err(|e| self.map_error(e))?;
		let base_uri = base_uri.trim_end_matches('/');
		for (file_path, entry) in files {
			let checksum = match entry.checksum() {
				Some(checksum) => checksum,
				None => checksum_bytes(&entry.read().map_err(|e| self.map_error(e))?),
			};
			let url = format!("{}/file_store/repo/{}/{}/{}", base_uri, collection, dir_name, file_path);
			manifest.add_file(&file_path, &checksum, Some(url));
		}
		if collection != ARTIFACTS {
			return Ok(manifest.to_json());
		}

		if let Some(real_version) = manifest.metadata.get("version").and_then(Value::as_str) {
			manifest.version = real_version.to_string();
		}
		let mut value = manifest.to_json();
		if let Some(object) = value.as_object_mut() {
			object.insert("name".into(), json!(name));
			object.insert("identifier".into(), json!(version));
		}
		Ok(value)
	}

	/// Write a cookbook version from its manifest.
	///
	/// File contents come from `file_store/checksums`. They are staged in
	/// memory and copied over the cookbook directory with purge on, so files
	/// the manifest no longer lists are removed; then the sentinel records
	/// the manifest's metadata.
	fn write_cookbook(&self, collection: &str, name: &str, version: &str, data: &[u8]) -> StoreResult<()> {
		let store_path = [collection, name, version];
		let manifest: Value = serde_json::from_slice(data).map_err(|e| invalid(&store_path, &e.to_string()))?;
		let dir_name = self.cookbook_dir_name(collection, name, version);
		let cookbook_path = path_utils::child_path(&format!("/{}", collection), &dir_name);

		let staging = MemoryEntry::new_root();
		staging.add_dir(&cookbook_path)?;
		let segments = manifest.as_object().into_iter().flat_map(|m| m.values()).filter_map(Value::as_array);
		for record in segments.flatten() {
			let checksum = record.get("checksum").and_then(Value::as_str);
			let file_path = record.get("path").and_then(Value::as_str);
			if let (Some(checksum), Some(file_path)) = (checksum, file_path) {
				let content = self.memory_store.get(&["file_store", "checksums", checksum])?;
				staging.add_file(&path_utils::child_path(&cookbook_path, file_path), &content)?;
			}
		}

		if !self.root.child(collection).exists() {
			self.root.create_child(collection, None).map_err(|e| self.map_error(e))?;
		}
		let pattern = FilePattern::new(&cookbook_path).map_err(|e| invalid(&store_path, &e.to_string()))?;
		let source: EntryRef = staging;
		let reporter: Arc<dyn Reporter> = Arc::new(LogReporter);
		let options = SyncOptions { purge: true, ..SyncOptions::default() };
		if copy_to(&Arc::new(pattern), &source, &self.root, None, &options, &reporter, &self.parallelizer) {
			return Err(DataStoreError::Fs(FsError::OperationFailed {
				path: cookbook_path,
				operation: Operation::Upload,
				message: "not every cookbook file could be written".to_string(),
			}));
		}

		let sentinel = json!({
			"frozen?": manifest.get("frozen?").cloned().unwrap_or(Value::Bool(false)),
			"metadata": manifest.get("metadata").cloned().unwrap_or_else(|| json!({})),
			"cookbook_name": name,
		});
		let dir = resolve_path(&self.root, &cookbook_path);
		match dir.uploaded_version() {
			Some(uploaded) => uploaded.write_uploaded_version(&to_pretty_json(&sentinel)).map_err(|e| self.map_error(e))?,
			None => warn!("Cannot record the uploaded version of {}", dir.path_for_printing()),
		}
		info!("Wrote cookbook {} version {} to {}", name, version, dir.path_for_printing());
		Ok(())
	}
}

fn with_name<'a>(path: &[&'a str], name: &'a str) -> Vec<&'a str> {
	let mut full = path.to_vec();
	full.push(name);
	full
}

fn invalid(path: &[&str], message: &str) -> DataStoreError {
	DataStoreError::InvalidData { path: owned(path), message: message.to_string() }
}

/// JSON if it parses, the raw text otherwise
fn parse_lenient(data: &[u8]) -> Value {
	serde_json::from_slice(data).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(data).into_owned()))
}

fn policies_mut(group: &mut Value) -> Option<&mut Map<String, Value>> {
	group.as_object_mut()?.entry("policies").or_insert_with(|| json!({})).as_object_mut()
}

/// Policy name of a `<name>-<revision>.json` entry
fn policy_name(entry_name: &str) -> Option<&str> {
	split_name_version(object_name(entry_name)).map(|(name, _)| name)
}

/// Usernames in `members.json` (`[{"user": {"username": ...}}]`)
fn member_names(members: &Value) -> Vec<String> {
	let names = members.as_array().into_iter().flatten();
	names
		.filter_map(|m| m.get("user").and_then(|u| u.get("username")).and_then(Value::as_str))
		.map(String::from)
		.collect()
}

/// Usernames in `invitations.json` (`[{"username": ...}]`)
fn invitation_names(invitations: &Value) -> Vec<String> {
	let names = invitations.as_array().into_iter().flatten();
	names.filter_map(|i| i.get("username").and_then(Value::as_str)).map(String::from).collect()
}

/// `list` without the entry naming `name`; `None` if there was none
fn remove_named(list: Value, names: &dyn Fn(&Value) -> Vec<String>, name: &str) -> Option<Value> {
	let items = list.as_array().cloned().unwrap_or_default();
	let kept: Vec<Value> = items
		.iter()
		.filter(|item| names(&Value::Array(vec![(*item).clone()])).iter().all(|n| n != name))
		.cloned()
		.collect();
	if kept.len() == items.len() {
		None
	} else {
		Some(Value::Array(kept))
	}
}

/// Every file below a cookbook directory, paths relative to it
fn cookbook_files(entry: &EntryRef, prefix: &str, out: &mut Vec<(String, EntryRef)>) -> FsResult<()> {
	for child in entry.children()? {
		let relative = if prefix.is_empty() {
			child.name().to_string()
		} else {
			format!("{}/{}", prefix, child.name())
		};
		if child.is_dir() {
			cookbook_files(&child, &relative, out)?;
		} else {
			out.push((relative, child));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::memory::MemoryEntry;
	use crate::fs::TreeEntry;

	fn store(root: &Arc<MemoryEntry>, repo_mode: RepoMode) -> ChefFsDataStore {
		let root: EntryRef = root.clone();
		let options = DataStoreOptions { repo_mode, versioned_cookbooks: true };
		ChefFsDataStore::new(root, Arc::new(Parallelizer::synchronous()), options)
	}

	#[test]
	fn test_data_bag_items_map_to_json_files() {
		let root = MemoryEntry::new_root();
		root.add_dir("data_bags").unwrap();
		let store = store(&root, RepoMode::Everything);
		store.create_dir(&["data"], "users", false).unwrap();
		store.create(&["data", "users"], "alice", b"{\"id\":\"alice\"}", false).unwrap();

		assert_eq!(store.list(&["data"]).unwrap(), vec!["users"]);
		assert_eq!(store.list(&["data", "users"]).unwrap(), vec!["alice"]);
		assert_eq!(store.get(&["data", "users", "alice"], "").unwrap(), b"{\"id\":\"alice\"}");
		assert!(root.child("data_bags").child("users").child("alice.json").exists());
	}

	#[test]
	fn test_missing_entries_are_not_found_in_store_space() {
		let root = MemoryEntry::new_root();
		root.add_dir("roles").unwrap();
		let store = store(&root, RepoMode::Everything);
		match store.get(&["roles", "web"], "") {
			Err(DataStoreError::NotFound { path }) => assert_eq!(path, vec!["roles", "web"]),
			other => panic!("unexpected {:?}", other),
		}
		assert!(store.list(&["nodes"]).unwrap().is_empty());
		assert!(store.exists(&["nodes"]));
	}

	#[test]
	fn test_policy_groups_nest_revisions() {
		let root = MemoryEntry::new_root();
		root.add_dir("policy_groups").unwrap();
		let store = store(&root, RepoMode::HostedEverything);
		store.create(&["policy_groups", "prod", "policies"], "app", b"\"abc\"", true).unwrap();

		assert_eq!(store.get(&["policy_groups", "prod", "policies", "app"], "").unwrap(), b"\"abc\"\n");
		assert_eq!(store.list(&["policy_groups", "prod", "policies"]).unwrap(), vec!["app"]);
		assert!(store.exists(&["policy_groups", "prod", "policies", "app"]));
		store.delete(&["policy_groups", "prod", "policies", "app"]).unwrap();
		assert!(!store.exists(&["policy_groups", "prod", "policies", "app"]));
	}

	#[test]
	fn test_org_members_live_in_members_json() {
		let root = MemoryEntry::new_root();
		let store = store(&root, RepoMode::HostedEverything);
		store.create(&["users"], "jkeiser", b"{}", false).unwrap();
		assert!(store.create(&["users"], "jkeiser", b"{}", false).is_err());
		assert_eq!(store.list(&["users"]).unwrap(), vec!["jkeiser"]);
		store.delete(&["users", "jkeiser"]).unwrap();
		assert!(store.list(&["users"]).unwrap().is_empty());
	}

	#[test]
	fn test_sandboxes_stay_in_memory() {
		let root = MemoryEntry::new_root();
		let store = store(&root, RepoMode::Everything);
		store.create(&["sandboxes"], "sb1", b"{}", false).unwrap();
		assert!(store.exists(&["sandboxes", "sb1"]));
		assert!(root.children().unwrap().is_empty());
	}
}

// vim: ts=4
