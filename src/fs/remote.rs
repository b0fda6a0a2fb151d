//! Tree backed by a server
//!
//! The server is reached through [`ServerApi`]; transport and
//! authentication are the caller's business. Top-level collections list
//! `{name: url}` maps and show up as directories of `<name>.json` objects.
//! Cookbooks and cookbook artifacts are directories built from their
//! manifests, so files can be compared by checksum without downloading them.
//! Under `acls/` every object of an ACL-bearing collection shows up as a
//! `<name>.json` holding its permissions.
//!
//! Listings are cached for the whole run in a [`ChildrenCache`] owned by
//! the root; call [`RemoteEntry::reset`] before starting a new run.

use super::children_cache::ChildrenCache;
use super::data_handler::{object_name, same_object, to_pretty_json, ObjectKind};
use super::repository::{segment_info, split_name_version, ACL_SUBDIRS, UPLOADED_COOKBOOK_VERSION_FILE};
use super::{CompareOutcome, Content, EntryRef, FastCopy, FastCreate, NonexistentEntry, SyncOptions, TreeEntry};
use crate::config::{Config, RepoMode};
use crate::cookbook::manifest::{checksum_bytes, CookbookMetadata, CookbookVersion, ManifestRecord};
use crate::error::{FsError, FsResult, NotAllowedReason, Operation, RestError};
use crate::logging::*;
use crate::path_utils;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// REST-style access to a server.
///
/// Paths are relative to the server's base URL (`roles/web`); URLs handed
/// out by the server (cookbook files, sandbox uploads) are absolute.
pub trait ServerApi: Send + Sync {
	fn get(&self, path: &str) -> Result<Value, RestError>;

	fn put(&self, path: &str, body: &Value) -> Result<Value, RestError>;

	fn post(&self, path: &str, body: &Value) -> Result<Value, RestError>;

	fn delete(&self, path: &str) -> Result<Value, RestError>;

	/// Download raw bytes
	fn get_raw(&self, url: &str) -> Result<Vec<u8>, RestError>;

	/// Upload raw bytes
	fn put_raw(&self, url: &str, content: &[u8]) -> Result<(), RestError>;
}

/// Permissions an ACL document holds
const ACL_PERMISSIONS: &[&str] = &["create", "read", "update", "delete", "grant"];

/// Server collection a cookbook lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CookbookSet {
	Cookbooks,
	/// `cookbook_artifacts`, keyed by identifier instead of version
	Artifacts,
}

impl CookbookSet {
	fn dir(self) -> &'static str {
		match self {
			CookbookSet::Cookbooks => "cookbooks",
			CookbookSet::Artifacts => "cookbook_artifacts",
		}
	}

	/// Whether tree names carry the version: `<name>-<version>`
	fn versioned(self, versioned_cookbooks: bool) -> bool {
		self == CookbookSet::Artifacts || versioned_cookbooks
	}
}

/// Where a remote entry sits in the server layout
#[derive(Clone)]
enum RemoteKind {
	Root,
	/// Collection of JSON objects (`roles`, `data/<bag>`, ...)
	ObjectList { api_path: String, object: ObjectKind },
	DataBags,
	Object { api_path: String, object: ObjectKind },
	Cookbooks(CookbookSet),
	/// A cookbook (`prefix` empty) or a directory inside one
	CookbookDir { set: CookbookSet, cookbook: String, prefix: String },
	CookbookFile { cookbook: String, record: ManifestRecord },
	Acls,
	/// ACLs of the objects in the collection at `api_path`
	AclList { api_path: String },
	Acl { api_path: String },
}

/// State shared by every entry of one server tree
struct Server {
	api: Arc<dyn ServerApi>,
	repo_mode: RepoMode,
	versioned_cookbooks: bool,
	children: ChildrenCache,
	/// Tree name -> (cookbook name, version or identifier)
	cookbook_index: RwLock<HashMap<CookbookSet, Arc<BTreeMap<String, (String, String)>>>>,
	/// Keyed by tree path
	manifests: RwLock<HashMap<String, Arc<CookbookVersion>>>,
}

impl Server {
	fn cookbooks(&self, set: CookbookSet) -> FsResult<Arc<BTreeMap<String, (String, String)>>> {
		if let Some(index) = self.cookbook_index.read().get(&set) {
			return Ok(Arc::clone(index));
		}
		let (listing_path, version_key) = match set {
			CookbookSet::Cookbooks => ("cookbooks?num_versions=all", "version"),
			CookbookSet::Artifacts => ("cookbook_artifacts", "identifier"),
		};
		let listing = self
			.api
			.get(listing_path)
			.map_err(|e| rest_error(&format!("/{}", set.dir()), Operation::List, e))?;
		let versioned = set.versioned(self.versioned_cookbooks);
		let mut index = BTreeMap::new();
		for (name, info) in listing.as_object().into_iter().flatten() {
			let versions = info.get("versions").and_then(Value::as_array).cloned().unwrap_or_default();
			// The server lists the newest version first.
			for version in versions.iter().filter_map(|v| v.get(version_key).and_then(Value::as_str)) {
				if versioned {
					index.insert(format!("{}-{}", name, version), (name.clone(), version.to_string()));
				} else {
					index.insert(name.clone(), (name.clone(), version.to_string()));
					break;
				}
			}
		}
		let index = Arc::new(index);
		self.cookbook_index.write().insert(set, Arc::clone(&index));
		Ok(index)
	}

	fn manifest(&self, set: CookbookSet, tree_name: &str) -> FsResult<Arc<CookbookVersion>> {
		let path = path_utils::child_path(&format!("/{}", set.dir()), tree_name);
		if let Some(manifest) = self.manifests.read().get(&path) {
			return Ok(Arc::clone(manifest));
		}
		let (name, version) = match self.cookbooks(set)?.get(tree_name) {
			Some(found) => found.clone(),
			None => return Err(FsError::NotFound { path }),
		};
		let value = self
			.api
			.get(&format!("{}/{}/{}", set.dir(), name, version))
			.map_err(|e| rest_error(&path, Operation::Read, e))?;
		let manifest = CookbookVersion::from_json(&value).map_err(|message| FsError::OperationFailed {
			path: path.clone(),
			operation: Operation::Read,
			message,
		})?;
		let manifest = Arc::new(manifest);
		self.manifests.write().insert(path, Arc::clone(&manifest));
		Ok(manifest)
	}

	fn invalidate_cookbooks(&self, set: CookbookSet) {
		self.children.invalidate(&format!("/{}", set.dir()));
		self.cookbook_index.write().remove(&set);
		self.manifests.write().clear();
	}
}

fn rest_error(path: &str, operation: Operation, e: RestError) -> FsError {
	let path = path.to_string();
	match e {
		RestError::NotFound => FsError::NotFound { path },
		RestError::Conflict => FsError::AlreadyExists { path },
		RestError::Forbidden => FsError::OperationNotAllowed {
			path,
			operation,
			reason: NotAllowedReason::Other("forbidden by the server".to_string()),
		},
		e => FsError::OperationFailed { path, operation, message: e.to_string() },
	}
}

/// Server path of the object behind `entry_name` in the collection `list_api`
fn object_api_path(list_api: &str, object: ObjectKind, entry_name: &str) -> String {
	let name = object_name(entry_name);
	if object == ObjectKind::Policy {
		if let Some((policy, revision)) = split_name_version(name) {
			return format!("policies/{}/revisions/{}", policy, revision);
		}
	}
	format!("{}/{}", list_api, name)
}

#[derive(Clone)]
pub struct RemoteEntry {
	name: String,
	path: String,
	parent: Option<Arc<RemoteEntry>>,
	kind: RemoteKind,
	server: Arc<Server>,
}

impl RemoteEntry {
	pub fn open_root(api: Arc<dyn ServerApi>, repo_mode: RepoMode, versioned_cookbooks: bool) -> Arc<RemoteEntry> {
		let server = Server {
			api,
			repo_mode,
			versioned_cookbooks,
			children: ChildrenCache::new(),
			cookbook_index: RwLock::new(HashMap::new()),
			manifests: RwLock::new(HashMap::new()),
		};
		Arc::new(RemoteEntry {
			name: String::new(),
			path: "/".to_string(),
			parent: None,
			kind: RemoteKind::Root,
			server: Arc::new(server),
		})
	}

	pub fn from_config(api: Arc<dyn ServerApi>, config: &Config) -> Arc<RemoteEntry> {
		RemoteEntry::open_root(api, config.repo_mode, config.versioned_cookbooks)
	}

	/// Forget every cached listing and manifest
	pub fn reset(&self) {
		self.server.children.reset();
		self.server.cookbook_index.write().clear();
		self.server.manifests.write().clear();
	}

	fn make_child(&self, name: &str, kind: RemoteKind) -> EntryRef {
		Arc::new(RemoteEntry {
			name: name.to_string(),
			path: path_utils::child_path(&self.path, name),
			parent: Some(Arc::new(self.clone())),
			kind,
			server: Arc::clone(&self.server),
		})
	}

	fn top_level(&self, name: &str) -> Option<EntryRef> {
		let kind = match name {
			"acls" => RemoteKind::Acls,
			"cookbooks" => RemoteKind::Cookbooks(CookbookSet::Cookbooks),
			"cookbook_artifacts" => RemoteKind::Cookbooks(CookbookSet::Artifacts),
			"data_bags" => RemoteKind::DataBags,
			_ => RemoteKind::ObjectList { api_path: name.to_string(), object: ObjectKind::for_dir(name)? },
		};
		Some(self.make_child(name, kind))
	}

	fn listing(&self) -> FsResult<Arc<Vec<EntryRef>>> {
		self.server.children.get_or_load(&self.path, || self.load_children())
	}

	fn load_children(&self) -> FsResult<Vec<EntryRef>> {
		let api = &self.server.api;
		match &self.kind {
			RemoteKind::Root => Ok(self
				.server
				.repo_mode
				.server_dirs()
				.iter()
				.filter_map(|name| self.top_level(name))
				.collect()),
			RemoteKind::ObjectList { api_path, object } => {
				let listing = api.get(api_path).map_err(|e| rest_error(&self.path, Operation::List, e))?;
				let mut names = BTreeSet::new();
				for (key, value) in listing.as_object().into_iter().flatten() {
					if *object == ObjectKind::Policy {
						let revisions = value.get("revisions").and_then(Value::as_object);
						for revision in revisions.into_iter().flat_map(|r| r.keys()) {
							names.insert(format!("{}-{}.json", key, revision));
						}
					} else {
						names.insert(format!("{}.json", key));
					}
				}
				Ok(names
					.into_iter()
					.map(|name| {
						let kind = RemoteKind::Object {
							api_path: object_api_path(api_path, *object, &name),
							object: *object,
						};
						self.make_child(&name, kind)
					})
					.collect())
			}
			RemoteKind::DataBags => {
				let listing = api.get("data").map_err(|e| rest_error(&self.path, Operation::List, e))?;
				Ok(listing
					.as_object()
					.into_iter()
					.flat_map(|bags| bags.keys())
					.map(|bag| {
						let kind =
							RemoteKind::ObjectList { api_path: format!("data/{}", bag), object: ObjectKind::DataBagItem };
						self.make_child(bag, kind)
					})
					.collect())
			}
			RemoteKind::Cookbooks(set) => Ok(self
				.server
				.cookbooks(*set)?
				.keys()
				.map(|tree_name| {
					let kind = RemoteKind::CookbookDir { set: *set, cookbook: tree_name.clone(), prefix: String::new() };
					self.make_child(tree_name, kind)
				})
				.collect()),
			RemoteKind::CookbookDir { set, cookbook, prefix } => {
				let manifest = self.server.manifest(*set, cookbook)?;
				let mut dirs = BTreeSet::new();
				let mut files = BTreeMap::new();
				for (_, record) in manifest.records() {
					let relative = if prefix.is_empty() {
						Some(record.path.as_str())
					} else {
						path_utils::relative_to(&record.path, prefix)
					};
					match relative.map(|r| r.split_once('/')) {
						Some(Some((dir, _))) => {
							dirs.insert(dir.to_string());
						}
						Some(None) => {
							files.insert(path_utils::basename(&record.path).to_string(), record.clone());
						}
						None => {}
					}
				}
				let mut children = Vec::new();
				for dir in dirs {
					let kind = RemoteKind::CookbookDir {
						set: *set,
						cookbook: cookbook.clone(),
						prefix: join_relative(prefix, &dir),
					};
					children.push(self.make_child(&dir, kind));
				}
				for (name, record) in files {
					let kind = RemoteKind::CookbookFile { cookbook: cookbook.clone(), record };
					children.push(self.make_child(&name, kind));
				}
				children.sort_by(|a, b| a.name().cmp(b.name()));
				Ok(children)
			}
			RemoteKind::Acls => {
				let server_dirs = self.server.repo_mode.server_dirs();
				let mut children: Vec<EntryRef> = ACL_SUBDIRS
					.iter()
					.filter(|dir| server_dirs.contains(*dir))
					.map(|dir| self.make_child(dir, RemoteKind::AclList { api_path: acl_collection(dir).to_string() }))
					.collect();
				let organization = RemoteKind::Acl { api_path: "organizations/_acl".to_string() };
				children.push(self.make_child("organization.json", organization));
				children.sort_by(|a, b| a.name().cmp(b.name()));
				Ok(children)
			}
			RemoteKind::AclList { api_path } => {
				let listing = api.get(api_path).map_err(|e| rest_error(&self.path, Operation::List, e))?;
				let names: BTreeSet<&String> = listing.as_object().into_iter().flat_map(|o| o.keys()).collect();
				Ok(names
					.into_iter()
					.map(|name| {
						let kind = RemoteKind::Acl { api_path: format!("{}/{}/_acl", api_path, name) };
						self.make_child(&format!("{}.json", name), kind)
					})
					.collect())
			}
			RemoteKind::Object { .. } | RemoteKind::CookbookFile { .. } | RemoteKind::Acl { .. } => {
				Err(FsError::TypeMismatch { path: self.path.clone(), expected_dir: true })
			}
		}
	}

	fn is_default_environment(&self) -> bool {
		matches!(self.kind, RemoteKind::Object { object: ObjectKind::Environment, .. }) && self.name == "_default.json"
	}

	fn not_allowed(&self, operation: Operation, reason: &str) -> FsError {
		FsError::OperationNotAllowed {
			path: self.path.clone(),
			operation,
			reason: NotAllowedReason::Other(reason.to_string()),
		}
	}

	fn invalidate_parent(&self) {
		if let Some(parent) = &self.parent {
			self.server.children.invalidate(&parent.path);
		}
	}

	/// Parse and normalize JSON written to `entry_name` in a collection
	fn parse_object(&self, object: ObjectKind, entry_name: &str, content: &[u8], operation: Operation) -> FsResult<Value> {
		let path = path_utils::child_path(&self.parent_path_for(entry_name), entry_name);
		let value: Value = serde_json::from_slice(content).map_err(|e| FsError::OperationFailed {
			path: path.clone(),
			operation,
			message: format!("invalid JSON: {}", e),
		})?;
		let name = object_name(entry_name);
		let normalized = object.normalize(&value, name);
		if let Some(key) = object.identity_key() {
			if let Some(actual) = normalized.get(key).and_then(Value::as_str) {
				if actual != name {
					return Err(FsError::OperationFailed {
						message: format!("{} in {} must be '{}' (is '{}')", key, path, name, actual),
						path,
						operation,
					});
				}
			}
		}
		Ok(normalized)
	}

	/// Path of the collection holding `entry_name`: `self` for new children
	fn parent_path_for(&self, entry_name: &str) -> String {
		if entry_name == self.name {
			self.parent.as_ref().map(|p| p.path.clone()).unwrap_or_else(|| "/".to_string())
		} else {
			self.path.clone()
		}
	}

	fn compare_object(&self, object: ObjectKind, other: &dyn TreeEntry) -> CompareOutcome {
		let theirs = match other.read() {
			Ok(bytes) => bytes,
			Err(e) if e.is_not_found() => {
				return CompareOutcome::Different { ours: Content::NotRead, theirs: Content::Missing }
			}
			Err(_) => return CompareOutcome::Unknown,
		};
		let ours = match self.read() {
			Ok(bytes) => bytes,
			Err(e) if e.is_not_found() => {
				return CompareOutcome::Different { ours: Content::Missing, theirs: Content::Value(theirs) }
			}
			Err(_) => return CompareOutcome::Unknown,
		};
		match same_object(object, object_name(&self.name), &ours, &theirs) {
			Some(true) => CompareOutcome::Same { ours: Content::Value(ours), theirs: Content::Value(theirs) },
			Some(false) => CompareOutcome::Different { ours: Content::Value(ours), theirs: Content::Value(theirs) },
			None => CompareOutcome::Unknown,
		}
	}

	/// PUT each permission that differs from what the server holds
	fn write_acl(&self, api_path: &str, content: &[u8]) -> FsResult<()> {
		let wanted: Value = serde_json::from_slice(content).map_err(|e| FsError::OperationFailed {
			path: self.path.clone(),
			operation: Operation::Write,
			message: format!("invalid JSON: {}", e),
		})?;
		let api = &self.server.api;
		let current = api.get(api_path).map_err(|e| rest_error(&self.path, Operation::Write, e))?;
		for permission in ACL_PERMISSIONS {
			let ace = match wanted.get(*permission) {
				Some(ace) if current.get(*permission) != Some(ace) => ace,
				_ => continue,
			};
			debug!("Updating {} permission of {}", permission, self.path);
			let mut body = Map::new();
			body.insert(permission.to_string(), ace.clone());
			api.put(&format!("{}/{}", api_path, permission), &Value::Object(body))
				.map_err(|e| rest_error(&self.path, Operation::Write, e))?;
		}
		Ok(())
	}

	fn compare_cookbook_file(&self, record: &ManifestRecord, other: &dyn TreeEntry) -> CompareOutcome {
		if let Some(checksum) = other.checksum() {
			return if checksum == record.checksum {
				CompareOutcome::Same { ours: Content::NotRead, theirs: Content::NotRead }
			} else {
				CompareOutcome::Different { ours: Content::NotRead, theirs: Content::NotRead }
			};
		}
		match other.read() {
			Ok(theirs) if checksum_bytes(&theirs) == record.checksum => {
				CompareOutcome::Same { ours: Content::NotRead, theirs: Content::Value(theirs) }
			}
			Ok(theirs) => CompareOutcome::Different { ours: Content::NotRead, theirs: Content::Value(theirs) },
			Err(e) if e.is_not_found() => CompareOutcome::Different { ours: Content::NotRead, theirs: Content::Missing },
			Err(_) => CompareOutcome::Unknown,
		}
	}

	/// Upload the cookbook in `source` as the child `tree_name` of this
	/// cookbooks directory: sandbox the file contents, then save the manifest.
	///
	/// Artifacts are saved under their identifier, the tree name's suffix.
	fn upload_cookbook(&self, source: &EntryRef, tree_name: &str) -> FsResult<()> {
		let set = match self.kind {
			RemoteKind::Cookbooks(set) => set,
			_ => return Err(self.not_allowed(Operation::Upload, "not a cookbooks directory")),
		};
		let path = path_utils::child_path(&self.path, tree_name);
		let mut files = Vec::new();
		collect_files(source.as_ref(), "", &mut files)?;

		let metadata = metadata_of(&files);
		let metadata_version = metadata.version.clone().unwrap_or_else(|| "0.0.0".to_string());
		let (cookbook_name, version) = match split_name_version(tree_name) {
			Some((name, version)) if set.versioned(self.server.versioned_cookbooks) => {
				(name.to_string(), version.to_string())
			}
			_ => (tree_name.to_string(), metadata_version.clone()),
		};
		let manifest_version = match set {
			CookbookSet::Cookbooks => &version,
			CookbookSet::Artifacts => &metadata_version,
		};

		let mut manifest = CookbookVersion::new(&cookbook_name, manifest_version);
		if let Some((_, bytes)) = files.iter().find(|(p, _)| p == "metadata.json") {
			if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
				manifest.metadata = value;
			}
		}
		let mut contents = BTreeMap::new();
		for (file_path, content) in &files {
			let checksum = checksum_bytes(content);
			manifest.add_file(file_path, &checksum, None);
			contents.insert(checksum, content);
		}

		let api = &self.server.api;
		let failed = |e: RestError| FsError::OperationFailed {
			path: path.clone(),
			operation: Operation::Upload,
			message: e.to_string(),
		};
		let checksums: Map<String, Value> = contents.keys().map(|c| (c.clone(), Value::Null)).collect();
		let sandbox = api.post("sandboxes", &json!({ "checksums": checksums })).map_err(failed)?;
		for (checksum, info) in sandbox.get("checksums").and_then(Value::as_object).into_iter().flatten() {
			if info.get("needs_upload").and_then(Value::as_bool) != Some(true) {
				continue;
			}
			if let (Some(url), Some(content)) = (info.get("url").and_then(Value::as_str), contents.get(checksum)) {
				debug!("Uploading {} for {}", checksum, path);
				api.put_raw(url, content).map_err(failed)?;
			}
		}
		if let Some(id) = sandbox.get("sandbox_id").and_then(Value::as_str) {
			api.put(&format!("sandboxes/{}", id), &json!({ "is_completed": true })).map_err(failed)?;
		}
		let body = match set {
			CookbookSet::Cookbooks => manifest.to_json(),
			CookbookSet::Artifacts => {
				let mut body = manifest.to_json();
				if let Some(object) = body.as_object_mut() {
					object.insert("name".into(), json!(cookbook_name));
					object.insert("identifier".into(), json!(version));
				}
				body
			}
		};
		api.put(&format!("{}/{}/{}", set.dir(), cookbook_name, version), &body).map_err(failed)?;
		info!("Uploaded {} {} {} ({} files)", set.dir(), cookbook_name, version, files.len());

		self.server.invalidate_cookbooks(set);
		Ok(())
	}
}

/// Server collection whose objects carry the ACLs under `acls/<dir>`
fn acl_collection(dir: &str) -> &str {
	match dir {
		"data_bags" => "data",
		dir => dir,
	}
}

fn join_relative(prefix: &str, name: &str) -> String {
	if prefix.is_empty() {
		name.to_string()
	} else {
		format!("{}/{}", prefix, name)
	}
}

/// Every file below `entry`, paths relative to it
fn collect_files(entry: &dyn TreeEntry, prefix: &str, out: &mut Vec<(String, Vec<u8>)>) -> FsResult<()> {
	for child in entry.children()? {
		let relative = join_relative(prefix, child.name());
		if child.is_dir() {
			collect_files(child.as_ref(), &relative, out)?;
		} else {
			let content = child.read()?;
			out.push((relative, content));
		}
	}
	Ok(())
}

fn metadata_of(files: &[(String, Vec<u8>)]) -> CookbookMetadata {
	let find = |name: &str| files.iter().find(|(p, _)| p == name).map(|(_, bytes)| bytes);
	find("metadata.json")
		.and_then(|bytes| CookbookMetadata::from_json(bytes))
		.or_else(|| find("metadata.rb").map(|bytes| CookbookMetadata::from_ruby(&String::from_utf8_lossy(bytes))))
		.unwrap_or_default()
}

/// Recursive sameness of two subtrees, by name sets and file comparison
fn same_tree(ours: &dyn TreeEntry, theirs: &dyn TreeEntry) -> FsResult<bool> {
	if ours.is_dir() != theirs.is_dir() {
		return Ok(false);
	}
	if !ours.is_dir() {
		return Ok(super::compare(ours, theirs)?.same);
	}
	let our_children = ours.children()?;
	let their_names: BTreeSet<String> = theirs.children()?.iter().map(|c| c.name().to_string()).collect();
	let our_names: BTreeSet<String> = our_children.iter().map(|c| c.name().to_string()).collect();
	if our_names != their_names {
		return Ok(false);
	}
	for child in &our_children {
		if !same_tree(child.as_ref(), theirs.child(child.name()).as_ref())? {
			return Ok(false);
		}
	}
	Ok(true)
}

impl TreeEntry for RemoteEntry {
	fn name(&self) -> &str {
		&self.name
	}

	fn parent(&self) -> Option<EntryRef> {
		self.parent.as_ref().map(|parent| Arc::clone(parent) as EntryRef)
	}

	fn path(&self) -> String {
		self.path.clone()
	}

	fn is_dir(&self) -> bool {
		!matches!(self.kind, RemoteKind::Object { .. } | RemoteKind::CookbookFile { .. } | RemoteKind::Acl { .. })
	}

	fn exists(&self) -> bool {
		match &self.parent {
			None => true,
			Some(parent) if matches!(parent.kind, RemoteKind::Root) => true,
			Some(parent) => parent
				.listing()
				.map(|children| children.iter().any(|child| child.name() == self.name))
				.unwrap_or(false),
		}
	}

	fn children(&self) -> FsResult<Vec<EntryRef>> {
		if !self.is_dir() {
			return Err(FsError::TypeMismatch { path: self.path.clone(), expected_dir: true });
		}
		Ok(self.listing()?.as_ref().clone())
	}

	fn child(&self, name: &str) -> EntryRef {
		let found = match &self.kind {
			RemoteKind::Root if self.server.repo_mode.server_dirs().contains(&name) => self.top_level(name),
			RemoteKind::Root | RemoteKind::Object { .. } | RemoteKind::CookbookFile { .. } | RemoteKind::Acl { .. } => None,
			RemoteKind::ObjectList { api_path, object } if self.can_have_child(name, false) => {
				let kind = RemoteKind::Object { api_path: object_api_path(api_path, *object, name), object: *object };
				Some(self.make_child(name, kind))
			}
			RemoteKind::AclList { api_path } if self.can_have_child(name, false) => {
				let kind = RemoteKind::Acl { api_path: format!("{}/{}/_acl", api_path, object_name(name)) };
				Some(self.make_child(name, kind))
			}
			_ => self.listing().ok().and_then(|children| children.iter().find(|c| c.name() == name).cloned()),
		};
		found.unwrap_or_else(|| NonexistentEntry::new_ref(name, Arc::new(self.clone())))
	}

	fn can_have_child(&self, name: &str, is_dir: bool) -> bool {
		match &self.kind {
			RemoteKind::Root => is_dir && self.server.repo_mode.server_dirs().contains(&name),
			RemoteKind::ObjectList { object: ObjectKind::Policy, .. } => {
				!is_dir && name.ends_with(".json") && split_name_version(object_name(name)).is_some()
			}
			RemoteKind::ObjectList { .. } => !is_dir && name.ends_with(".json"),
			RemoteKind::DataBags => is_dir,
			RemoteKind::Cookbooks(set) => {
				is_dir && (!set.versioned(self.server.versioned_cookbooks) || split_name_version(name).is_some())
			}
			RemoteKind::Acls => {
				if is_dir {
					ACL_SUBDIRS.contains(&name) && self.server.repo_mode.server_dirs().contains(&name)
				} else {
					name == "organization.json"
				}
			}
			RemoteKind::AclList { .. } => !is_dir && name.ends_with(".json"),
			RemoteKind::CookbookDir { prefix, .. } if prefix.is_empty() => {
				if is_dir {
					name != "root_files"
				} else {
					name != UPLOADED_COOKBOOK_VERSION_FILE
				}
			}
			RemoteKind::CookbookDir { prefix, .. } => {
				let segment = segment_info(prefix.split('/').next().unwrap_or_default());
				if is_dir {
					segment.recursive
				} else {
					!segment.ruby_only || name.ends_with(".rb")
				}
			}
			RemoteKind::Object { .. } | RemoteKind::CookbookFile { .. } | RemoteKind::Acl { .. } => false,
		}
	}

	fn create_child(&self, name: &str, content: Option<&[u8]>) -> FsResult<EntryRef> {
		let child_path = path_utils::child_path(&self.path, name);
		match (&self.kind, content) {
			(RemoteKind::ObjectList { api_path, object }, Some(content)) => {
				if *object == ObjectKind::Environment && name == "_default.json" {
					return Err(FsError::OperationNotAllowed {
						path: child_path,
						operation: Operation::CreateChild,
						reason: NotAllowedReason::DefaultEnvironment,
					});
				}
				let body = self.parse_object(*object, name, content, Operation::CreateChild)?;
				let post_path = match (object, split_name_version(object_name(name))) {
					(ObjectKind::Policy, Some((policy, _))) => format!("policies/{}/revisions", policy),
					_ => api_path.clone(),
				};
				self.server
					.api
					.post(&post_path, &body)
					.map_err(|e| rest_error(&child_path, Operation::CreateChild, e))?;
				self.server.children.invalidate(&self.path);
				let kind = RemoteKind::Object { api_path: object_api_path(api_path, *object, name), object: *object };
				Ok(self.make_child(name, kind))
			}
			(RemoteKind::DataBags, None) => {
				self.server
					.api
					.post("data", &json!({ "name": name }))
					.map_err(|e| rest_error(&child_path, Operation::CreateChild, e))?;
				self.server.children.invalidate(&self.path);
				let kind = RemoteKind::ObjectList { api_path: format!("data/{}", name), object: ObjectKind::DataBagItem };
				Ok(self.make_child(name, kind))
			}
			(RemoteKind::Cookbooks(_), _) => Err(FsError::OperationNotAllowed {
				path: child_path,
				operation: Operation::CreateChild,
				reason: NotAllowedReason::Other("cookbooks can only be uploaded whole".to_string()),
			}),
			(RemoteKind::Acls, _) | (RemoteKind::AclList { .. }, _) => Err(FsError::OperationNotAllowed {
				path: child_path,
				operation: Operation::CreateChild,
				reason: NotAllowedReason::Other("ACLs are created with their objects".to_string()),
			}),
			_ => Err(FsError::OperationNotAllowed {
				path: child_path,
				operation: Operation::CreateChild,
				reason: NotAllowedReason::Other("cannot be created on the server".to_string()),
			}),
		}
	}

	fn read(&self) -> FsResult<Vec<u8>> {
		match &self.kind {
			RemoteKind::Object { api_path, object } => {
				let value = self.server.api.get(api_path).map_err(|e| rest_error(&self.path, Operation::Read, e))?;
				Ok(to_pretty_json(&object.minimize(&value, object_name(&self.name))))
			}
			RemoteKind::CookbookFile { record, .. } => {
				let url = record.url.as_deref().ok_or_else(|| FsError::OperationFailed {
					path: self.path.clone(),
					operation: Operation::Read,
					message: "manifest has no URL for this file".to_string(),
				})?;
				self.server.api.get_raw(url).map_err(|e| rest_error(&self.path, Operation::Read, e))
			}
			RemoteKind::Acl { api_path } => {
				let value = self.server.api.get(api_path).map_err(|e| rest_error(&self.path, Operation::Read, e))?;
				Ok(to_pretty_json(&ObjectKind::Acl.minimize(&value, object_name(&self.name))))
			}
			_ => Err(FsError::TypeMismatch { path: self.path.clone(), expected_dir: false }),
		}
	}

	fn write(&self, content: &[u8]) -> FsResult<()> {
		match &self.kind {
			RemoteKind::Object { .. } if self.is_default_environment() => Err(FsError::OperationNotAllowed {
				path: self.path.clone(),
				operation: Operation::Write,
				reason: NotAllowedReason::DefaultEnvironment,
			}),
			RemoteKind::Object { object: ObjectKind::Policy, .. } => Err(FsError::OperationNotAllowed {
				path: self.path.clone(),
				operation: Operation::Write,
				reason: NotAllowedReason::ReadOnly,
			}),
			RemoteKind::Object { api_path, object } => {
				let body = self.parse_object(*object, &self.name, content, Operation::Write)?;
				self.server.api.put(api_path, &body).map_err(|e| rest_error(&self.path, Operation::Write, e))?;
				Ok(())
			}
			RemoteKind::CookbookFile { .. } => {
				Err(self.not_allowed(Operation::Write, "cookbook files are uploaded with their cookbook"))
			}
			RemoteKind::Acl { api_path } => self.write_acl(api_path, content),
			_ => Err(FsError::TypeMismatch { path: self.path.clone(), expected_dir: false }),
		}
	}

	fn delete(&self, recurse: bool) -> FsResult<()> {
		let api = &self.server.api;
		match &self.kind {
			RemoteKind::Object { .. } if self.is_default_environment() => Err(FsError::OperationNotAllowed {
				path: self.path.clone(),
				operation: Operation::Delete,
				reason: NotAllowedReason::DefaultEnvironment,
			}),
			RemoteKind::Object { api_path, .. } => {
				api.delete(api_path).map_err(|e| rest_error(&self.path, Operation::Delete, e))?;
				self.invalidate_parent();
				Ok(())
			}
			RemoteKind::ObjectList { api_path, .. } if self.parent.as_ref().map_or(false, |p| matches!(p.kind, RemoteKind::DataBags)) => {
				if !recurse {
					return Err(FsError::MustDeleteRecursively { path: self.path.clone() });
				}
				api.delete(api_path).map_err(|e| rest_error(&self.path, Operation::Delete, e))?;
				self.server.children.invalidate(&self.path);
				self.invalidate_parent();
				Ok(())
			}
			RemoteKind::CookbookDir { set, cookbook, prefix } if prefix.is_empty() => {
				if !recurse {
					return Err(FsError::MustDeleteRecursively { path: self.path.clone() });
				}
				let (name, version) = match self.server.cookbooks(*set)?.get(cookbook) {
					Some(found) => found.clone(),
					None => return Err(FsError::NotFound { path: self.path.clone() }),
				};
				api.delete(&format!("{}/{}/{}", set.dir(), name, version))
					.map_err(|e| rest_error(&self.path, Operation::Delete, e))?;
				self.server.invalidate_cookbooks(*set);
				Ok(())
			}
			RemoteKind::Acl { .. } => Err(self.not_allowed(Operation::Delete, "ACLs are removed with their objects")),
			RemoteKind::CookbookDir { .. } | RemoteKind::CookbookFile { .. } => {
				Err(self.not_allowed(Operation::Delete, "cookbook files are uploaded with their cookbook"))
			}
			_ => Err(self.not_allowed(Operation::Delete, "top-level directories cannot be deleted")),
		}
	}

	fn compare_to(&self, other: &dyn TreeEntry) -> CompareOutcome {
		match &self.kind {
			RemoteKind::Object { object, .. } => self.compare_object(*object, other),
			RemoteKind::CookbookFile { record, .. } => self.compare_cookbook_file(record, other),
			RemoteKind::Acl { .. } => self.compare_object(ObjectKind::Acl, other),
			RemoteKind::CookbookDir { prefix, .. } if prefix.is_empty() => {
				if !other.is_dir() {
					return CompareOutcome::Different { ours: Content::NotRead, theirs: Content::NotRead };
				}
				match same_tree(self, other) {
					Ok(true) => CompareOutcome::Same { ours: Content::NotRead, theirs: Content::NotRead },
					Ok(false) => CompareOutcome::Different { ours: Content::NotRead, theirs: Content::NotRead },
					Err(_) => CompareOutcome::Unknown,
				}
			}
			_ => CompareOutcome::Unknown,
		}
	}

	fn checksum(&self) -> Option<String> {
		match &self.kind {
			RemoteKind::CookbookFile { record, .. } => Some(record.checksum.clone()),
			_ => None,
		}
	}

	fn fast_create(&self) -> Option<&dyn FastCreate> {
		match self.kind {
			RemoteKind::Cookbooks(_) => Some(self),
			_ => None,
		}
	}

	fn fast_copy(&self) -> Option<&dyn FastCopy> {
		match &self.kind {
			RemoteKind::CookbookDir { prefix, .. } if prefix.is_empty() => Some(self),
			_ => None,
		}
	}
}

impl FastCreate for RemoteEntry {
	fn create_child_from(&self, source: &EntryRef) -> FsResult<EntryRef> {
		self.upload_cookbook(source, source.name())?;
		Ok(self.child(source.name()))
	}
}

impl FastCopy for RemoteEntry {
	fn copy_from(&self, source: &EntryRef, _options: &SyncOptions) -> FsResult<()> {
		match &self.parent {
			Some(cookbooks) => cookbooks.upload_cookbook(source, &self.name),
			None => Err(self.not_allowed(Operation::Upload, "not a cookbook")),
		}
	}
}


// vim: ts=4
