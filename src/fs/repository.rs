//! Layout rules of an on-disk repository
//!
//! Which names may appear at each level of a repository, and what kind of
//! entry they become. [`super::local`] applies these rules to the disk.

use super::data_handler::ObjectKind;
use crate::chefignore::Chefignore;
use crate::config::Config;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sentinel written into a cookbook directory by uploads through the data store
pub const UPLOADED_COOKBOOK_VERSION_FILE: &str = ".uploaded-cookbook-version.json";

/// Organization files kept at the repository root
pub const ROOT_FILES: &[&str] = &["invitations.json", "members.json", "org.json"];

/// Directories under `acls/`
pub const ACL_SUBDIRS: &[&str] = &[
	"clients",
	"containers",
	"cookbook_artifacts",
	"cookbooks",
	"data_bags",
	"environments",
	"groups",
	"nodes",
	"policies",
	"policy_groups",
	"roles",
];

/// Cookbook segments, in manifest order
pub const COOKBOOK_SEGMENTS: &[&str] = &[
	"attributes",
	"definitions",
	"files",
	"libraries",
	"providers",
	"recipes",
	"resources",
	"root_files",
	"templates",
];

/// Rules for a cookbook subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentInfo {
	/// Only `.rb` files count
	pub ruby_only: bool,
	/// Nested directories count
	pub recursive: bool,
}

/// Rules for the cookbook subdirectory `name`; unknown names hold flat files
pub fn segment_info(name: &str) -> SegmentInfo {
	match name {
		"attributes" | "definitions" | "recipes" => SegmentInfo { ruby_only: true, recursive: false },
		"libraries" | "templates" | "files" => SegmentInfo { ruby_only: false, recursive: true },
		"resources" | "providers" => SegmentInfo { ruby_only: true, recursive: true },
		_ => SegmentInfo::default(),
	}
}

/// Role an entry plays in the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
	Root,
	/// `roles/`, `nodes/`, ... holding `<name>.json` objects
	ObjectDir(ObjectKind),
	/// A JSON object (or its Ruby source)
	ObjectFile(ObjectKind),
	/// `org.json`, `members.json`, `invitations.json`
	RootFile,
	DataBags,
	DataBag,
	AclsDir,
	AclsSubdir,
	Cookbooks,
	/// `cookbook_artifacts/`, holding `<name>-<identifier>` cookbooks
	CookbookArtifacts,
	Cookbook,
	/// Anything inside a cookbook
	CookbookEntry(SegmentInfo),
}

impl EntryKind {
	/// Kind of a top-level directory
	pub fn top_level(name: &str) -> Option<EntryKind> {
		match name {
			"cookbooks" => Some(EntryKind::Cookbooks),
			"cookbook_artifacts" => Some(EntryKind::CookbookArtifacts),
			"data_bags" => Some(EntryKind::DataBags),
			"acls" => Some(EntryKind::AclsDir),
			_ => ObjectKind::for_dir(name).map(EntryKind::ObjectDir),
		}
	}

	/// Kind of the child `name` of an entry of this kind
	pub fn child_kind(&self, name: &str) -> Option<EntryKind> {
		match self {
			EntryKind::Root => {
				if ROOT_FILES.contains(&name) {
					Some(EntryKind::RootFile)
				} else {
					EntryKind::top_level(name)
				}
			}
			EntryKind::ObjectDir(kind) => Some(EntryKind::ObjectFile(*kind)),
			EntryKind::DataBags => Some(EntryKind::DataBag),
			EntryKind::DataBag => Some(EntryKind::ObjectFile(ObjectKind::DataBagItem)),
			EntryKind::AclsDir => {
				if name == "organization.json" {
					Some(EntryKind::ObjectFile(ObjectKind::Acl))
				} else {
					Some(EntryKind::AclsSubdir)
				}
			}
			EntryKind::AclsSubdir => Some(EntryKind::ObjectFile(ObjectKind::Acl)),
			EntryKind::Cookbooks | EntryKind::CookbookArtifacts => Some(EntryKind::Cookbook),
			EntryKind::Cookbook => Some(EntryKind::CookbookEntry(segment_info(name))),
			EntryKind::CookbookEntry(info) => Some(EntryKind::CookbookEntry(*info)),
			EntryKind::ObjectFile(_) | EntryKind::RootFile => None,
		}
	}

	/// Structural part of `can_have_child`; chefignore is applied by the backend
	pub fn accepts(&self, name: &str, is_dir: bool, layout: &RepositoryLayout) -> bool {
		match self {
			EntryKind::Root => {
				if is_dir {
					layout.child_paths.contains_key(name)
				} else {
					layout.root_path.is_some() && ROOT_FILES.contains(&name)
				}
			}
			EntryKind::ObjectDir(_) | EntryKind::DataBag | EntryKind::AclsSubdir => {
				!is_dir && is_json_name(name)
			}
			EntryKind::DataBags => is_dir && !name.starts_with('.'),
			EntryKind::AclsDir => {
				if is_dir {
					ACL_SUBDIRS.contains(&name)
				} else {
					name == "organization.json"
				}
			}
			EntryKind::Cookbooks => {
				is_dir
					&& !name.starts_with('.')
					&& (!layout.versioned_cookbooks || split_name_version(name).is_some())
			}
			EntryKind::CookbookArtifacts => is_dir && !name.starts_with('.') && split_name_version(name).is_some(),
			EntryKind::Cookbook => {
				if is_dir {
					!matches!(name, "root_files" | "." | "..")
				} else {
					name != UPLOADED_COOKBOOK_VERSION_FILE
				}
			}
			EntryKind::CookbookEntry(info) => {
				if is_dir {
					info.recursive && name != "." && name != ".."
				} else {
					!info.ruby_only || name.ends_with(".rb")
				}
			}
			EntryKind::ObjectFile(_) | EntryKind::RootFile => false,
		}
	}

	/// `cookbooks/` or `cookbook_artifacts/`
	pub fn holds_cookbooks(&self) -> bool {
		matches!(self, EntryKind::Cookbooks | EntryKind::CookbookArtifacts)
	}

	pub fn is_cookbook_content(&self) -> bool {
		matches!(self, EntryKind::Cookbook | EntryKind::CookbookEntry(_))
	}
}

fn is_json_name(name: &str) -> bool {
	name.len() > ".json".len() && name.ends_with(".json") && !name.starts_with('.')
}

/// Split `name-version` at the last hyphen.
///
/// `foo-1-2-3` is `("foo-1-2", "3")`. Names without a hyphen, or with an
/// empty side, do not split.
pub fn split_name_version(entry_name: &str) -> Option<(&str, &str)> {
	let index = entry_name.rfind('-')?;
	let (name, version) = (&entry_name[..index], &entry_name[index + 1..]);
	if name.is_empty() || version.is_empty() {
		return None;
	}
	Some((name, version))
}

/// Where the repository lives and how it is laid out
pub struct RepositoryLayout {
	/// Top-level directory name -> directory on disk
	pub child_paths: BTreeMap<String, PathBuf>,

	/// Directory holding the root files; `None` hides them
	pub root_path: Option<PathBuf>,

	/// Cookbook directories are named `name-version`
	pub versioned_cookbooks: bool,

	chefignores: Mutex<HashMap<PathBuf, Arc<Chefignore>>>,
}

impl RepositoryLayout {
	pub fn new(
		child_paths: BTreeMap<String, PathBuf>,
		root_path: Option<PathBuf>,
		versioned_cookbooks: bool,
	) -> Self {
		RepositoryLayout { child_paths, root_path, versioned_cookbooks, chefignores: Mutex::new(HashMap::new()) }
	}

	/// Layout of `config.chef_repo_path`, honoring per-directory overrides
	pub fn from_config(config: &Config) -> Self {
		RepositoryLayout::new(
			config.repo_child_paths(),
			Some(config.chef_repo_path.clone()),
			config.versioned_cookbooks,
		)
	}

	/// Chefignore of `dir`, parsed once per layout
	pub fn chefignore(&self, dir: &Path) -> Arc<Chefignore> {
		let mut cache = self.chefignores.lock();
		if let Some(ignore) = cache.get(dir) {
			return Arc::clone(ignore);
		}
		let ignore = Arc::new(Chefignore::load(dir));
		cache.insert(dir.to_path_buf(), Arc::clone(&ignore));
		ignore
	}

	/// Drop parsed chefignores so edits are seen
	pub fn reset(&self) {
		self.chefignores.lock().clear();
	}
}


// vim: ts=4
