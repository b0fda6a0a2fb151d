//! Repository checked out on local disk
//!
//! Every entry knows its file on disk and its [`EntryKind`]; the layout rules
//! in [`super::repository`] decide which names are visible. Entries that do
//! not fit the layout (editor backups, chefignored files, empty cookbook
//! directories) are simply not part of the tree.

use super::repository::{EntryKind, RepositoryLayout, ROOT_FILES, UPLOADED_COOKBOOK_VERSION_FILE};
use super::{EntryRef, NonexistentEntry, TreeEntry, UploadedVersion};
use crate::config::Config;
use crate::error::{FsError, FsResult, NotAllowedReason, Operation};
use crate::logging::*;
use crate::path_utils;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct LocalEntry {
	name: String,
	path: String,
	file_path: PathBuf,
	parent: Option<Arc<LocalEntry>>,
	kind: EntryKind,
	layout: Arc<RepositoryLayout>,
}

impl LocalEntry {
	/// Root of the repository described by `layout`
	pub fn open_root(layout: Arc<RepositoryLayout>) -> Arc<LocalEntry> {
		let file_path = layout.root_path.clone().unwrap_or_else(|| PathBuf::from("."));
		Arc::new(LocalEntry {
			name: String::new(),
			path: "/".to_string(),
			file_path,
			parent: None,
			kind: EntryKind::Root,
			layout,
		})
	}

	pub fn from_config(config: &Config) -> Arc<LocalEntry> {
		LocalEntry::open_root(Arc::new(RepositoryLayout::from_config(config)))
	}

	pub fn file_path(&self) -> &Path {
		&self.file_path
	}

	pub fn kind(&self) -> EntryKind {
		self.kind
	}

	pub fn layout(&self) -> &Arc<RepositoryLayout> {
		&self.layout
	}

	fn make_child(&self, name: &str) -> Option<LocalEntry> {
		let kind = self.kind.child_kind(name)?;
		let file_path = match self.kind {
			EntryKind::Root => match kind {
				EntryKind::RootFile => self.layout.root_path.as_ref()?.join(name),
				_ => self.layout.child_paths.get(name)?.clone(),
			},
			EntryKind::ObjectDir(object) if object.allows_ruby() => ruby_or_json(&self.file_path, name),
			_ => self.file_path.join(name),
		};
		Some(LocalEntry {
			name: name.to_string(),
			path: path_utils::child_path(&self.path, name),
			file_path,
			parent: Some(Arc::new(self.clone())),
			kind,
			layout: Arc::clone(&self.layout),
		})
	}

	/// Backed by a `.rb` source instead of JSON
	pub fn is_ruby_source(&self) -> bool {
		matches!(self.kind, EntryKind::ObjectFile(_))
			&& self.file_path.extension().map(|ext| ext == "rb").unwrap_or(false)
	}

	/// Whether the file `name` in this cookbook directory is chefignored.
	///
	/// Both `cookbooks/chefignore` (paths relative to the cookbooks
	/// directory) and `<cookbook>/chefignore` (paths relative to the
	/// cookbook) apply.
	fn is_chefignored(&self, name: &str) -> bool {
		let mut names = vec![name];
		let mut current = self;
		let cookbooks = loop {
			match current.kind {
				EntryKind::Cookbooks | EntryKind::CookbookArtifacts => break current,
				EntryKind::Cookbook | EntryKind::CookbookEntry(_) => {
					names.push(&current.name);
					current = match &current.parent {
						Some(parent) => &**parent,
						None => return false,
					};
				}
				_ => return false,
			}
		};
		names.reverse();

		let from_cookbooks = names.join("/");
		if self.layout.chefignore(&cookbooks.file_path).is_ignored(&from_cookbooks) {
			return true;
		}
		match names.split_first() {
			Some((cookbook, rest)) if !rest.is_empty() => {
				let cookbook_dir = cookbooks.file_path.join(cookbook);
				self.layout.chefignore(&cookbook_dir).is_ignored(&rest.join("/"))
			}
			_ => false,
		}
	}

	fn io_error(&self, e: io::Error) -> FsError {
		FsError::from_io(self.path.clone(), e)
	}

	fn root_children(&self) -> Vec<LocalEntry> {
		let mut names: Vec<&str> = self.layout.child_paths.keys().map(String::as_str).collect();
		names.extend(ROOT_FILES.iter().cloned());
		names.sort_unstable();
		names
			.into_iter()
			.filter_map(|name| self.make_child(name))
			.filter(|child| child.exists())
			.collect()
	}

	fn disk_children(&self) -> FsResult<Vec<LocalEntry>> {
		let mut names = BTreeSet::new();
		for dirent in fs::read_dir(&self.file_path).map_err(|e| self.io_error(e))? {
			let dirent = dirent.map_err(|e| self.io_error(e))?;
			let name = dirent.file_name().to_string_lossy().into_owned();
			names.insert(self.logical_name(name));
		}

		let mut result = Vec::new();
		for name in names {
			let child = match self.make_child(&name) {
				Some(child) => child,
				None => continue,
			};
			let is_dir = child.is_dir();
			if !self.can_have_child(&name, is_dir) {
				continue;
			}
			if is_dir && self.kind.is_cookbook_content() && child.is_empty_dir() {
				continue;
			}
			if self.kind.holds_cookbooks() && !child.can_upload() {
				warn!("Cookbook '{}' is empty or entirely chefignored at {}", name, child.path_for_printing());
				continue;
			}
			result.push(child);
		}
		Ok(result)
	}

	/// Ruby sources of roles and environments appear under their JSON name
	fn logical_name(&self, disk_name: String) -> String {
		if let EntryKind::ObjectDir(object) = self.kind {
			if object.allows_ruby() {
				if let Some(stem) = disk_name.strip_suffix(".rb") {
					return format!("{}.json", stem);
				}
			}
		}
		disk_name
	}

	fn is_empty_dir(&self) -> bool {
		self.disk_children().map(|children| children.is_empty()).unwrap_or(false)
	}

	/// A cookbook counts once uploaded or while it has any visible file
	fn can_upload(&self) -> bool {
		self.file_path.join(UPLOADED_COOKBOOK_VERSION_FILE).exists()
			|| self.disk_children().map(|children| !children.is_empty()).unwrap_or(false)
	}
}

fn ruby_or_json(dir: &Path, name: &str) -> PathBuf {
	if let Some(stem) = name.strip_suffix(".json") {
		let ruby = dir.join(format!("{}.rb", stem));
		if ruby.is_file() {
			return ruby;
		}
	}
	dir.join(name)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
	use std::os::unix::fs::DirBuilderExt;
	fs::DirBuilder::new().mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
	fs::create_dir(path)
}

impl TreeEntry for LocalEntry {
	fn name(&self) -> &str {
		&self.name
	}

	fn parent(&self) -> Option<EntryRef> {
		self.parent.as_ref().map(|parent| Arc::clone(parent) as EntryRef)
	}

	fn path(&self) -> String {
		self.path.clone()
	}

	fn path_for_printing(&self) -> String {
		self.file_path.display().to_string()
	}

	fn is_dir(&self) -> bool {
		self.kind == EntryKind::Root || self.file_path.is_dir()
	}

	fn exists(&self) -> bool {
		let parent = match &self.parent {
			Some(parent) => parent,
			None => return true,
		};
		match fs::metadata(&self.file_path) {
			Ok(meta) => parent.can_have_child(&self.name, meta.is_dir()),
			Err(_) => false,
		}
	}

	fn children(&self) -> FsResult<Vec<EntryRef>> {
		let children = if self.kind == EntryKind::Root { self.root_children() } else { self.disk_children()? };
		Ok(children.into_iter().map(|child| Arc::new(child) as EntryRef).collect())
	}

	fn child(&self, name: &str) -> EntryRef {
		if self.can_have_child(name, true) || self.can_have_child(name, false) {
			if let Some(child) = self.make_child(name) {
				return Arc::new(child);
			}
		}
		NonexistentEntry::new_ref(name, Arc::new(self.clone()))
	}

	fn can_have_child(&self, name: &str, is_dir: bool) -> bool {
		if !self.kind.accepts(name, is_dir, &self.layout) {
			return false;
		}
		is_dir || !self.kind.is_cookbook_content() || !self.is_chefignored(name)
	}

	fn create_child(&self, name: &str, content: Option<&[u8]>) -> FsResult<EntryRef> {
		let path = path_utils::child_path(&self.path, name);
		let child = match self.make_child(name) {
			Some(child) if self.can_have_child(name, content.is_none()) => child,
			_ => {
				return Err(FsError::OperationNotAllowed {
					path,
					operation: Operation::CreateChild,
					reason: NotAllowedReason::Other(format!("{} cannot hold {}", self.path, name)),
				})
			}
		};
		if child.exists() {
			return Err(FsError::AlreadyExists { path });
		}

		match content {
			Some(bytes) => child.write(bytes)?,
			None => {
				let created = if self.kind == EntryKind::Root {
					create_private_dir(&child.file_path)
				} else {
					fs::create_dir(&child.file_path)
				};
				created.map_err(|e| FsError::from_io(path.clone(), e))?;
				debug!("Created directory {}", child.file_path.display());
			}
		}
		Ok(Arc::new(child))
	}

	fn read(&self) -> FsResult<Vec<u8>> {
		if self.kind == EntryKind::Root {
			return Err(FsError::TypeMismatch { path: self.path.clone(), expected_dir: false });
		}
		fs::read(&self.file_path).map_err(|e| self.io_error(e))
	}

	fn write(&self, content: &[u8]) -> FsResult<()> {
		if self.is_ruby_source() {
			return Err(FsError::RubyFile {
				path: self.path.clone(),
				reason: format!("is backed by {} and cannot be rewritten as JSON", self.path_for_printing()),
			});
		}
		if self.kind == EntryKind::Root {
			return Err(FsError::TypeMismatch { path: self.path.clone(), expected_dir: false });
		}
		fs::write(&self.file_path, content).map_err(|e| self.io_error(e))
	}

	fn delete(&self, recurse: bool) -> FsResult<()> {
		if self.kind == EntryKind::Root {
			return Err(FsError::OperationNotAllowed {
				path: self.path.clone(),
				operation: Operation::Delete,
				reason: NotAllowedReason::Other("the repository root cannot be deleted".to_string()),
			});
		}
		let meta = fs::symlink_metadata(&self.file_path).map_err(|e| self.io_error(e))?;
		if meta.is_dir() {
			if !recurse {
				return Err(FsError::MustDeleteRecursively { path: self.path.clone() });
			}
			fs::remove_dir_all(&self.file_path).map_err(|e| self.io_error(e))
		} else {
			fs::remove_file(&self.file_path).map_err(|e| self.io_error(e))
		}
	}

	fn uploaded_version(&self) -> Option<&dyn UploadedVersion> {
		if self.kind == EntryKind::Cookbook {
			Some(self)
		} else {
			None
		}
	}
}

impl UploadedVersion for LocalEntry {
	fn read_uploaded_version(&self) -> FsResult<Option<Vec<u8>>> {
		let sentinel = self.file_path.join(UPLOADED_COOKBOOK_VERSION_FILE);
		match fs::read(&sentinel) {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(self.io_error(e)),
		}
	}

	fn write_uploaded_version(&self, content: &[u8]) -> FsResult<()> {
		fs::create_dir_all(&self.file_path).map_err(|e| self.io_error(e))?;
		fs::write(self.file_path.join(UPLOADED_COOKBOOK_VERSION_FILE), content).map_err(|e| self.io_error(e))
	}
}


// vim: ts=4
