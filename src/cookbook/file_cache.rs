//! On-disk file cache
//!
//! Keys are `/`-separated paths relative to the cache root
//! (`cookbooks/app/recipes/default.rb`).

use crate::error::CookbookSyncError;
use crate::logging::*;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub struct FileCache {
	root: PathBuf,
}

fn io_error(path: &Path, source: io::Error) -> CookbookSyncError {
	CookbookSyncError::Io { path: path.display().to_string(), source }
}

impl FileCache {
	pub fn new<P: Into<PathBuf>>(root: P) -> Self {
		FileCache { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Location of `key` on disk; keys may not leave the cache root
	pub fn path_for(&self, key: &str) -> Result<PathBuf, CookbookSyncError> {
		let relative = Path::new(key);
		let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
		if key.is_empty() || escapes {
			return Err(CookbookSyncError::Cache { message: format!("invalid cache key {:?}", key) });
		}
		Ok(self.root.join(relative))
	}

	pub fn has_key(&self, key: &str) -> bool {
		self.path_for(key).map(|path| path.is_file()).unwrap_or(false)
	}

	pub fn load(&self, key: &str) -> Result<Vec<u8>, CookbookSyncError> {
		let path = self.path_for(key)?;
		fs::read(&path).map_err(|e| io_error(&path, e))
	}

	/// Write `content` under `key`, replacing any previous file atomically
	pub fn store(&self, key: &str, content: &[u8]) -> Result<PathBuf, CookbookSyncError> {
		let path = self.path_for(key)?;
		let parent = path.parent().unwrap_or(&self.root);
		fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;

		let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
		let temp = parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
		fs::write(&temp, content).map_err(|e| io_error(&temp, e))?;
		if let Err(e) = fs::rename(&temp, &path) {
			let _ = fs::remove_file(&temp);
			return Err(io_error(&path, e));
		}
		trace!("Stored {} bytes at {}", content.len(), path.display());
		Ok(path)
	}

	/// Remove `key`; a missing key is not an error
	pub fn delete(&self, key: &str) -> Result<(), CookbookSyncError> {
		let path = self.path_for(key)?;
		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(io_error(&path, e)),
		}
	}

	/// Keys of the files matching a glob relative to the root, sorted
	pub fn find(&self, pattern: &str) -> Result<Vec<String>, CookbookSyncError> {
		let root = glob::Pattern::escape(&self.root.to_string_lossy());
		let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
		let paths = glob::glob(&full).map_err(|e| CookbookSyncError::Cache { message: e.to_string() })?;

		let mut keys = Vec::new();
		for path in paths {
			let path = match path {
				Ok(path) => path,
				Err(e) => {
					warn!("Skipping unreadable cache entry: {}", e);
					continue;
				}
			};
			if !path.is_file() {
				continue;
			}
			if let Ok(relative) = path.strip_prefix(&self.root) {
				let parts: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
				keys.push(parts.join("/"));
			}
		}
		keys.sort();
		Ok(keys)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_store_load_delete() {
		let dir = TempDir::new().unwrap();
		let cache = FileCache::new(dir.path());
		cache.store("cookbooks/app/recipes/default.rb", b"log 'hi'").unwrap();
		assert!(cache.has_key("cookbooks/app/recipes/default.rb"));
		assert_eq!(cache.load("cookbooks/app/recipes/default.rb").unwrap(), b"log 'hi'");
		cache.delete("cookbooks/app/recipes/default.rb").unwrap();
		assert!(!cache.has_key("cookbooks/app/recipes/default.rb"));
		cache.delete("cookbooks/app/recipes/default.rb").unwrap();
	}

	#[test]
	fn test_find_includes_dotfiles() {
		let dir = TempDir::new().unwrap();
		let cache = FileCache::new(dir.path());
		cache.store("cookbooks/app/.kitchen.yml", b"").unwrap();
		cache.store("cookbooks/app/files/default/a", b"").unwrap();
		cache.store("other/x", b"").unwrap();
		assert_eq!(
			cache.find("cookbooks/**/*").unwrap(),
			vec!["cookbooks/app/.kitchen.yml", "cookbooks/app/files/default/a"]
		);
	}

	#[test]
	fn test_keys_stay_inside_root() {
		let dir = TempDir::new().unwrap();
		let cache = FileCache::new(dir.path());
		assert!(cache.path_for("../escape").is_err());
		assert!(cache.path_for("/etc/passwd").is_err());
		assert!(cache.store("cookbooks/../../x", b"").is_err());
	}
}

// vim: ts=4
