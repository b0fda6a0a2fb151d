//! Persistent checksum cache for files in the file cache
//!
//! Stores the checksum of each file together with its mtime and size, so
//! unchanged files are not hashed again. Entries are json5 records in a redb
//! table keyed by absolute path.

use crate::cookbook::manifest::checksum_file;
use crate::error::CookbookSyncError;
use crate::logging::*;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Key: absolute file path
/// Value: serialized ChecksumEntry
const CHECKSUMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("checksums");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
	#[serde(rename = "mt")]
	pub mtime: u64,
	#[serde(rename = "ns")]
	pub mtime_nanos: u32,
	#[serde(rename = "sz")]
	pub size: u64,
	#[serde(rename = "ck")]
	pub checksum: String,
}

impl ChecksumEntry {
	fn matches(&self, other: &ChecksumEntry) -> bool {
		self.mtime == other.mtime && self.mtime_nanos == other.mtime_nanos && self.size == other.size
	}
}

/// Source of file checksums
pub trait FileChecksums: Send + Sync {
	fn checksum_for_file(&self, path: &Path) -> Result<String, CookbookSyncError>;
}

/// Hashes every file on every call
pub struct NoChecksumCache;

impl FileChecksums for NoChecksumCache {
	fn checksum_for_file(&self, path: &Path) -> Result<String, CookbookSyncError> {
		checksum_file(path).map_err(|source| CookbookSyncError::Io { path: path.display().to_string(), source })
	}
}

fn cache_error<E: fmt::Display>(e: E) -> CookbookSyncError {
	CookbookSyncError::Cache { message: e.to_string() }
}

/// Checksum cache backed by a redb database
pub struct ChecksumCache {
	db: redb::Database,
}

impl ChecksumCache {
	/// Open or create the cache database
	pub fn open(db_path: &Path) -> Result<Self, CookbookSyncError> {
		if let Some(parent) = db_path.parent() {
			fs::create_dir_all(parent)
				.map_err(|source| CookbookSyncError::Io { path: parent.display().to_string(), source })?;
		}
		let db = redb::Database::create(db_path).map_err(cache_error)?;
		{
			let write_txn = db.begin_write().map_err(cache_error)?;
			let _ = write_txn.open_table(CHECKSUMS_TABLE).map_err(cache_error)?;
			write_txn.commit().map_err(cache_error)?;
		}
		Ok(ChecksumCache { db })
	}

	pub fn get(&self, key: &str) -> Result<Option<ChecksumEntry>, CookbookSyncError> {
		let read_txn = self.db.begin_read().map_err(cache_error)?;
		let table = read_txn.open_table(CHECKSUMS_TABLE).map_err(cache_error)?;
		match table.get(key).map_err(cache_error)? {
			Some(entry) => {
				let bytes = entry.value().to_vec();
				let text = std::str::from_utf8(&bytes).map_err(cache_error)?;
				Ok(Some(json5::from_str(text).map_err(cache_error)?))
			}
			None => Ok(None),
		}
	}

	pub fn set(&self, key: &str, entry: &ChecksumEntry) -> Result<(), CookbookSyncError> {
		let bytes = json5::to_string(entry).map_err(cache_error)?.into_bytes();
		let write_txn = self.db.begin_write().map_err(cache_error)?;
		{
			let mut table = write_txn.open_table(CHECKSUMS_TABLE).map_err(cache_error)?;
			table.insert(key, bytes.as_slice()).map_err(cache_error)?;
		}
		write_txn.commit().map_err(cache_error)
	}

	pub fn remove(&self, key: &str) -> Result<(), CookbookSyncError> {
		let write_txn = self.db.begin_write().map_err(cache_error)?;
		{
			let mut table = write_txn.open_table(CHECKSUMS_TABLE).map_err(cache_error)?;
			table.remove(key).map_err(cache_error)?;
		}
		write_txn.commit().map_err(cache_error)
	}
}

impl FileChecksums for ChecksumCache {
	fn checksum_for_file(&self, path: &Path) -> Result<String, CookbookSyncError> {
		let io_error = |source: std::io::Error| CookbookSyncError::Io { path: path.display().to_string(), source };
		let metadata = fs::metadata(path).map_err(io_error)?;
		let modified = metadata.modified().map_err(io_error)?;
		let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
		let mut current = ChecksumEntry {
			mtime: since_epoch.as_secs(),
			mtime_nanos: since_epoch.subsec_nanos(),
			size: metadata.len(),
			checksum: String::new(),
		};

		let key = path.to_string_lossy();
		if let Some(cached) = self.get(&key)? {
			if cached.matches(&current) {
				debug!("Using cached checksum for {}", path.display());
				return Ok(cached.checksum);
			}
		}

		current.checksum = checksum_file(path).map_err(io_error)?;
		debug!("Computed checksum for {}", path.display());
		self.set(&key, &current)?;
		Ok(current.checksum)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_entry_round_trip() {
		let dir = TempDir::new().unwrap();
		let cache = ChecksumCache::open(&dir.path().join("checksums.redb")).unwrap();
		let entry = ChecksumEntry { mtime: 10, mtime_nanos: 5, size: 3, checksum: "abc".into() };
		cache.set("/x", &entry).unwrap();
		assert_eq!(cache.get("/x").unwrap(), Some(entry));
		cache.remove("/x").unwrap();
		assert_eq!(cache.get("/x").unwrap(), None);
	}

	#[test]
	fn test_checksum_matches_uncached() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("a.rb");
		fs::write(&file, b"package 'x'").unwrap();
		let cache = ChecksumCache::open(&dir.path().join("checksums.redb")).unwrap();
		let cached = cache.checksum_for_file(&file).unwrap();
		assert_eq!(cached, NoChecksumCache.checksum_for_file(&file).unwrap());
		assert_eq!(cache.checksum_for_file(&file).unwrap(), cached);
	}
}

// vim: ts=4
