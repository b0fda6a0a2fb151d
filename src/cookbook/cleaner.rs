//! Removal of cached cookbook files a run did not use

use crate::callbacks::SyncEvents;
use crate::cookbook::file_cache::FileCache;
use crate::error::CookbookSyncError;
use crate::logging::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks which cached files are still valid during one run.
///
/// Call [`reset`](Self::reset) at the start of every run; the synchronizer
/// marks each file it keeps, and [`cleanup_file_cache`](Self::cleanup_file_cache)
/// deletes the rest.
#[derive(Default)]
pub struct CookbookCacheCleaner {
	valid_cache_entries: Mutex<HashSet<String>>,
	skip_removal: AtomicBool,
}

impl CookbookCacheCleaner {
	pub fn new() -> Self {
		CookbookCacheCleaner::default()
	}

	pub fn reset(&self) {
		self.valid_cache_entries.lock().clear();
		self.skip_removal.store(false, Ordering::SeqCst);
	}

	pub fn mark_file_as_valid(&self, cache_key: &str) {
		self.valid_cache_entries.lock().insert(cache_key.to_string());
	}

	pub fn is_valid(&self, cache_key: &str) -> bool {
		self.valid_cache_entries.lock().contains(cache_key)
	}

	/// Keep every cached file at the end of this run
	pub fn skip_removal(&self) {
		self.skip_removal.store(true, Ordering::SeqCst);
	}

	pub fn is_removal_skipped(&self) -> bool {
		self.skip_removal.load(Ordering::SeqCst)
	}

	/// Delete every cached cookbook file not marked valid.
	///
	/// Nothing is removed when `keep_all` is set (solo and local runs) or
	/// removal was skipped. Returns the removed keys.
	pub fn cleanup_file_cache(
		&self,
		file_cache: &FileCache,
		keep_all: bool,
		events: &dyn SyncEvents,
	) -> Result<Vec<String>, CookbookSyncError> {
		if keep_all || self.is_removal_skipped() {
			debug!("Keeping every cached cookbook file");
			return Ok(Vec::new());
		}
		let mut removed = Vec::new();
		for key in file_cache.find("cookbooks/**/*")? {
			if self.is_valid(&key) {
				continue;
			}
			info!("Removing {} from the cache; it is no longer needed.", key);
			file_cache.delete(&key)?;
			events.removed_cookbook_file(&key);
			removed.push(key);
		}
		Ok(removed)
	}
}


// vim: ts=4
