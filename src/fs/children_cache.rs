//! Per-run cache of directory listings
//!
//! Remote listings are expensive, so each directory's children are fetched
//! once per run. Readers always see a complete list: a reload replaces the
//! whole `Arc<Vec<_>>`.

use super::EntryRef;
use crate::error::FsResult;
use crate::logging::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct CacheState {
	entries: HashMap<String, Arc<Vec<EntryRef>>>,
	/// Bumped by every invalidation; a load that raced one is not kept
	epoch: u64,
}

#[derive(Default)]
pub struct ChildrenCache {
	state: RwLock<CacheState>,
}

impl ChildrenCache {
	pub fn new() -> Self {
		ChildrenCache::default()
	}

	/// Cached listing of `path`, loading it on first use.
	///
	/// A listing loaded while an invalidation ran is returned to this caller
	/// but not cached, so later readers load again.
	pub fn get_or_load<F>(&self, path: &str, load: F) -> FsResult<Arc<Vec<EntryRef>>>
	where
		F: FnOnce() -> FsResult<Vec<EntryRef>>,
	{
		let started = {
			let state = self.state.read();
			if let Some(children) = state.entries.get(path) {
				return Ok(Arc::clone(children));
			}
			state.epoch
		};
		let children = Arc::new(load()?);

		let mut state = self.state.write();
		if state.epoch != started {
			debug!("Not caching children of {}, the cache was invalidated meanwhile", path);
			return Ok(children);
		}
		debug!("Cached {} children of {}", children.len(), path);
		state.entries.insert(path.to_string(), Arc::clone(&children));
		Ok(children)
	}

	/// Forget the listing of `path` and of everything below it
	pub fn invalidate(&self, path: &str) {
		let prefix = format!("{}/", path.trim_end_matches('/'));
		let mut state = self.state.write();
		state.epoch += 1;
		state.entries.retain(|key, _| key != path && !key.starts_with(&prefix));
	}

	/// Forget everything (start of a run)
	pub fn reset(&self) {
		let mut state = self.state.write();
		state.epoch += 1;
		state.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state.read().entries.is_empty()
	}
}


// vim: ts=4
