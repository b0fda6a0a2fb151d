//! Keeps the local file cache in line with a set of cookbook manifests
//!
//! A run removes cached files of cookbooks that are gone and files their
//! manifest no longer lists, then downloads every file whose cached copy is
//! missing or has a different checksum. Downloads run on the shared
//! [`Parallelizer`]; the first failure stops the run.

use crate::callbacks::SyncEvents;
use crate::config::Config;
use crate::cookbook::checksum_cache::FileChecksums;
use crate::cookbook::cleaner::CookbookCacheCleaner;
use crate::cookbook::file_cache::FileCache;
use crate::cookbook::manifest::{CookbookFile, CookbookVersion};
use crate::error::{CookbookSyncError, RestError};
use crate::fs::remote::ServerApi;
use crate::logging::*;
use crate::parallel::{ParallelOptions, Parallelizer};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Segments fetched on first use when lazy loading is on
const LAZY_SEGMENTS: &[&str] = &["files", "templates"];

/// Fetches file contents by URL
pub trait CookbookFileDownloader: Send + Sync {
	fn download(&self, url: &str) -> Result<Vec<u8>, RestError>;
}

/// Downloads through the server API
pub struct ServerDownloader {
	api: Arc<dyn ServerApi>,
}

impl ServerDownloader {
	pub fn new(api: Arc<dyn ServerApi>) -> Self {
		ServerDownloader { api }
	}
}

impl CookbookFileDownloader for ServerDownloader {
	fn download(&self, url: &str) -> Result<Vec<u8>, RestError> {
		self.api.get_raw(url)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynchronizerOptions {
	/// Download `files` and `templates` up front
	pub no_lazy_load: bool,
	/// Trust every cached file
	pub skip_cookbook_sync: bool,
	/// Remove cached cookbooks that are no longer in the run
	pub remove_obsoleted_files: bool,
	/// Never delete from the cache (solo and local runs)
	pub keep_file_cache: bool,
}

impl Default for SynchronizerOptions {
	fn default() -> Self {
		SynchronizerOptions {
			no_lazy_load: false,
			skip_cookbook_sync: false,
			remove_obsoleted_files: true,
			keep_file_cache: false,
		}
	}
}

impl SynchronizerOptions {
	pub fn from_config(config: &Config) -> Self {
		SynchronizerOptions {
			no_lazy_load: config.no_lazy_load,
			skip_cookbook_sync: config.skip_cookbook_sync,
			remove_obsoleted_files: config.remove_obsoleted_files,
			keep_file_cache: config.keeps_file_cache(),
		}
	}
}

/// State shared with download tasks
struct SyncContext {
	events: Arc<dyn SyncEvents>,
	downloader: Arc<dyn CookbookFileDownloader>,
	file_cache: Arc<FileCache>,
	checksums: Arc<dyn FileChecksums>,
	cleaner: Arc<CookbookCacheCleaner>,
	options: SynchronizerOptions,
}

impl SyncContext {
	/// Bring one file up to date; true if it was downloaded
	fn sync_file(&self, file: &CookbookFile) -> Result<bool, CookbookSyncError> {
		let key = cache_key(&file.cookbook, &file.record.path);
		self.cleaner.mark_file_as_valid(&key);

		let cached = self.file_cache.has_key(&key);
		if cached && self.options.skip_cookbook_sync {
			debug!("Skipping checksum of {}, cookbook sync is disabled", key);
			return Ok(false);
		}
		if cached {
			let path = self.file_cache.path_for(&key)?;
			if self.checksums.checksum_for_file(&path)? == file.record.checksum {
				debug!("Not storing {}, as the cache is up to date.", key);
				return Ok(false);
			}
		}

		let url = file.record.url.as_deref().ok_or_else(|| CookbookSyncError::Download {
			url: String::new(),
			cache_path: key.clone(),
			message: "manifest has no URL for this file".to_string(),
		})?;
		let content = self.downloader.download(url).map_err(|e| CookbookSyncError::Download {
			url: url.to_string(),
			cache_path: key.clone(),
			message: e.to_string(),
		})?;
		self.file_cache.store(&key, &content)?;
		info!("Storing updated {} in the cache.", key);
		self.events.updated_cookbook_file(&file.cookbook, &file.record.path);
		Ok(true)
	}
}

fn cache_key(cookbook: &str, path: &str) -> String {
	format!("cookbooks/{}/{}", cookbook, path)
}

pub struct CookbookSynchronizer {
	cookbooks: BTreeMap<String, CookbookVersion>,
	context: Arc<SyncContext>,
	parallelizer: Arc<Parallelizer>,
}

impl CookbookSynchronizer {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		cookbooks_by_name: BTreeMap<String, CookbookVersion>,
		events: Arc<dyn SyncEvents>,
		downloader: Arc<dyn CookbookFileDownloader>,
		file_cache: Arc<FileCache>,
		checksums: Arc<dyn FileChecksums>,
		cleaner: Arc<CookbookCacheCleaner>,
		parallelizer: Arc<Parallelizer>,
		options: SynchronizerOptions,
	) -> Self {
		let mut cookbooks = cookbooks_by_name;
		if !options.no_lazy_load {
			for cookbook in cookbooks.values_mut() {
				for segment in LAZY_SEGMENTS {
					for record in cookbook.segments.get_mut(*segment).into_iter().flatten() {
						record.lazy = true;
					}
				}
			}
		}
		let context = SyncContext { events, downloader, file_cache, checksums, cleaner, options };
		CookbookSynchronizer { cookbooks, context: Arc::new(context), parallelizer }
	}

	pub fn cookbook_names(&self) -> Vec<&str> {
		self.cookbooks.keys().map(String::as_str).collect()
	}

	pub fn cookbook_count(&self) -> usize {
		self.cookbooks.len()
	}

	pub fn has_cookbook(&self, name: &str) -> bool {
		self.cookbooks.contains_key(name)
	}

	/// Files to fetch now: every record except lazy ones
	pub fn files(&self) -> Vec<CookbookFile> {
		let mut files = Vec::new();
		for (name, cookbook) in &self.cookbooks {
			for (segment, record) in cookbook.records() {
				if record.lazy {
					continue;
				}
				files.push(CookbookFile {
					cookbook: name.clone(),
					segment: segment.to_string(),
					record: record.clone(),
				});
			}
		}
		files
	}

	/// Run the whole sync: clean, then download what is stale
	pub fn sync_cookbooks(&self) -> Result<(), CookbookSyncError> {
		let loading: Vec<String> = self.cookbooks.values().map(CookbookVersion::full_name).collect();
		info!("Loading cookbooks [{}]", loading.join(", "));

		let result = self.clear_obsoleted_cookbooks().and_then(|_| self.download_files());
		let events = &self.context.events;
		match result {
			Ok(()) => {
				events.cookbook_sync_complete();
				Ok(())
			}
			Err(e) => {
				error!("Cookbook sync failed: {}", e);
				events.cookbook_sync_failed(&e);
				Err(e)
			}
		}
	}

	/// Remove cached files that no cookbook in this run still uses
	pub fn clear_obsoleted_cookbooks(&self) -> Result<(), CookbookSyncError> {
		let events = &self.context.events;
		events.cookbook_clean_start();
		if self.context.options.remove_obsoleted_files {
			self.remove_old_cookbooks()?;
		} else {
			info!("Skipping removal of obsoleted cookbooks from the cache");
			self.context.cleaner.skip_removal();
		}
		self.remove_deleted_files()?;
		events.cookbook_clean_complete();
		Ok(())
	}

	fn remove_old_cookbooks(&self) -> Result<(), CookbookSyncError> {
		let file_cache = &self.context.file_cache;
		for key in file_cache.find("cookbooks/**/*")? {
			let cookbook = key.split('/').nth(1).unwrap_or_default();
			if self.cookbooks.contains_key(cookbook) {
				continue;
			}
			info!("Removing {} from the cache; its cookbook is no longer needed on this client.", key);
			file_cache.delete(&key)?;
			self.context.events.removed_cookbook_file(&key);
		}
		Ok(())
	}

	fn remove_deleted_files(&self) -> Result<(), CookbookSyncError> {
		let file_cache = &self.context.file_cache;
		for (name, cookbook) in &self.cookbooks {
			let prefix = cache_key(name, "");
			let pattern = format!("{}**/*", glob::Pattern::escape(&prefix));
			for key in file_cache.find(&pattern)? {
				let relative = key.strip_prefix(&prefix).unwrap_or(&key);
				if cookbook.find(relative).is_some() {
					continue;
				}
				info!("Removing {} from the cache; it is no longer in the cookbook manifest.", key);
				file_cache.delete(&key)?;
				self.context.events.removed_cookbook_file(&key);
			}
		}
		Ok(())
	}

	fn download_files(&self) -> Result<(), CookbookSyncError> {
		let files = self.files();
		let events = &self.context.events;
		let mut remaining: HashMap<String, usize> = HashMap::new();
		for file in &files {
			*remaining.entry(file.cookbook.clone()).or_insert(0) += 1;
		}
		events.cookbook_sync_start(self.cookbooks.len());
		for name in self.cookbooks.keys().filter(|name| !remaining.contains_key(*name)) {
			events.synchronized_cookbook(name);
		}

		let aborted = Arc::new(AtomicBool::new(false));
		let context = Arc::clone(&self.context);
		let task_aborted = Arc::clone(&aborted);
		let results = self.parallelizer.parallelize(files, ParallelOptions::unordered(), move |file: CookbookFile| {
			if task_aborted.load(Ordering::SeqCst) {
				return Ok(None);
			}
			match context.sync_file(&file) {
				Ok(_) => Ok(Some(file.cookbook)),
				Err(e) => {
					task_aborted.store(true, Ordering::SeqCst);
					Err(e)
				}
			}
		});

		// Drain every task so nothing touches the cache after we return.
		let mut first_error = None;
		for result in results {
			match result.map_err(CookbookSyncError::from).and_then(|r| r) {
				Ok(Some(cookbook)) => {
					if let Some(count) = remaining.get_mut(&cookbook) {
						*count -= 1;
						if *count == 0 {
							events.synchronized_cookbook(&cookbook);
						}
					}
				}
				Ok(None) => {}
				Err(e) => {
					aborted.store(true, Ordering::SeqCst);
					if first_error.is_none() {
						first_error = Some(e);
					}
				}
			}
		}
		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// Bring a single file (lazy or not) into the cache and return its path
	pub fn ensure_file(&self, cookbook: &str, path: &str) -> Result<PathBuf, CookbookSyncError> {
		let (segment, record) = self
			.cookbooks
			.get(cookbook)
			.and_then(|c| c.records().find(|(_, record)| record.path == path))
			.ok_or_else(|| CookbookSyncError::Cache { message: format!("{} has no file {}", cookbook, path) })?;
		let file = CookbookFile { cookbook: cookbook.to_string(), segment: segment.to_string(), record: record.clone() };
		self.context.sync_file(&file)?;
		self.context.file_cache.path_for(&cache_key(cookbook, path))
	}

	/// Delete what this run did not mark as valid
	pub fn cleanup_file_cache(&self) -> Result<Vec<String>, CookbookSyncError> {
		let context = &self.context;
		context.cleaner.cleanup_file_cache(&context.file_cache, context.options.keep_file_cache, context.events.as_ref())
	}
}


// vim: ts=4
