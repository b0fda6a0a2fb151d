//! Cookbook file cache synchronization against counting fakes

use cheffs::cookbook::manifest::checksum_bytes;
use cheffs::cookbook::{
	CookbookCacheCleaner, CookbookFileDownloader, CookbookSynchronizer, CookbookVersion, FileCache,
	NoChecksumCache, SynchronizerOptions,
};
use cheffs::{CookbookSyncError, Parallelizer, RestError, SyncEvents};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct CountingDownloader {
	contents: HashMap<String, Vec<u8>>,
	downloads: AtomicUsize,
}

impl CookbookFileDownloader for CountingDownloader {
	fn download(&self, url: &str) -> Result<Vec<u8>, RestError> {
		self.downloads.fetch_add(1, Ordering::SeqCst);
		self.contents.get(url).cloned().ok_or(RestError::NotFound)
	}
}

#[derive(Default)]
struct RecordingEvents {
	events: Mutex<Vec<String>>,
}

impl RecordingEvents {
	fn recorded(&self) -> Vec<String> {
		self.events.lock().clone()
	}
}

impl SyncEvents for RecordingEvents {
	fn removed_cookbook_file(&self, path: &str) {
		self.events.lock().push(format!("removed {}", path));
	}

	fn updated_cookbook_file(&self, cookbook: &str, path: &str) {
		self.events.lock().push(format!("updated {}/{}", cookbook, path));
	}

	fn synchronized_cookbook(&self, cookbook: &str) {
		self.events.lock().push(format!("synchronized {}", cookbook));
	}

	fn cookbook_sync_failed(&self, _error: &CookbookSyncError) {
		self.events.lock().push("failed".to_string());
	}

	fn cookbook_sync_complete(&self) {
		self.events.lock().push("complete".to_string());
	}
}

struct Fixture {
	_dir: TempDir,
	cache: Arc<FileCache>,
	downloader: Arc<CountingDownloader>,
	events: Arc<RecordingEvents>,
	cleaner: Arc<CookbookCacheCleaner>,
}

impl Fixture {
	fn new(files: &[(&str, &str)]) -> Self {
		cheffs::logging::init_tracing_with_default("debug");
		let dir = TempDir::new().unwrap();
		let mut downloader = CountingDownloader::default();
		for (url, content) in files {
			downloader.contents.insert(url.to_string(), content.as_bytes().to_vec());
		}
		Fixture {
			cache: Arc::new(FileCache::new(dir.path())),
			_dir: dir,
			downloader: Arc::new(downloader),
			events: Arc::new(RecordingEvents::default()),
			cleaner: Arc::new(CookbookCacheCleaner::new()),
		}
	}

	fn synchronizer(&self, cookbooks: Vec<CookbookVersion>, options: SynchronizerOptions) -> CookbookSynchronizer {
		let by_name: BTreeMap<String, CookbookVersion> =
			cookbooks.into_iter().map(|c| (c.cookbook_name.clone(), c)).collect();
		CookbookSynchronizer::new(
			by_name,
			self.events.clone(),
			self.downloader.clone(),
			Arc::clone(&self.cache),
			Arc::new(NoChecksumCache),
			Arc::clone(&self.cleaner),
			Arc::new(Parallelizer::new(3)),
			options,
		)
	}

	fn downloads(&self) -> usize {
		self.downloader.downloads.load(Ordering::SeqCst)
	}
}

/// Cookbook whose recipe has the given content, served at `http://server/<name>`
fn cookbook(name: &str, content: &str) -> CookbookVersion {
	let mut cookbook = CookbookVersion::new(name, "1.0.0");
	let url = format!("http://server/{}", name);
	cookbook.add_file("recipes/default.rb", &checksum_bytes(content.as_bytes()), Some(url));
	cookbook
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_current_files_are_not_downloaded() {
	let fixture = Fixture::new(&[("http://server/abc", "abc")]);
	fixture.cache.store("cookbooks/abc/recipes/default.rb", b"abc").unwrap();

	let sync = fixture.synchronizer(vec![cookbook("abc", "abc")], SynchronizerOptions::default());
	sync.sync_cookbooks().unwrap();

	assert_eq!(fixture.downloads(), 0);
	assert_eq!(fixture.events.recorded(), vec!["synchronized abc", "complete"]);
}

#[test]
fn test_server_md5_checksum_matches_cached_file() {
	let fixture = Fixture::new(&[("http://server/app", "abc")]);
	fixture.cache.store("cookbooks/app/recipes/default.rb", b"abc").unwrap();

	// Manifest exactly as a server sends it: MD5 hex of the file contents.
	let mut app = CookbookVersion::new("app", "1.0.0");
	app.add_file("recipes/default.rb", "900150983cd24fb0d6963f7d28e17f72", Some("http://server/app".into()));
	let sync = fixture.synchronizer(vec![app], SynchronizerOptions::default());
	sync.sync_cookbooks().unwrap();

	assert_eq!(fixture.downloads(), 0);
}

#[test]
fn test_stale_files_are_downloaded() {
	let fixture = Fixture::new(&[("http://server/xyz", "xyz")]);
	fixture.cache.store("cookbooks/xyz/recipes/default.rb", b"old").unwrap();

	let sync = fixture.synchronizer(vec![cookbook("xyz", "xyz")], SynchronizerOptions::default());
	sync.sync_cookbooks().unwrap();

	assert_eq!(fixture.downloads(), 1);
	assert_eq!(fixture.cache.load("cookbooks/xyz/recipes/default.rb").unwrap(), b"xyz");
	assert_eq!(
		fixture.events.recorded(),
		vec!["updated xyz/recipes/default.rb", "synchronized xyz", "complete"]
	);
}

#[test]
fn test_obsolete_and_deleted_files_are_removed() {
	let fixture = Fixture::new(&[("http://server/abc", "abc")]);
	fixture.cache.store("cookbooks/gone/recipes/default.rb", b"x").unwrap();
	fixture.cache.store("cookbooks/abc/recipes/old.rb", b"x").unwrap();

	let sync = fixture.synchronizer(vec![cookbook("abc", "abc")], SynchronizerOptions::default());
	sync.sync_cookbooks().unwrap();

	assert!(!fixture.cache.has_key("cookbooks/gone/recipes/default.rb"));
	assert!(!fixture.cache.has_key("cookbooks/abc/recipes/old.rb"));
	assert!(fixture.cache.has_key("cookbooks/abc/recipes/default.rb"));
	let recorded = fixture.events.recorded();
	assert!(recorded.contains(&"removed cookbooks/gone/recipes/default.rb".to_string()));
	assert!(recorded.contains(&"removed cookbooks/abc/recipes/old.rb".to_string()));
}

#[test]
fn test_obsolete_cookbooks_kept_when_removal_is_off() {
	let fixture = Fixture::new(&[("http://server/abc", "abc")]);
	fixture.cache.store("cookbooks/gone/recipes/default.rb", b"x").unwrap();

	let options = SynchronizerOptions { remove_obsoleted_files: false, ..SynchronizerOptions::default() };
	let sync = fixture.synchronizer(vec![cookbook("abc", "abc")], options);
	sync.sync_cookbooks().unwrap();
	assert!(sync.cleanup_file_cache().unwrap().is_empty());

	assert!(fixture.cache.has_key("cookbooks/gone/recipes/default.rb"));
	assert!(fixture.cleaner.is_removal_skipped());
}

#[test]
fn test_cleanup_removes_files_not_used_this_run() {
	let fixture = Fixture::new(&[("http://server/abc", "abc")]);
	let mut abc = cookbook("abc", "abc");
	abc.add_file("templates/default/motd.erb", &checksum_bytes(b"motd"), Some("http://server/motd".into()));
	fixture.cache.store("cookbooks/abc/templates/default/motd.erb", b"motd").unwrap();

	fixture.cleaner.reset();
	let sync = fixture.synchronizer(vec![abc], SynchronizerOptions::default());
	sync.sync_cookbooks().unwrap();
	let removed = sync.cleanup_file_cache().unwrap();

	// The template is lazy, so this run never touched it.
	assert_eq!(removed, vec!["cookbooks/abc/templates/default/motd.erb"]);
	assert!(fixture.cache.has_key("cookbooks/abc/recipes/default.rb"));
}

#[test]
fn test_lazy_file_fetched_on_demand() {
	let fixture = Fixture::new(&[("http://server/abc", "abc"), ("http://server/motd", "motd")]);
	let mut abc = cookbook("abc", "abc");
	abc.add_file("templates/default/motd.erb", &checksum_bytes(b"motd"), Some("http://server/motd".into()));

	let sync = fixture.synchronizer(vec![abc], SynchronizerOptions::default());
	sync.sync_cookbooks().unwrap();
	assert_eq!(fixture.downloads(), 1);

	let path = sync.ensure_file("abc", "templates/default/motd.erb").unwrap();
	assert_eq!(std::fs::read(path).unwrap(), b"motd");
	assert_eq!(fixture.downloads(), 2);
}

#[test]
fn test_first_failure_aborts_the_run() {
	let fixture = Fixture::new(&[]);
	let sync = fixture.synchronizer(vec![cookbook("abc", "abc")], SynchronizerOptions::default());

	match sync.sync_cookbooks() {
		Err(CookbookSyncError::Download { url, .. }) => assert_eq!(url, "http://server/abc"),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(fixture.events.recorded(), vec!["failed"]);
}

// vim: ts=4
