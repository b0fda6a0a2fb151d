//! Checksum cache invalidation driven by file mtime and size

use cheffs::cookbook::manifest::checksum_bytes;
use cheffs::cookbook::{ChecksumCache, FileChecksums};
use filetime::FileTime;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_unchanged_metadata_reuses_cached_checksum() {
	let dir = TempDir::new().unwrap();
	let file = dir.path().join("default.rb");
	fs::write(&file, b"aaaa").unwrap();
	let mtime = FileTime::from_last_modification_time(&fs::metadata(&file).unwrap());

	let cache = ChecksumCache::open(&dir.path().join("cache/checksums.redb")).unwrap();
	assert_eq!(cache.checksum_for_file(&file).unwrap(), checksum_bytes(b"aaaa"));

	// Same size, same mtime: the cache cannot tell the difference.
	fs::write(&file, b"bbbb").unwrap();
	filetime::set_file_mtime(&file, mtime).unwrap();
	assert_eq!(cache.checksum_for_file(&file).unwrap(), checksum_bytes(b"aaaa"));

	let later = FileTime::from_unix_time(mtime.unix_seconds() + 10, mtime.nanoseconds());
	filetime::set_file_mtime(&file, later).unwrap();
	assert_eq!(cache.checksum_for_file(&file).unwrap(), checksum_bytes(b"bbbb"));
}

#[test]
fn test_size_change_invalidates() {
	let dir = TempDir::new().unwrap();
	let file = dir.path().join("default.rb");
	fs::write(&file, b"short").unwrap();
	let mtime = FileTime::from_last_modification_time(&fs::metadata(&file).unwrap());

	let cache = ChecksumCache::open(&dir.path().join("checksums.redb")).unwrap();
	cache.checksum_for_file(&file).unwrap();
	fs::write(&file, b"much longer").unwrap();
	filetime::set_file_mtime(&file, mtime).unwrap();
	assert_eq!(cache.checksum_for_file(&file).unwrap(), checksum_bytes(b"much longer"));
}

#[test]
fn test_entries_survive_reopen() {
	let dir = TempDir::new().unwrap();
	let file = dir.path().join("default.rb");
	fs::write(&file, b"content").unwrap();
	let db = dir.path().join("checksums.redb");

	{
		let cache = ChecksumCache::open(&db).unwrap();
		cache.checksum_for_file(&file).unwrap();
	}
	let cache = ChecksumCache::open(&db).unwrap();
	let entry = cache.get(&file.to_string_lossy()).unwrap().unwrap();
	assert_eq!(entry.checksum, checksum_bytes(b"content"));
	assert_eq!(entry.size, 7);
}

// vim: ts=4
