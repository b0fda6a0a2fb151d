//! Cookbook manifests and the client-side cookbook file cache

pub mod checksum_cache;
pub mod cleaner;
pub mod file_cache;
pub mod manifest;
pub mod synchronizer;

pub use checksum_cache::{ChecksumCache, FileChecksums, NoChecksumCache};
pub use cleaner::CookbookCacheCleaner;
pub use file_cache::FileCache;
pub use manifest::{CookbookFile, CookbookMetadata, CookbookVersion, ManifestRecord};
pub use synchronizer::{CookbookFileDownloader, CookbookSynchronizer, ServerDownloader, SynchronizerOptions};

// vim: ts=4
