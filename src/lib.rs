//! # ChefFS - one tree view over configuration repositories
//!
//! ChefFS presents a configuration repository on disk, one held in memory
//! and one on a server as the same kind of tree, so they can be listed,
//! diffed and copied onto each other with path patterns.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cheffs::fs::local::LocalEntry;
//! use cheffs::fs::remote::RemoteEntry;
//! use cheffs::{copy_to, Config, FilePattern, LogReporter, Parallelizer, SyncOptions};
//! use std::sync::Arc;
//!
//! let config = Config::resolve(None)?;
//! let local = LocalEntry::from_config(&config);
//! let remote = RemoteEntry::from_config(api, &config);
//! let pattern = Arc::new(FilePattern::new("/roles/*.json")?);
//! let failed = copy_to(
//!     &pattern, &local, &remote, None,
//!     &SyncOptions::default(),
//!     &(Arc::new(LogReporter) as _),
//!     &Arc::new(Parallelizer::from_concurrency(config.concurrency)),
//! );
//! ```
//!
//! ## Serving a repository
//!
//! ```rust,ignore
//! use cheffs::datastore::{ChefFsDataStore, DataStoreOptions};
//!
//! let store = ChefFsDataStore::new(local, parallelizer, DataStoreOptions::from_config(&config));
//! let roles = store.list(&["roles"])?;
//! ```

pub mod callbacks;
pub mod chefignore;
pub mod config;
pub mod cookbook;
pub mod datastore;
pub mod error;
pub mod fs;
pub mod logging;
pub mod parallel;
pub mod path_utils;
pub mod pattern;

// Re-export commonly used types and functions
pub use callbacks::{CollectingReporter, LogReporter, NoReporter, Reporter, SyncEvents};
pub use config::{Config, RepoMode};
pub use error::{CookbookSyncError, DataStoreError, FsError, PatternError, RestError};
pub use fs::{copy_to, diff, EntryRef, SyncOptions, TreeEntry};
pub use parallel::Parallelizer;
pub use pattern::FilePattern;

// vim: ts=4
