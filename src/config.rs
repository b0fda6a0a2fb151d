//! Unified configuration for ChefFS
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (TOML, or JSON/JSON5 for any other extension)
//! 3. Environment variables (CHEFFS_* prefix)
//! 4. Explicit field assignment by the embedding program (highest priority)

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level repository directories, in listing order
pub const REPO_CHILD_DIRS: &[&str] = &[
	"acls",
	"clients",
	"containers",
	"cookbook_artifacts",
	"cookbooks",
	"data_bags",
	"environments",
	"groups",
	"nodes",
	"policies",
	"policy_groups",
	"roles",
	"users",
];

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// EXECUTION
	// ========================================================================
	/// Number of concurrent tree operations (the caller counts as one)
	pub concurrency: usize,

	/// Threads used to download cookbook files
	pub cookbook_sync_threads: usize,

	/// Default tracing filter when RUST_LOG is unset
	pub log_level: String,

	// ========================================================================
	// REPOSITORY LAYOUT
	// ========================================================================
	/// Which object kinds the repository and server expose
	pub repo_mode: RepoMode,

	/// Store cookbooks as `name-version` directories
	pub versioned_cookbooks: bool,

	/// Root of the local repository
	pub chef_repo_path: PathBuf,

	/// Per-directory overrides (e.g. `cookbooks` -> `/srv/cookbooks`)
	pub child_paths: BTreeMap<String, PathBuf>,

	// ========================================================================
	// COOKBOOK SYNCHRONIZATION
	// ========================================================================
	/// Root of the local file cache
	pub file_cache_path: PathBuf,

	/// Download `files` and `templates` segments eagerly
	pub no_lazy_load: bool,

	/// Treat every cached file as current (development only)
	pub skip_cookbook_sync: bool,

	/// Delete cached files of cookbooks no longer in the run list
	pub remove_obsoleted_files: bool,

	/// Legacy solo mode never cleans the file cache
	pub solo_legacy_mode: bool,

	/// Local mode never cleans the file cache either
	pub local_mode: bool,
}

impl Default for Config {
	fn default() -> Self {
		let home = std::env::var("HOME")
			.map(PathBuf::from)
			.unwrap_or_else(|_| PathBuf::from("."));
		Config {
			concurrency: 10,
			cookbook_sync_threads: 10,
			log_level: "info".to_string(),

			repo_mode: RepoMode::Everything,
			versioned_cookbooks: false,
			chef_repo_path: PathBuf::from("."),
			child_paths: BTreeMap::new(),

			file_cache_path: home.join(".cheffs").join("cache"),
			no_lazy_load: false,
			skip_cookbook_sync: false,
			remove_obsoleted_files: true,
			solo_legacy_mode: false,
			local_mode: false,
		}
	}
}

impl Config {
	/// Load a config file on top of the defaults
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let display = path.display().to_string();
		let text = fs::read_to_string(path)
			.map_err(|source| ConfigError::Io { path: display.clone(), source })?;

		let is_toml = path.extension().map(|ext| ext == "toml").unwrap_or(false);
		if is_toml {
			toml::from_str(&text)
				.map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		} else {
			json5::from_str(&text)
				.map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		}
	}

	/// Apply CHEFFS_* overrides from the process environment
	pub fn apply_env(&mut self) -> Result<(), ConfigError> {
		self.apply_env_from(|key| std::env::var(key).ok())
	}

	/// Apply CHEFFS_* overrides from an arbitrary lookup
	pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = lookup("CHEFFS_CONCURRENCY") {
			self.concurrency = parse_number("CHEFFS_CONCURRENCY", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_COOKBOOK_SYNC_THREADS") {
			self.cookbook_sync_threads = parse_number("CHEFFS_COOKBOOK_SYNC_THREADS", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_LOG_LEVEL") {
			self.log_level = v;
		}
		if let Some(v) = lookup("CHEFFS_REPO_MODE") {
			self.repo_mode = RepoMode::parse(&v).ok_or(ConfigError::InvalidValue {
				key: "CHEFFS_REPO_MODE".to_string(),
				value: v.clone(),
			})?;
		}
		if let Some(v) = lookup("CHEFFS_VERSIONED_COOKBOOKS") {
			self.versioned_cookbooks = parse_bool("CHEFFS_VERSIONED_COOKBOOKS", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_CHEF_REPO_PATH") {
			self.chef_repo_path = PathBuf::from(v);
		}
		if let Some(v) = lookup("CHEFFS_FILE_CACHE_PATH") {
			self.file_cache_path = PathBuf::from(v);
		}
		if let Some(v) = lookup("CHEFFS_NO_LAZY_LOAD") {
			self.no_lazy_load = parse_bool("CHEFFS_NO_LAZY_LOAD", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_SKIP_COOKBOOK_SYNC") {
			self.skip_cookbook_sync = parse_bool("CHEFFS_SKIP_COOKBOOK_SYNC", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_REMOVE_OBSOLETED_FILES") {
			self.remove_obsoleted_files = parse_bool("CHEFFS_REMOVE_OBSOLETED_FILES", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_SOLO_LEGACY_MODE") {
			self.solo_legacy_mode = parse_bool("CHEFFS_SOLO_LEGACY_MODE", &v)?;
		}
		if let Some(v) = lookup("CHEFFS_LOCAL_MODE") {
			self.local_mode = parse_bool("CHEFFS_LOCAL_MODE", &v)?;
		}
		Ok(())
	}

	/// Defaults, then `path` if given, then the environment
	pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match path {
			Some(path) => Config::load(path)?,
			None => Config::default(),
		};
		config.apply_env()?;
		Ok(config)
	}

	/// Directory backing a top-level repository child
	pub fn child_path(&self, name: &str) -> PathBuf {
		self.child_paths
			.get(name)
			.cloned()
			.unwrap_or_else(|| self.chef_repo_path.join(name))
	}

	/// Every top-level child the repository knows about
	pub fn repo_child_paths(&self) -> BTreeMap<String, PathBuf> {
		REPO_CHILD_DIRS
			.iter()
			.map(|name| (name.to_string(), self.child_path(name)))
			.collect()
	}

	/// redb database holding remembered cookbook file checksums
	pub fn checksum_cache_path(&self) -> PathBuf {
		self.file_cache_path.join("checksums.redb")
	}

	/// Solo and local runs keep every cached file
	pub fn keeps_file_cache(&self) -> bool {
		self.solo_legacy_mode || self.local_mode
	}
}

fn parse_number(key: &str, value: &str) -> Result<usize, ConfigError> {
	value
		.trim()
		.parse()
		.map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" | "" => Ok(false),
		_ => Err(ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() }),
	}
}

// ============================================================================
// ENUMERATIONS
// ============================================================================

/// Which object kinds exist in the repository and on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoMode {
	/// Roles, environments, data bags and cookbooks only
	Static,
	/// Everything an open-source server holds
	#[default]
	Everything,
	/// Everything a hosted organization holds (ACLs, groups, containers, policies)
	HostedEverything,
}

impl RepoMode {
	pub fn parse(value: &str) -> Option<Self> {
		match value.trim() {
			"static" => Some(RepoMode::Static),
			"everything" => Some(RepoMode::Everything),
			"hosted_everything" => Some(RepoMode::HostedEverything),
			_ => None,
		}
	}

	/// Whether organization membership files are served
	pub fn is_org(&self) -> bool {
		*self == RepoMode::HostedEverything
	}

	/// Top-level directories a server exposes in this mode
	pub fn server_dirs(&self) -> &'static [&'static str] {
		match self {
			RepoMode::Static => &["cookbooks", "data_bags", "environments", "roles"],
			RepoMode::Everything => {
				&["clients", "cookbooks", "data_bags", "environments", "nodes", "roles", "users"]
			}
			RepoMode::HostedEverything => &[
				"acls",
				"clients",
				"containers",
				"cookbook_artifacts",
				"cookbooks",
				"data_bags",
				"environments",
				"groups",
				"nodes",
				"policies",
				"policy_groups",
				"roles",
			],
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.concurrency, 10);
		assert_eq!(config.cookbook_sync_threads, 10);
		assert_eq!(config.repo_mode, RepoMode::Everything);
		assert!(!config.versioned_cookbooks);
		assert!(config.remove_obsoleted_files);
	}

	#[test]
	fn test_env_overrides() {
		let env: HashMap<&str, &str> = [
			("CHEFFS_CONCURRENCY", "4"),
			("CHEFFS_REPO_MODE", "hosted_everything"),
			("CHEFFS_NO_LAZY_LOAD", "true"),
		]
		.iter()
		.cloned()
		.collect();

		let mut config = Config::default();
		config.apply_env_from(|k| env.get(k).map(|v| v.to_string())).unwrap();
		assert_eq!(config.concurrency, 4);
		assert_eq!(config.repo_mode, RepoMode::HostedEverything);
		assert!(config.no_lazy_load);
	}

	#[test]
	fn test_env_rejects_garbage() {
		let mut config = Config::default();
		let result = config.apply_env_from(|k| {
			if k == "CHEFFS_VERSIONED_COOKBOOKS" {
				Some("maybe".to_string())
			} else {
				None
			}
		});
		assert!(result.is_err());
	}

	#[test]
	fn test_config_serialization() {
		let config = Config::default();
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		assert!(json.contains("\"repoMode\":\"everything\""));
		let deserialized: Config = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config.concurrency, deserialized.concurrency);
	}

	#[test]
	fn test_child_path_override() {
		let mut config = Config::default();
		config.chef_repo_path = PathBuf::from("/repo");
		config.child_paths.insert("cookbooks".into(), PathBuf::from("/srv/cookbooks"));
		assert_eq!(config.child_path("roles"), PathBuf::from("/repo/roles"));
		assert_eq!(config.child_path("cookbooks"), PathBuf::from("/srv/cookbooks"));
	}
}

// vim: ts=4
