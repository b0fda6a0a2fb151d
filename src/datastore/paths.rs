//! Mapping between store paths and repository tree paths
//!
//! The store speaks the server's layout (`data/<bag>/<item>`,
//! `cookbooks/<name>/<version>`); the repository keeps its own
//! (`data_bags/<bag>/<item>.json`, `cookbooks/<name>`). Cookbook artifacts
//! are always `cookbook_artifacts/<name>-<identifier>`. Cookbooks in a
//! single-version repository need their version looked up, which the
//! caller supplies.

use crate::error::DataStoreError;
use crate::fs::data_handler::object_name;
use crate::fs::repository::split_name_version;
use crate::path_utils;

/// Store directories that list as empty instead of failing when missing
pub const BASE_DIRNAMES: &[&str] = &[
	"clients",
	"containers",
	"cookbook_artifacts",
	"cookbooks",
	"data",
	"environments",
	"groups",
	"nodes",
	"policies",
	"policy_groups",
	"roles",
	"users",
];

pub fn owned(path: &[&str]) -> Vec<String> {
	path.iter().map(|s| s.to_string()).collect()
}

pub fn always_exists(path: &[&str]) -> bool {
	path.len() == 1 && BASE_DIRNAMES.contains(&path[0])
}

/// Served from the in-memory overlay instead of the tree
pub fn uses_memory_store(path: &[&str]) -> bool {
	match path {
		["sandboxes", ..] | ["file_store", "checksums", ..] => true,
		["environments", "_default"] => true,
		_ => false,
	}
}

fn with_json(name: &str) -> String {
	format!("{}.json", name)
}

/// Tree segments for a store path.
///
/// `single_version(name)` returns the version of `cookbooks/<name>` in a
/// single-version repository.
pub fn to_tree_segments<F>(path: &[&str], versioned_cookbooks: bool, single_version: F) -> Result<Vec<String>, DataStoreError>
where
	F: Fn(&str) -> Result<String, DataStoreError>,
{
	let mut segments = owned(path);
	match path {
		["data", ..] => {
			segments[0] = "data_bags".to_string();
			if let Some(item) = segments.get_mut(2) {
				*item = with_json(item);
			}
		}
		["policies", policy, "revisions", revision, ..] => {
			segments = vec!["policies".to_string(), with_json(&format!("{}-{}", policy, revision))];
		}
		["cookbooks", _] => return Err(DataStoreError::NotFound { path: owned(path) }),
		["cookbooks", name, version, rest @ ..] => {
			let dir = if versioned_cookbooks {
				format!("{}-{}", name, version)
			} else {
				if single_version(name)? != *version {
					return Err(DataStoreError::NotFound { path: owned(path) });
				}
				name.to_string()
			};
			segments = vec!["cookbooks".to_string(), dir];
			segments.extend(rest.iter().map(|s| s.to_string()));
		}
		["cookbook_artifacts", _] => return Err(DataStoreError::NotFound { path: owned(path) }),
		["cookbook_artifacts", name, identifier, rest @ ..] => {
			segments = vec!["cookbook_artifacts".to_string(), format!("{}-{}", name, identifier)];
			segments.extend(rest.iter().map(|s| s.to_string()));
		}
		["acls", ..] => {
			if path.get(1) == Some(&"data") {
				segments[1] = "data_bags".to_string();
			}
			if path.len() == 3 || path == ["acls", "organization"] {
				if let Some(last) = segments.last_mut() {
					*last = with_json(last);
				}
			}
		}
		[_, name] => segments[1] = with_json(name),
		_ => {}
	}
	Ok(segments)
}

/// Store path for a tree path; the inverse of [`to_tree_segments`]
pub fn to_store_segments<F>(tree_path: &str, versioned_cookbooks: bool, single_version: F) -> Vec<String>
where
	F: Fn(&str) -> Result<String, DataStoreError>,
{
	let parts = path_utils::split(tree_path);
	let mut segments = owned(&parts);
	match parts.as_slice() {
		["data_bags", ..] => {
			segments[0] = "data".to_string();
			if let Some(item) = segments.get_mut(2) {
				*item = object_name(item).to_string();
			}
		}
		["cookbooks", dir, rest @ ..] => {
			let (name, version) = if versioned_cookbooks {
				match split_name_version(dir) {
					Some((name, version)) => (name.to_string(), version.to_string()),
					None => (dir.to_string(), String::new()),
				}
			} else {
				(dir.to_string(), single_version(dir).unwrap_or_else(|_| "0.0.0".to_string()))
			};
			segments = vec!["cookbooks".to_string(), name, version];
			segments.extend(rest.iter().map(|s| s.to_string()));
		}
		["cookbook_artifacts", dir, rest @ ..] => {
			if let Some((name, identifier)) = split_name_version(dir) {
				segments = vec!["cookbook_artifacts".into(), name.into(), identifier.into()];
				segments.extend(rest.iter().map(|s| s.to_string()));
			}
		}
		["policies", file, ..] => {
			let stem = object_name(file);
			segments = match split_name_version(stem) {
				Some((name, revision)) => vec!["policies".into(), name.into(), "revisions".into(), revision.into()],
				None => vec!["policies".into(), stem.into()],
			};
		}
		["acls", ..] => {
			if parts.get(1) == Some(&"data_bags") {
				segments[1] = "data".to_string();
			}
			if let Some(last) = segments.last_mut() {
				*last = object_name(last).to_string();
			}
		}
		[_, name] => segments[1] = object_name(name).to_string(),
		_ => {}
	}
	segments
}


// vim: ts=4
