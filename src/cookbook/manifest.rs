//! Cookbook version manifests
//!
//! A manifest lists every file of one cookbook version, grouped by segment,
//! with the checksum and download URL of each.

use crate::fs::repository::COOKBOOK_SEGMENTS;
use md5::{Digest, Md5};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// One file in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
	pub name: String,
	pub path: String,
	pub checksum: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default = "default_specificity")]
	pub specificity: String,
	/// Fetched on first use instead of up front
	#[serde(skip)]
	pub lazy: bool,
}

fn default_specificity() -> String {
	"default".to_string()
}

/// A file of a specific cookbook, as handed to the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookbookFile {
	pub cookbook: String,
	pub segment: String,
	pub record: ManifestRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CookbookVersion {
	pub cookbook_name: String,
	pub version: String,
	pub metadata: Value,
	pub frozen: bool,
	/// Segment name -> records, every segment present
	pub segments: BTreeMap<String, Vec<ManifestRecord>>,
}

impl CookbookVersion {
	pub fn new(cookbook_name: &str, version: &str) -> Self {
		let segments = COOKBOOK_SEGMENTS.iter().map(|s| (s.to_string(), Vec::new())).collect();
		CookbookVersion {
			cookbook_name: cookbook_name.to_string(),
			version: version.to_string(),
			metadata: json!({ "name": cookbook_name, "version": version }),
			frozen: false,
			segments,
		}
	}

	/// `name-version`, the server-side identity
	pub fn full_name(&self) -> String {
		format!("{}-{}", self.cookbook_name, self.version)
	}

	/// Parse a manifest in either the per-segment or the `all_files` layout
	pub fn from_json(value: &Value) -> Result<Self, String> {
		let object = value.as_object().ok_or("manifest is not a JSON object")?;
		let metadata = object.get("metadata").cloned().unwrap_or_else(|| json!({}));
		let full_name = object.get("name").and_then(Value::as_str).unwrap_or_default();

		let cookbook_name = object
			.get("cookbook_name")
			.and_then(Value::as_str)
			.or_else(|| metadata.get("name").and_then(Value::as_str))
			// Artifact manifests carry the bare cookbook name.
			.or_else(|| match object.get("identifier") {
				Some(_) => Some(full_name).filter(|name| !name.is_empty()),
				None => full_name.rsplit_once('-').map(|(name, _)| name),
			})
			.ok_or("manifest has no cookbook_name")?
			.to_string();
		let version = object
			.get("version")
			.and_then(Value::as_str)
			.or_else(|| metadata.get("version").and_then(Value::as_str))
			.unwrap_or("0.0.0")
			.to_string();

		let mut manifest = CookbookVersion::new(&cookbook_name, &version);
		manifest.metadata = metadata;
		manifest.frozen = object.get("frozen?").and_then(Value::as_bool).unwrap_or(false);

		if let Some(all_files) = object.get("all_files") {
			for record in parse_records(all_files)? {
				let segment = segment_for_path(&record.path);
				manifest.push(segment, record);
			}
		}
		for segment in COOKBOOK_SEGMENTS {
			if let Some(records) = object.get(*segment) {
				for record in parse_records(records)? {
					manifest.push(segment, record);
				}
			}
		}
		Ok(manifest)
	}

	pub fn to_json(&self) -> Value {
		let mut object = Map::new();
		object.insert("name".into(), json!(self.full_name()));
		object.insert("cookbook_name".into(), json!(self.cookbook_name));
		object.insert("version".into(), json!(self.version));
		object.insert("json_class".into(), json!("Chef::CookbookVersion"));
		object.insert("chef_type".into(), json!("cookbook_version"));
		object.insert("frozen?".into(), json!(self.frozen));
		object.insert("metadata".into(), self.metadata.clone());
		for (segment, records) in &self.segments {
			object.insert(segment.clone(), serde_json::to_value(records).unwrap_or_else(|_| json!([])));
		}
		Value::Object(object)
	}

	fn push(&mut self, segment: &str, record: ManifestRecord) {
		let records = self.segments.entry(segment.to_string()).or_insert_with(Vec::new);
		if !records.iter().any(|r| r.path == record.path) {
			records.push(record);
		}
	}

	/// Record the file at cookbook-relative `path`
	pub fn add_file(&mut self, path: &str, checksum: &str, url: Option<String>) {
		let segment = segment_for_path(path);
		let parts: Vec<&str> = path.split('/').collect();
		let specificity = match segment {
			"files" | "templates" if parts.len() > 2 => parts[1].to_string(),
			_ => default_specificity(),
		};
		let record = ManifestRecord {
			name: parts.last().map(|s| s.to_string()).unwrap_or_default(),
			path: path.to_string(),
			checksum: checksum.to_string(),
			url,
			specificity,
			lazy: false,
		};
		self.push(segment, record);
	}

	/// Every record with its segment, in segment order
	pub fn records(&self) -> impl Iterator<Item = (&str, &ManifestRecord)> {
		self.segments.iter().flat_map(|(segment, records)| records.iter().map(move |r| (segment.as_str(), r)))
	}

	/// Record for a cookbook-relative path
	pub fn find(&self, path: &str) -> Option<&ManifestRecord> {
		self.records().map(|(_, record)| record).find(|record| record.path == path)
	}
}

fn parse_records(value: &Value) -> Result<Vec<ManifestRecord>, String> {
	serde_json::from_value(value.clone()).map_err(|e| format!("invalid manifest records: {}", e))
}

/// Segment holding the file at cookbook-relative `path`
pub fn segment_for_path(path: &str) -> &'static str {
	if let Some((first, _)) = path.split_once('/') {
		if let Some(segment) = COOKBOOK_SEGMENTS.iter().find(|s| **s == first && **s != "root_files") {
			return *segment;
		}
	}
	"root_files"
}

/// Checksum of file contents as used in manifests and sandboxes (MD5, hex)
pub fn checksum_bytes(bytes: &[u8]) -> String {
	hex::encode(Md5::digest(bytes))
}

/// Checksum of a file on disk, streamed
pub fn checksum_file(path: &Path) -> io::Result<String> {
	let mut file = File::open(path)?;
	let mut hasher = Md5::new();
	let mut buf = [0u8; 64 * 1024];
	loop {
		let n = file.read(&mut buf)?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hex::encode(hasher.finalize()))
}

/// Name and version declared by a cookbook's metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookbookMetadata {
	pub name: Option<String>,
	pub version: Option<String>,
}

impl CookbookMetadata {
	/// From `metadata.json`; `None` when it is not JSON
	pub fn from_json(bytes: &[u8]) -> Option<Self> {
		let value: Value = serde_json::from_slice(bytes).ok()?;
		Some(CookbookMetadata::from_value(&value))
	}

	pub fn from_value(value: &Value) -> Self {
		CookbookMetadata {
			name: value.get("name").and_then(Value::as_str).map(String::from),
			version: value.get("version").and_then(Value::as_str).map(String::from),
		}
	}

	/// From the `name "..."` and `version "..."` lines of `metadata.rb`
	pub fn from_ruby(text: &str) -> Self {
		let mut metadata = CookbookMetadata::default();
		let line = match Regex::new(r#"^\s*(name|version)\s+['"]([^'"]*)['"]"#) {
			Ok(line) => line,
			Err(_) => return metadata,
		};
		for caps in text.lines().filter_map(|l| line.captures(l)) {
			let value = caps[2].to_string();
			match &caps[1] {
				"name" => metadata.name = Some(value),
				_ => metadata.version = Some(value),
			}
		}
		metadata
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_add_file_assigns_segments() {
		let mut manifest = CookbookVersion::new("app", "1.2.3");
		manifest.add_file("recipes/default.rb", "c1", None);
		manifest.add_file("templates/default/motd.erb", "c2", None);
		manifest.add_file("README.md", "c3", None);
		manifest.add_file("spec/unit.rb", "c4", None);

		assert_eq!(manifest.segments["recipes"][0].name, "default.rb");
		assert_eq!(manifest.segments["templates"][0].specificity, "default");
		let root: Vec<&str> = manifest.segments["root_files"].iter().map(|r| r.path.as_str()).collect();
		assert_eq!(root, vec!["README.md", "spec/unit.rb"]);
		assert_eq!(manifest.full_name(), "app-1.2.3");
	}

	#[test]
	fn test_json_round_trip_keeps_records() {
		let mut manifest = CookbookVersion::new("app", "1.0.0");
		manifest.add_file("recipes/default.rb", "abc", Some("http://x/abc".into()));
		let parsed = CookbookVersion::from_json(&manifest.to_json()).unwrap();
		assert_eq!(parsed.find("recipes/default.rb").unwrap().url.as_deref(), Some("http://x/abc"));
		assert_eq!(parsed.version, "1.0.0");
	}

	#[test]
	fn test_all_files_layout() {
		let value = json!({
			"cookbook_name": "app",
			"version": "2.0.0",
			"all_files": [
				{"name": "recipes/default.rb", "path": "recipes/default.rb", "checksum": "a"},
				{"name": "metadata.rb", "path": "metadata.rb", "checksum": "b"}
			]
		});
		let manifest = CookbookVersion::from_json(&value).unwrap();
		assert_eq!(manifest.segments["recipes"].len(), 1);
		assert_eq!(manifest.segments["root_files"].len(), 1);
	}

	#[test]
	fn test_metadata_rb() {
		let metadata = CookbookMetadata::from_ruby("name 'app'\nmaintainer 'x'\nversion \"1.4.0\"\n");
		assert_eq!(metadata.name.as_deref(), Some("app"));
		assert_eq!(metadata.version.as_deref(), Some("1.4.0"));
	}

	#[test]
	fn test_checksum_is_stable() {
		assert_eq!(checksum_bytes(b"abc"), checksum_bytes(b"abc"));
		assert_ne!(checksum_bytes(b"abc"), checksum_bytes(b"abd"));
		assert_eq!(checksum_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
		assert_eq!(checksum_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
	}
}

// vim: ts=4
