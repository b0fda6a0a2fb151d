//! Repository trees on disk: layout rules, chefignore and diffs against memory

use cheffs::callbacks::CollectingReporter;
use cheffs::fs::diff_print::{diff_print, OutputMode};
use cheffs::fs::local::LocalEntry;
use cheffs::fs::memory::MemoryEntry;
use cheffs::{Config, EntryRef, FilePattern, Parallelizer, TreeEntry};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Helper Functions for Test Setup
// ============================================================================

fn create_test_file(dir: &TempDir, name: &str, content: &[u8]) {
	let file_path = dir.path().join(name);
	if let Some(parent) = file_path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(&file_path, content).unwrap();
}

fn open(dir: &Path, versioned_cookbooks: bool) -> EntryRef {
	let config = Config { chef_repo_path: dir.to_path_buf(), versioned_cookbooks, ..Config::default() };
	LocalEntry::from_config(&config)
}

fn names(entry: &EntryRef) -> Vec<String> {
	entry.children().unwrap().iter().map(|c| c.name().to_string()).collect()
}

fn list(root: &EntryRef, pattern: &str) -> Vec<String> {
	let pattern = Arc::new(FilePattern::new(pattern).unwrap());
	let lister = cheffs::fs::list(root, &pattern, &Arc::new(Parallelizer::new(2)));
	let mut paths: Vec<String> = lister.iter().map(|entry| entry.unwrap().path()).collect();
	paths.sort();
	paths
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_root_lists_existing_directories_only() {
	let dir = TempDir::new().unwrap();
	create_test_file(&dir, "roles/web.json", b"{}");
	create_test_file(&dir, "members.json", b"[]");
	fs::create_dir_all(dir.path().join("random")).unwrap();

	let root = open(dir.path(), false);
	assert_eq!(names(&root), vec!["members.json", "roles"]);
}

#[test]
fn test_chefignore_hides_cookbook_files() {
	let dir = TempDir::new().unwrap();
	create_test_file(&dir, "cookbooks/chefignore", b"# editor files\n*.swp\n");
	create_test_file(&dir, "cookbooks/app/recipes/default.rb", b"package 'nginx'");
	create_test_file(&dir, "cookbooks/app/recipes/default.rb.swp", b"junk");
	create_test_file(&dir, "cookbooks/app/chefignore", b"README*\n");
	create_test_file(&dir, "cookbooks/app/README.md", b"# app");
	create_test_file(&dir, "cookbooks/ignored/notes.swp", b"junk");

	let root = open(dir.path(), false);
	assert_eq!(names(&root.child("cookbooks")), vec!["app"]);
	let app = root.child("cookbooks").child("app");
	assert_eq!(names(&app.child("recipes")), vec!["default.rb"]);
	assert!(!names(&app).contains(&"README.md".to_string()));
}

#[test]
fn test_empty_cookbook_directories_are_hidden() {
	let dir = TempDir::new().unwrap();
	fs::create_dir_all(dir.path().join("cookbooks/empty/recipes")).unwrap();
	create_test_file(&dir, "cookbooks/app/metadata.rb", b"name 'app'");

	let root = open(dir.path(), false);
	assert_eq!(names(&root.child("cookbooks")), vec!["app"]);
}

#[test]
fn test_versioned_cookbooks_need_a_version() {
	let dir = TempDir::new().unwrap();
	create_test_file(&dir, "cookbooks/app-1.0.0/metadata.rb", b"name 'app'");
	create_test_file(&dir, "cookbooks/plain/metadata.rb", b"name 'plain'");

	let root = open(dir.path(), true);
	assert_eq!(names(&root.child("cookbooks")), vec!["app-1.0.0"]);
}

#[test]
fn test_list_with_wildcards() {
	let dir = TempDir::new().unwrap();
	create_test_file(&dir, "roles/web.json", b"{}");
	create_test_file(&dir, "roles/db.rb", b"name 'db'");
	create_test_file(&dir, "roles/notes.txt", b"");
	create_test_file(&dir, "data_bags/users/alice.json", b"{\"id\":\"alice\"}");

	let root = open(dir.path(), false);
	assert_eq!(list(&root, "/roles/*.json"), vec!["/roles/db.json", "/roles/web.json"]);
	assert_eq!(list(&root, "/data_bags/**/*.json"), vec!["/data_bags/users/alice.json"]);
}

#[test]
fn test_diff_against_memory_tree() {
	let dir = TempDir::new().unwrap();
	create_test_file(&dir, "roles/web.json", b"{\"name\":\"web\"}");
	create_test_file(&dir, "roles/db.json", b"{\"name\":\"db\"}");
	let local = open(dir.path(), false);

	let memory = MemoryEntry::new_root();
	memory.add_file("roles/web.json", b"{\"name\":\"web\"}").unwrap();
	memory.add_file("roles/api.json", b"{\"name\":\"api\"}").unwrap();
	let memory: EntryRef = memory;

	let reporter = CollectingReporter::new();
	let pattern = Arc::new(FilePattern::new("/roles").unwrap());
	let parallelizer = Arc::new(Parallelizer::new(2));
	let error =
		diff_print(&pattern, &memory, &local, None, OutputMode::NameStatus, None, &reporter, &parallelizer);

	assert!(!error);
	let on_disk = |name: &str| dir.path().join("roles").join(name).display().to_string();
	assert_eq!(reporter.outputs(), vec![format!("D\t{}", on_disk("api.json")), format!("A\t{}", on_disk("db.json"))]);
}

// vim: ts=4
