//! Copying between in-memory trees: purge, force and depth handling

use cheffs::callbacks::CollectingReporter;
use cheffs::fs::memory::MemoryEntry;
use cheffs::{copy_to, EntryRef, FilePattern, Parallelizer, Reporter, SyncOptions, TreeEntry};
use std::sync::Arc;

// ============================================================================
// Helper Functions for Test Setup
// ============================================================================

struct Trees {
	src: Arc<MemoryEntry>,
	dest: Arc<MemoryEntry>,
}

fn trees() -> Trees {
	let src = MemoryEntry::new_root();
	src.add_file("roles/web.json", b"{\"name\":\"web\",\"run_list\":[\"recipe[nginx]\"]}").unwrap();
	src.add_file("roles/db.json", b"{\"name\":\"db\"}").unwrap();
	src.add_file("cookbooks/app/recipes/default.rb", b"package 'nginx'").unwrap();

	let dest = MemoryEntry::new_root();
	dest.add_file("roles/web.json", b"{\"name\":\"web\"}").unwrap();
	dest.add_file("roles/old.json", b"{\"name\":\"old\"}").unwrap();
	dest.add_dir("cookbooks").unwrap();
	Trees { src, dest }
}

fn copy(trees: &Trees, pattern: &str, depth: Option<usize>, options: SyncOptions) -> (bool, Arc<CollectingReporter>) {
	let reporter = Arc::new(CollectingReporter::new());
	let as_reporter: Arc<dyn Reporter> = reporter.clone();
	let src: EntryRef = trees.src.clone();
	let dest: EntryRef = trees.dest.clone();
	let pattern = Arc::new(FilePattern::new(pattern).unwrap());
	let failed = copy_to(&pattern, &src, &dest, depth, &options, &as_reporter, &Arc::new(Parallelizer::new(4)));
	(failed, reporter)
}

fn read(root: &Arc<MemoryEntry>, path: &str) -> Vec<u8> {
	let root: EntryRef = root.clone();
	cheffs::fs::resolve_path(&root, path).read().unwrap()
}

fn sorted(mut lines: Vec<String>) -> Vec<String> {
	lines.sort();
	lines
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_copy_without_purge_keeps_extra_entries() {
	let trees = trees();
	let (failed, reporter) = copy(&trees, "/roles", None, SyncOptions::default());

	assert!(!failed);
	assert_eq!(sorted(reporter.outputs()), vec!["Created /roles/db.json", "Updated /roles/web.json"]);
	assert!(trees.dest.child("roles").child("old.json").exists());
	assert_eq!(read(&trees.dest, "/roles/web.json"), read(&trees.src, "/roles/web.json"));
}

#[test]
fn test_copy_with_purge_deletes_extra_entries() {
	let trees = trees();
	let options = SyncOptions { purge: true, ..SyncOptions::default() };
	let (failed, reporter) = copy(&trees, "/roles", None, options);

	assert!(!failed);
	assert!(!trees.dest.child("roles").child("old.json").exists());
	assert!(reporter.outputs().contains(&"Deleted extra entry /roles/old.json (purge is on)".to_string()));
}

#[test]
fn test_second_copy_is_a_no_op() {
	let trees = trees();
	copy(&trees, "/**", None, SyncOptions::default());
	let (failed, reporter) = copy(&trees, "/**", None, SyncOptions::default());
	assert!(!failed);
	assert!(reporter.outputs().is_empty(), "unexpected output {:?}", reporter.outputs());
}

#[test]
fn test_force_rewrites_identical_files() {
	let trees = trees();
	copy(&trees, "/roles/*.json", None, SyncOptions::default());
	let options = SyncOptions { force: true, ..SyncOptions::default() };
	let (failed, reporter) = copy(&trees, "/roles/*.json", None, options);
	assert!(!failed);
	assert_eq!(sorted(reporter.outputs()), vec!["Updated /roles/db.json", "Updated /roles/web.json"]);
}

#[test]
fn test_depth_zero_creates_only_the_directory() {
	let trees = trees();
	let (failed, reporter) = copy(&trees, "/cookbooks/app", Some(0), SyncOptions::default());
	assert!(!failed);
	assert_eq!(reporter.outputs(), vec!["Created /cookbooks/app"]);
	assert!(trees.dest.child("cookbooks").child("app").children().unwrap().is_empty());
}

#[test]
fn test_type_mismatch_is_reported() {
	let trees = trees();
	trees.dest.add_file("cookbooks/app", b"not a dir").unwrap();
	let (_failed, reporter) = copy(&trees, "/cookbooks/app", None, SyncOptions::default());
	assert_eq!(
		reporter.errors(),
		vec!["File /cookbooks/app is a directory while file /cookbooks/app is a regular file"]
	);
}

#[test]
fn test_relative_pattern_purges_from_the_root() {
	let src = MemoryEntry::new_root();
	let dest = MemoryEntry::new_root();
	dest.add_file("x.json", b"{}").unwrap();
	let trees = Trees { src, dest };

	let (failed, _) = copy(&trees, "*", None, SyncOptions::default());
	assert!(!failed);
	assert!(trees.dest.child("x.json").exists());

	let options = SyncOptions { purge: true, ..SyncOptions::default() };
	let (failed, reporter) = copy(&trees, "*", None, options);
	assert!(!failed);
	assert!(trees.dest.children().unwrap().is_empty());
	assert_eq!(reporter.outputs(), vec!["Deleted extra entry /x.json (purge is on)"]);
}

#[test]
fn test_missing_exact_path_is_an_error() {
	let trees = trees();
	let (failed, reporter) = copy(&trees, "roles/nope.json", None, SyncOptions::default());
	assert!(failed);
	assert_eq!(reporter.errors(), vec!["roles/nope.json: No such file or directory on remote or local"]);
}

// vim: ts=4
