//! Pattern-driven tree listing
//!
//! [`list`] walks a tree, pruning with the pattern: a subtree is only entered
//! when something below it could match, and when the pattern names the next
//! segment literally only that child is resolved. Sibling subtrees are listed
//! in parallel but yielded in child order.

use super::{resolve_path, EntryRef};
use crate::error::{FsError, FsResult, Operation};
use crate::parallel::{ParallelOptions, ParallelResults, Parallelizer};
use crate::pattern::FilePattern;
use std::collections::HashSet;
use std::sync::Arc;
use std::vec;

/// Every entry under `root` matching `pattern`.
///
/// Relative patterns are matched from the root (`*` is `/*`). The returned
/// value is restartable: each iteration walks the tree again.
pub fn list(root: &EntryRef, pattern: &Arc<FilePattern>, parallelizer: &Arc<Parallelizer>) -> Lister {
	Lister {
		root: Arc::clone(root),
		pattern: pattern.rooted(),
		parallelizer: Arc::clone(parallelizer),
	}
}

#[derive(Clone)]
pub struct Lister {
	root: EntryRef,
	pattern: Arc<FilePattern>,
	parallelizer: Arc<Parallelizer>,
}

impl Lister {
	pub fn iter(&self) -> ListIter {
		ListIter {
			pattern: Arc::clone(&self.pattern),
			parallelizer: Arc::clone(&self.parallelizer),
			stack: vec![Frame::Visit(Arc::clone(&self.root))],
		}
	}
}

impl<'a> IntoIterator for &'a Lister {
	type Item = FsResult<EntryRef>;
	type IntoIter = ListIter;

	fn into_iter(self) -> ListIter {
		self.iter()
	}
}

enum Frame {
	Visit(EntryRef),
	Subtrees { parent: String, results: ParallelResults<Vec<FsResult<EntryRef>>> },
	Buffered(vec::IntoIter<FsResult<EntryRef>>),
}

/// Depth-first walk; listing errors are yielded in place and the walk goes on
pub struct ListIter {
	pattern: Arc<FilePattern>,
	parallelizer: Arc<Parallelizer>,
	stack: Vec<Frame>,
}

impl ListIter {
	/// Queue whatever below `entry` could still match
	fn expand(&mut self, entry: &EntryRef) -> Option<FsError> {
		let display_path = entry.display_path();
		if !self.pattern.could_match_children(&display_path) {
			return None;
		}

		if let Some(name) = self.pattern.exact_child_name_under(&display_path) {
			let child = entry.child(name);
			if child.exists() {
				self.stack.push(Frame::Visit(child));
			}
			return None;
		}

		if !entry.is_dir() {
			return None;
		}
		let children = match entry.children() {
			Ok(children) => children,
			Err(e) => return Some(e),
		};

		let pattern = Arc::clone(&self.pattern);
		let parallelizer = Arc::clone(&self.parallelizer);
		let results = self.parallelizer.parallelize(children, ParallelOptions::default(), move |child| {
			let walk = ListIter {
				pattern: Arc::clone(&pattern),
				parallelizer: Arc::clone(&parallelizer),
				stack: vec![Frame::Visit(child)],
			};
			walk.collect::<Vec<_>>()
		});
		self.stack.push(Frame::Subtrees { parent: entry.path(), results });
		None
	}
}

impl Iterator for ListIter {
	type Item = FsResult<EntryRef>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let frame = self.stack.pop()?;
			match frame {
				Frame::Visit(entry) => {
					let matched = self.pattern.matches(&entry.display_path());
					if let Some(e) = self.expand(&entry) {
						// The entry still counts; its listing failure follows it.
						self.stack.push(Frame::Buffered(vec![Err(e)].into_iter()));
					}
					if matched {
						return Some(Ok(entry));
					}
				}
				Frame::Subtrees { parent, mut results } => match results.next() {
					Some(Ok(subtree)) => {
						self.stack.push(Frame::Subtrees { parent, results });
						self.stack.push(Frame::Buffered(subtree.into_iter()));
					}
					Some(Err(e)) => {
						let error = FsError::OperationFailed {
							path: parent.clone(),
							operation: Operation::List,
							message: e.to_string(),
						};
						self.stack.push(Frame::Subtrees { parent, results });
						return Some(Err(error));
					}
					None => {}
				},
				Frame::Buffered(mut items) => {
					if let Some(item) = items.next() {
						self.stack.push(Frame::Buffered(items));
						return Some(item);
					}
				}
			}
		}
	}
}

/// Matches from both trees paired with their counterparts.
///
/// Everything matching under `a_root` comes first, paired with the same
/// display path resolved under `b_root`; then matches under `b_root` not
/// seen yet. Each matching path appears exactly once.
pub fn list_pairs(
	pattern: &Arc<FilePattern>,
	a_root: &EntryRef,
	b_root: &EntryRef,
	parallelizer: &Arc<Parallelizer>,
) -> PairLister {
	PairLister {
		a: list(a_root, pattern, parallelizer),
		b: list(b_root, pattern, parallelizer),
	}
}

#[derive(Clone)]
pub struct PairLister {
	a: Lister,
	b: Lister,
}

impl PairLister {
	pub fn iter(&self) -> PairIter {
		PairIter {
			a_root: Arc::clone(&self.a.root),
			b_root: Arc::clone(&self.b.root),
			a: self.a.iter(),
			b: self.b.iter(),
			found_paths: HashSet::new(),
		}
	}

	/// Collect every pair, setting listing errors aside
	pub fn partition(&self) -> (Vec<(EntryRef, EntryRef)>, Vec<FsError>) {
		let mut pairs = Vec::new();
		let mut errors = Vec::new();
		for item in self.iter() {
			match item {
				Ok(pair) => pairs.push(pair),
				Err(e) => errors.push(e),
			}
		}
		(pairs, errors)
	}
}

impl<'a> IntoIterator for &'a PairLister {
	type Item = FsResult<(EntryRef, EntryRef)>;
	type IntoIter = PairIter;

	fn into_iter(self) -> PairIter {
		self.iter()
	}
}

pub struct PairIter {
	a_root: EntryRef,
	b_root: EntryRef,
	a: ListIter,
	b: ListIter,
	found_paths: HashSet<String>,
}

impl Iterator for PairIter {
	type Item = FsResult<(EntryRef, EntryRef)>;

	fn next(&mut self) -> Option<Self::Item> {
		if let Some(a) = self.a.next() {
			return Some(a.map(|a| {
				let display_path = a.display_path();
				let b = resolve_path(&self.b_root, &display_path);
				self.found_paths.insert(display_path);
				(a, b)
			}));
		}
		loop {
			match self.b.next()? {
				Ok(b) => {
					let display_path = b.display_path();
					if self.found_paths.contains(&display_path) {
						continue;
					}
					let a = resolve_path(&self.a_root, &display_path);
					return Some(Ok((a, b)));
				}
				Err(e) => return Some(Err(e)),
			}
		}
	}
}

/// Children of two directories paired by name (union of both sides)
pub fn child_pairs(a: &EntryRef, b: &EntryRef) -> FsResult<Vec<(EntryRef, EntryRef)>> {
	let mut result = Vec::new();
	let mut a_names = HashSet::new();
	for a_child in a.children()? {
		a_names.insert(a_child.name().to_string());
		let b_child = b.child(a_child.name());
		result.push((a_child, b_child));
	}
	for b_child in b.children()? {
		if !a_names.contains(b_child.name()) {
			let a_child = a.child(b_child.name());
			result.push((a_child, b_child));
		}
	}
	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::memory::MemoryEntry;
	use crate::fs::TreeEntry;
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Wraps a tree and counts directory listings
	struct CountingEntry {
		inner: EntryRef,
		listings: Arc<AtomicUsize>,
	}

	impl CountingEntry {
		fn wrap(inner: EntryRef, listings: &Arc<AtomicUsize>) -> EntryRef {
			Arc::new(CountingEntry { inner, listings: Arc::clone(listings) })
		}
	}

	impl TreeEntry for CountingEntry {
		fn name(&self) -> &str {
			self.inner.name()
		}

		fn parent(&self) -> Option<EntryRef> {
			self.inner.parent()
		}

		fn path(&self) -> String {
			self.inner.path()
		}

		fn is_dir(&self) -> bool {
			self.inner.is_dir()
		}

		fn exists(&self) -> bool {
			self.inner.exists()
		}

		fn children(&self) -> FsResult<Vec<EntryRef>> {
			self.listings.fetch_add(1, Ordering::SeqCst);
			let children = self.inner.children()?;
			Ok(children.into_iter().map(|c| CountingEntry::wrap(c, &self.listings)).collect())
		}

		fn child(&self, name: &str) -> EntryRef {
			CountingEntry::wrap(self.inner.child(name), &self.listings)
		}

		fn can_have_child(&self, name: &str, is_dir: bool) -> bool {
			self.inner.can_have_child(name, is_dir)
		}

		fn create_child(&self, name: &str, content: Option<&[u8]>) -> FsResult<EntryRef> {
			self.inner.create_child(name, content)
		}

		fn read(&self) -> FsResult<Vec<u8>> {
			self.inner.read()
		}

		fn write(&self, content: &[u8]) -> FsResult<()> {
			self.inner.write(content)
		}

		fn delete(&self, recurse: bool) -> FsResult<()> {
			self.inner.delete(recurse)
		}
	}

	fn tree(files: &[&str]) -> Arc<MemoryEntry> {
		let root = MemoryEntry::new_root();
		for file in files {
			root.add_file(file, b"{}").unwrap();
		}
		root
	}

	fn pattern(text: &str) -> Arc<FilePattern> {
		Arc::new(FilePattern::new(text).unwrap())
	}

	fn paths(lister: &Lister) -> Vec<String> {
		lister.iter().map(|entry| entry.unwrap().path()).collect()
	}

	#[test]
	fn test_lister_is_restartable() {
		let root: EntryRef = tree(&["roles/web.json", "roles/db.json", "nodes/a.json"]);
		let lister = list(&root, &pattern("/roles/*"), &Arc::new(Parallelizer::new(2)));
		let first = paths(&lister);
		assert_eq!(first.len(), 2);
		assert_eq!(paths(&lister), first);
	}

	#[test]
	fn test_exact_child_is_resolved_without_listing() {
		let memory = tree(&["roles/web.json", "roles/db.json"]);
		let listings = Arc::new(AtomicUsize::new(0));
		let root = CountingEntry::wrap(memory, &listings);
		let parallelizer = Arc::new(Parallelizer::synchronous());

		assert!(paths(&list(&root, &pattern("/roles/nope.json"), &parallelizer)).is_empty());
		assert_eq!(paths(&list(&root, &pattern("/roles/web.json"), &parallelizer)), vec!["/roles/web.json"]);
		assert_eq!(listings.load(Ordering::SeqCst), 0);

		assert_eq!(paths(&list(&root, &pattern("/roles/*.json"), &parallelizer)).len(), 2);
		assert_eq!(listings.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_relative_pattern_lists_from_root() {
		let root: EntryRef = tree(&["x.json", "roles/web.json"]);
		let lister = list(&root, &pattern("*"), &Arc::new(Parallelizer::synchronous()));
		let mut found = paths(&lister);
		found.sort();
		assert_eq!(found, vec!["/roles", "/x.json"]);
	}

	#[test]
	fn test_pairs_cover_each_path_once() {
		let a: EntryRef = tree(&["roles/web.json", "roles/db.json"]);
		let b: EntryRef = tree(&["roles/web.json", "roles/api.json"]);
		let pairs = list_pairs(&pattern("/roles/*"), &a, &b, &Arc::new(Parallelizer::new(2)));
		let mut seen: Vec<(String, bool, bool)> = pairs
			.iter()
			.map(|pair| {
				let (a, b) = pair.unwrap();
				(a.path(), a.exists(), b.exists())
			})
			.collect();
		seen.sort();
		assert_eq!(
			seen,
			vec![
				("/roles/api.json".to_string(), false, true),
				("/roles/db.json".to_string(), true, false),
				("/roles/web.json".to_string(), true, true),
			]
		);
	}

	#[test]
	fn test_child_pairs_union() {
		let a: EntryRef = tree(&["roles/web.json", "roles/db.json"]);
		let b: EntryRef = tree(&["roles/web.json", "roles/api.json"]);
		let pairs = child_pairs(&a.child("roles"), &b.child("roles")).unwrap();
		let mut names: Vec<&str> = pairs.iter().map(|(a, _)| a.name()).collect();
		names.sort();
		assert_eq!(names, vec!["api.json", "db.json", "web.json"]);
	}
}

// vim: ts=4
