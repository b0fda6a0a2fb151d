//! Callback traits for user-facing output and cookbook sync events

use crate::error::CookbookSyncError;
use crate::logging::*;
use parking_lot::Mutex;

// Type aliases to reduce complexity
type LineFn = dyn Fn(&str) + Send + Sync;

/// Receives the lines copy and diff produce for the user.
///
/// `output` is regular output ("Created /roles/web.json", a diff hunk),
/// `warn` a skipped entry, `error` a failed one.
pub trait Reporter: Send + Sync {
	fn output(&self, _line: &str) {}

	fn warn(&self, _line: &str) {}

	fn error(&self, _line: &str) {}
}

/// Reporter that drops everything
pub struct NoReporter;

impl Reporter for NoReporter {}

/// Reporter forwarding to tracing
pub struct LogReporter;

impl Reporter for LogReporter {
	fn output(&self, line: &str) {
		info!("{}", line);
	}

	fn warn(&self, line: &str) {
		warn!("{}", line);
	}

	fn error(&self, line: &str) {
		error!("{}", line);
	}
}

/// Kind of a reported line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
	Output,
	Warning,
	Error,
}

/// Reporter keeping every line, in order
#[derive(Default)]
pub struct CollectingReporter {
	lines: Mutex<Vec<(LineKind, String)>>,
}

impl CollectingReporter {
	pub fn new() -> Self {
		CollectingReporter::default()
	}

	pub fn lines(&self) -> Vec<(LineKind, String)> {
		self.lines.lock().clone()
	}

	/// Lines of one kind only
	pub fn of_kind(&self, kind: LineKind) -> Vec<String> {
		self.lines.lock().iter().filter(|(k, _)| *k == kind).map(|(_, line)| line.clone()).collect()
	}

	pub fn outputs(&self) -> Vec<String> {
		self.of_kind(LineKind::Output)
	}

	pub fn warnings(&self) -> Vec<String> {
		self.of_kind(LineKind::Warning)
	}

	pub fn errors(&self) -> Vec<String> {
		self.of_kind(LineKind::Error)
	}

	fn push(&self, kind: LineKind, line: &str) {
		self.lines.lock().push((kind, line.to_string()));
	}
}

impl Reporter for CollectingReporter {
	fn output(&self, line: &str) {
		self.push(LineKind::Output, line);
	}

	fn warn(&self, line: &str) {
		self.push(LineKind::Warning, line);
	}

	fn error(&self, line: &str) {
		self.push(LineKind::Error, line);
	}
}

/// Builder for a reporter made of closures
#[derive(Default)]
pub struct ReporterBuilder {
	output: Option<Box<LineFn>>,
	warn: Option<Box<LineFn>>,
	error: Option<Box<LineFn>>,
}

impl ReporterBuilder {
	pub fn new() -> Self {
		ReporterBuilder::default()
	}

	pub fn on_output<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		self.output = Some(Box::new(callback));
		self
	}

	pub fn on_warn<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		self.warn = Some(Box::new(callback));
		self
	}

	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		self.error = Some(Box::new(callback));
		self
	}

	pub fn build(self) -> Box<dyn Reporter> {
		Box::new(CompositeReporter { output: self.output, warn: self.warn, error: self.error })
	}
}

struct CompositeReporter {
	output: Option<Box<LineFn>>,
	warn: Option<Box<LineFn>>,
	error: Option<Box<LineFn>>,
}

impl Reporter for CompositeReporter {
	fn output(&self, line: &str) {
		if let Some(ref callback) = self.output {
			callback(line);
		}
	}

	fn warn(&self, line: &str) {
		if let Some(ref callback) = self.warn {
			callback(line);
		}
	}

	fn error(&self, line: &str) {
		if let Some(ref callback) = self.error {
			callback(line);
		}
	}
}

/// Events fired while synchronizing cookbooks into the file cache
pub trait SyncEvents: Send + Sync {
	/// Obsolete cached files are about to be removed
	fn cookbook_clean_start(&self) {}

	/// A cached file was removed
	fn removed_cookbook_file(&self, _path: &str) {}

	fn cookbook_clean_complete(&self) {}

	/// Downloads start for `cookbook_count` cookbooks
	fn cookbook_sync_start(&self, _cookbook_count: usize) {}

	/// A file was downloaded into the cache
	fn updated_cookbook_file(&self, _cookbook: &str, _path: &str) {}

	/// Every file of a cookbook is current
	fn synchronized_cookbook(&self, _cookbook: &str) {}

	fn cookbook_sync_failed(&self, _error: &CookbookSyncError) {}

	fn cookbook_sync_complete(&self) {}
}

/// Default event sink that does nothing
pub struct NoSyncEvents;

impl SyncEvents for NoSyncEvents {}


// vim: ts=4
