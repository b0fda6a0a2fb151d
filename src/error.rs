//! Error types for ChefFS operations

use std::error::Error;
use std::fmt;
use std::io;

/// Result alias used by every tree backend
pub type FsResult<T> = Result<T, FsError>;

/// Tree operation that failed or was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Read,
	Write,
	CreateChild,
	Delete,
	List,
	Upload,
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Operation::Read => "read",
			Operation::Write => "write",
			Operation::CreateChild => "create",
			Operation::Delete => "delete",
			Operation::List => "list",
			Operation::Upload => "upload",
		};
		f.write_str(name)
	}
}

/// Why an operation was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotAllowedReason {
	/// The `_default` environment is immutable on the server
	DefaultEnvironment,

	/// The entry is read-only in this backend
	ReadOnly,

	/// Backend specific reason
	Other(String),
}

impl fmt::Display for NotAllowedReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NotAllowedReason::DefaultEnvironment => {
				write!(f, "cannot be modified (default environment cannot be modified)")
			}
			NotAllowedReason::ReadOnly => write!(f, "cannot be modified (read-only)"),
			NotAllowedReason::Other(reason) => write!(f, "{}", reason),
		}
	}
}

/// Errors raised by tree entries
#[derive(Debug)]
pub enum FsError {
	/// Entry (or one of its parents) does not exist
	NotFound { path: String },

	/// Tried to create an entry that already exists
	AlreadyExists { path: String },

	/// Non-recursive delete of a directory
	MustDeleteRecursively { path: String },

	/// Entry is backed by a Ruby source file and cannot be rewritten
	RubyFile { path: String, reason: String },

	/// Backend refuses the operation
	OperationNotAllowed { path: String, operation: Operation, reason: NotAllowedReason },

	/// Backend tried and failed
	OperationFailed { path: String, operation: Operation, message: String },

	/// Directory operation on a file or file operation on a directory
	TypeMismatch { path: String, expected_dir: bool },

	/// I/O error on a local file
	Io { path: String, source: io::Error },
}

impl FsError {
	/// Tree path of the entry the error is about
	pub fn path(&self) -> &str {
		match self {
			FsError::NotFound { path }
			| FsError::AlreadyExists { path }
			| FsError::MustDeleteRecursively { path }
			| FsError::RubyFile { path, .. }
			| FsError::OperationNotAllowed { path, .. }
			| FsError::OperationFailed { path, .. }
			| FsError::TypeMismatch { path, .. }
			| FsError::Io { path, .. } => path,
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, FsError::NotFound { .. })
	}

	/// Map an I/O error, turning `ENOENT` into `NotFound`
	pub fn from_io(path: impl Into<String>, source: io::Error) -> Self {
		let path = path.into();
		match source.kind() {
			io::ErrorKind::NotFound => FsError::NotFound { path },
			io::ErrorKind::AlreadyExists => FsError::AlreadyExists { path },
			_ => FsError::Io { path, source },
		}
	}
}

impl fmt::Display for FsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FsError::NotFound { path } => write!(f, "{}: No such file or directory", path),
			FsError::AlreadyExists { path } => write!(f, "{}: Already exists", path),
			FsError::MustDeleteRecursively { path } => {
				write!(f, "{}: Must delete recursively", path)
			}
			FsError::RubyFile { path, reason } => write!(f, "{} {}", path, reason),
			FsError::OperationNotAllowed { path, operation, reason } => {
				write!(f, "{} {} not allowed: {}", path, operation, reason)
			}
			FsError::OperationFailed { path, operation, message } => {
				write!(f, "{} failed to {}: {}", path, operation, message)
			}
			FsError::TypeMismatch { path, expected_dir: true } => {
				write!(f, "{}: Not a directory", path)
			}
			FsError::TypeMismatch { path, expected_dir: false } => {
				write!(f, "{}: Is a directory", path)
			}
			FsError::Io { path, source } => write!(f, "{}: I/O error: {}", path, source),
		}
	}
}

impl Error for FsError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			FsError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Pattern compilation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
	/// `..` would step back over a `**` segment
	DotDotOverDoubleStar { pattern: String },

	/// Generated regex did not compile
	InvalidRegex { pattern: String, message: String },
}

impl fmt::Display for PatternError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatternError::DotDotOverDoubleStar { pattern } => {
				write!(f, "{}: .. overlapping a ** is unsupported", pattern)
			}
			PatternError::InvalidRegex { pattern, message } => {
				write!(f, "{}: invalid pattern: {}", pattern, message)
			}
		}
	}
}

impl Error for PatternError {}

/// Errors reported by a remote server collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestError {
	NotFound,
	Conflict,
	Forbidden,
	Failed { status: u16, message: String },
}

impl fmt::Display for RestError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RestError::NotFound => write!(f, "404 Not Found"),
			RestError::Conflict => write!(f, "409 Conflict"),
			RestError::Forbidden => write!(f, "403 Forbidden"),
			RestError::Failed { status, message } => write!(f, "{} {}", status, message),
		}
	}
}

impl Error for RestError {}

/// Errors from the parallel executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParallelError {
	/// Task panicked; the payload message is kept
	TaskPanicked { message: String },
}

impl fmt::Display for ParallelError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ParallelError::TaskPanicked { message } => write!(f, "Task panicked: {}", message),
		}
	}
}

impl Error for ParallelError {}

/// Errors surfaced by the key/value data store adapter
#[derive(Debug)]
pub enum DataStoreError {
	/// Store path does not exist
	NotFound { path: Vec<String> },

	/// Store path already exists
	AlreadyExists { path: Vec<String> },

	/// Cookbook version sources disagree
	AmbiguousCookbookVersion { cookbook: String, versions: Vec<String> },

	/// Payload is not what the path expects
	InvalidData { path: Vec<String>, message: String },

	/// Underlying tree error that has no store-level meaning
	Fs(FsError),
}

impl fmt::Display for DataStoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DataStoreError::NotFound { path } => write!(f, "Object not found: /{}", path.join("/")),
			DataStoreError::AlreadyExists { path } => {
				write!(f, "Object already exists: /{}", path.join("/"))
			}
			DataStoreError::AmbiguousCookbookVersion { cookbook, versions } => write!(
				f,
				"Cookbook {} has conflicting versions in its metadata: {}",
				cookbook,
				versions.join(", ")
			),
			DataStoreError::InvalidData { path, message } => {
				write!(f, "Invalid data for /{}: {}", path.join("/"), message)
			}
			DataStoreError::Fs(e) => write!(f, "{}", e),
		}
	}
}

impl Error for DataStoreError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			DataStoreError::Fs(e) => Some(e),
			_ => None,
		}
	}
}

impl From<FsError> for DataStoreError {
	fn from(e: FsError) -> Self {
		DataStoreError::Fs(e)
	}
}

/// Cookbook synchronization errors
#[derive(Debug)]
pub enum CookbookSyncError {
	/// A file could not be fetched
	Download { url: String, cache_path: String, message: String },

	/// File cache or checksum cache failure
	Cache { message: String },

	/// Local I/O failure
	Io { path: String, source: io::Error },

	/// A sync task panicked
	TaskPanicked { message: String },
}

impl fmt::Display for CookbookSyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CookbookSyncError::Download { url, cache_path, message } => {
				write!(f, "Failed to download {} to {}: {}", url, cache_path, message)
			}
			CookbookSyncError::Cache { message } => write!(f, "Cache error: {}", message),
			CookbookSyncError::Io { path, source } => write!(f, "{}: I/O error: {}", path, source),
			CookbookSyncError::TaskPanicked { message } => {
				write!(f, "Cookbook sync task panicked: {}", message)
			}
		}
	}
}

impl Error for CookbookSyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			CookbookSyncError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<ParallelError> for CookbookSyncError {
	fn from(e: ParallelError) -> Self {
		match e {
			ParallelError::TaskPanicked { message } => CookbookSyncError::TaskPanicked { message },
		}
	}
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Io { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// Environment override has an invalid value
	InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Io { path, source } => write!(f, "Failed to read {}: {}", path, source),
			ConfigError::Parse { path, message } => {
				write!(f, "Failed to parse {}: {}", path, message)
			}
			ConfigError::InvalidValue { key, value } => {
				write!(f, "Invalid value for {}: {:?}", key, value)
			}
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ConfigError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_from_io_maps_not_found() {
		let err = FsError::from_io("/roles/x.json", io::Error::from(io::ErrorKind::NotFound));
		assert!(err.is_not_found());
		assert_eq!(err.path(), "/roles/x.json");
	}

	#[test]
	fn test_default_environment_reason() {
		let err = FsError::OperationNotAllowed {
			path: "/environments/_default.json".to_string(),
			operation: Operation::Write,
			reason: NotAllowedReason::DefaultEnvironment,
		};
		assert!(err.to_string().contains("default environment cannot be modified"));
	}

	#[test]
	fn test_data_store_path_display() {
		let err = DataStoreError::NotFound { path: vec!["data".into(), "bag".into()] };
		assert_eq!(err.to_string(), "Object not found: /data/bag");
	}
}

// vim: ts=4
