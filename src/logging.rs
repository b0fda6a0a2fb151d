//! Logging prelude module for convenient access to tracing macros.
//!
//! Re-exports the tracing macros used across the crate so every module
//! logs through the same facade.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Storing updated {} in the cache", path);
//! warn!("Cookbook {} is empty or entirely chefignored", name);
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log level
/// with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug
/// RUST_LOG=cheffs=trace
/// RUST_LOG=cheffs::cookbook=debug,cheffs::parallel=trace
/// ```
pub fn init_tracing() {
	init_tracing_with_default("info");
}

/// Same as [`init_tracing`], with a caller supplied fallback filter
/// (typically `Config::log_level`). Safe to call more than once.
pub fn init_tracing_with_default(default_filter: &str) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
