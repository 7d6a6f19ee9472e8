//! Dynamic script ingestion: validation, storage, loading and inspection.
//!
//! Scripts are Rhai source units. The pipeline is strictly one-way:
//! [`path`] validates the requested filename, [`store`] writes the body
//! under the base directory, [`loader`] compiles and runs the top-level
//! code, and [`exports`] decides what (if anything) gets mounted.
//! [`handler`] adapts script functions and native async closures to one
//! invocation interface used by the dispatch table.

pub mod exports;
pub mod handler;
pub mod loader;
pub mod path;
pub mod sandbox;
pub mod store;
pub mod upload;

/// File suffix every uploaded script must carry.
pub const SCRIPT_SUFFIX: &str = ".rhai";
