//! Domain logic for the script scaffold service.
//!
//! Everything here is free of HTTP concerns: path validation, script
//! storage, module loading, export inspection, and the process-wide
//! dispatch table that the API crate consults on every request.

pub mod error;
pub mod hashing;
pub mod routing;
pub mod scripting;
