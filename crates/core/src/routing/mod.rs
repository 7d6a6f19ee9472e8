//! The live dispatch table and everything that mutates it.
//!
//! [`table::DispatchTable`] is process-wide state read by the HTTP front end
//! on every request. Only [`mount::MountManager`] writes to it, and it does
//! so under a single write guard per mount so a remove and the following
//! insert can never interleave with another upload.

pub mod endpoint;
pub mod mount;
pub mod table;
pub mod verb;
