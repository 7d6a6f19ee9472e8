//! Script ingestion service.
//!
//! The [`orchestrator::ScriptOrchestrator`] ties the core pipeline stages
//! together behind a single entry point used by the upload handler.

pub mod orchestrator;
