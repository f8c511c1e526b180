//! Service Module
//!
//! Background job engine and the workflows it runs.
//! Handlers reach these through the shared application state.

pub mod artifacts;
pub mod commands;
pub mod connection;
pub mod discovery;
pub mod executor;
pub mod fetch;
pub mod import;
pub mod jobs;
pub mod parse;
pub mod registry;
pub mod reporter;
pub mod scrape;
pub mod sink;
pub mod transfer;
pub mod volume;

// Re-export for convenience
pub use commands as command_service;
