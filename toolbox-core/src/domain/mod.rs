//! Core domain types
//!
//! These types are shared between the console server (which runs jobs and
//! streams their progress) and the clients that trigger and observe them.

pub mod event;
pub mod import;
pub mod job;
pub mod scrape;
