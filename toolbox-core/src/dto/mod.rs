//! Data Transfer Objects for the console API
//!
//! Request and response bodies shared by the console server and its clients.

pub mod connection;
pub mod import;
pub mod job;
pub mod scrape;
