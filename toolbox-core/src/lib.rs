//! Toolbox Core
//!
//! Shared types for the operator toolbox.
//!
//! This crate contains:
//! - Domain types: jobs, progress events, import plans and scrape tasks
//! - DTOs: request and response bodies exchanged between the console server and its clients

pub mod domain;
pub mod dto;
