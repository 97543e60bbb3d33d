//! Core types and trait definitions for WatchMyBack checklist sync.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod checklist;
pub mod error;
pub mod outcome;
pub mod store;

pub use error::{Error, Result};
