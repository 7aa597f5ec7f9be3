//! # CFA Common Library
//!
//! Shared code for the Consensus Forecast Aggregator crates:
//! - Database initialization and row models
//! - Configuration loading and root folder resolution
//! - Common error type
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
