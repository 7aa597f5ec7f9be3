//! Test Helper Utilities
//!
//! Shared utilities for testing cfa-engine

#![allow(dead_code)]

pub mod db_utils;
pub mod mock_adapter;

pub use db_utils::{add_event, add_source, create_test_db, observation_count};
pub use mock_adapter::{MockAdapter, MockResponse};
