//! Test Helper Utilities
//!
//! Shared utilities for testing ivrm-explorer

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{create_test_db, insert_target, TestHarness};
pub use fakes::{FakeAnalyzer, FakeExecutor};
