//! # IVRM Common Library
//!
//! Shared code for the IVR mapper services:
//! - Error and result types
//! - Bootstrap configuration and root folder resolution
//! - Database initialization and schema
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
