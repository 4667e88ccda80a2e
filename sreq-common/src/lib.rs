//! # sreq Common Library
//!
//! Shared code for the sreq song-request services including:
//! - Database schema initialization and models
//! - Bootstrap configuration loading
//! - Caller authentication primitives
//! - Common error types

pub mod api;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
