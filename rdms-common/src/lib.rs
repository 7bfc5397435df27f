//! # RDMS Common Library
//!
//! Shared code for the RDM Supervisor service:
//! - Error types
//! - Configuration resolution (CLI / env / TOML / defaults)
//! - Database connection and schema initialization

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
