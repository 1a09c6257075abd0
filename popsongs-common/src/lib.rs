//! # popsongs Common Library
//!
//! Shared code for the popsongs tools:
//! - Configuration loading (TOML file + environment secrets)
//! - Error types

pub mod config;
pub mod error;

pub use error::{Error, Result};
