//! popsongs-etl library interface
//!
//! Extracts artists' top tracks per market from the Spotify Web API, flattens
//! them into `(song, country)` rows and appends them to
//! `<schema>.popular_songs`. Exposed as a library for integration testing.

pub mod catalog;
pub mod error;
pub mod extract;
pub mod load;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod transform;

pub use crate::error::{EtlError, EtlResult};
