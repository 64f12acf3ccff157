//! ControlDB Common - Shared types and utilities
//!
//! This crate provides the record types, error taxonomy, checksum helpers
//! and configuration used by the store and the daemon.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::{CHECKSUM_BYTES, content_md5_hex, record_checksum};
pub use config::ControlDbConfig;
pub use error::{DbError, DbResult};
pub use types::*;
