//! Faultstash Core: shared error taxonomy, run configuration and retry policy
//!
//! This crate defines the pieces every other faultstash crate depends on:
//! - `BackupError` / `Result`: the error taxonomy of a backup run
//! - `RunConfig`: validated per-run configuration (bucket, prefix, include
//!   list, watermark override, notice cap)
//! - `RetryPolicy`: the bounded, no-delay retry policy shared by the API
//!   client and the storage backend

pub mod config;
pub mod error;
pub mod retry;

pub use config::{RunConfig, DEFAULT_API_ENDPOINT};
pub use error::{BackupError, Result};
pub use retry::RetryPolicy;
