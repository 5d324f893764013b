//! Faultstash: incremental error-tracker backup into object storage
//!
//! Walks the upstream resource tree (projects → faults → notices), streams
//! every record into size-chunked multipart uploads, and resumes from the
//! previous run's per-project watermark. The design is single-threaded by
//! intent: one outbound call is in flight at any instant and correctness
//! rests on that ordering.
//!
//! # Quick Start
//!
//! ```no_run
//! use faultstash::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = RunConfig::new("my-bucket", "api-key")?
//!     .with_prefix("backups")
//!     .with_include_list("checkout, billing");
//!
//! let transport = HttpTransport::new()?;
//! let store = S3Store::from_env(RetryPolicy::default()).await;
//!
//! let mut orchestrator = BackupOrchestrator::new(config, transport, store);
//! let uploaded = orchestrator.run().await?;
//! for location in uploaded {
//!     println!("{location}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod ledger;
pub mod orchestrator;
pub mod paginator;
pub mod prelude;
pub mod resources;
pub mod s3_store;
pub mod storage;
pub mod transport;
pub mod uploader;

// Re-export core types
pub use faultstash_core::{BackupError, Result, RetryPolicy, RunConfig, DEFAULT_API_ENDPOINT};

// Re-export main types from this crate
pub use client::{ApiClient, RateLimitState};
pub use ledger::RunLedger;
pub use orchestrator::BackupOrchestrator;
pub use paginator::{PageCursor, PageResponse, Paginator};
pub use resources::{
    Fault, FaultPage, Notice, NoticePage, PageRequest, PageRoute, Project, ProjectPage,
};
pub use s3_store::S3Store;
pub use storage::{MemoryStore, ObjectStore, PartTag, PendingUpload};
pub use transport::{ApiResponse, ApiTransport, HttpTransport, RateLimitSnapshot};
pub use uploader::{object_key, UploadSession, MIN_PART_BYTES};
