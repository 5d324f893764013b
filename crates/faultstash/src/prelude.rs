//! Faultstash Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use faultstash::prelude::*;
//! ```

// Core types
pub use crate::{BackupError, Result, RetryPolicy, RunConfig};

// Client and pagination
pub use crate::{ApiClient, ApiTransport, HttpTransport, PageResponse, Paginator, RateLimitState};

// Storage and uploads
pub use crate::{MemoryStore, ObjectStore, S3Store, UploadSession};

// Ledger and orchestration
pub use crate::{BackupOrchestrator, RunLedger};

// Resource records
pub use crate::{Fault, Notice, Project};
