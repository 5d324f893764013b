//! Size-chunked multipart upload sessions
//!
//! One `UploadSession` is one logical output stream: records are serialized
//! into an in-memory buffer and shipped as multipart parts once the buffer
//! crosses the storage minimum. A session ends through exactly one of
//! `finalize` or `abort`; a session that never received a record is aborted
//! rather than committed, so empty objects are never created.

use chrono::{DateTime, Utc};
use faultstash_core::{BackupError, Result};
use serde::Serialize;

use crate::storage::{ObjectStore, PartTag};

/// Multipart uploads require every part except the last to be at least
/// 5 MiB.
pub const MIN_PART_BYTES: usize = 5 * 1024 * 1024;

/// Builds the object key for an output stream: slugs joined with `-`,
/// spaces replaced by underscores, suffixed with the creation timestamp.
/// No leading slash when the prefix is empty.
pub fn object_key(prefix: &str, names: &[&str], created: DateTime<Utc>) -> String {
    let mut slugs: Vec<String> = names.iter().map(|name| name.replace(' ', "_")).collect();
    slugs.push(created.format("%Y%m%d%H%M%S").to_string());
    let file = format!("{}.json", slugs.join("-"));
    if prefix.is_empty() {
        file
    } else {
        format!("{prefix}/{file}")
    }
}

/// One in-progress multipart upload.
pub struct UploadSession {
    bucket: String,
    key: String,
    upload_id: String,
    part_number: i32,
    buffer: Vec<u8>,
    parts: Vec<PartTag>,
    has_records: bool,
    aborted: bool,
}

impl UploadSession {
    /// Starts the multipart upload.
    pub async fn open(
        store: &impl ObjectStore,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let key = key.into();
        let upload_id = store.create_multipart_upload(&bucket, &key).await?;
        tracing::debug!(bucket = %bucket, key = %key, upload_id = %upload_id, "upload session opened");
        Ok(Self {
            bucket,
            key,
            upload_id,
            part_number: 0,
            buffer: Vec::new(),
            parts: Vec::new(),
            has_records: false,
            aborted: false,
        })
    }

    /// `bucket/key` of the object this session writes.
    pub fn location(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }

    /// Serializes the record onto the buffer, shipping a part once the
    /// buffer crosses the part minimum. A failed flush aborts the session
    /// before the error propagates.
    pub async fn append<R: Serialize>(&mut self, store: &impl ObjectStore, record: &R) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|err| BackupError::Serialization(err.to_string()))?;
        self.buffer.extend_from_slice(&bytes);
        self.has_records = true;
        if self.buffer.len() >= MIN_PART_BYTES {
            if let Err(err) = self.flush(store).await {
                self.abort(store).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn flush(&mut self, store: &impl ObjectStore) -> Result<()> {
        self.part_number += 1;
        let body = std::mem::take(&mut self.buffer);
        let size = body.len();
        let tag = store
            .upload_part(&self.bucket, &self.key, &self.upload_id, self.part_number, body)
            .await?;
        tracing::debug!(
            key = %self.key,
            part = self.part_number,
            bytes = size,
            "part uploaded"
        );
        self.parts.push(tag);
        Ok(())
    }

    /// Commits the upload and returns its location. A session without any
    /// appended record is aborted instead, still returning the location. A
    /// failed flush or commit aborts the session before the error
    /// propagates.
    pub async fn finalize(mut self, store: &impl ObjectStore) -> Result<String> {
        if !self.has_records {
            tracing::debug!(key = %self.key, "no records appended, aborting empty upload");
            self.abort(store).await;
            return Ok(self.location());
        }
        // The final part has no minimum size.
        if !self.buffer.is_empty() {
            if let Err(err) = self.flush(store).await {
                self.abort(store).await;
                return Err(err);
            }
        }
        if let Err(err) = store
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &self.parts)
            .await
        {
            self.abort(store).await;
            return Err(err);
        }
        tracing::info!(location = %self.location(), parts = self.parts.len(), "upload committed");
        Ok(self.location())
    }

    /// Best-effort cancel. Abort is part of error recovery, so its own
    /// failures are logged, never propagated; repeated calls are no-ops.
    pub async fn abort(&mut self, store: &impl ObjectStore) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        if let Err(err) = store
            .abort_multipart_upload(&self.bucket, &self.key, &self.upload_id)
            .await
        {
            tracing::error!(
                bucket = %self.bucket,
                key = %self.key,
                error = %err,
                "failed to abort multipart upload"
            );
        }
    }
}
