//! Object-storage abstraction
//!
//! The narrow set of storage capabilities the backup consumes, as a trait so
//! backends are pluggable: the production S3 backend lives in
//! [`crate::s3_store`], and [`MemoryStore`] here backs the tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use faultstash_core::{BackupError, Result};
use tokio::sync::Mutex;

/// Receipt for one uploaded part, echoed back on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTag {
    pub part_number: i32,
    pub etag: String,
}

/// An in-progress multipart upload found by the startup sweep.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub key: String,
    pub upload_id: String,
}

/// Storage capabilities consumed by the backup run.
///
/// `get_object` returns `Ok(None)` when the object does not exist; a
/// missing object is a domain state (empty ledger), not an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    /// Starts a multipart upload and returns its upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<PartTag>;

    /// Commits the upload from its part tags, in ascending part-number
    /// order.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    /// Lists multipart uploads that were started but never completed or
    /// aborted under `prefix`.
    async fn list_pending_uploads(&self, bucket: &str, prefix: &str) -> Result<Vec<PendingUpload>>;
}

#[derive(Debug, Default)]
struct MultipartState {
    bucket: String,
    key: String,
    parts: HashMap<i32, Vec<u8>>,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    /// `bucket/key` → committed body.
    objects: HashMap<String, Vec<u8>>,
    /// `bucket/key` → sizes of the parts the committed body was built from.
    part_sizes: HashMap<String, Vec<usize>>,
    uploads: HashMap<String, MultipartState>,
    aborted: Vec<String>,
    upload_seq: u64,
    /// When set, the Nth subsequent `upload_part` call (1-based) and every
    /// later one fail.
    fail_parts_after: Option<u32>,
    parts_uploaded: u32,
}

/// In-memory store for tests. Clones share state, so a test can keep a
/// handle for assertions while the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn location(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }

    /// Committed body of `bucket/key`, if any.
    pub async fn committed(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.objects.get(&Self::location(bucket, key)).cloned()
    }

    /// Keys of every committed object, sorted.
    pub async fn committed_keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state.objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Sizes of the parts a committed object was assembled from.
    pub async fn committed_part_sizes(&self, bucket: &str, key: &str) -> Vec<usize> {
        let state = self.state.lock().await;
        state
            .part_sizes
            .get(&Self::location(bucket, key))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn aborted_upload_ids(&self) -> Vec<String> {
        self.state.lock().await.aborted.clone()
    }

    pub async fn pending_upload_count(&self) -> usize {
        self.state.lock().await.uploads.len()
    }

    /// Seeds a committed object, e.g. a previous run's ledger.
    pub async fn seed_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        let mut state = self.state.lock().await;
        state.objects.insert(Self::location(bucket, key), body);
    }

    /// Seeds a dangling multipart upload for the startup sweep to find.
    pub async fn seed_pending_upload(&self, bucket: &str, key: &str) -> String {
        let mut state = self.state.lock().await;
        state.upload_seq += 1;
        let upload_id = format!("upload-{}", state.upload_seq);
        state.uploads.insert(
            upload_id.clone(),
            MultipartState {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        upload_id
    }

    /// Makes the Nth subsequent part upload (1-based) and every later one
    /// fail with a storage error.
    pub async fn fail_part_uploads_after(&self, n: u32) {
        let mut state = self.state.lock().await;
        state.fail_parts_after = Some(n);
        state.parts_uploaded = 0;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock().await;
        Ok(state.objects.get(&Self::location(bucket, key)).cloned())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.objects.insert(Self::location(bucket, key), body);
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        state.upload_seq += 1;
        let upload_id = format!("upload-{}", state.upload_seq);
        state.uploads.insert(
            upload_id.clone(),
            MultipartState {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<PartTag> {
        let mut state = self.state.lock().await;
        state.parts_uploaded += 1;
        if let Some(after) = state.fail_parts_after {
            if state.parts_uploaded >= after {
                return Err(BackupError::Storage(format!(
                    "injected part upload failure for {bucket}/{key}"
                )));
            }
        }
        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| {
            BackupError::Storage(format!("unknown upload id {upload_id} for {bucket}/{key}"))
        })?;
        upload.parts.insert(part_number, body);
        Ok(PartTag {
            part_number,
            etag: format!("etag-{upload_id}-{part_number}"),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut upload = state.uploads.remove(upload_id).ok_or_else(|| {
            BackupError::Storage(format!("unknown upload id {upload_id} for {bucket}/{key}"))
        })?;
        let mut body = Vec::new();
        let mut sizes = Vec::new();
        for tag in parts {
            let part = upload.parts.remove(&tag.part_number).ok_or_else(|| {
                BackupError::Storage(format!(
                    "upload {upload_id} has no part {}",
                    tag.part_number
                ))
            })?;
            sizes.push(part.len());
            body.extend_from_slice(&part);
        }
        let location = Self::location(&upload.bucket, &upload.key);
        state.objects.insert(location.clone(), body);
        state.part_sizes.insert(location, sizes);
        Ok(())
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        let _ = (bucket, key);
        let mut state = self.state.lock().await;
        state.uploads.remove(upload_id);
        state.aborted.push(upload_id.to_string());
        Ok(())
    }

    async fn list_pending_uploads(&self, bucket: &str, prefix: &str) -> Result<Vec<PendingUpload>> {
        let state = self.state.lock().await;
        let mut pending: Vec<PendingUpload> = state
            .uploads
            .iter()
            .filter(|(_, upload)| upload.bucket == bucket && upload.key.starts_with(prefix))
            .map(|(upload_id, upload)| PendingUpload {
                key: upload.key.clone(),
                upload_id: upload_id.clone(),
            })
            .collect();
        pending.sort_by(|a, b| a.upload_id.cmp(&b.upload_id));
        Ok(pending)
    }
}
