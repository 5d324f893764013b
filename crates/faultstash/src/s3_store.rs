//! S3 object-storage backend
//!
//! Production [`ObjectStore`] over `aws-sdk-s3`. Credentials resolve through
//! the SDK's default chain (environment → shared credentials file → instance
//! role); the SDK's own retry configuration is derived from the run's
//! [`RetryPolicy`] so both transports share one bounded-attempts constant.

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use faultstash_core::{BackupError, Result, RetryPolicy};

use crate::storage::{ObjectStore, PartTag, PendingUpload};

pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Builds a store from the ambient AWS configuration.
    pub async fn from_env(retry: RetryPolicy) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::standard().with_max_attempts(retry.max_attempts))
            .load()
            .await;
        Self {
            client: Client::new(&config),
        }
    }

    /// Wraps an already-configured client (custom endpoint, tests against
    /// S3-compatible storage).
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let data = output.body.collect().await.map_err(|err| {
                    BackupError::Storage(format!("failed to read body of {bucket}/{key}: {err}"))
                })?;
                Ok(Some(data.into_bytes().to_vec()))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .map(GetObjectError::is_no_such_key)
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                Err(BackupError::Storage(format!(
                    "get object {bucket}/{key} failed: {err}"
                )))
            }
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                BackupError::Storage(format!("put object {bucket}/{key} failed: {err}"))
            })?;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type("application/json")
            .send()
            .await
            .map_err(|err| {
                BackupError::Storage(format!(
                    "create multipart upload {bucket}/{key} failed: {err}"
                ))
            })?;
        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| {
                BackupError::Storage(format!(
                    "create multipart upload {bucket}/{key} returned no upload id"
                ))
            })
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<PartTag> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                BackupError::Storage(format!(
                    "upload part {part_number} of {bucket}/{key} failed: {err}"
                ))
            })?;
        Ok(PartTag {
            part_number,
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|tag| {
                CompletedPart::builder()
                    .part_number(tag.part_number)
                    .e_tag(tag.etag.as_str())
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| {
                BackupError::Storage(format!(
                    "complete multipart upload {bucket}/{key} failed: {err}"
                ))
            })?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| {
                BackupError::Storage(format!(
                    "abort multipart upload {bucket}/{key} failed: {err}"
                ))
            })?;
        Ok(())
    }

    async fn list_pending_uploads(&self, bucket: &str, prefix: &str) -> Result<Vec<PendingUpload>> {
        let mut pending = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_multipart_uploads()
                .bucket(bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(|err| {
                    BackupError::Storage(format!(
                        "list multipart uploads in {bucket}/{prefix} failed: {err}"
                    ))
                })?;
            for upload in output.uploads() {
                if let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) {
                    pending.push(PendingUpload {
                        key: key.to_string(),
                        upload_id: upload_id.to_string(),
                    });
                }
            }
            if output.is_truncated().unwrap_or(false) {
                key_marker = output.next_key_marker().map(str::to_string);
                upload_id_marker = output.next_upload_id_marker().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(pending)
    }
}
