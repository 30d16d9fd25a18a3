use super::backend::{
    CompletedPart, GetObjectOutput, ListObjectsOutput, ListQuery, ObjectBackend, PutOptions,
};
use crate::types::{Credentials, FileInfo, error::StorageError};
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use bytes::Bytes;
use std::collections::HashMap;

/// Full-API backend talking to S3 (or an S3-compatible service) via the AWS SDK
pub struct S3Backend {
    client: S3Client,
    bucket: String,
}

/// Convert an SDK timestamp. A missing or out-of-range value maps to the
/// Unix epoch rather than a made-up current time.
fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> chrono::DateTime<chrono::Utc> {
    match dt.and_then(|dt| chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())) {
        Some(converted) => converted,
        None => {
            tracing::warn!("Object has no usable LastModified, reporting the Unix epoch");
            chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
        }
    }
}

fn metadata_or_none(metadata: &HashMap<String, String>) -> Option<HashMap<String, String>> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata.clone())
    }
}

impl S3Backend {
    /// Build a client for `bucket` with static credentials.
    ///
    /// A custom `endpoint` switches to path-style addressing, which is what
    /// most S3-compatible services expect.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint: Option<String>,
        credentials: Credentials,
    ) -> Result<Self, StorageError> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                credentials.access_key_id,
                credentials.secret_access_key,
                None,
                None,
                "static",
            ))
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&config);

        if let Some(endpoint_url) = endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint_url)
                .force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        Ok(Self { client, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait::async_trait]
impl ObjectBackend for S3Backend {
    async fn list_objects(&self, query: &ListQuery) -> Result<ListObjectsOutput, StorageError> {
        tracing::debug!(
            "[{}] Listing objects prefix={:?} delimiter={:?} marker={:?}",
            self.bucket,
            query.prefix,
            query.delimiter,
            query.marker
        );

        let output = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .set_prefix(query.prefix.clone())
            .set_delimiter(query.delimiter.clone())
            .set_marker(query.marker.clone())
            .set_max_keys(query.max_keys)
            .send()
            .await
            .map_err(|err| {
                tracing::error!("[{}] Failed to list objects: {}", self.bucket, err);
                StorageError::backend(err)
            })?;

        let objects: Vec<FileInfo> = output
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(FileInfo {
                    name: obj.key()?.to_string(),
                    etag: obj.e_tag().map(|s| s.to_string()).unwrap_or_default(),
                    last_modified: to_chrono(obj.last_modified()),
                    size: obj.size().unwrap_or(0) as u64,
                })
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix().map(|p| p.to_string()))
            .collect();

        tracing::debug!("[{}] Found {} objects", self.bucket, objects.len());

        Ok(ListObjectsOutput {
            objects,
            common_prefixes,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_marker: output.next_marker().map(|s| s.to_string()),
        })
    }

    async fn get_object(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        tracing::debug!("[{}] Getting object: {}", self.bucket, key);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!("[{}] Failed to get object {}: {}", self.bucket, key, err);
                StorageError::backend(err)
            })?;

        Ok(GetObjectOutput {
            etag: output.e_tag().map(|s| s.to_string()).unwrap_or_default(),
            last_modified: to_chrono(output.last_modified()),
            size: output.content_length().unwrap_or(0) as u64,
            metadata: output.metadata().cloned().unwrap_or_default(),
            body: Box::new(Box::pin(output.body.into_async_read())),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), StorageError> {
        tracing::debug!(
            "[{}] Putting object: {} ({} bytes)",
            self.bucket,
            key,
            data.len()
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&options.content_type)
            .set_metadata(metadata_or_none(&options.metadata))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| {
                tracing::error!("[{}] Failed to put object {}: {}", self.bucket, key, err);
                StorageError::backend(err)
            })?;

        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&options.content_type)
            .set_metadata(metadata_or_none(&options.metadata))
            .send()
            .await
            .map_err(StorageError::backend)?;

        let upload_id = output.upload_id().ok_or_else(|| {
            StorageError::backend(format!("no upload id returned for {}", key))
        })?;
        tracing::debug!(
            "[{}] Started multipart upload {} for {}",
            self.bucket,
            upload_id,
            key
        );
        Ok(upload_id.to_string())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String, StorageError> {
        tracing::debug!(
            "[{}] Uploading part {} of {} ({} bytes)",
            self.bucket,
            part_number,
            key,
            data.len()
        );

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(StorageError::backend)?;

        Ok(output.e_tag().map(|s| s.to_string()).unwrap_or_default())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let parts = parts
            .into_iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(StorageError::backend)?;

        tracing::debug!("[{}] Completed multipart upload for {}", self.bucket, key);
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(StorageError::backend)?;
        Ok(())
    }
}
