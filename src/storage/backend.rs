use crate::types::{FileInfo, ObjectBody, error::StorageError};
use bytes::Bytes;
use std::collections::HashMap;

/// Parameters of a single ListObjects call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: Option<i32>,
}

/// Raw result of a single ListObjects call
#[derive(Debug, Clone, Default)]
pub struct ListObjectsOutput {
    pub objects: Vec<FileInfo>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Object attributes sent along with an upload
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

/// Result of a GetObject call
pub struct GetObjectOutput {
    pub body: ObjectBody,
    pub etag: String,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    pub size: u64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Storage backend trait - the per-object API of one bucket
#[async_trait::async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn list_objects(&self, query: &ListQuery) -> Result<ListObjectsOutput, StorageError>;
    async fn get_object(&self, key: &str) -> Result<GetObjectOutput, StorageError>;
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), StorageError>;

    // Multipart upload
    async fn create_multipart_upload(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> Result<String, StorageError>;
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String, StorageError>;
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError>;
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StorageError>;
}
