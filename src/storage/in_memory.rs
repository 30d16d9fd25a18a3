use super::backend::{
    CompletedPart, GetObjectOutput, ListObjectsOutput, ListQuery, ObjectBackend, PutOptions,
};
use crate::types::{FileInfo, error::StorageError};
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

const DEFAULT_MAX_KEYS: i32 = 1000;

/// In-memory storage backend for testing/development.
///
/// Listing follows ListObjects v1 rules: keys come back in lexicographic
/// order and `NextMarker` is only reported when a delimiter was requested.
#[derive(Clone)]
pub struct InMemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    uploads: Arc<RwLock<HashMap<String, PendingUpload>>>,
    list_calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    info: FileInfo,
    options: PutOptions,
}

struct PendingUpload {
    key: String,
    options: PutOptions,
    parts: BTreeMap<i32, (String, Bytes)>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            uploads: Arc::new(RwLock::new(HashMap::new())),
            list_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of ListObjects calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of multipart uploads started but neither completed nor aborted
    pub async fn pending_uploads(&self) -> usize {
        self.uploads.read().await.len()
    }

    /// Content type an object was stored with
    pub async fn content_type(&self, key: &str) -> Option<String> {
        let objects = self.objects.read().await;
        objects.get(key).map(|obj| obj.options.content_type.clone())
    }

    fn calculate_etag(data: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(data);
        format!("\"{}\"", hex::encode(hash))
    }

    async fn store(&self, key: &str, data: Bytes, options: PutOptions) {
        let info = FileInfo {
            name: key.to_string(),
            etag: Self::calculate_etag(&data),
            last_modified: chrono::Utc::now(),
            size: data.len() as u64,
        };
        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                info,
                options,
            },
        );
    }
}

fn no_such_upload(upload_id: &str) -> StorageError {
    StorageError::backend(format!(
        "NoSuchUpload: The specified upload does not exist: {}",
        upload_id
    ))
}

#[async_trait::async_trait]
impl ObjectBackend for InMemoryStorage {
    async fn list_objects(&self, query: &ListQuery) -> Result<ListObjectsOutput, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.read().await;

        let prefix = query.prefix.as_deref().unwrap_or("");
        let delimiter = query.delimiter.as_deref().filter(|d| !d.is_empty());
        let max_keys = query.max_keys.unwrap_or(DEFAULT_MAX_KEYS).max(0) as usize;

        let mut output = ListObjectsOutput::default();
        let mut returned = 0;
        let mut last_returned = None;

        for (key, obj) in objects.iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(marker) = query.marker.as_deref() {
                if key.as_str() <= marker {
                    continue;
                }
                // A common prefix used as marker covers every key below it
                if delimiter.is_some_and(|d| marker.ends_with(d)) && key.starts_with(marker) {
                    continue;
                }
            }

            let common_prefix = delimiter.and_then(|d| {
                key[prefix.len()..]
                    .find(d)
                    .map(|idx| key[..prefix.len() + idx + d.len()].to_string())
            });
            if let Some(cp) = &common_prefix
                && output.common_prefixes.last() == Some(cp)
            {
                continue;
            }

            if returned == max_keys {
                output.is_truncated = true;
                break;
            }
            returned += 1;

            match common_prefix {
                Some(cp) => {
                    last_returned = Some(cp.clone());
                    output.common_prefixes.push(cp);
                }
                None => {
                    last_returned = Some(key.clone());
                    output.objects.push(obj.info.clone());
                }
            }
        }

        if output.is_truncated && delimiter.is_some() {
            output.next_marker = last_returned;
        }

        Ok(output)
    }

    async fn get_object(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        let objects = self.objects.read().await;

        let obj = objects.get(key).ok_or_else(|| {
            StorageError::backend(format!(
                "NoSuchKey: The specified key does not exist: {}",
                key
            ))
        })?;

        Ok(GetObjectOutput {
            body: Box::new(Cursor::new(obj.data.clone())),
            etag: obj.info.etag.clone(),
            last_modified: obj.info.last_modified,
            size: obj.info.size,
            metadata: obj.options.metadata.clone(),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), StorageError> {
        self.store(key, data, options.clone()).await;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        let mut uploads = self.uploads.write().await;
        uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                options: options.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String, StorageError> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;

        let etag = Self::calculate_etag(&data);
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let upload = {
            let mut uploads = self.uploads.write().await;
            uploads
                .remove(upload_id)
                .ok_or_else(|| no_such_upload(upload_id))?
        };
        if upload.key != key {
            return Err(no_such_upload(upload_id));
        }

        let mut data = BytesMut::new();
        for part in &parts {
            match upload.parts.get(&part.part_number) {
                Some((etag, chunk)) if *etag == part.etag => data.extend_from_slice(chunk),
                _ => {
                    return Err(StorageError::backend(format!(
                        "InvalidPart: part {} of upload {} was not uploaded",
                        part.part_number, upload_id
                    )));
                }
            }
        }

        self.store(key, data.freeze(), upload.options).await;
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<(), StorageError> {
        let mut uploads = self.uploads.write().await;
        uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(upload_id))
    }
}
