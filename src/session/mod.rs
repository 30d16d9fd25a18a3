mod post;

use crate::auth::{SignedPolicy, signing_fields};
use crate::storage::{ListQuery, ObjectBackend, PageInfo, PutOptions, Uploader, peek_content_type};
use crate::types::{FileInfo, FileInfoReader, ObjectBody, S3OsInfo, error::StorageError};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Used on save operations when no timeout is given
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations available on an object storage session
#[async_trait::async_trait]
pub trait OsSession: Send + Sync {
    /// Store `data` as `<session key>/<name>` and return its absolute URL.
    /// `None` (or a zero duration) uses [`DEFAULT_SAVE_TIMEOUT`].
    async fn save_data(
        &self,
        name: &str,
        data: ObjectBody,
        meta: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<String, StorageError>;

    async fn read_data(&self, name: &str) -> Result<FileInfoReader, StorageError>;

    async fn list_files(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<PageInfo, StorageError>;

    /// Whether `url` points into this session's storage
    fn is_own(&self, url: &str) -> bool;

    /// Whether the session was received from elsewhere rather than created
    /// by a local driver
    fn is_external(&self) -> bool;

    /// The delegated-access grant backing this session
    fn get_info(&self) -> S3OsInfo;
}

/// How a session reaches the bucket
#[derive(Clone)]
pub(crate) enum SessionMode {
    /// Authenticated API calls through the driver's client
    Direct(Arc<dyn ObjectBackend>),
    /// Signed POST policy uploads only
    Delegated(reqwest::Client),
}

/// A view of one bucket key prefix
#[derive(Clone)]
pub struct S3Session {
    host: String,
    bucket: String,
    key: String,
    policy: String,
    signature: String,
    credential: String,
    x_amz_date: String,
    fields: HashMap<String, String>,
    mode: SessionMode,
    external: bool,
}

impl std::fmt::Debug for S3Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Session")
            .field("host", &self.host)
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("direct", &self.has_full_api())
            .field("external", &self.external)
            .finish_non_exhaustive()
    }
}

impl S3Session {
    pub(crate) fn new(
        host: String,
        bucket: String,
        key: String,
        signed: SignedPolicy,
        mode: SessionMode,
    ) -> Self {
        Self {
            fields: signed.fields(),
            host,
            bucket,
            key,
            policy: signed.policy,
            signature: signed.signature,
            credential: signed.credential,
            x_amz_date: signed.x_amz_date,
            mode,
            external: false,
        }
    }

    /// Rebuild a session from a grant handed over by another process.
    ///
    /// The result can only upload; the host already addresses the bucket.
    pub fn from_info(info: S3OsInfo) -> Self {
        Self::from_info_with_client(info, reqwest::Client::new())
    }

    pub fn from_info_with_client(info: S3OsInfo, client: reqwest::Client) -> Self {
        Self {
            fields: signing_fields(&info.credential, &info.x_amz_date, &info.signature),
            host: info.host,
            bucket: String::new(),
            key: info.key,
            policy: info.policy,
            signature: info.signature,
            credential: info.credential,
            x_amz_date: info.x_amz_date,
            mode: SessionMode::Delegated(client),
            external: true,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether reads, listings and direct uploads are available
    pub fn has_full_api(&self) -> bool {
        matches!(self.mode, SessionMode::Direct(_))
    }

    /// Absolute URL of an object key
    pub fn abs_url(&self, key: &str) -> String {
        abs_url(&self.host, &self.bucket, key)
    }

    /// URL of the bucket itself, the target of POST uploads
    fn bucket_url(&self) -> String {
        if self.host.contains(&self.bucket) {
            self.host.clone()
        } else {
            format!("{}/{}", self.host, self.bucket)
        }
    }

    async fn save_data_put(
        &self,
        backend: &Arc<dyn ObjectBackend>,
        name: &str,
        data: ObjectBody,
        meta: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<String, StorageError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let key = join_key(&self.key, name)?;
        let (data, content_type) = tokio::time::timeout_at(deadline, peek_content_type(name, data))
            .await
            .map_err(|_| StorageError::Timeout(timeout))??;
        let options = PutOptions {
            content_type,
            metadata: meta.clone(),
        };

        // The uploader owns the deadline so it can still abort a multipart
        // upload that runs out of time
        Uploader::default()
            .with_deadline(deadline, timeout)
            .upload(backend, &key, data, &options)
            .await?;

        Ok(self.abs_url(&key))
    }

    async fn save_data_post(
        &self,
        client: &reqwest::Client,
        name: &str,
        data: ObjectBody,
    ) -> Result<String, StorageError> {
        let (data, content_type) = peek_content_type(name, data).await?;
        let full_key = join_key(&self.key, name)?;
        let (dir, file_name) = split_key(&full_key);

        let mut fields = BTreeMap::from([
            ("acl".to_string(), "public-read".to_string()),
            ("Content-Type".to_string(), content_type),
            ("key".to_string(), format!("{}${{filename}}", dir)),
            ("policy".to_string(), self.policy.clone()),
        ]);
        fields.extend(self.fields.clone());

        post::post_form(client, &self.bucket_url(), fields, data, file_name).await?;

        Ok(self.abs_url(&format!("{}{}", dir, file_name)))
    }
}

#[async_trait::async_trait]
impl OsSession for S3Session {
    async fn save_data(
        &self,
        name: &str,
        data: ObjectBody,
        meta: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<String, StorageError> {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_SAVE_TIMEOUT);
        let started = Instant::now();

        let result = match &self.mode {
            SessionMode::Direct(backend) => {
                self.save_data_put(backend, name, data, meta, timeout).await
            }
            SessionMode::Delegated(client) => {
                with_timeout(timeout, self.save_data_post(client, name, data)).await
            }
        };

        match &result {
            Ok(url) => tracing::info!("Saved to S3 url={} dur={:?}", url, started.elapsed()),
            Err(err) => tracing::error!("Save S3 error key={}/{} err={}", self.key, name, err),
        }
        result
    }

    async fn read_data(&self, name: &str) -> Result<FileInfoReader, StorageError> {
        let SessionMode::Direct(backend) = &self.mode else {
            return Err(StorageError::NotImplemented);
        };

        let output = backend.get_object(name).await?;
        Ok(FileInfoReader {
            info: FileInfo {
                name: name.to_string(),
                etag: output.etag,
                last_modified: output.last_modified,
                size: output.size,
            },
            metadata: (!output.metadata.is_empty()).then_some(output.metadata),
            body: output.body,
        })
    }

    async fn list_files(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<PageInfo, StorageError> {
        let SessionMode::Direct(backend) = &self.mode else {
            return Err(StorageError::NotImplemented);
        };

        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        let query = ListQuery {
            prefix: non_empty(prefix),
            delimiter: non_empty(delimiter),
            ..Default::default()
        };
        PageInfo::fetch(Arc::clone(backend), query).await
    }

    fn is_own(&self, url: &str) -> bool {
        url.starts_with(&self.host)
    }

    fn is_external(&self) -> bool {
        self.external
    }

    fn get_info(&self) -> S3OsInfo {
        // Grants carry no bucket, so the exported host must address it
        S3OsInfo {
            host: self.bucket_url(),
            key: self.key.clone(),
            policy: self.policy.clone(),
            signature: self.signature.clone(),
            credential: self.credential.clone(),
            x_amz_date: self.x_amz_date.clone(),
        }
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    operation: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}

/// `host/key` when the host already names the bucket, `host/bucket/key`
/// otherwise
pub fn abs_url(host: &str, bucket: &str, key: &str) -> String {
    if host.contains(bucket) {
        format!("{}/{}", host, key)
    } else {
        format!("{}/{}/{}", host, bucket, key)
    }
}

/// Join key segments with single slashes, dropping empty and `.` segments
/// and resolving `..` against the segments before it. A name that climbs
/// above the start of the key is rejected.
fn join_key(prefix: &str, name: &str) -> Result<String, StorageError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in prefix.split('/').chain(name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::Config(format!(
                        "object name {} escapes the bucket root",
                        name
                    )));
                }
            }
            segment => segments.push(segment),
        }
    }
    Ok(segments.join("/"))
}

/// Split a key into its directory (with trailing slash, possibly empty) and
/// file name
fn split_key(key: &str) -> (String, &str) {
    match key.rsplit_once('/') {
        Some((dir, file)) => (format!("{}/", dir), file),
        None => (String::new(), key),
    }
}
