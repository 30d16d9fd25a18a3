use crate::auth::create_policy;
use crate::config::DriverConfig;
use crate::session::{S3Session, SessionMode};
use crate::storage::{ObjectBackend, S3Backend};
use crate::types::{Credentials, error::StorageError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// S3-backed object storage driver.
///
/// A driver holding a key with full API access gives its sessions direct,
/// authenticated access. Every session also carries a signed POST policy
/// (valid for 24 hours) so write access to its key prefix can be handed to
/// another process through [`crate::OsSession::get_info`].
pub struct S3Driver {
    host: String,
    region: String,
    bucket: String,
    credentials: Option<Credentials>,
    use_full_api: bool,
    backend: Option<Arc<dyn ObjectBackend>>,
    http: reqwest::Client,
}

/// Virtual-hosted AWS endpoint of a bucket
pub fn s3_host(bucket: &str) -> String {
    format!("https://{}.s3.amazonaws.com", bucket)
}

impl S3Driver {
    /// Create a driver, connecting the AWS SDK client when an access key is
    /// configured
    pub async fn new(config: DriverConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let backend = match config.credentials() {
            Some(credentials) => {
                let backend = S3Backend::new(
                    config.bucket.clone(),
                    config.region.clone(),
                    config.host.clone(),
                    credentials,
                )
                .await?;
                Some(Arc::new(backend) as Arc<dyn ObjectBackend>)
            }
            None => None,
        };

        Ok(Self::build(config, backend))
    }

    /// Create a driver on top of an already constructed backend
    pub fn with_backend(config: DriverConfig, backend: Arc<dyn ObjectBackend>) -> Self {
        Self::build(config, Some(backend))
    }

    fn build(config: DriverConfig, backend: Option<Arc<dyn ObjectBackend>>) -> Self {
        let host = match config.host.as_deref() {
            None => s3_host(&config.bucket),
            Some(custom) => {
                let custom = custom.trim_end_matches('/');
                // Policy-only access posts to the bucket URL itself
                if config.use_full_api {
                    custom.to_string()
                } else {
                    format!("{}/{}", custom, config.bucket)
                }
            }
        };

        tracing::info!(
            "Creating S3 driver host={} bucket={} region={} use_full_api={}",
            host,
            config.bucket,
            config.region,
            config.use_full_api
        );

        Self {
            credentials: config.credentials(),
            host,
            region: config.region,
            bucket: config.bucket,
            use_full_api: config.use_full_api,
            backend,
            http: reqwest::Client::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn use_full_api(&self) -> bool {
        self.use_full_api
    }

    /// Open a session for the key prefix `path`
    pub fn new_session(&self, path: &str) -> S3Session {
        self.new_session_at(path, Utc::now())
    }

    /// Open a session whose upload policy is signed at `now`
    pub fn new_session_at(&self, path: &str, now: DateTime<Utc>) -> S3Session {
        let (access_key_id, secret) = match &self.credentials {
            Some(creds) => (creds.access_key_id.as_str(), creds.secret_access_key.as_str()),
            None => ("", ""),
        };
        let signed = create_policy(access_key_id, &self.bucket, &self.region, secret, path, now);

        let mode = match &self.backend {
            Some(backend) if self.use_full_api => SessionMode::Direct(Arc::clone(backend)),
            _ => SessionMode::Delegated(self.http.clone()),
        };

        S3Session::new(
            self.host.clone(),
            self.bucket.clone(),
            path.to_string(),
            signed,
            mode,
        )
    }
}
