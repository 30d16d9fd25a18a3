use crate::types::{Credentials, error::StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Backend-wide settings a driver is built from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    pub region: String,
    pub bucket: String,
    /// Custom S3-compatible endpoint. Defaults to AWS virtual-hosted style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    /// Whether the configured key may call the full S3 API. Without it,
    /// sessions only upload through signed POST policies.
    #[serde(default)]
    pub use_full_api: bool,
}

impl DriverConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let config: DriverConfig = if is_yaml {
            serde_yml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.bucket.is_empty() {
            return Err(StorageError::Config("bucket must not be empty".to_string()));
        }
        if self.use_full_api && self.access_key_id.as_deref().unwrap_or("").is_empty() {
            return Err(StorageError::Config(
                "use_full_api requires access_key_id".to_string(),
            ));
        }
        Ok(())
    }

    /// Static credentials, when an access key id is configured
    pub fn credentials(&self) -> Option<Credentials> {
        let access_key_id = self.access_key_id.clone().filter(|k| !k.is_empty())?;
        Some(Credentials {
            access_key_id,
            secret_access_key: self.secret_access_key.clone().unwrap_or_default(),
        })
    }
}
