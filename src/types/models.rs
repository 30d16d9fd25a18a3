use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::io::AsyncRead;

/// Lazily-read object body
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// Represents a listed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub etag: String,
    pub last_modified: chrono::DateTime<chrono::Utc>,
    pub size: u64,
}

/// An object opened for reading
pub struct FileInfoReader {
    pub info: FileInfo,
    /// Custom metadata, only present when the backend reported any
    pub metadata: Option<HashMap<String, String>>,
    pub body: ObjectBody,
}

impl fmt::Debug for FileInfoReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfoReader")
            .field("info", &self.info)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Delegated write grant for one key prefix.
///
/// Carries everything another process needs to upload under `key` with a
/// signed POST policy, and nothing secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3OsInfo {
    pub host: String,
    pub key: String,
    pub policy: String,
    pub signature: String,
    pub credential: String,
    pub x_amz_date: String,
}

/// Credentials for the full-API client
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_wire_format() {
        let info = S3OsInfo {
            host: "https://videos.s3.amazonaws.com".to_string(),
            key: "streamB".to_string(),
            policy: "eyJ9".to_string(),
            signature: "ab12".to_string(),
            credential: "AKID/20240101/us-east-1/s3/aws4_request".to_string(),
            x_amz_date: "20240101T000000Z".to_string(),
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["xAmzDate"], "20240101T000000Z");
        assert_eq!(json["credential"], "AKID/20240101/us-east-1/s3/aws4_request");

        let back: S3OsInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "topsecret".to_string(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("AKID"));
        assert!(!shown.contains("topsecret"));
    }
}
