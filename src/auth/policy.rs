use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// How long a delegated upload grant stays valid
pub const POLICY_EXPIRE_IN_HOURS: i64 = 24;

pub const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const REQUEST_TYPE: &str = "aws4_request";

const EXPIRATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const SHORT_DATE_FORMAT: &str = "%Y%m%d";

/// A signed POST policy for one bucket and key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPolicy {
    /// Base64-encoded JSON policy document
    pub policy: String,
    /// Hex-encoded HMAC-SHA256 signature over `policy`
    pub signature: String,
    /// `<key>/<date>/<region>/s3/aws4_request`
    pub credential: String,
    /// `<YYYYMMDD>T000000Z`
    pub x_amz_date: String,
}

impl SignedPolicy {
    /// Form fields that authenticate a POST upload made with this policy
    pub fn fields(&self) -> HashMap<String, String> {
        signing_fields(&self.credential, &self.x_amz_date, &self.signature)
    }
}

pub(crate) fn signing_fields(
    credential: &str,
    x_amz_date: &str,
    signature: &str,
) -> HashMap<String, String> {
    HashMap::from([
        ("x-amz-algorithm".to_string(), SIGNING_ALGORITHM.to_string()),
        ("x-amz-credential".to_string(), credential.to_string()),
        ("x-amz-date".to_string(), x_amz_date.to_string()),
        ("x-amz-signature".to_string(), signature.to_string()),
    ])
}

/// Build and sign a POST policy that lets its holder upload public-read
/// objects under `path` in `bucket` until the policy expires.
///
/// `now` is the signing instant; identical inputs and instant always give an
/// identical result. An empty secret still produces a well-formed (but
/// useless) signature.
pub fn create_policy(
    access_key_id: &str,
    bucket: &str,
    region: &str,
    secret: &str,
    path: &str,
    now: DateTime<Utc>,
) -> SignedPolicy {
    let expiration = (now + Duration::hours(POLICY_EXPIRE_IN_HOURS))
        .format(EXPIRATION_FORMAT)
        .to_string();
    let short_date = now.format(SHORT_DATE_FORMAT).to_string();
    let x_amz_date = format!("{}T000000Z", short_date);
    let credential = format!(
        "{}/{}/{}/{}/{}",
        access_key_id, short_date, region, SERVICE, REQUEST_TYPE
    );

    let document = serde_json::json!({
        "expiration": expiration,
        "conditions": [
            { "bucket": bucket },
            { "acl": "public-read" },
            ["starts-with", "$Content-Type", ""],
            ["starts-with", "$key", path],
            { "x-amz-algorithm": SIGNING_ALGORITHM },
            { "x-amz-credential": credential },
            { "x-amz-date": x_amz_date },
        ]
    });
    let policy = BASE64.encode(document.to_string());
    let signature = sign_string(&policy, region, &short_date, secret);

    tracing::debug!(
        "Signed upload policy for bucket={} path={} expiration={}",
        bucket,
        path,
        expiration
    );

    SignedPolicy {
        policy,
        signature,
        credential,
        x_amz_date,
    }
}

/// Derive the scoped signing key and sign `string_to_sign` with it
fn sign_string(string_to_sign: &str, region: &str, short_date: &str, secret: &str) -> String {
    let k_secret = format!("AWS4{}", secret);
    let k_date = hmac_sha256(k_secret.as_bytes(), short_date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    let k_signing = hmac_sha256(&k_service, REQUEST_TYPE.as_bytes());

    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}

/// HMAC-SHA256 helper
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
