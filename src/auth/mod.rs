use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use ring::{digest, hmac};
use thiserror::Error;

const SCHEME: &str = "AWS4-HMAC-SHA256";
const REGION: &str = "us-east-1";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-date";

/// Everything except the V4 unreserved set gets percent-encoded.
const STRICT_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Invalid Header Value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Computes the authentication headers for one outbound request.
///
/// The path handed in here is the unsigned variant, without the action
/// query parameter; the caller restores the query string on the request it
/// actually sends.
pub trait SignRequest {
    fn sign(
        &self,
        method: &str,
        path: &str,
        action: &str,
        access_key: &str,
        secret_key: &str,
        when: DateTime<Utc>,
    ) -> Result<HeaderMap, SignError>;
}

/// AWS Signature Version 4 over an empty payload, scoped to the fixed
/// `s3` service identifier.
pub struct V4Signer {
    host: String,
}

impl V4Signer {
    /// `host` is the value of the canonical `host` header, including the
    /// port when one is used.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl SignRequest for V4Signer {
    fn sign(
        &self,
        method: &str,
        path: &str,
        action: &str,
        access_key: &str,
        secret_key: &str,
        when: DateTime<Utc>,
    ) -> Result<HeaderMap, SignError> {
        let amz_date = when.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = when.format("%Y%m%d").to_string();

        let canonical_uri = encode_path(path);
        let canonical_query = format!("Action={}", encode_component(action));
        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", self.host, amz_date);
        let payload_hash = hex_digest(b"");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{SIGNED_HEADERS}\n{payload_hash}"
        );

        let scope = format!("{date_stamp}/{REGION}/{SERVICE}/aws4_request");
        let string_to_sign = format!(
            "{SCHEME}\n{amz_date}\n{scope}\n{}",
            hex_digest(canonical_request.as_bytes())
        );

        let key = signing_key(secret_key, &date_stamp);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));
        let authorization = format!(
            "{SCHEME} Credential={access_key}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-amz-date"),
            HeaderValue::from_str(&amz_date)?,
        );
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);
        Ok(headers)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

fn hex_digest(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

/// Derives the per-day signing key: AWS4 + secret, chained through date,
/// region, service and the terminal literal.
fn signing_key(secret_key: &str, date_stamp: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, REGION.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, STRICT_ENCODE).to_string()
}
