//! Metadata document retrieval
//!
//! `ipfs://` URIs are rewritten to an HTTP gateway before fetching. Inline
//! `data:application/json` URIs (plain or base64) are decoded without any
//! network round trip.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rarity_common::config::DEFAULT_IPFS_GATEWAY;
use rarity_common::{Error, Result};
use serde_json::Value;

use crate::error::FetchError;

const IPFS_SCHEME: &str = "ipfs://";
const DATA_JSON_PREFIX: &str = "data:application/json";
const USER_AGENT: &str = concat!("rarity-scan/", env!("CARGO_PKG_VERSION"));

/// Rewrites `ipfs://<path>` to `<gateway>/<path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpfsGateway {
    base: String,
}

impl IpfsGateway {
    pub fn new(base: &str) -> Result<Self> {
        let base = base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::Config("IPFS gateway must not be empty".to_string()));
        }
        Ok(Self {
            base: base.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Gateway URL for `uri`; non-IPFS URIs pass through unchanged
    pub fn resolve(&self, uri: &str) -> String {
        match uri.strip_prefix(IPFS_SCHEME) {
            Some(path) => format!("{}/{}", self.base, path.trim_start_matches('/')),
            None => uri.to_string(),
        }
    }
}

impl Default for IpfsGateway {
    fn default() -> Self {
        Self {
            base: DEFAULT_IPFS_GATEWAY.to_string(),
        }
    }
}

/// Retrieves and parses a JSON metadata document
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_json(&self, uri: &str) -> std::result::Result<Value, FetchError>;
}

/// reqwest-backed fetcher with an optional request-rate ceiling
pub struct HttpContentFetcher {
    client: reqwest::Client,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, requests_per_second: Option<u32>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        let rate_limiter = match requests_per_second {
            Some(rate) => {
                let rate = NonZeroU32::new(rate).ok_or_else(|| {
                    Error::Config("requests_per_second must be at least 1".to_string())
                })?;
                Some(RateLimiter::direct(Quota::per_second(rate)))
            }
            None => None,
        };

        Ok(Self {
            client,
            rate_limiter,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch_json(&self, uri: &str) -> std::result::Result<Value, FetchError> {
        if let Some(inline) = decode_data_uri(uri) {
            return inline;
        }

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        tracing::debug!(uri = %uri, "Fetching metadata document");

        let response = self.client.get(uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                uri: uri.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Parse(format!("{} is not JSON: {}", uri, e)))
    }
}

/// Decode an inline `data:application/json[;base64],<payload>` document.
/// Returns `None` for any other URI.
pub fn decode_data_uri(uri: &str) -> Option<std::result::Result<Value, FetchError>> {
    let rest = uri.strip_prefix(DATA_JSON_PREFIX)?;
    let (params, payload) = match rest.split_once(',') {
        Some(parts) => parts,
        None => return Some(Err(FetchError::Parse("data URI has no payload".to_string()))),
    };

    let decoded = if params.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        match base64::engine::general_purpose::STANDARD.decode(payload) {
            Ok(bytes) => bytes,
            Err(e) => return Some(Err(FetchError::Parse(format!("Invalid base64 payload: {}", e)))),
        }
    } else {
        payload.as_bytes().to_vec()
    };

    Some(
        serde_json::from_slice(&decoded)
            .map_err(|e| FetchError::Parse(format!("Inline metadata is not JSON: {}", e))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_rewrites_ipfs_uris() {
        let gateway = IpfsGateway::new("https://ipfs.io/ipfs/").unwrap();
        assert_eq!(
            gateway.resolve("ipfs://QmHash/12.json"),
            "https://ipfs.io/ipfs/QmHash/12.json"
        );
        assert_eq!(
            gateway.resolve("https://example.org/12.json"),
            "https://example.org/12.json"
        );
    }

    #[test]
    fn test_default_gateway() {
        assert_eq!(IpfsGateway::default().base(), "https://ipfs.io/ipfs");
        assert!(IpfsGateway::new("").is_err());
    }

    #[test]
    fn test_decode_plain_data_uri() {
        let value = decode_data_uri(r#"data:application/json,{"name":"A"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(value, json!({"name": "A"}));
    }

    #[test]
    fn test_decode_base64_data_uri() {
        let payload = base64::engine::general_purpose::STANDARD.encode(r#"{"name":"B","attributes":[]}"#);
        let uri = format!("data:application/json;base64,{}", payload);
        let value = decode_data_uri(&uri).unwrap().unwrap();
        assert_eq!(value["name"], "B");
    }

    #[test]
    fn test_decode_data_uri_errors() {
        assert!(decode_data_uri("https://example.org/1").is_none());
        assert!(matches!(
            decode_data_uri("data:application/json;base64,!!!"),
            Some(Err(FetchError::Parse(_)))
        ));
        assert!(matches!(
            decode_data_uri("data:application/json"),
            Some(Err(FetchError::Parse(_)))
        ));
    }

    #[test]
    fn test_fetcher_rejects_zero_rate() {
        assert!(HttpContentFetcher::new(Duration::from_secs(5), Some(0)).is_err());
        assert!(HttpContentFetcher::new(Duration::from_secs(5), Some(2)).is_ok());
    }
}
