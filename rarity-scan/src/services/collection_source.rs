//! Collection metadata sources
//!
//! A source answers two questions for a collection: how many items it has and
//! where each item's metadata document lives. Two adapters are provided:
//! - [`JsonRpcSource`] reads `totalSupply()` / `tokenURI(uint256)` from an
//!   ERC-721 contract over Ethereum JSON-RPC (`eth_call`)
//! - [`BaseUriSource`] serves `<base>/<id>` for a known supply

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rarity_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;

use crate::error::FetchError;

/// `totalSupply()` selector
const TOTAL_SUPPLY_SELECTOR: &str = "18160ddd";

/// `tokenURI(uint256)` selector
const TOKEN_URI_SELECTOR: &str = "c87b56dd";

/// ABI word size in bytes
const WORD: usize = 32;

/// Read access to a collection. Values are assumed stable for one run.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Number of items; ids run `1..=total_supply`
    async fn total_supply(&self) -> std::result::Result<u64, FetchError>;

    /// Metadata document URI for one item
    async fn token_uri(&self, id: u64) -> std::result::Result<String, FetchError>;
}

/// Builds a source for a collection key
pub trait SourceProvider: Send + Sync {
    fn source_for(&self, collection: &str) -> Result<Arc<dyn CollectionSource>>;
}

/// Check for a `0x`-prefixed 20-byte hex address
pub fn validate_contract_address(address: &str) -> Result<()> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| Error::Config(format!("Contract address must start with 0x: {}", address)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Config(format!(
            "Contract address must be 40 hex characters: {}",
            address
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// ERC-721 contract read over JSON-RPC
pub struct JsonRpcSource {
    client: reqwest::Client,
    rpc_url: String,
    contract: String,
}

impl JsonRpcSource {
    /// Fails with a configuration error on a malformed contract address
    pub fn new(client: reqwest::Client, rpc_url: impl Into<String>, contract: &str) -> Result<Self> {
        let contract = contract.trim();
        validate_contract_address(contract)?;

        let rpc_url = rpc_url.into();
        if rpc_url.trim().is_empty() {
            return Err(Error::Config("RPC URL not configured".to_string()));
        }

        Ok(Self {
            client,
            rpc_url,
            contract: contract.to_lowercase(),
        })
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    async fn eth_call(&self, data: String) -> std::result::Result<Vec<u8>, FetchError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": self.contract, "data": data }, "latest"],
        });

        tracing::debug!(contract = %self.contract, data = %body["params"][0]["data"], "eth_call");

        let response = self.client.post(&self.rpc_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                uri: self.rpc_url.clone(),
            });
        }

        let rpc: RpcResponse = response.json().await?;
        if let Some(err) = rpc.error {
            return Err(FetchError::Rpc(format!("{} (code {})", err.message, err.code)));
        }

        let result = rpc
            .result
            .ok_or_else(|| FetchError::Rpc("Response carries neither result nor error".to_string()))?;
        let hex_part = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(hex_part).map_err(|e| FetchError::Parse(format!("Invalid hex result: {}", e)))
    }
}

#[async_trait]
impl CollectionSource for JsonRpcSource {
    async fn total_supply(&self) -> std::result::Result<u64, FetchError> {
        let bytes = self.eth_call(format!("0x{}", TOTAL_SUPPLY_SELECTOR)).await?;
        decode_uint(&bytes)
    }

    async fn token_uri(&self, id: u64) -> std::result::Result<String, FetchError> {
        let data = format!("0x{}{:064x}", TOKEN_URI_SELECTOR, id);
        let bytes = self.eth_call(data).await?;
        decode_string(&bytes)
    }
}

/// Decode a single ABI `uint256` that must fit in a `u64`
pub fn decode_uint(bytes: &[u8]) -> std::result::Result<u64, FetchError> {
    let word = bytes
        .get(..WORD)
        .ok_or_else(|| FetchError::Parse(format!("Expected 32-byte word, got {} bytes", bytes.len())))?;

    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(FetchError::Parse("uint256 value exceeds u64".to_string()));
    }

    let mut low = [0u8; 8];
    low.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(low))
}

/// Decode an ABI-encoded dynamic `string` return value
pub fn decode_string(bytes: &[u8]) -> std::result::Result<String, FetchError> {
    let offset = usize::try_from(decode_uint(bytes)?)
        .map_err(|_| FetchError::Parse("String offset out of range".to_string()))?;
    let length_word = bytes
        .get(offset..)
        .ok_or_else(|| FetchError::Parse("String offset past end of data".to_string()))?;
    let length = usize::try_from(decode_uint(length_word)?)
        .map_err(|_| FetchError::Parse("String length out of range".to_string()))?;

    let start = offset + WORD;
    let content = start
        .checked_add(length)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| FetchError::Parse("String length past end of data".to_string()))?;

    String::from_utf8(content.to_vec())
        .map_err(|e| FetchError::Parse(format!("String is not UTF-8: {}", e)))
}

/// Items at `<base>/<id>` for ids `1..=supply`
pub struct BaseUriSource {
    base: String,
    supply: u64,
}

impl BaseUriSource {
    pub fn new(base: &str, supply: u64) -> Result<Self> {
        let base = base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::Config("Base URI must not be empty".to_string()));
        }
        Ok(Self {
            base: base.to_string(),
            supply,
        })
    }
}

#[async_trait]
impl CollectionSource for BaseUriSource {
    async fn total_supply(&self) -> std::result::Result<u64, FetchError> {
        Ok(self.supply)
    }

    async fn token_uri(&self, id: u64) -> std::result::Result<String, FetchError> {
        Ok(format!("{}/{}", self.base, id))
    }
}

/// Provider building a [`JsonRpcSource`] per contract address
pub struct RpcSourceProvider {
    client: reqwest::Client,
    rpc_url: Option<String>,
}

impl RpcSourceProvider {
    pub fn new(rpc_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { client, rpc_url })
    }
}

impl SourceProvider for RpcSourceProvider {
    fn source_for(&self, collection: &str) -> Result<Arc<dyn CollectionSource>> {
        let rpc_url = self.rpc_url.as_deref().ok_or_else(|| {
            Error::Config(
                "RPC URL not configured. Set scan.rpc_url in rarity.toml, \
                 RARITY_RPC_URL, or pass --rpc-url"
                    .to_string(),
            )
        })?;
        Ok(Arc::new(JsonRpcSource::new(self.client.clone(), rpc_url, collection)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u64) -> Vec<u8> {
        let mut word = vec![0u8; WORD];
        word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
        word
    }

    fn abi_string(s: &str) -> Vec<u8> {
        let mut bytes = word(32);
        bytes.extend(word(s.len() as u64));
        let mut content = s.as_bytes().to_vec();
        let padded = s.len().div_ceil(WORD) * WORD;
        content.resize(padded, 0);
        bytes.extend(content);
        bytes
    }

    #[test]
    fn test_validate_contract_address() {
        assert!(validate_contract_address("0x8a90CAb2b38dba80c64b7734e58Ee1dB38B8992e").is_ok());
        assert!(matches!(
            validate_contract_address("8a90cab2b38dba80c64b7734e58ee1db38b8992e"),
            Err(Error::Config(_))
        ));
        assert!(validate_contract_address("0x1234").is_err());
        assert!(validate_contract_address("0xzz90cab2b38dba80c64b7734e58ee1db38b8992e").is_err());
        assert!(validate_contract_address("").is_err());
    }

    #[test]
    fn test_decode_uint() {
        assert_eq!(decode_uint(&word(10_000)).unwrap(), 10_000);
        assert!(decode_uint(&[0u8; 4]).is_err());

        let mut huge = word(1);
        huge[0] = 1;
        assert!(decode_uint(&huge).is_err());
    }

    #[test]
    fn test_decode_string() {
        let uri = "ipfs://QmYDvPAXtiJg7s8JdRBSLWdgSphQdac8j1YuQNNxcGE1hg/1";
        assert_eq!(decode_string(&abi_string(uri)).unwrap(), uri);
        assert_eq!(decode_string(&abi_string("")).unwrap(), "");
    }

    #[test]
    fn test_decode_string_rejects_truncated_data() {
        let mut bytes = abi_string("https://example.org/meta/1");
        bytes.truncate(WORD * 2 + 4);
        assert!(matches!(decode_string(&bytes), Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_base_uri_source() {
        let source = BaseUriSource::new("https://meta.example.org/tokens/", 3).unwrap();
        assert_eq!(source.total_supply().await.unwrap(), 3);
        assert_eq!(
            source.token_uri(2).await.unwrap(),
            "https://meta.example.org/tokens/2"
        );
        assert!(BaseUriSource::new("  ", 3).is_err());
    }

    #[test]
    fn test_rpc_provider_requires_url() {
        let provider = RpcSourceProvider::new(None, Duration::from_secs(5)).unwrap();
        let result = provider.source_for("0x8a90cab2b38dba80c64b7734e58ee1db38b8992e");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
