//! Ethereum JSON-RPC reader for the pin-storage contract.
//!
//! Issues `eth_call` requests against the contract's view functions
//! (`replicationFactor()`, `pinCount()`, `pins(uint256)`) and decodes the
//! ABI-encoded results.

use crate::contract::ContractReader;
use crate::error::{ReplError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const WORD: usize = 32;

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Hex calldata (`0x`-prefixed) for `signature` with unsigned integer arguments.
pub fn encode_call(signature: &str, args: &[u64]) -> String {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        let mut word = [0u8; WORD];
        word[WORD - 8..].copy_from_slice(&arg.to_be_bytes());
        data.extend_from_slice(&word);
    }
    format!("0x{}", hex::encode(data))
}

fn abi_error(msg: impl Into<String>) -> ReplError {
    ReplError::ContractRead { msg: msg.into() }
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| abi_error(format!("ABI word at {} out of range ({} bytes)", offset, data.len())))
}

fn word_to_u64(word: &[u8]) -> Result<u64> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(abi_error("ABI uint exceeds 64 bits"));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

/// Decode a single ABI `uint` return value.
pub fn decode_uint(data: &[u8]) -> Result<u64> {
    word_to_u64(word_at(data, 0)?)
}

/// Decode a single ABI `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String> {
    let offset = word_to_u64(word_at(data, 0)?)? as usize;
    let len = word_to_u64(word_at(data, offset)?)? as usize;
    let start = offset + WORD;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| abi_error(format!("ABI string of {} bytes truncated", len)))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| abi_error(format!("ABI string not UTF-8: {}", e)))
}

fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(digits).map_err(|e| abi_error(format!("bad hex in call result: {}", e)))
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl RpcResponse {
    fn into_bytes(self) -> Result<Vec<u8>> {
        if let Some(err) = self.error {
            return Err(abi_error(format!("rpc error {}: {}", err.code, err.message)));
        }
        let result = self
            .result
            .ok_or_else(|| abi_error("rpc response has neither result nor error"))?;
        decode_hex(&result)
    }
}

/// Reads the pin directory through an Ethereum node's JSON-RPC endpoint.
pub struct EthRpcContract {
    client: reqwest::Client,
    url: String,
    address: String,
    next_id: AtomicU64,
}

impl EthRpcContract {
    /// Reader for the contract at `address` via the node at `url`.
    pub fn new(url: &str, address: &str, timeout: Duration) -> Result<Self> {
        let digits = address.strip_prefix("0x").unwrap_or(address);
        if digits.len() != 40 || hex::decode(digits).is_err() {
            return Err(ReplError::Config {
                msg: format!("invalid contract address {:?}", address),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReplError::Config {
                msg: format!("http client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
            address: format!("0x{}", digits),
            next_id: AtomicU64::new(1),
        })
    }

    /// Contract address, `0x`-prefixed.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, signature: &str, args: &[u64]) -> Result<Vec<u8>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_call",
            "params": [
                { "to": self.address, "data": encode_call(signature, args) },
                "latest"
            ],
        });
        debug!(id, signature, "eth_call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| abi_error(format!("{}: {}", signature, e)))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| abi_error(format!("{}: malformed response: {}", signature, e)))?;
        body.into_bytes()
    }
}

#[async_trait]
impl ContractReader for EthRpcContract {
    async fn replication_factor(&self) -> Result<u64> {
        decode_uint(&self.call("replicationFactor()", &[]).await?)
    }

    async fn directory_size(&self) -> Result<u64> {
        decode_uint(&self.call("pinCount()", &[]).await?)
    }

    async fn directory_entry(&self, index: u64) -> Result<String> {
        decode_string(&self.call("pins(uint256)", &[index]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint_word(v: u64) -> Vec<u8> {
        let mut w = vec![0u8; WORD];
        w[WORD - 8..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn abi_string(s: &str) -> Vec<u8> {
        let mut out = uint_word(32);
        out.extend(uint_word(s.len() as u64));
        let mut body = s.as_bytes().to_vec();
        body.resize(s.len().div_ceil(WORD) * WORD, 0);
        out.extend(body);
        out
    }

    mod encoding {
        use super::*;

        #[test]
        fn test_known_selectors() {
            assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
            assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        }

        #[test]
        fn test_encode_call_without_args() {
            let data = encode_call("pinCount()", &[]);
            assert_eq!(data.len(), 2 + 8);
            assert!(data.starts_with("0x"));
        }

        #[test]
        fn test_encode_call_with_index() {
            let data = encode_call("pins(uint256)", &[258]);
            assert_eq!(data.len(), 2 + 8 + 64);
            assert!(data.ends_with("0102"));
            assert_eq!(&data[2..10], hex::encode(selector("pins(uint256)")));
        }
    }

    mod decoding {
        use super::*;

        #[test]
        fn test_decode_uint() {
            assert_eq!(decode_uint(&uint_word(10)).unwrap(), 10);
            assert_eq!(decode_uint(&uint_word(u64::MAX)).unwrap(), u64::MAX);
        }

        #[test]
        fn test_decode_uint_too_short() {
            assert!(decode_uint(&[0u8; 31]).is_err());
        }

        #[test]
        fn test_decode_uint_overflow() {
            let mut w = uint_word(1);
            w[0] = 1;
            assert!(decode_uint(&w).is_err());
        }

        #[test]
        fn test_decode_string() {
            let cid = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
            assert_eq!(decode_string(&abi_string(cid)).unwrap(), cid);
            assert_eq!(decode_string(&abi_string("")).unwrap(), "");
        }

        #[test]
        fn test_decode_string_truncated() {
            let mut data = abi_string("hello world");
            data.truncate(WORD * 2 + 4);
            assert!(decode_string(&data).is_err());
        }

        #[test]
        fn test_decode_string_bad_offset() {
            let data = uint_word(4096);
            assert!(decode_string(&data).is_err());
        }

        #[test]
        fn test_decode_string_invalid_utf8() {
            let mut data = uint_word(32);
            data.extend(uint_word(2));
            let mut body = vec![0xff, 0xfe];
            body.resize(WORD, 0);
            data.extend(body);
            assert!(decode_string(&data).is_err());
        }
    }

    mod rpc {
        use super::*;

        #[test]
        fn test_response_result() {
            let body: RpcResponse =
                serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x0a"}"#).unwrap();
            assert_eq!(body.into_bytes().unwrap(), vec![0x0a]);
        }

        #[test]
        fn test_response_error() {
            let body: RpcResponse = serde_json::from_str(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#,
            )
            .unwrap();
            let err = body.into_bytes().unwrap_err();
            assert!(err.to_string().contains("execution reverted"));
        }

        #[test]
        fn test_response_empty() {
            let body: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
            assert!(body.into_bytes().is_err());
        }

        #[test]
        fn test_new_rejects_bad_address() {
            assert!(EthRpcContract::new("http://localhost:8545", "0x1234", Duration::from_secs(1)).is_err());
            let ok = EthRpcContract::new(
                "http://localhost:8545",
                "D3b80c611999D46895109d75322494F7A49D742F",
                Duration::from_secs(1),
            )
            .unwrap();
            assert_eq!(ok.address(), "0xD3b80c611999D46895109d75322494F7A49D742F");
        }

        #[tokio::test]
        async fn test_unreachable_node_is_contract_read_error() {
            let contract = EthRpcContract::new(
                "http://127.0.0.1:1",
                "0xD3b80c611999D46895109d75322494F7A49D742F",
                Duration::from_secs(2),
            )
            .unwrap();
            let err = contract.replication_factor().await.unwrap_err();
            assert!(matches!(err, ReplError::ContractRead { .. }));
        }
    }
}
