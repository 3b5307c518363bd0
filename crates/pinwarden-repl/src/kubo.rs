//! Content store backed by a Kubo node's RPC API (`/api/v0`).

use crate::error::{with_deadline, ReplError, Result};
use crate::store::{ContentPath, ContentStore, PinListing};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// Routing event type for "provider found".
const PROVIDER_EVENT: i32 = 4;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PinLsEntry {
    #[serde(rename = "Type")]
    pin_type: String,
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, PinLsEntry>,
}

#[derive(Debug, Deserialize)]
struct PeerRecord {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct RoutingEvent {
    #[serde(rename = "Type")]
    kind: i32,
    #[serde(rename = "Responses", default)]
    responses: Option<Vec<PeerRecord>>,
}

/// Parse a `pin/ls` response body into a CID to pin-type map.
pub fn parse_pin_listing(body: &[u8]) -> Result<PinListing> {
    let parsed: PinLsResponse = serde_json::from_slice(body).map_err(|e| ReplError::List {
        msg: format!("malformed pin/ls response: {}", e),
    })?;
    Ok(parsed
        .keys
        .into_iter()
        .map(|(cid, entry)| (cid, entry.pin_type))
        .collect())
}

/// Count distinct provider peers in a `routing/findprovs` NDJSON stream,
/// stopping at `max`. Lines that do not parse are skipped.
pub fn count_providers(ndjson: &str, max: u64) -> u64 {
    let mut seen = HashSet::new();
    for line in ndjson.lines().filter(|l| !l.trim().is_empty()) {
        let event: RoutingEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "skipping unparsable routing event");
                continue;
            }
        };
        if event.kind != PROVIDER_EVENT {
            continue;
        }
        for peer in event.responses.unwrap_or_default() {
            seen.insert(peer.id);
            if seen.len() as u64 >= max {
                return max;
            }
        }
    }
    seen.len() as u64
}

fn error_message(status: reqwest::StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ApiErrorBody>(body) {
        Ok(err) => format!("{}: {}", status, err.message),
        Err(_) => format!("{}: {}", status, String::from_utf8_lossy(body).trim()),
    }
}

/// [`ContentStore`] speaking to a Kubo daemon over HTTP.
pub struct KuboStore {
    client: reqwest::Client,
    base: String,
    max_providers: u64,
}

impl KuboStore {
    /// Store for the RPC API at `api_url` (e.g. `http://127.0.0.1:5001`).
    pub fn new(api_url: &str, max_providers: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ReplError::Config {
                msg: format!("http client: {}", e),
            })?;
        Ok(Self {
            client,
            base: format!("{}/api/v0", api_url.trim_end_matches('/')),
            max_providers: max_providers.max(1),
        })
    }

    /// Full URL of an RPC command.
    pub fn endpoint(&self, command: &str) -> String {
        format!("{}/{}", self.base, command)
    }

    async fn post(&self, command: &str, query: &[(&str, String)]) -> std::result::Result<Bytes, String> {
        let response = self
            .client
            .post(self.endpoint(command))
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(error_message(status, &body));
        }
        Ok(body)
    }

    /// Query the routing system for up to `limit` providers of `cid`,
    /// never asking for more than the configured `max_providers`.
    async fn find_providers(&self, cid: &Cid, limit: u64) -> Result<u64> {
        let limit = limit.clamp(1, self.max_providers);
        let args = [
            ("arg", cid.to_string()),
            ("num-providers", limit.to_string()),
        ];
        let body = self
            .post("routing/findprovs", &args)
            .await
            .map_err(|msg| ReplError::Query {
                cid: cid.to_string(),
                msg,
            })?;
        Ok(count_providers(&String::from_utf8_lossy(&body), limit))
    }

    async fn pin_op(&self, op: &'static str, command: &str, cid: &Cid) -> Result<()> {
        let args = [("arg", cid.to_string()), ("recursive", "true".to_string())];
        self.post(command, &args)
            .await
            .map(|_| ())
            .map_err(|msg| ReplError::PinOp {
                op,
                cid: cid.to_string(),
                msg,
            })
    }
}

#[async_trait]
impl ContentStore for KuboStore {
    async fn fetch(&self, path: &ContentPath, timeout: Duration) -> Result<Bytes> {
        with_deadline("fetch", timeout, async {
            self.post("cat", &[("arg", path.to_string())])
                .await
                .map_err(|msg| ReplError::Fetch {
                    path: path.to_string(),
                    msg,
                })
        })
        .await
    }

    async fn list_local_pins(&self, timeout: Duration) -> Result<PinListing> {
        with_deadline("pin ls", timeout, async {
            let body = self
                .post("pin/ls", &[("type", "all".to_string())])
                .await
                .map_err(|msg| ReplError::List { msg })?;
            parse_pin_listing(&body)
        })
        .await
    }

    async fn provider_count(&self, cid: &Cid) -> Result<u64> {
        self.find_providers(cid, self.max_providers).await
    }

    async fn provider_count_up_to(&self, cid: &Cid, limit: u64) -> Result<u64> {
        self.find_providers(cid, limit).await
    }

    async fn pin_add(&self, cid: &Cid) -> Result<()> {
        self.pin_op("pin add", "pin/add", cid).await
    }

    async fn pin_remove(&self, cid: &Cid) -> Result<()> {
        self.pin_op("pin remove", "pin/rm", cid).await
    }
}
