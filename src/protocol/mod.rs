//! Protocol adapters
//!
//! Each supported chain family exposes its head in a different shape. The
//! adapters normalize those shapes into a [`ChainMeasurement`]:
//!
//! - **EVM**: JSON-RPC `eth_blockNumber`, `eth_getBlockByNumber`, `eth_syncing`
//! - **Cosmos**: Tendermint/CometBFT REST `/status` and `/block`
//! - **Beacon**: Ethereum beacon API `/eth/v1/node/syncing` and block headers
//! - **Sui**: JSON-RPC checkpoint sequence numbers and digests
//!
//! The protocol is picked once at startup; all dispatch goes through the
//! [`Protocol`] enum.

mod beacon;
mod cosmos;
mod evm;
mod sui;
mod types;

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{Endpoint, Transport};

pub use types::{ChainMeasurement, Side, SyncFlag};

/// Supported chain families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Ethereum-style execution clients (geth, reth, nethermind, erigon, ...)
    Evm,
    /// Tendermint/CometBFT based chains
    Cosmos,
    /// Ethereum consensus clients
    Beacon,
    /// Sui full nodes
    Sui,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Evm => write!(f, "evm"),
            Protocol::Cosmos => write!(f, "cosmos"),
            Protocol::Beacon => write!(f, "beacon"),
            Protocol::Sui => write!(f, "sui"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "evm" | "eth" | "ethereum" | "execution" => Ok(Protocol::Evm),
            "cosmos" | "tendermint" | "cometbft" => Ok(Protocol::Cosmos),
            "beacon" | "consensus" | "eth2" => Ok(Protocol::Beacon),
            "sui" => Ok(Protocol::Sui),
            other => Err(Error::ConfigError(format!(
                "Unknown protocol {:?} (expected evm, cosmos, beacon or sui)",
                other
            ))),
        }
    }
}

impl Protocol {
    /// Port the node's API listens on by default
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Evm => 8545,
            Protocol::Cosmos => 26657,
            Protocol::Beacon => 5052,
            Protocol::Sui => 9000,
        }
    }

    /// Env keys holding the local API port, most specific first
    pub fn port_keys(&self) -> &'static [&'static str] {
        match self {
            Protocol::Evm => &["EL_RPC_PORT", "RPC_PORT"],
            Protocol::Cosmos => &["COMET_RPC_PORT", "TENDERMINT_RPC_PORT", "RPC_PORT"],
            Protocol::Beacon => &["CL_REST_PORT", "BEACON_API_PORT", "RPC_PORT"],
            Protocol::Sui => &["SUI_RPC_PORT", "RPC_PORT"],
        }
    }

    /// Assumed growth of the public chain in positions per second
    pub fn default_growth_rate(&self) -> f64 {
        match self {
            // ~12s blocks
            Protocol::Evm => 0.08,
            // ~6s blocks
            Protocol::Cosmos => 0.16,
            // 12s slots
            Protocol::Beacon => 0.083,
            // ~4 checkpoints/s
            Protocol::Sui => 4.0,
        }
    }

    pub fn position_label(&self) -> &'static str {
        match self {
            Protocol::Evm => "block",
            Protocol::Cosmos => "height",
            Protocol::Beacon => "slot",
            Protocol::Sui => "checkpoint",
        }
    }

    pub fn reference_label(&self) -> &'static str {
        match self {
            Protocol::Evm | Protocol::Cosmos => "block hash",
            Protocol::Beacon => "block root",
            Protocol::Sui => "checkpoint digest",
        }
    }

    /// Sui has no syncing flag; the checker derives one from the lag
    pub fn has_native_sync_flag(&self) -> bool {
        !matches!(self, Protocol::Sui)
    }

    /// Head position, `None` when the node returned no value
    pub async fn position(&self, client: &NodeClient<'_>) -> Result<Option<u64>> {
        match self {
            Protocol::Evm => evm::position(client).await,
            Protocol::Cosmos => cosmos::position(client).await,
            Protocol::Beacon => beacon::position(client).await,
            Protocol::Sui => sui::position(client).await,
        }
    }

    /// Hash, root or digest at `position`, `None` when unavailable
    pub async fn reference(&self, client: &NodeClient<'_>, position: u64) -> Result<Option<String>> {
        match self {
            Protocol::Evm => evm::reference(client, position).await,
            Protocol::Cosmos => cosmos::reference(client, position).await,
            Protocol::Beacon => beacon::reference(client, position).await,
            Protocol::Sui => sui::reference(client, position).await,
        }
    }

    /// The node's own syncing flag
    pub async fn syncing(&self, client: &NodeClient<'_>) -> Result<SyncFlag> {
        match self {
            Protocol::Evm => evm::syncing(client).await,
            Protocol::Cosmos => cosmos::syncing(client).await,
            Protocol::Beacon => beacon::syncing(client).await,
            Protocol::Sui => Ok(SyncFlag::Unknown),
        }
    }

    /// Position, reference at that position and syncing flag in one pass
    pub async fn measure(&self, client: &NodeClient<'_>) -> Result<ChainMeasurement> {
        match self {
            Protocol::Cosmos => cosmos::measure(client).await,
            Protocol::Beacon => beacon::measure(client).await,
            Protocol::Evm | Protocol::Sui => {
                let position = client.required(
                    self.position(client).await?,
                    format!("head {}", self.position_label()),
                )?;
                // Only the local flag feeds the verdict, and public providers
                // often restrict `eth_syncing`
                let syncing = match client.side() {
                    Side::Local => self.syncing(client).await?,
                    Side::Public => SyncFlag::Unknown,
                };
                let reference = self.reference(client, position).await?;

                Ok(ChainMeasurement {
                    side: client.side(),
                    protocol: *self,
                    position,
                    reference,
                    syncing,
                    optimistic: None,
                })
            }
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    /// CometBFT puts the detail here and keeps `message` generic
    data: Option<Value>,
}

impl JsonRpcError {
    fn detail(&self) -> String {
        match self.data.as_ref() {
            Some(Value::String(data)) => format!("{} ({})", self.message, data),
            _ => self.message.clone(),
        }
    }
}

/// Integer field that may arrive as a number, a decimal string or a hex string
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub(crate) enum Quantity {
    Int(u64),
    Text(String),
}

/// Decode `0x`-prefixed hex or plain decimal into an integer
pub fn parse_quantity(raw: &str) -> std::result::Result<u64, String> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| format!("{:?} is not a valid quantity ({})", raw, e))
}

/// Error text a node returns for a position it has not produced yet
const NOT_REACHED_MARKERS: &[&str] = &[
    // Tendermint/CometBFT `/block?height=N` above the node's head
    "must be less than or equal to the current blockchain height",
    // Sui `sui_getCheckpoint` for a checkpoint the node has not synced
    "could not find the referenced checkpoint",
];

fn not_reached(message: &str) -> bool {
    let message = message.to_lowercase();
    NOT_REACHED_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Treat empty strings like missing values
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One side's view of a node: transport, endpoint and the side tag used to
/// scope every error raised while talking to it
pub struct NodeClient<'a> {
    transport: &'a dyn Transport,
    endpoint: &'a Endpoint,
    side: Side,
}

impl<'a> NodeClient<'a> {
    pub fn new(transport: &'a dyn Transport, endpoint: &'a Endpoint, side: Side) -> Self {
        Self {
            transport,
            endpoint,
            side,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Call a JSON-RPC method; an error object is a parse failure
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<Option<T>> {
        let response = self.rpc_response::<T>(method, params).await?;

        if let Some(error) = response.error {
            return Err(Error::parse(
                self.side,
                format!("{} returned error {}: {}", method, error.code, error.detail()),
            ));
        }

        Ok(response.result)
    }

    /// Call a JSON-RPC method for an object that may not exist at this node.
    /// Only a null result or a "not produced yet" error means absent; any
    /// other failure ends the run.
    pub(crate) async fn lookup<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<Option<T>> {
        let text = match self.transport.rpc(self.endpoint, method, params).await {
            Ok(text) => text,
            Err(e) => {
                if e.status().is_some_and(|(_, body)| not_reached(body)) {
                    debug!("{} {} not reached yet: {}", self.side, method, e);
                    return Ok(None);
                }
                return Err(e.scoped(self.side));
            }
        };

        let response = self.decode::<JsonRpcResponse<T>>(method, &text)?;
        match response.error {
            Some(error) => self.lookup_error(method, error),
            None => Ok(response.result),
        }
    }

    /// Error object from a lookup: absent when the node has not produced the
    /// object yet, a parse failure otherwise
    fn lookup_error<T>(&self, what: &str, error: JsonRpcError) -> Result<Option<T>> {
        let detail = error.detail();
        if not_reached(&detail) {
            debug!("{} {} not reached yet: {} {}", self.side, what, error.code, detail);
            return Ok(None);
        }

        Err(Error::parse(
            self.side,
            format!("{} returned error {}: {}", what, error.code, detail),
        ))
    }

    /// GET a JSON document
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let text = self
            .transport
            .get(self.endpoint, path)
            .await
            .map_err(|e| e.scoped(self.side))?;
        self.decode(path, &text)
    }

    /// GET a JSON document that may not exist. A 404 or a "not produced yet"
    /// error body means `None`; any other HTTP error status ends the run.
    pub(crate) async fn fetch_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.transport.get(self.endpoint, path).await {
            Ok(text) => self.decode(path, &text).map(Some),
            Err(e) => {
                let absent = e
                    .status()
                    .is_some_and(|(status, body)| status == 404 || not_reached(body));
                if absent {
                    debug!("{} {} not available: {}", self.side, path, e);
                    return Ok(None);
                }
                Err(e.scoped(self.side))
            }
        }
    }

    /// Decode an optional integer field; malformed input is an error, never zero
    pub(crate) fn quantity(&self, field: &str, value: Option<Quantity>) -> Result<Option<u64>> {
        match value {
            None => Ok(None),
            Some(Quantity::Int(v)) => Ok(Some(v)),
            Some(Quantity::Text(raw)) => parse_quantity(&raw)
                .map(Some)
                .map_err(|e| Error::parse(self.side, format!("{}: {}", field, e))),
        }
    }

    /// Turn an absent required field into a parse failure
    pub(crate) fn required<T>(&self, value: Option<T>, field: impl AsRef<str>) -> Result<T> {
        value.ok_or_else(|| {
            Error::parse(
                self.side,
                format!("{} missing from {} response", field.as_ref(), self.endpoint),
            )
        })
    }

    async fn rpc_response<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<JsonRpcResponse<T>> {
        let text = self
            .transport
            .rpc(self.endpoint, method, params)
            .await
            .map_err(|e| e.scoped(self.side))?;
        self.decode(method, &text)
    }

    fn decode<T: DeserializeOwned>(&self, what: &str, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| {
            Error::parse(
                self.side,
                format!("cannot decode {} response: {}", what, e),
            )
        })
    }
}
