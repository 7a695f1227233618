//! Tendermint/CometBFT REST adapter
//!
//! `/status` is served either wrapped in a JSON-RPC envelope
//! (`{"result": {"sync_info": ...}}`) or bare (`{"sync_info": ...}`),
//! depending on the node and any proxy in front of it. Both are accepted.

use serde::Deserialize;

use super::{
    non_empty, ChainMeasurement, JsonRpcError, NodeClient, Protocol, Quantity, SyncFlag,
};
use crate::error::Result;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { result: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { result } => result,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    sync_info: Option<SyncInfo>,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: Option<Quantity>,
    latest_block_hash: Option<String>,
    catching_up: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block_id: Option<BlockId>,
    /// Some gateways answer 200 with the JSON-RPC error in the body
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct BlockId {
    hash: Option<String>,
}

async fn sync_info(client: &NodeClient<'_>) -> Result<SyncInfo> {
    let status: Envelope<StatusResponse> = client.fetch("/status").await?;
    client.required(status.into_inner().sync_info, "sync_info")
}

fn catching_up(info: &SyncInfo) -> SyncFlag {
    info.catching_up
        .map(SyncFlag::from_bool)
        .unwrap_or(SyncFlag::Unknown)
}

pub(super) async fn position(client: &NodeClient<'_>) -> Result<Option<u64>> {
    let info = sync_info(client).await?;
    client.quantity("sync_info.latest_block_height", info.latest_block_height)
}

pub(super) async fn reference(client: &NodeClient<'_>, height: u64) -> Result<Option<String>> {
    let path = format!("/block?height={}", height);
    let block = match client.fetch_optional::<Envelope<BlockResponse>>(&path).await? {
        Some(block) => block.into_inner(),
        None => return Ok(None),
    };

    if let Some(error) = block.error {
        return client.lookup_error(&path, error);
    }

    Ok(block.block_id.and_then(|id| non_empty(id.hash)))
}

pub(super) async fn syncing(client: &NodeClient<'_>) -> Result<SyncFlag> {
    let info = sync_info(client).await?;
    Ok(catching_up(&info))
}

/// Everything comes from a single `/status` call
pub(super) async fn measure(client: &NodeClient<'_>) -> Result<ChainMeasurement> {
    let info = sync_info(client).await?;
    let position = client.required(
        client.quantity("sync_info.latest_block_height", info.latest_block_height.clone())?,
        "sync_info.latest_block_height",
    )?;

    Ok(ChainMeasurement {
        side: client.side(),
        protocol: Protocol::Cosmos,
        position,
        reference: non_empty(info.latest_block_hash.clone()),
        syncing: catching_up(&info),
        optimistic: None,
    })
}
