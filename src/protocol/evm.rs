//! EVM-style JSON-RPC adapter

use serde::Deserialize;
use serde_json::Value;

use super::{non_empty, NodeClient, Quantity, SyncFlag};
use crate::error::Result;

/// Subset of the `eth_getBlockByNumber` block object
#[derive(Debug, Deserialize)]
struct Block {
    hash: Option<String>,
}

pub(super) async fn position(client: &NodeClient<'_>) -> Result<Option<u64>> {
    let raw: Option<Quantity> = client.call("eth_blockNumber", &[]).await?;
    client.quantity("eth_blockNumber result", raw)
}

pub(super) async fn reference(client: &NodeClient<'_>, position: u64) -> Result<Option<String>> {
    let params = [Value::from(format!("{:#x}", position)), Value::Bool(false)];
    let block: Option<Block> = client.lookup("eth_getBlockByNumber", &params).await?;
    Ok(block.and_then(|b| non_empty(b.hash)))
}

pub(super) async fn syncing(client: &NodeClient<'_>) -> Result<SyncFlag> {
    let raw: Option<Value> = client.call("eth_syncing", &[]).await?;
    Ok(sync_flag(raw))
}

/// Only a literal `false` means synced. `true`, a progress object or a null
/// result all count as syncing.
fn sync_flag(result: Option<Value>) -> SyncFlag {
    match result {
        Some(Value::Bool(false)) => SyncFlag::NotSyncing,
        _ => SyncFlag::Syncing,
    }
}
