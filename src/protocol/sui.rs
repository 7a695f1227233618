//! Sui JSON-RPC adapter
//!
//! Sui nodes expose no syncing flag; [`Protocol::syncing`](super::Protocol::syncing)
//! reports `Unknown` and the checker derives one from the lag.

use serde::Deserialize;
use serde_json::Value;

use super::{non_empty, NodeClient, Quantity};
use crate::error::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Checkpoint {
    digest: Option<String>,
}

pub(super) async fn position(client: &NodeClient<'_>) -> Result<Option<u64>> {
    let raw: Option<Quantity> = client
        .call("sui_getLatestCheckpointSequenceNumber", &[])
        .await?;
    client.quantity("sui_getLatestCheckpointSequenceNumber result", raw)
}

pub(super) async fn reference(client: &NodeClient<'_>, sequence: u64) -> Result<Option<String>> {
    // Sequence numbers are passed as strings (BigInt on the wire)
    let params = [Value::from(sequence.to_string())];
    let checkpoint: Option<Checkpoint> = client.lookup("sui_getCheckpoint", &params).await?;
    Ok(checkpoint.and_then(|c| non_empty(c.digest)))
}
