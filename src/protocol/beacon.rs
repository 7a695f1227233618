//! Ethereum beacon node REST adapter
//!
//! The head slot and syncing flag come from `/eth/v1/node/syncing`, the block
//! root from the headers endpoint. `is_optimistic` is carried through for the
//! report but never affects the verdict.

use serde::Deserialize;

use super::{non_empty, ChainMeasurement, NodeClient, Protocol, Quantity, SyncFlag};
use crate::error::Result;

const SYNCING_PATH: &str = "/eth/v1/node/syncing";
const HEAD_HEADER_PATH: &str = "/eth/v1/beacon/headers/head";

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SyncingData {
    head_slot: Option<Quantity>,
    is_syncing: Option<bool>,
    is_optimistic: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct HeaderData {
    root: Option<String>,
    header: Option<SignedHeader>,
}

#[derive(Debug, Deserialize)]
struct SignedHeader {
    message: Option<HeaderMessage>,
}

#[derive(Debug, Deserialize)]
struct HeaderMessage {
    slot: Option<Quantity>,
}

impl HeaderData {
    fn slot(&self) -> Option<Quantity> {
        self.header
            .as_ref()
            .and_then(|h| h.message.as_ref())
            .and_then(|m| m.slot.clone())
    }
}

async fn syncing_data(client: &NodeClient<'_>) -> Result<SyncingData> {
    let envelope: DataEnvelope<SyncingData> = client.fetch(SYNCING_PATH).await?;
    client.required(envelope.data, "data")
}

pub(super) async fn position(client: &NodeClient<'_>) -> Result<Option<u64>> {
    let data = syncing_data(client).await?;
    client.quantity("data.head_slot", data.head_slot)
}

/// Empty slots have no header, so a 404 is an absent root, not an error
pub(super) async fn reference(client: &NodeClient<'_>, slot: u64) -> Result<Option<String>> {
    let path = format!("/eth/v1/beacon/headers/{}", slot);
    let envelope: Option<DataEnvelope<HeaderData>> = client.fetch_optional(&path).await?;

    Ok(envelope
        .and_then(|e| e.data)
        .and_then(|data| non_empty(data.root)))
}

pub(super) async fn syncing(client: &NodeClient<'_>) -> Result<SyncFlag> {
    let data = syncing_data(client).await?;
    Ok(flag(&data))
}

fn flag(data: &SyncingData) -> SyncFlag {
    data.is_syncing
        .map(SyncFlag::from_bool)
        .unwrap_or(SyncFlag::Unknown)
}

pub(super) async fn measure(client: &NodeClient<'_>) -> Result<ChainMeasurement> {
    let data = syncing_data(client).await?;
    let position = client.required(
        client.quantity("data.head_slot", data.head_slot.clone())?,
        "data.head_slot",
    )?;

    let head: DataEnvelope<HeaderData> = client.fetch(HEAD_HEADER_PATH).await?;
    let head = head.data;
    let head_slot = match &head {
        Some(h) => client.quantity("data.header.message.slot", h.slot())?,
        None => None,
    };

    // The head may move between the two calls; only use its root if it
    // belongs to the slot we report
    let root = if head_slot == Some(position) {
        head.and_then(|h| non_empty(h.root))
    } else {
        reference(client, position).await?
    };

    Ok(ChainMeasurement {
        side: client.side(),
        protocol: Protocol::Beacon,
        position,
        reference: root,
        syncing: flag(&data),
        optimistic: data.is_optimistic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syncing_response_decoding() {
        let body = r#"{"data":{"head_slot":"8200000","sync_distance":"0","is_syncing":false,"is_optimistic":true,"el_offline":false}}"#;
        let envelope: DataEnvelope<SyncingData> = serde_json::from_str(body).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.head_slot, Some(Quantity::Text("8200000".to_string())));
        assert_eq!(flag(&data), SyncFlag::NotSyncing);
        assert_eq!(data.is_optimistic, Some(true));
    }

    #[test]
    fn test_header_response_decoding() {
        let body = r#"{
            "execution_optimistic": false,
            "finalized": false,
            "data": {
                "root": "0xcf8e0d4e9587369b2301d0790347320302cc0943d5a1884560367e8208d920f2",
                "canonical": true,
                "header": {
                    "message": {
                        "slot": "8200000",
                        "proposer_index": "1",
                        "parent_root": "0x00",
                        "state_root": "0x00",
                        "body_root": "0x00"
                    },
                    "signature": "0x00"
                }
            }
        }"#;
        let envelope: DataEnvelope<HeaderData> = serde_json::from_str(body).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.slot(), Some(Quantity::Text("8200000".to_string())));
        assert!(data.root.unwrap().starts_with("0xcf8e"));
    }

    #[test]
    fn test_missing_is_syncing_is_unknown() {
        let envelope: DataEnvelope<SyncingData> =
            serde_json::from_str(r#"{"data":{"head_slot":"1"}}"#).unwrap();
        assert_eq!(flag(&envelope.data.unwrap()), SyncFlag::Unknown);
    }
}
