//! Sync comparison engine
//!
//! Runs a single comparison pass:
//!
//! 1. Check the local execution context can issue requests
//! 2. Measure the local and public heads
//! 3. Compute the lag and, when the local node is behind, sample its progress
//!    for an ETA
//! 4. Compare references at the local position
//! 5. Decide the verdict
//!
//! Queries run strictly one after another. The only wait is the ETA sample.

mod eta;
mod lag;
mod verdict;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CheckConfig;
use crate::error::{Error, Result};
use crate::protocol::{ChainMeasurement, NodeClient, Protocol, Side, SyncFlag};
use crate::transport::{ToolStatus, Transport};

pub use eta::{format_duration, EtaSample, MIN_EFFECTIVE_RATE};
pub use lag::{LagDirection, LagResult};
pub use verdict::{decide, ReferenceCheck, Verdict};

/// Everything measured during one run
#[derive(Clone, Debug, Serialize)]
pub struct CheckReport {
    pub checked_at: DateTime<Utc>,
    pub protocol: Protocol,
    pub local_endpoint: String,
    pub public_endpoint: String,
    pub tools: ToolStatus,
    pub local: ChainMeasurement,
    pub public: ChainMeasurement,
    /// Syncing flag used for the verdict
    pub local_syncing: SyncFlag,
    /// `local_syncing` was derived from the lag rather than reported by the node
    pub syncing_derived: bool,
    pub lag: LagResult,
    pub block_lag: u64,
    pub eta: Option<EtaSample>,
    pub references: ReferenceCheck,
    pub verdict: Verdict,
}

/// Runs one comparison between the configured local and public nodes
pub struct Checker<'a> {
    config: &'a CheckConfig,
    transport: &'a dyn Transport,
}

impl CheckReport {
    /// The divergence as a terminal diagnostic, when references differ
    pub fn divergence(&self) -> Option<Error> {
        let refs = &self.references;
        match (&refs.local, &refs.public) {
            (Some(local), Some(public)) if refs.diverged() => Some(Error::Diverged {
                what: format!(
                    "{} at {}",
                    self.protocol.reference_label(),
                    self.protocol.position_label()
                ),
                position: refs.position,
                local: local.clone(),
                public: public.clone(),
            }),
            _ => None,
        }
    }
}

impl<'a> Checker<'a> {
    pub fn new(config: &'a CheckConfig, transport: &'a dyn Transport) -> Self {
        Self { config, transport }
    }

    fn client(&self, side: Side) -> NodeClient<'a> {
        let endpoint = match side {
            Side::Local => &self.config.local,
            Side::Public => &self.config.public,
        };
        NodeClient::new(self.transport, endpoint, side)
    }

    pub async fn run(&self) -> Result<CheckReport> {
        let protocol = self.config.protocol;
        let local_client = self.client(Side::Local);
        let public_client = self.client(Side::Public);

        let tools = self
            .transport
            .prepare(&self.config.local)
            .await
            .map_err(|e| e.scoped(Side::Local))?;
        debug!("HTTP client: {}", tools.summary());

        info!("Querying local {} node at {}", protocol, self.config.local);
        let local = protocol.measure(&local_client).await?;
        info!("Querying public {} node at {}", protocol, self.config.public);
        let public = protocol.measure(&public_client).await?;

        let lag = LagResult::compute(local.position, public.position);
        debug!(
            "Local {} {}, public {} {}, lag {} ({})",
            protocol.position_label(),
            local.position,
            protocol.position_label(),
            public.position,
            lag.magnitude,
            lag.direction.as_str()
        );

        let (local_syncing, syncing_derived) = if protocol.has_native_sync_flag() {
            (local.syncing, false)
        } else {
            (self.exceeds_threshold(&lag), true)
        };

        let eta = if lag.is_behind() {
            self.sample_progress(&local_client, &local, &public).await?
        } else {
            None
        };

        let references = self.compare_references(&public_client, &local, &public).await?;
        if references.diverged() {
            warn!(
                "References differ at {} {}: local {:?}, public {:?}",
                protocol.position_label(),
                references.position,
                references.local,
                references.public
            );
        }

        let verdict = decide(&lag, local_syncing, self.config.block_lag, &references);
        info!("Verdict: {}", verdict);

        Ok(CheckReport {
            checked_at: Utc::now(),
            protocol,
            local_endpoint: self.config.local.to_string(),
            public_endpoint: self.config.public.to_string(),
            tools,
            local,
            public,
            local_syncing,
            syncing_derived,
            lag,
            block_lag: self.config.block_lag,
            eta,
            references,
            verdict,
        })
    }

    fn exceeds_threshold(&self, lag: &LagResult) -> SyncFlag {
        let threshold = i64::try_from(self.config.block_lag).unwrap_or(i64::MAX);
        SyncFlag::from_bool(lag.raw_lag > threshold)
    }

    /// Sleep for the sampling window and re-read the local head
    async fn sample_progress(
        &self,
        local_client: &NodeClient<'_>,
        local: &ChainMeasurement,
        public: &ChainMeasurement,
    ) -> Result<Option<EtaSample>> {
        let window = self.config.sample_secs;
        if window == 0 {
            debug!("ETA sampling disabled");
            return Ok(None);
        }

        info!("Sampling local progress for {}s", window);
        tokio::time::sleep(Duration::from_secs(window)).await;

        let protocol = self.config.protocol;
        let end = local_client.required(
            protocol.position(local_client).await?,
            format!("head {}", protocol.position_label()),
        )?;

        let sample = EtaSample::compute(
            local.position,
            end,
            public.position,
            window,
            self.config.growth_rate,
        );
        debug!(
            "Advanced {} in {}s, ETA {}",
            sample.blocks_advanced,
            window,
            sample.eta_display()
        );

        Ok(Some(sample))
    }

    /// Compare references at the local position. The public reference is
    /// looked up at that same position, reusing the head measurement when
    /// both heads are equal.
    async fn compare_references(
        &self,
        public_client: &NodeClient<'_>,
        local: &ChainMeasurement,
        public: &ChainMeasurement,
    ) -> Result<ReferenceCheck> {
        let position = local.position;

        let (public_reference, reused_public) = if public.position == position {
            (public.reference.clone(), true)
        } else {
            let reference = self
                .config
                .protocol
                .reference(public_client, position)
                .await?;
            (reference, false)
        };

        Ok(ReferenceCheck {
            position,
            local: local.reference.clone(),
            public: public_reference,
            reused_public,
        })
    }
}

/// Run one check with the given configuration and transport
pub async fn run_check(config: &CheckConfig, transport: &dyn Transport) -> Result<CheckReport> {
    Checker::new(config, transport).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::error::Error;
    use crate::transport::{Endpoint, TransportFailure};

    /// In-process EVM node answering JSON-RPC by method name
    struct FakeEvmNode {
        heads: Mutex<VecDeque<u64>>,
        hashes: HashMap<u64, String>,
        syncing: Value,
        calls: Mutex<Vec<String>>,
    }

    impl FakeEvmNode {
        fn new(heads: &[u64], hashes: &[(u64, &str)], syncing: Value) -> Self {
            Self {
                heads: Mutex::new(heads.iter().copied().collect()),
                hashes: hashes
                    .iter()
                    .map(|(n, h)| (*n, h.to_string()))
                    .collect(),
                syncing,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn answer(&self, body: &str) -> String {
            let request: Value = serde_json::from_str(body).unwrap();
            let method = request["method"].as_str().unwrap().to_string();
            self.calls.lock().unwrap().push(method.clone());

            let result = match method.as_str() {
                "eth_blockNumber" => {
                    let mut heads = self.heads.lock().unwrap();
                    // Last head repeats once the script runs out
                    let head = if heads.len() > 1 {
                        heads.pop_front().unwrap()
                    } else {
                        *heads.front().unwrap()
                    };
                    json!(format!("{:#x}", head))
                }
                "eth_getBlockByNumber" => {
                    let raw = request["params"][0].as_str().unwrap();
                    let number = u64::from_str_radix(raw.trim_start_matches("0x"), 16).unwrap();
                    match self.hashes.get(&number) {
                        Some(hash) => json!({ "number": raw, "hash": hash }),
                        None => Value::Null,
                    }
                }
                "eth_syncing" => self.syncing.clone(),
                other => panic!("unexpected method {}", other),
            };

            json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
        }

        fn count(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.as_str() == method)
                .count()
        }
    }

    struct FakeTransport {
        local: FakeEvmNode,
        public: Option<FakeEvmNode>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post(&self, endpoint: &Endpoint, body: &str) -> Result<String, TransportFailure> {
            if endpoint.url.contains("local") {
                return Ok(self.local.answer(body));
            }
            match &self.public {
                Some(node) => Ok(node.answer(body)),
                None => Err(TransportFailure::Exec("connection refused".to_string())),
            }
        }

        async fn get(&self, _: &Endpoint, path: &str) -> Result<String, TransportFailure> {
            panic!("unexpected GET {}", path)
        }
    }

    fn config(sample_secs: u64) -> CheckConfig {
        CheckConfig {
            protocol: Protocol::Evm,
            local: Endpoint::direct("http://local:8545"),
            public: Endpoint::direct("http://public:8545"),
            block_lag: 2,
            sample_secs,
            growth_rate: 0.08,
            allow_install: true,
        }
    }

    #[tokio::test]
    async fn test_scenario_in_sync() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[1000], &[(1000, "0xh")], json!(false)),
            public: Some(FakeEvmNode::new(&[1000], &[(1000, "0xh")], json!(false))),
        };

        let report = run_check(&config(10), &transport).await.unwrap();
        assert_eq!(report.verdict, Verdict::InSync);
        assert_eq!(report.verdict.exit_code(), 0);
        assert!(report.divergence().is_none());
        assert_eq!(report.lag.direction, LagDirection::InSync);
        assert!(report.eta.is_none());
        assert!(report.references.reused_public);
        assert_eq!(report.references.status(), "match");
        // Public reference at the shared head is not fetched twice
        assert_eq!(transport.public.as_ref().unwrap().count("eth_getBlockByNumber"), 1);
    }

    #[tokio::test]
    async fn test_public_syncing_flag_is_not_queried() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[1000], &[(1000, "0xh")], json!(false)),
            public: Some(FakeEvmNode::new(&[1000], &[(1000, "0xh")], json!(false))),
        };

        let report = run_check(&config(10), &transport).await.unwrap();
        assert_eq!(report.local.syncing, SyncFlag::NotSyncing);
        assert_eq!(report.public.syncing, SyncFlag::Unknown);
        assert_eq!(transport.local.count("eth_syncing"), 1);
        assert_eq!(transport.public.as_ref().unwrap().count("eth_syncing"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_syncing_with_eta() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(
                &[900, 950],
                &[(900, "0xa900")],
                json!({ "currentBlock": "0x384", "highestBlock": "0x3e8" }),
            ),
            public: Some(FakeEvmNode::new(
                &[1000],
                &[(900, "0xa900"), (1000, "0xa1000")],
                json!(false),
            )),
        };

        let report = run_check(&config(10), &transport).await.unwrap();
        assert_eq!(report.lag.raw_lag, 100);
        assert_eq!(report.verdict, Verdict::Syncing);
        assert_eq!(report.verdict.exit_code(), 1);

        let eta = report.eta.expect("ETA sample");
        assert_eq!(eta.blocks_advanced, 50);
        assert_eq!(eta.eta_display(), "11s");

        // Public side looked up at the local position
        assert_eq!(report.references.position, 900);
        assert!(!report.references.reused_public);
        assert_eq!(report.references.status(), "match");
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncing_without_progress_has_no_eta() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[900], &[], json!(false)),
            public: Some(FakeEvmNode::new(&[1000], &[], json!(false))),
        };

        let report = run_check(&config(10), &transport).await.unwrap();
        assert_eq!(report.verdict, Verdict::Syncing);
        assert_eq!(report.eta.unwrap().eta_display(), "n/a");
        assert_eq!(report.references.status(), "unverified");
    }

    #[tokio::test]
    async fn test_scenario_diverged() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[1000], &[(1000, "0xh1")], json!(false)),
            public: Some(FakeEvmNode::new(&[1000], &[(1000, "0xh2")], json!(false))),
        };

        let report = run_check(&config(10), &transport).await.unwrap();
        assert_eq!(report.verdict, Verdict::Diverged);
        assert_eq!(report.verdict.exit_code(), 2);

        let err = report.divergence().expect("divergence");
        assert_eq!(err.label(), "DIVERGED");
        assert_eq!(
            err.to_string(),
            "block hash at block 1000 differs: local 0xh1 vs public 0xh2"
        );
        assert_eq!(Verdict::from(&err), Verdict::Diverged);
    }

    #[tokio::test]
    async fn test_local_ahead_compares_at_local_position() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[1002], &[(1002, "0xh")], json!(false)),
            // Public has not produced 1002 yet
            public: Some(FakeEvmNode::new(&[1000], &[(1000, "0xp")], json!(false))),
        };

        let report = run_check(&config(10), &transport).await.unwrap();
        assert_eq!(report.lag.raw_lag, -2);
        assert_eq!(report.lag.magnitude, 2);
        assert_eq!(report.verdict, Verdict::InSync);
        assert!(report.eta.is_none());
        assert_eq!(report.references.public, None);
    }

    #[tokio::test]
    async fn test_scenario_public_unreachable() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[1000], &[(1000, "0xh")], json!(false)),
            public: None,
        };

        let err = run_check(&config(10), &transport).await.unwrap_err();
        assert!(matches!(
            err,
            Error::TransportError {
                side: Side::Public,
                ..
            }
        ));
        assert_eq!(Verdict::from(&err).exit_code(), 2);
    }

    #[tokio::test]
    async fn test_sampling_disabled() {
        let transport = FakeTransport {
            local: FakeEvmNode::new(&[900], &[], json!(false)),
            public: Some(FakeEvmNode::new(&[1000], &[], json!(false))),
        };

        let report = run_check(&config(0), &transport).await.unwrap();
        assert!(report.eta.is_none());
        assert_eq!(transport.local.count("eth_blockNumber"), 1);
    }
}
