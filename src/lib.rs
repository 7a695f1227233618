//! node-sync-check: compares a local blockchain node against a public
//! reference node and reports whether it is in sync, syncing or diverged.
//!
//! Supported chain families are EVM JSON-RPC, Tendermint/Cosmos REST,
//! Ethereum beacon REST and Sui JSON-RPC.

pub mod checker;
pub mod config;
pub mod error;
pub mod protocol;
pub mod report;
pub mod transport;

pub use checker::{run_check, CheckReport, Checker, Verdict};
pub use config::{CheckConfig, Overrides};
pub use error::{Error, Result};
pub use protocol::Protocol;
