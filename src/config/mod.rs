//! Run configuration
//!
//! [`CheckConfig`] is resolved once at startup from CLI overrides and a flat
//! key/value map (env file plus process environment) and is read-only
//! afterwards. Nothing below this module reads the environment.

mod env_file;

use std::str::FromStr;

use reqwest::Url;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::transport::{Endpoint, ExecContext};

pub use env_file::{load_env, parse_env, read_env_file, EnvMap};

/// Default lag (in positions) tolerated before the node counts as syncing
pub const DEFAULT_BLOCK_LAG: u64 = 2;

/// Default ETA sampling window in seconds
pub const DEFAULT_SAMPLE_SECS: u64 = 10;

/// Values given on the command line; `None` falls back to the env map
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub protocol: Option<String>,
    pub public_rpc: Option<String>,
    pub local_rpc: Option<String>,
    pub block_lag: Option<u64>,
    pub sample_secs: Option<u64>,
    pub growth_rate: Option<f64>,
    pub container: Option<String>,
    pub compose_service: Option<String>,
    pub no_install: bool,
}

/// Fully resolved, immutable configuration for one check
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckConfig {
    pub protocol: Protocol,
    pub local: Endpoint,
    pub public: Endpoint,
    /// Lag above which the node is reported as syncing
    pub block_lag: u64,
    /// ETA sampling window; 0 disables sampling
    pub sample_secs: u64,
    /// Assumed public chain growth in positions per second
    pub growth_rate: f64,
    /// Install `curl` into the execution context when missing
    pub allow_install: bool,
}

impl CheckConfig {
    pub fn resolve(overrides: &Overrides, env: &EnvMap) -> Result<Self> {
        let protocol = match overrides.protocol.clone().or_else(|| lookup(env, "PROTOCOL")) {
            Some(name) => Protocol::from_str(&name)?,
            None => Protocol::Evm,
        };

        let public_url = overrides
            .public_rpc
            .clone()
            .or_else(|| lookup(env, "PUBLIC_RPC"))
            .ok_or_else(|| {
                Error::ConfigError("--public-rpc (or PUBLIC_RPC) is required".to_string())
            })?;
        let public_url = validate_url("public RPC", &public_url)?;

        let local_url = match overrides.local_rpc.clone().or_else(|| lookup(env, "LOCAL_RPC")) {
            Some(url) => validate_url("local RPC", &url)?,
            None => format!("http://127.0.0.1:{}", local_port(protocol, env)?),
        };

        let container = overrides.container.clone().or_else(|| lookup(env, "CONTAINER"));
        let compose_service = overrides
            .compose_service
            .clone()
            .or_else(|| lookup(env, "COMPOSE_SERVICE"));
        let via = match (container, compose_service) {
            (Some(_), Some(_)) => {
                return Err(Error::ConfigError(
                    "--container and --compose-service are mutually exclusive".to_string(),
                ))
            }
            (Some(name), None) => ExecContext::Container(name),
            (None, Some(service)) => ExecContext::ComposeService(service),
            (None, None) => ExecContext::Direct,
        };

        let block_lag = match overrides.block_lag {
            Some(v) => v,
            None => parse_key(env, "BLOCK_LAG")?.unwrap_or(DEFAULT_BLOCK_LAG),
        };

        let sample_secs = match overrides.sample_secs {
            Some(v) => v,
            None => parse_key(env, "SAMPLE_SECS")?.unwrap_or(DEFAULT_SAMPLE_SECS),
        };

        let growth_rate = match overrides.growth_rate {
            Some(v) => v,
            None => parse_key(env, "PUBLIC_GROWTH_RATE")?
                .unwrap_or_else(|| protocol.default_growth_rate()),
        };
        if !growth_rate.is_finite() || growth_rate < 0.0 {
            return Err(Error::ConfigError(format!(
                "PUBLIC_GROWTH_RATE must be a non-negative number, got {}",
                growth_rate
            )));
        }

        let no_install = overrides.no_install
            || lookup(env, "NO_INSTALL")
                .map(|v| is_truthy(&v))
                .unwrap_or(false);

        let config = Self {
            protocol,
            local: Endpoint::new(local_url, via),
            public: Endpoint::direct(public_url),
            block_lag,
            sample_secs,
            growth_rate,
            allow_install: !no_install,
        };

        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

/// Non-empty value for `key`
fn lookup(env: &EnvMap, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_key<T: FromStr>(env: &EnvMap, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(env, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("Invalid {} value {:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

fn local_port(protocol: Protocol, env: &EnvMap) -> Result<u16> {
    for key in protocol.port_keys() {
        if let Some(port) = parse_key::<u16>(env, key)? {
            return Ok(port);
        }
    }
    Ok(protocol.default_port())
}

fn validate_url(what: &str, raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| Error::ConfigError(format!("Invalid {} URL {:?}: {}", what, raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        scheme => Err(Error::ConfigError(format!(
            "Unsupported {} URL scheme {:?}",
            what, scheme
        ))),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
