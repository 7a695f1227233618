//! Transport layer for node queries
//!
//! Issues JSON-RPC POSTs and REST GETs against an [`Endpoint`], either directly
//! from this process or from inside a container through `docker exec`.
//! Transports return raw response text and an unscoped [`TransportFailure`];
//! the protocol adapters decide which side the failure belongs to.

mod exec;
mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::Error;
use crate::protocol::Side;

pub use exec::{CommandExecutor, CommandOutput, ExecTransport, ProcessExecutor};
pub use http::HttpTransport;

/// Connect timeout for every node request
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout for every node request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a request is issued from
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ExecContext {
    /// From this process
    Direct,
    /// `docker exec <name>`
    Container(String),
    /// `docker compose exec -T <service>`
    ComposeService(String),
}

impl std::fmt::Display for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecContext::Direct => write!(f, "host"),
            ExecContext::Container(name) => write!(f, "container {}", name),
            ExecContext::ComposeService(name) => write!(f, "compose service {}", name),
        }
    }
}

/// A node API base URL and the context used to reach it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub url: String,
    pub via: ExecContext,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, via: ExecContext) -> Self {
        Self {
            url: url.into(),
            via,
        }
    }

    pub fn direct(url: impl Into<String>) -> Self {
        Self::new(url, ExecContext::Direct)
    }

    /// Append a REST path to the base URL
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.via {
            ExecContext::Direct => write!(f, "{}", self.url),
            via => write!(f, "{} (via {})", self.url, via),
        }
    }
}

/// Failure raised below the adapter boundary
#[derive(Error, Debug)]
pub enum TransportFailure {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Command inside the execution context failed
    #[error("{0}")]
    Exec(String),

    /// HTTP client missing in the execution context
    #[error("{0}")]
    Tooling(String),

    /// Container or compose service does not exist
    #[error("{0}")]
    ContextMissing(String),
}

impl TransportFailure {
    /// Status code and body when the node answered with an HTTP error
    pub fn status(&self) -> Option<(u16, &str)> {
        match self {
            TransportFailure::Status { status, body } => Some((*status, body.as_str())),
            _ => None,
        }
    }

    /// Attach the side that issued the request
    pub fn scoped(self, side: Side) -> Error {
        match self {
            TransportFailure::Tooling(msg) => Error::ToolingError(msg),
            TransportFailure::ContextMissing(msg) => Error::ConfigError(msg),
            other => Error::transport(side, other.to_string()),
        }
    }
}

/// HTTP client availability for an endpoint's execution context
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub context: String,
    pub http_client: String,
    /// Client was installed during this run
    pub installed: bool,
}

impl ToolStatus {
    pub fn builtin(endpoint: &Endpoint) -> Self {
        Self {
            context: endpoint.via.to_string(),
            http_client: "built-in (reqwest)".to_string(),
            installed: false,
        }
    }

    pub fn summary(&self) -> String {
        if self.installed {
            format!("{} on {} (installed)", self.http_client, self.context)
        } else {
            format!("{} on {}", self.http_client, self.context)
        }
    }
}

/// JSON-RPC 2.0 request body; field order is part of the wire contract
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

/// Serialize a JSON-RPC request with positional params and id 1
pub fn jsonrpc_body(method: &str, params: &[Value]) -> String {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id: 1,
    };
    // Serializing borrowed strings and JSON values cannot fail
    serde_json::to_string(&request).unwrap_or_default()
}

/// Request/response access to a node
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body to the endpoint base URL
    async fn post(&self, endpoint: &Endpoint, body: &str) -> Result<String, TransportFailure>;

    /// GET `<base><path>`
    async fn get(&self, endpoint: &Endpoint, path: &str) -> Result<String, TransportFailure>;

    /// Make sure the endpoint's execution context can issue requests
    async fn prepare(&self, endpoint: &Endpoint) -> Result<ToolStatus, TransportFailure> {
        Ok(ToolStatus::builtin(endpoint))
    }

    async fn rpc(
        &self,
        endpoint: &Endpoint,
        method: &str,
        params: &[Value],
    ) -> Result<String, TransportFailure> {
        self.post(endpoint, &jsonrpc_body(method, params)).await
    }
}

/// Routes each request by the endpoint's execution context
pub struct NodeTransport {
    http: HttpTransport,
    exec: ExecTransport,
}

impl NodeTransport {
    pub fn new(http: HttpTransport, exec: ExecTransport) -> Self {
        Self { http, exec }
    }
}

#[async_trait]
impl Transport for NodeTransport {
    async fn post(&self, endpoint: &Endpoint, body: &str) -> Result<String, TransportFailure> {
        match endpoint.via {
            ExecContext::Direct => self.http.post(endpoint, body).await,
            _ => self.exec.post(endpoint, body).await,
        }
    }

    async fn get(&self, endpoint: &Endpoint, path: &str) -> Result<String, TransportFailure> {
        match endpoint.via {
            ExecContext::Direct => self.http.get(endpoint, path).await,
            _ => self.exec.get(endpoint, path).await,
        }
    }

    async fn prepare(&self, endpoint: &Endpoint) -> Result<ToolStatus, TransportFailure> {
        match endpoint.via {
            ExecContext::Direct => self.http.prepare(endpoint).await,
            _ => self.exec.prepare(endpoint).await,
        }
    }
}
