//! Transport that runs `curl` inside a container
//!
//! Used when the local node's RPC port is only reachable from inside its own
//! container or compose service. The HTTP client is checked (and installed
//! unless disabled) before the first request.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{
    Endpoint, ExecContext, ToolStatus, Transport, TransportFailure, CONNECT_TIMEOUT,
    REQUEST_TIMEOUT,
};

/// Output of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs a program to completion
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Executes commands on the host with `tokio::process`
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

const INSTALL_SCRIPT: &str = "if command -v apk >/dev/null 2>&1; then apk add --no-cache curl; \
elif command -v apt-get >/dev/null 2>&1; then apt-get update -qq && apt-get install -y -qq curl; \
elif command -v microdnf >/dev/null 2>&1; then microdnf install -y curl; \
elif command -v yum >/dev/null 2>&1; then yum install -y curl; \
else exit 127; fi";

/// Marker curl appends after the body so the status code can be split off
const STATUS_MARKER: &str = "\n__HTTP_STATUS__:";

/// Issues requests with `docker exec ... curl`
pub struct ExecTransport {
    executor: Arc<dyn CommandExecutor>,
    allow_install: bool,
    tools: OnceCell<ToolStatus>,
}

impl ExecTransport {
    pub fn new(executor: Arc<dyn CommandExecutor>, allow_install: bool) -> Self {
        Self {
            executor,
            allow_install,
            tools: OnceCell::new(),
        }
    }

    /// `docker` arguments running `command` inside the context; `None` for a
    /// direct endpoint, which never reaches this transport
    fn docker_args(via: &ExecContext, command: &[String]) -> Option<Vec<String>> {
        let mut args = match via {
            ExecContext::Container(name) => vec!["exec".to_string(), name.clone()],
            ExecContext::ComposeService(service) => vec![
                "compose".to_string(),
                "exec".to_string(),
                "-T".to_string(),
                service.clone(),
            ],
            ExecContext::Direct => return None,
        };
        args.extend(command.iter().cloned());
        Some(args)
    }

    /// Run a command inside the container or compose service
    async fn run_in(
        &self,
        via: &ExecContext,
        command: &[String],
    ) -> Result<CommandOutput, TransportFailure> {
        let args = Self::docker_args(via, command).ok_or_else(|| {
            TransportFailure::Exec(format!("{} has no execution context", via))
        })?;

        let output = self
            .executor
            .run("docker", &args)
            .await
            .map_err(|e| TransportFailure::Tooling(format!("Failed to run command: {}", e)))?;

        if !output.success() && is_missing_context(&output.stderr) {
            return Err(TransportFailure::ContextMissing(format!(
                "{} not found: {}",
                via,
                output.stderr.trim()
            )));
        }

        Ok(output)
    }

    async fn has_curl(&self, via: &ExecContext) -> Result<bool, TransportFailure> {
        let output = self
            .run_in(via, &shell("command -v curl >/dev/null 2>&1"))
            .await?;
        Ok(output.success())
    }

    async fn ensure_tools(&self, endpoint: &Endpoint) -> Result<ToolStatus, TransportFailure> {
        let via = &endpoint.via;
        let mut status = ToolStatus {
            context: via.to_string(),
            http_client: "curl".to_string(),
            installed: false,
        };

        if self.has_curl(via).await? {
            debug!("curl present in {}", via);
            return Ok(status);
        }

        if !self.allow_install {
            return Err(TransportFailure::Tooling(format!(
                "curl is not available in {} and installation is disabled",
                via
            )));
        }

        info!("curl missing in {}, attempting install", via);
        let output = self.run_in(via, &shell(INSTALL_SCRIPT)).await?;
        if !output.success() {
            warn!("curl install failed in {}: {}", via, output.stderr.trim());
        }

        if !self.has_curl(via).await? {
            return Err(TransportFailure::Tooling(format!(
                "curl is not available in {} and could not be installed",
                via
            )));
        }

        status.installed = true;
        Ok(status)
    }

    async fn curl(&self, endpoint: &Endpoint, extra: Vec<String>) -> Result<String, TransportFailure> {
        let mut command = vec![
            "curl".to_string(),
            "-sS".to_string(),
            "--connect-timeout".to_string(),
            CONNECT_TIMEOUT.as_secs().to_string(),
            "--max-time".to_string(),
            REQUEST_TIMEOUT.as_secs().to_string(),
            "-w".to_string(),
            format!("{}%{{http_code}}", STATUS_MARKER),
        ];
        command.extend(extra);

        let output = self.run_in(&endpoint.via, &command).await?;
        if !output.success() {
            let code = output
                .status
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(TransportFailure::Exec(format!(
                "curl exited with {}: {}",
                code,
                output.stderr.trim()
            )));
        }

        split_status(&output.stdout)
    }
}

#[async_trait]
impl Transport for ExecTransport {
    async fn post(&self, endpoint: &Endpoint, body: &str) -> Result<String, TransportFailure> {
        debug!("POST {} {}", endpoint, body);
        self.curl(
            endpoint,
            vec![
                "-X".to_string(),
                "POST".to_string(),
                "-H".to_string(),
                "Content-Type: application/json".to_string(),
                "--data-raw".to_string(),
                body.to_string(),
                endpoint.url.clone(),
            ],
        )
        .await
    }

    async fn get(&self, endpoint: &Endpoint, path: &str) -> Result<String, TransportFailure> {
        debug!("GET {}{}", endpoint, path);
        self.curl(endpoint, vec![endpoint.join(path)]).await
    }

    async fn prepare(&self, endpoint: &Endpoint) -> Result<ToolStatus, TransportFailure> {
        self.tools
            .get_or_try_init(|| self.ensure_tools(endpoint))
            .await
            .cloned()
    }
}

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn is_missing_context(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container")
        || stderr.contains("no such service")
        || stderr.contains("is not running")
}

/// Split curl's `-w` trailer off the body and check the status code
fn split_status(stdout: &str) -> Result<String, TransportFailure> {
    let (body, code) = stdout.rsplit_once(STATUS_MARKER).ok_or_else(|| {
        TransportFailure::Exec("curl output is missing the status trailer".to_string())
    })?;

    let status: u16 = code.trim().parse().map_err(|_| {
        TransportFailure::Exec(format!("curl reported invalid status code {:?}", code.trim()))
    })?;

    if !(200..300).contains(&status) {
        return Err(TransportFailure::Status {
            status,
            body: body.to_string(),
        });
    }

    Ok(body.to_string())
}
