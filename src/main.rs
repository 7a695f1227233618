//! node-sync-check: one-shot health probe for blockchain full nodes
//!
//! Compares the local node's head with a public reference node and exits with:
//! - `0` - in sync
//! - `1` - syncing (lagging beyond the threshold or self-reported)
//! - `2` - diverged, or any error

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use node_sync_check::config::{load_env, CheckConfig, Overrides};
use node_sync_check::error::Result;
use node_sync_check::report::render;
use node_sync_check::transport::{ExecTransport, HttpTransport, NodeTransport, ProcessExecutor};
use node_sync_check::{run_check, Verdict};

#[derive(Parser, Debug)]
#[command(name = "node-sync-check")]
#[command(about = "Compare a local blockchain node's head against a public reference node", long_about = None)]
#[command(version)]
struct Cli {
    /// Public reference node URL (or PUBLIC_RPC)
    #[arg(long, value_name = "URL")]
    public_rpc: Option<String>,

    /// Local node URL (defaults to http://127.0.0.1:<RPC_PORT>)
    #[arg(long, value_name = "URL")]
    local_rpc: Option<String>,

    /// Lag tolerated before the node counts as syncing
    #[arg(long, value_name = "N")]
    block_lag: Option<u64>,

    /// Seconds to sample local progress for the ETA (0 disables)
    #[arg(long, value_name = "N")]
    sample_secs: Option<u64>,

    /// Query the local node from inside this container
    #[arg(long, value_name = "NAME", conflicts_with = "compose_service")]
    container: Option<String>,

    /// Query the local node from inside this compose service
    #[arg(long, value_name = "NAME")]
    compose_service: Option<String>,

    /// Env file with RPC_PORT, PROTOCOL and other defaults (default: ./.env if present)
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Do not install curl into the container when it is missing
    #[arg(long)]
    no_install: bool,

    /// Chain family: evm, cosmos, beacon or sui (or PROTOCOL)
    #[arg(long, value_name = "NAME")]
    protocol: Option<String>,

    /// Assumed public chain growth per second used for the ETA
    #[arg(long, value_name = "RATE")]
    growth_rate: Option<f64>,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    output: String,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            protocol: self.protocol.clone(),
            public_rpc: self.public_rpc.clone(),
            local_rpc: self.local_rpc.clone(),
            block_lag: self.block_lag,
            sample_secs: self.sample_secs,
            growth_rate: self.growth_rate,
            container: self.container.clone(),
            compose_service: self.compose_service.clone(),
            no_install: self.no_install,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", e.label(), e);
            tracing::debug!("Verdict: {}", Verdict::from(&e));
            e.exit_code()
        }
    };

    process::exit(code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("node_sync_check=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> Result<i32> {
    let env = load_env(cli.env_file.as_deref())?;
    let config = CheckConfig::resolve(&cli.overrides(), &env)?;

    let transport = NodeTransport::new(
        HttpTransport::new()?,
        ExecTransport::new(Arc::new(ProcessExecutor), config.allow_install),
    );

    let report = run_check(&config, &transport).await?;
    let rendered = render(&report, &cli.output)?;
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }

    if let Some(err) = report.divergence() {
        eprintln!("{}: {}", err.label(), err);
    }

    Ok(report.verdict.exit_code())
}
