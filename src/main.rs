//! pskgate - expose a PSK-TLS protected dashboard on a local port
//!
//! Loads the tunnel descriptor, starts the tunnel in the background and prints
//! the local URL to open once it is ready. Runs until Ctrl+C.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pskgate_config::{
    PresharedKeyDescriptor, TunnelConfig, TunnelDescriptor, DEFAULT_DESCRIPTOR_PATH,
};
use pskgate_tunnel::{TunnelLauncher, TunnelOptions};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// pskgate - reach a PSK-TLS protected dashboard through a local port
#[derive(Parser, Debug)]
#[command(name = "pskgate")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the tunnel and keep it running until Ctrl+C
    #[command(long_about = r#"
Listen on 127.0.0.1:<localPort> and forward every connection over TLS 1.2
with a pre-shared key to <remoteAddress>:<remotePort>.

EXAMPLES:
  # Use config/redirect.json
  pskgate run

  # Explicit descriptor, key from the environment
  PSKGATE_PSK_KEY=... pskgate run --config home.json

  # No descriptor at all
  pskgate run --remote-address home.example.com --identity phone --key $KEY --local-port 8123

ENVIRONMENT VARIABLES:
  PSKGATE_CONFIG         Path of the tunnel descriptor
  PSKGATE_PSK_IDENTITY   PSK identity
  PSKGATE_PSK_KEY        PSK secret
    "#)]
    Run {
        #[command(flatten)]
        source: ConfigArgs,

        /// Seconds allowed for resolving and connecting to the remote host
        #[arg(long, default_value = "10")]
        connect_timeout: u64,

        /// Seconds allowed for the PSK handshake
        #[arg(long, default_value = "10")]
        handshake_timeout: u64,

        /// Bind attempts when the local port is still in use
        #[arg(long, default_value = "1")]
        bind_attempts: u32,

        /// Resolve the remote host before listening and fail if it does not resolve
        #[arg(long)]
        verify_remote: bool,

        /// Fixed address for a host name, as HOST=IP (repeatable)
        #[arg(long = "resolve", value_name = "HOST=IP", value_parser = parse_host_override)]
        resolve: Vec<(String, IpAddr)>,
    },

    /// Validate the descriptor and print the effective tunnel settings
    Check {
        #[command(flatten)]
        source: ConfigArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Tunnel descriptor (JSON)
    #[arg(long, short = 'c', env = "PSKGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Local port to listen on (0 or negative picks a random port)
    #[arg(long, allow_negative_numbers = true)]
    local_port: Option<i64>,

    /// Remote host running the PSK-TLS endpoint
    #[arg(long)]
    remote_address: Option<String>,

    /// Remote port (0, negative or absent means 443)
    #[arg(long, allow_negative_numbers = true)]
    remote_port: Option<i64>,

    /// PSK identity
    #[arg(long, env = "PSKGATE_PSK_IDENTITY")]
    identity: Option<String>,

    /// PSK secret
    #[arg(long, env = "PSKGATE_PSK_KEY", hide_env_values = true)]
    key: Option<String>,
}

impl ConfigArgs {
    /// Load the descriptor and apply command-line overrides.
    ///
    /// A missing default descriptor is not an error when everything needed is
    /// given on the command line; an explicitly named one must exist.
    fn descriptor(&self) -> Result<TunnelDescriptor> {
        let mut descriptor = match &self.config {
            Some(path) => load_descriptor(path)?,
            None if Path::new(DEFAULT_DESCRIPTOR_PATH).exists() => {
                load_descriptor(Path::new(DEFAULT_DESCRIPTOR_PATH))?
            }
            None => TunnelDescriptor::default(),
        };

        self.apply_overrides(&mut descriptor);
        Ok(descriptor)
    }

    fn apply_overrides(&self, descriptor: &mut TunnelDescriptor) {
        if self.local_port.is_some() {
            descriptor.local_port = self.local_port;
        }
        if self.remote_address.is_some() {
            descriptor.remote_address = self.remote_address.clone();
        }
        if self.remote_port.is_some() {
            descriptor.remote_port = self.remote_port;
        }
        if self.identity.is_some() || self.key.is_some() {
            let psk = descriptor
                .pre_shared_key
                .get_or_insert_with(PresharedKeyDescriptor::default);
            if self.identity.is_some() {
                psk.identity = self.identity.clone();
            }
            if self.key.is_some() {
                psk.key = self.key.clone();
            }
        }
    }

    fn tunnel_config(&self) -> Result<TunnelConfig> {
        self.descriptor()?
            .into_config()
            .context("Tunnel configuration is missing or invalid")
    }
}

fn load_descriptor(path: &Path) -> Result<TunnelDescriptor> {
    info!("Loading tunnel descriptor from {}", path.display());
    TunnelDescriptor::from_path(path)
        .with_context(|| format!("Failed to load tunnel descriptor {}", path.display()))
}

fn parse_host_override(value: &str) -> Result<(String, IpAddr), String> {
    let (host, ip) = value
        .split_once('=')
        .ok_or_else(|| format!("expected HOST=IP, got '{}'", value))?;
    if host.is_empty() {
        return Err("host name must not be empty".to_string());
    }
    let ip = ip
        .parse::<IpAddr>()
        .map_err(|e| format!("invalid IP address '{}': {}", ip, e))?;
    Ok((host.to_string(), ip))
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool, log_level: &str) {
    let log_level = if verbose { "debug" } else { log_level };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

async fn run_tunnel(config: TunnelConfig, options: TunnelOptions) -> Result<()> {
    info!(
        "Starting tunnel 127.0.0.1:{} -> {}",
        config.local_port(),
        config.remote_authority()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let pending = TunnelLauncher::spawn(config, options);

    // Ctrl+C during start-up drops the pending tunnel, which closes it
    let handle = tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C before the tunnel was ready, shutting down...");
            return Ok(());
        }
        result = pending.wait() => result.context("Failed to start tunnel")?,
    };

    info!("Tunnel ready, open {} in a browser", handle.local_url());
    println!("{}", handle.local_url());

    if let Err(e) = (&mut ctrl_c).await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");

    handle.close();
    if tokio::time::timeout(Duration::from_secs(5), handle.wait_closed())
        .await
        .is_err()
    {
        warn!("Tunnel sessions did not stop within 5 seconds");
    }

    let stats = handle.stats();

    info!(
        "Tunnel stopped ({} connections, {} failed handshakes, {}B up, {}B down)",
        stats.accepted, stats.failed_handshakes, stats.bytes_to_remote, stats.bytes_to_local
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, &cli.log_level);

    match cli.command {
        Commands::Run {
            source,
            connect_timeout,
            handshake_timeout,
            bind_attempts,
            verify_remote,
            resolve,
        } => {
            let config = source.tunnel_config()?;

            let mut options = TunnelOptions::default()
                .with_connect_timeout(Duration::from_secs(connect_timeout))
                .with_handshake_timeout(Duration::from_secs(handshake_timeout))
                .with_bind_attempts(bind_attempts)
                .with_verify_remote(verify_remote);
            for (host, ip) in resolve {
                options = options.with_host_override(host, ip);
            }

            run_tunnel(config, options).await
        }
        Commands::Check { source } => {
            let config = source.tunnel_config()?;
            println!("local:    127.0.0.1:{}", config.local_port());
            println!("remote:   {}", config.remote_authority());
            println!("identity: {}", config.psk().identity());
            Ok(())
        }
    }
}
