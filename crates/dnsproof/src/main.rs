use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dnsproof::{challenge, CleanupOutcome, DnsproofConfig, ProvisioningEngine};

/// dnsproof - publish and retract ACME DNS-01 challenge records
#[derive(Parser, Debug)]
#[command(name = "dnsproof")]
#[command(about = "Provision DNS-01 challenge TXT records through a DNS provider API")]
struct Cli {
    /// Config file (TOML); environment variables take priority
    #[arg(short, long, default_value = dnsproof::config::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish the challenge record, wait, then remove it
    Present {
        /// Domain under validation (wildcards accepted)
        #[arg(long)]
        domain: String,

        /// Challenge token issued by the CA
        #[arg(long)]
        token: String,

        /// Key authorization (token.thumbprint)
        #[arg(long)]
        key_auth: String,

        /// Remove the record after this many seconds instead of waiting for a signal
        #[arg(long)]
        hold_secs: Option<u64>,
    },

    /// Print the record name and value without touching the provider
    Record {
        #[arg(long)]
        domain: String,

        #[arg(long)]
        key_auth: String,
    },

    /// Print the propagation timeout and polling interval
    Timeout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dnsproof=info".parse()?),
        )
        .init();

    match cli.command {
        Commands::Record { domain, key_auth } => {
            let descriptor = challenge::derive(&domain, "", &key_auth);
            println!("{}\tTXT\t\"{}\"", descriptor.effective_name, descriptor.expected_value);
            Ok(())
        }
        Commands::Timeout => {
            let engine = build_engine(&cli.config)?;
            let (timeout, interval) = engine.timeout();
            println!("timeout={}s interval={}s", timeout.as_secs(), interval.as_secs());
            Ok(())
        }
        Commands::Present {
            domain,
            token,
            key_auth,
            hold_secs,
        } => {
            let engine = build_engine(&cli.config)?;
            run_present(&engine, &domain, &token, &key_auth, hold_secs).await
        }
    }
}

fn build_engine(config_path: &str) -> Result<ProvisioningEngine> {
    let resolved = DnsproofConfig::load_and_resolve(config_path)
        .context("Failed to resolve configuration")?;
    let engine = ProvisioningEngine::from_config(resolved).context("Failed to create engine")?;
    tracing::info!(backend = engine.backend_name(), ttl = engine.ttl(), "Engine ready");
    Ok(engine)
}

async fn run_present(
    engine: &ProvisioningEngine,
    domain: &str,
    token: &str,
    key_auth: &str,
    hold_secs: Option<u64>,
) -> Result<()> {
    engine
        .present(domain, token, key_auth)
        .await
        .with_context(|| format!("Failed to present challenge for {}", domain))?;

    let descriptor = engine.descriptor(domain, token, key_auth);
    let (timeout, interval) = engine.timeout();
    println!("{}\tTXT\t\"{}\"", descriptor.effective_name, descriptor.expected_value);
    tracing::info!(
        record = %descriptor.effective_name,
        timeout_secs = timeout.as_secs(),
        interval_secs = interval.as_secs(),
        "Record published, waiting before cleanup"
    );

    let hold = async {
        match hold_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = hold => {
            tracing::info!("Hold period elapsed");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let outcome = engine
        .cleanup(domain, token, key_auth)
        .await
        .with_context(|| format!("Failed to clean up challenge for {}", domain))?;

    match outcome {
        CleanupOutcome::Deleted => tracing::info!("Challenge record removed"),
        CleanupOutcome::AlreadyAbsent => tracing::info!("Challenge record was already gone"),
    }
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
