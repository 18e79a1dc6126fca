use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use camwatch::{Engine, MonitorConfig, MonitorState, Snapshot};

#[derive(Parser, Debug)]
#[command(name = "camwatch")]
#[command(about = "Dependency-ordered connectivity monitor for a WebRTC camera pipeline")]
struct Args {
    /// Path to a TOML config file (CAMWATCH_* environment variables
    /// override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signaling relay URL (overrides config)
    #[arg(long)]
    signaling_url: Option<String>,

    /// Detection backend base URL (overrides config)
    #[arg(long)]
    backend_url: Option<String>,

    /// Poll interval in milliseconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single evaluation pass and exit
    #[arg(long)]
    once: bool,

    /// Emit each snapshot as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = MonitorConfig::load(args.config.as_deref())?;
    if let Some(url) = args.signaling_url {
        config.signaling_url = url;
    }
    if let Some(url) = args.backend_url {
        config.backend_base_url = Some(url);
    }
    if let Some(interval) = args.interval {
        config.poll_interval_ms = interval;
    }

    info!(
        signaling = %config.signaling_url,
        backend = config.backend_base_url.as_deref().unwrap_or("<unconfigured>"),
        interval_ms = config.poll_interval_ms,
        "starting camwatch v{}",
        env!("CARGO_PKG_VERSION")
    );

    let json = args.json;
    let engine = Arc::new(
        Engine::builder(config)
            .on_update(move |snapshot| report(&snapshot, json))
            .build(),
    );

    if args.once {
        engine.run_once().await;
        engine.stop().await;
        return Ok(());
    }

    engine.start();
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    engine.stop().await;
    Ok(())
}

/// Print one snapshot, either as a JSON line or as a summary log line.
fn report(snapshot: &Snapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "failed to encode snapshot"),
        }
        return;
    }

    let ok = snapshot
        .values()
        .filter(|b| b.state == MonitorState::Ok)
        .count();
    let failing: Vec<String> = snapshot
        .values()
        .filter(|b| b.state == MonitorState::Fail)
        .map(|b| format!("{}: {}", b.id, b.detail))
        .collect();

    if failing.is_empty() {
        info!("{}/{} blocks OK", ok, snapshot.len());
    } else {
        info!("{}/{} blocks OK; failing: {}", ok, snapshot.len(), failing.join("; "));
    }
}
