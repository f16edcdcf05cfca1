//! Pingers Binary Entry Point
//!
//! Probes the configured host on a fixed interval and prints one status line
//! per outcome. Core functionality is provided by the `pingers` library crate.

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use pingers::{
    AppConfig, ConfigError, HistoryRing, PingProber, ProbeTarget, Prober,
    ScheduleConfig, Scheduler,
    config::{DEFAULT_CONFIG_PATH, parse_positive_duration},
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pingers - periodic latency probe
#[derive(Parser, Debug)]
#[command(name = "pingers", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "PINGERS_CONFIG")]
    config: String,

    /// Target host (overrides config file)
    #[arg(long, env = "PINGERS_HOST")]
    host: Option<String>,

    /// Probe interval, e.g. "500ms", "10s" (overrides config file)
    #[arg(long, env = "PINGERS_INTERVAL", value_parser = parse_positive_duration)]
    interval: Option<Duration>,

    /// Probe timeout, e.g. "2s" (overrides config file)
    #[arg(long, env = "PINGERS_TIMEOUT", value_parser = parse_positive_duration)]
    timeout: Option<Duration>,

    /// Probe once, print the result and exit (status 1 when offline)
    #[arg(long)]
    once: bool,

    /// Print JSON lines instead of plain text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; stdout is reserved for status lines
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pingers=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = load_config(&cli)?;
    let probe_config = config.probe_config()?;
    let prober = PingProber::new(config.ping.clone());

    tracing::info!(
        "Target: {}, interval: {:?}, timeout: {:?}, tool: {}",
        probe_config.target,
        config.probe.interval,
        probe_config.timeout,
        prober.tool().program,
    );

    let mut history = HistoryRing::new();

    if cli.once {
        let outcome = prober.probe(&probe_config).await;
        let online = outcome.is_online();
        history.record(outcome, Utc::now());
        report(&history, &probe_config.target, cli.json)?;
        std::process::exit(if online { 0 } else { 1 });
    }

    // The handler only forwards; the consumer loop below does the rendering
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = Scheduler::new(
        prober,
        probe_config,
        config.schedule_config()?,
        move |outcome| {
            if tx.send(outcome).is_err() {
                tracing::debug!("Outcome consumer gone, dropping outcome");
            }
        },
    );
    scheduler.start();

    let mut reload = reload_signal()?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(outcome) = rx.recv() => {
                history.record(outcome, Utc::now());
                report(&history, &scheduler.probe_config().target, cli.json)?;
            }
            _ = wait_reload(&mut reload) => {
                tracing::info!("Reloading configuration from: {}", cli.config);
                if let Err(e) = apply_reload(&cli, &mut scheduler, &mut config) {
                    tracing::error!("Config reload failed, keeping current settings: {}", e);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    scheduler.stop();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load the config file and apply CLI/env overrides (CLI > ENV > config file).
fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = if cli.config == DEFAULT_CONFIG_PATH {
        AppConfig::load_or_default(&cli.config)?
    } else {
        AppConfig::load(&cli.config)?
    };

    if let Some(ref host) = cli.host {
        config.probe.host = host.clone();
    }
    if let Some(interval) = cli.interval {
        config.probe.interval = interval;
    }
    if let Some(timeout) = cli.timeout {
        config.probe.timeout = timeout;
    }

    config.validate()?;
    Ok(config)
}

/// Re-read configuration and swap changed snapshots into the running scheduler.
fn apply_reload(
    cli: &Cli,
    scheduler: &mut Scheduler<PingProber>,
    current: &mut AppConfig,
) -> Result<(), ConfigError> {
    let next = load_config(cli)?;
    let probe_config = next.probe_config()?;
    let schedule: ScheduleConfig = next.schedule_config()?;

    if next.ping != current.ping {
        tracing::warn!("Probe tool settings changed; restart to apply them");
    }
    if probe_config != *scheduler.probe_config() {
        scheduler.reconfigure(probe_config);
    }
    if schedule != scheduler.schedule() {
        scheduler.reconfigure(schedule);
    }

    *current = next;
    Ok(())
}

/// Print the newest outcome together with the retained history.
fn report(
    history: &HistoryRing,
    target: &ProbeTarget,
    json: bool,
) -> Result<(), serde_json::Error> {
    let Some(latest) = history.latest() else {
        return Ok(());
    };

    if json {
        let line = serde_json::json!({
            "host": target.as_str(),
            "online": latest.outcome.is_online(),
            "outcome": latest.outcome,
            "captured_at": latest.captured_at,
            "history": history.entries(),
        });
        println!("{}", serde_json::to_string(&line)?);
    } else {
        let recent: Vec<String> = history
            .iter()
            .map(|entry| entry.outcome.to_string())
            .collect();
        println!(
            "{} {} {} [{}]",
            latest.captured_at.format("%H:%M:%S"),
            target,
            latest.outcome,
            recent.join(", ")
        );
    }
    Ok(())
}

#[cfg(unix)]
type ReloadSignal = tokio::signal::unix::Signal;

#[cfg(unix)]
fn reload_signal() -> std::io::Result<ReloadSignal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
}

#[cfg(unix)]
async fn wait_reload(signal: &mut ReloadSignal) {
    if signal.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
struct ReloadSignal;

#[cfg(not(unix))]
fn reload_signal() -> std::io::Result<ReloadSignal> {
    Ok(ReloadSignal)
}

#[cfg(not(unix))]
async fn wait_reload(_signal: &mut ReloadSignal) {
    std::future::pending::<()>().await;
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
