use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use vigil_service::config::Config;
use vigil_service::monitoring::ProbeOutcome;
use vigil_service::orchestrator::{Engine, Orchestrator};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version, about = "Vigil - monitor execution and alerting engine")]
struct Cli {
    /// Path to the config file (defaults to $XDG_CONFIG_HOME/vigil/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine until interrupted
    Run,

    /// Probe one monitor now and print the result without recording it
    Check {
        monitor_id: i64,
    },

    /// Record a heartbeat for a push monitor
    Push {
        monitor_id: i64,

        /// Report the job as failed
        #[arg(long)]
        down: bool,

        /// Message attached to the heartbeat
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List stored monitors with their last known status
    Monitors,

    /// Send a test message through one notification channel
    TestChannel {
        channel_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let orchestrator = Orchestrator::new(config.clone()).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("{config}");
            let engine = orchestrator.start().await?;
            wait_for_signals(&engine).await?;
            engine.shutdown().await;
        }
        Command::Check { monitor_id } => {
            let result = orchestrator.check_once(monitor_id).await?;
            println!("{}: {}", result.outcome, result.detail());
        }
        Command::Push { monitor_id, down, message } => {
            let outcome = if down { ProbeOutcome::Failure } else { ProbeOutcome::Success };
            orchestrator.record_push(monitor_id, outcome, message).await?;
            println!("Heartbeat recorded for monitor {monitor_id}");
        }
        Command::TestChannel { channel_id } => {
            let outcome = orchestrator.test_channel(channel_id).await?;
            if outcome.delivered {
                println!("Test message delivered through channel {channel_id} ({}ms)", outcome.elapsed_ms);
            } else {
                let reason = outcome.reason.unwrap_or_default();
                anyhow::bail!("Test message through channel {channel_id} failed: {reason}");
            }
        }
        Command::Monitors => {
            for (record, state) in orchestrator.monitor_overview().await? {
                let status = state.map(|s| s.status.to_string()).unwrap_or_else(|| "unknown".into());
                println!(
                    "{:>5}  {:<8}  {:<8}  {:<24}  {}{}",
                    record.id.unwrap_or_default(),
                    status,
                    record.kind,
                    record.name,
                    record.target,
                    if record.enabled { "" } else { "  (disabled)" },
                );
            }
        }
    }

    Ok(())
}

/// Ctrl-C stops the engine; SIGHUP reloads configuration; SIGUSR1 checks everything now.
#[cfg(unix)]
async fn wait_for_signals(engine: &Engine) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                return Ok(());
            }
            _ = hangup.recv() => engine.scheduler().reload(),
            _ = user1.recv() => {
                let queued = engine.scheduler().check_all();
                info!(queued, "Forced check of all monitors");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_engine: &Engine) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
