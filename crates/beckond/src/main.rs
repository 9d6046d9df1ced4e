//! beckond - The beckon session service
//!
//! This is the main entry point for the beckond service.
//! It wires together all the components:
//! - Configuration loading
//! - Session log
//! - Event bus
//! - Scheduler
//! - Interaction relay
//! - Notification injection from stdin

use anyhow::{Context, Result};
use beckon_api::{EventName, Notification};
use beckon_bus::{EventBus, MemoryBus};
use beckon_config::{Policy, load_config_or_default};
use beckon_core::Scheduler;
use beckon_relay::{CommandActuator, Relay, RelayHandle};
use beckon_store::{FileSessionLog, SessionLog};
use beckon_util::default_config_path;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// beckond - Calls a child and watches for a response
#[derive(Parser, Debug)]
#[command(name = "beckond")]
#[command(about = "Calls a child and watches for a response", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/beckon/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Session log directory override (or set BECKON_LOG_DIR env var)
    #[arg(short = 'd', long, env = "BECKON_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Do not read notifications from stdin
    #[arg(long)]
    no_stdin: bool,
}

/// Main service state
struct Service {
    policy: Policy,
    bus: Arc<MemoryBus>,
    log: Arc<dyn SessionLog>,
    read_stdin: bool,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let policy = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            by_name_attempts = policy.scheduler.by_name_attempts,
            special_phrase_until = policy.scheduler.special_phrase_until,
            "Configuration loaded"
        );

        let log_dir = args
            .log_dir
            .clone()
            .unwrap_or_else(|| policy.log.dir.clone());

        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;

        info!(log_dir = %log_dir.display(), "Session log initialized");

        Ok(Self {
            policy,
            bus: Arc::new(MemoryBus::with_all_declared()),
            log: Arc::new(FileSessionLog::new(log_dir)),
            read_stdin: !args.no_stdin,
        })
    }

    async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();

        let (scheduler, scheduler_task) = Scheduler::spawn(
            self.policy.scheduler,
            self.bus.clone(),
            self.log.clone(),
            shutdown.clone(),
        );

        let actuator = Arc::new(CommandActuator::new(self.policy.relay.player.clone()));
        let (relay, relay_task) = Relay::spawn(
            self.policy.relay.clone(),
            self.bus.clone(),
            actuator,
            shutdown.clone(),
        );

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;
        let mut sigusr1 =
            signal(SignalKind::user_defined1()).context("Failed to create SIGUSR1 handler")?;

        let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = self.read_stdin;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // SIGUSR1 stands in for the activation button
                _ = sigusr1.recv() => {
                    Self::activate(&relay);
                }

                line = stdin_lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => self.inject(&line),
                    Ok(None) => {
                        debug!("stdin closed, no more notifications");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin, ignoring it from now on");
                        stdin_open = false;
                    }
                },
            }
        }

        // Graceful shutdown
        info!("Shutting down beckond");

        match scheduler.snapshot().await {
            Ok(snapshot) => info!(
                sessions_started = snapshot.sessions_started,
                state = ?snapshot.state,
                "Scheduler state at shutdown"
            ),
            Err(e) => warn!(error = %e, "Failed to query scheduler"),
        }

        shutdown.cancel();
        Self::join("scheduler", scheduler_task).await;
        Self::join("relay", relay_task).await;

        match self.bus.read_latest(EventName::EndSession) {
            Ok(Some(outcome)) => info!(outcome = ?outcome, "Last session outcome"),
            Ok(None) => debug!("No session ended during this run"),
            Err(e) => warn!(error = %e, "Failed to read last session outcome"),
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn activate(relay: &RelayHandle) {
        if let Err(e) = relay.activate() {
            warn!(error = %e, "Failed to activate relay");
        }
    }

    /// Raise a notification read from stdin
    fn inject(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let notification: Notification = match serde_json::from_str(line) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, line, "Ignoring malformed notification");
                return;
            }
        };

        debug!(event = %notification.event, value = ?notification.value, "Injecting notification");

        if let Err(e) = self.bus.raise(notification.event, notification.value) {
            warn!(event = %notification.event, error = %e, "Failed to raise notification");
        }
    }

    async fn join(name: &str, task: JoinHandle<()>) {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Task ended abnormally");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "beckond starting");

    if beckon_util::is_mock_time_active() {
        warn!(now = %beckon_util::now(), "Mock time is active, log file names use it");
    }

    // Create and run the service
    let service = Service::new(&args)?;
    service.run().await
}
