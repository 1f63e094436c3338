//! RWT Supervisor - runs the PDANet+ reverse-WiFi-tether tunnel script under
//! supervision.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rwt_supervisor::config::{ConfigLoader, SupervisorConfig};
use rwt_supervisor::display::{self, OutputMode};
use rwt_supervisor::events::{event_channel, SupervisorEvent};
use rwt_supervisor::process::LaunchCommand;
use rwt_supervisor::supervisor::{SessionOptions, ShutdownReport, Supervisor};
use rwt_supervisor::watcher::{LogTailer, TailerOptions};

/// Bound on waiting for the log tailer once the session is over.
const TAILER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "rwt-supervisor",
    about = "Supervise the PDANet+ reverse-WiFi-tether tunnel",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tunnel and follow its output until it exits.
    Run {
        /// Tunnel script to run.
        #[arg(long)]
        script: Option<PathBuf>,
        /// Run the script without privilege escalation.
        #[arg(long)]
        no_escalation: bool,
        /// Do not follow the tunnel's log file.
        #[arg(long)]
        no_log: bool,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Show which lines the output filter would suppress.
    CheckFilter {
        /// Lines to check.
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Print the effective configuration.
    ShowConfig,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<SupervisorConfig, String> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    if let Some(found) = loader.find_config_file() {
        tracing::info!(path = %found.display(), "Using config file");
    }
    loader.load().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e);
            std::process::exit(2);
        }
    };

    let code = match cli.command {
        Commands::Run {
            script,
            no_escalation,
            no_log,
            json,
        } => {
            let mut config = config;
            if let Some(script) = script {
                config.process.script_path = script;
            }
            if no_escalation {
                config.process.escalation.clear();
                config.process.privilege_check.clear();
            }
            if no_log {
                config.log.enabled = false;
            }
            let mode = if json {
                OutputMode::Json
            } else {
                OutputMode::Human
            };
            run(config, mode).await
        }
        Commands::CheckFilter { lines } => match config.filter.build_filter() {
            Ok(filter) => {
                for line in &lines {
                    display::print_filter_check(&filter, line);
                }
                0
            }
            Err(e) => {
                display::print_error(&e.to_string());
                2
            }
        },
        Commands::ShowConfig => match toml::to_string_pretty(&config) {
            Ok(text) => {
                print!("{text}");
                0
            }
            Err(e) => {
                display::print_error(&format!("Failed to render config: {e}"));
                1
            }
        },
    };

    std::process::exit(code);
}

/// Run one tunnel session. Returns the exit status for this process.
async fn run(config: SupervisorConfig, mode: OutputMode) -> i32 {
    let filter = match config.filter.build_filter() {
        Ok(filter) => Arc::new(filter),
        Err(e) => {
            display::print_error(&e.to_string());
            return 2;
        }
    };

    // Listen before launching so an early Ctrl-C reaches the stop protocol
    let mut interrupts = match signal(SignalKind::interrupt()) {
        Ok(interrupts) => interrupts,
        Err(e) => {
            display::print_error(&format!("Failed to listen for Ctrl-C: {e}"));
            return 1;
        }
    };

    let (sink, mut events) = event_channel();
    let supervisor = Supervisor::new(Arc::clone(&filter), Arc::clone(&sink))
        .with_options(SessionOptions::from(&config.shutdown));
    let command = LaunchCommand::from_config(&config.process);

    tracing::info!(script = %config.process.script_path.display(), "Starting tunnel");
    let mut handle = match supervisor.start(&command).await {
        Ok(handle) => handle,
        Err(e) => {
            display::print_error(&e.to_string());
            return 1;
        }
    };
    tracing::info!(pid = handle.pid(), pgid = handle.pgid(), "Tunnel launched");

    let tailer = if config.log.enabled {
        match config.log_workspace() {
            Some(workspace) => Some(
                LogTailer::new(workspace, config.log.prefix.clone(), filter, sink)
                    .with_options(TailerOptions::from(&config.log))
                    .spawn(),
            ),
            None => {
                tracing::warn!("No workspace for log tailing");
                None
            }
        }
    } else {
        None
    };

    let mut stopper = tokio::spawn(async move {
        if interrupts.recv().await.is_none() {
            return std::future::pending().await;
        }
        tracing::info!("Interrupt received, stopping tunnel");
        handle.shutdown().await
    });
    let mut stopper_done = false;

    let code = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    display::print_event(&event, mode);
                    if let SupervisorEvent::Terminated(term) = event {
                        break term.exit_code;
                    }
                }
                None => break 1,
            },
            report = &mut stopper, if !stopper_done => {
                stopper_done = true;
                match report {
                    // The termination event is still on its way through the channel.
                    Ok(Ok(ShutdownReport::Completed(_))) => {}
                    Ok(Ok(ShutdownReport::Pending)) => {
                        // Drain whatever already arrived, including the warning.
                        while let Ok(event) = events.try_recv() {
                            display::print_event(&event, mode);
                        }
                        break 1;
                    }
                    Ok(Err(e)) => {
                        display::print_error(&e.to_string());
                        break 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Stop task failed");
                        break 1;
                    }
                }
            }
        }
    };

    stopper.abort();
    if let Some(tailer) = tailer {
        if !tailer.shutdown(TAILER_SHUTDOWN_TIMEOUT).await {
            tracing::warn!("Log tailer did not stop in time");
        }
    }

    code
}
