use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use stevedore_core::installer::{InstallProgress, Installer};
use stevedore_core::observability::{log_event, new_trace_id, LogLevel};
use stevedore_core::orchestrator::{Orchestrator, SetupStage};
use stevedore_core::probe::SystemProbe;
use stevedore_core::settings::SettingsStore;

#[derive(Debug, Parser)]
#[command(name = "stevedore")]
#[command(about = "Deployment assistant for a containerized OpenHands service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the host prerequisite checks and print the report.
    Check,
    /// Run the full deployment sequence: checks, optional engine install,
    /// directory and compose-file generation, readiness gate.
    Setup {
        /// Download and run the engine installer when the engine is absent.
        #[arg(long)]
        install_engine: bool,
    },
    /// Download and silently run the container engine installer.
    Install,
    /// Start the service from the generated compose file.
    Up,
    /// Stop the service.
    Down,
    /// Stop and start the service in one step.
    Restart,
    /// Query the container status.
    Status,
    /// Print the last lines of the container log.
    Logs {
        #[arg(long, default_value_t = 50)]
        tail: u32,
    },
    /// Show or change persisted settings.
    Config {
        #[arg(long)]
        set_port: Option<String>,

        #[arg(long)]
        set_workspace_dir: Option<PathBuf>,

        #[arg(long)]
        set_state_dir: Option<PathBuf>,

        #[arg(long, value_enum)]
        set_auto_start: Option<Toggle>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn as_bool(self) -> bool {
        matches!(self, Self::On)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let trace_id = new_trace_id();

    log_event(
        &trace_id,
        LogLevel::Info,
        "cli",
        "SV-UI-001",
        "stevedore_started",
        serde_json::json!({ "command": format!("{:?}", cli.command) }),
    );

    let store = SettingsStore::open_default(&trace_id);

    match cli.command {
        Command::Check => run_check(&trace_id),
        Command::Setup { install_engine } => run_setup(&trace_id, store, install_engine).await,
        Command::Install => run_install(&trace_id).await,
        Command::Up => run_up(&trace_id, store),
        Command::Down => run_down(&trace_id, store),
        Command::Restart => run_restart(&trace_id, store),
        Command::Status => run_status(&trace_id, store),
        Command::Logs { tail } => run_logs(&trace_id, store, tail),
        Command::Config {
            set_port,
            set_workspace_dir,
            set_state_dir,
            set_auto_start,
        } => run_config(store, set_port, set_workspace_dir, set_state_dir, set_auto_start),
    }
}

fn run_check(trace_id: &str) -> anyhow::Result<()> {
    let report = SystemProbe::default().run_all();

    log_event(
        trace_id,
        LogLevel::Info,
        "probe",
        "SV-PR-001",
        "probe_finished",
        serde_json::json!({
            "all_critical_passed": report.all_critical_passed,
            "engine_installed": report.engine_installed,
            "engine_running": report.engine_running,
        }),
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize check report")?
    );

    if !report.all_critical_passed {
        return Err(anyhow!(
            "critical prerequisite checks failed: {}",
            report.failed_critical_names().join(", ")
        ));
    }

    Ok(())
}

async fn run_setup(
    trace_id: &str,
    store: SettingsStore,
    install_engine: bool,
) -> anyhow::Result<()> {
    let auto_start = store.settings().auto_start;
    let mut orchestrator = Orchestrator::new(store, trace_id);

    let (progress, progress_logger) = spawn_progress_logger(trace_id.to_string());
    let outcome = orchestrator
        .run_setup(install_engine, progress)
        .await
        .context("setup sequence failed")?;
    progress_logger.await.context("progress logger task")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("failed to serialize setup outcome")?
    );

    match outcome.stage {
        SetupStage::ChecksFailed => Err(anyhow!(
            "critical prerequisite checks failed: {}",
            outcome.failed_critical.join(", ")
        )),
        SetupStage::NeedsEngineInstall => Err(anyhow!(
            "container engine is not installed; re-run with --install-engine"
        )),
        SetupStage::InstallFailed => Err(anyhow!(
            "engine install failed: {}",
            outcome.install_error.unwrap_or_default()
        )),
        SetupStage::Ready if auto_start => {
            let output = orchestrator
                .start_service()
                .context("auto-start after setup failed")?;
            log_event(
                trace_id,
                LogLevel::Info,
                "engine",
                "SV-EN-001",
                "service_started",
                serde_json::json!({ "output": output.trim() }),
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn run_install(trace_id: &str) -> anyhow::Result<()> {
    let installer = Installer::default();

    if !installer.is_needed() {
        println!(
            "{}",
            serde_json::json!({ "status": "already-installed" })
        );
        return Ok(());
    }

    let (progress, progress_logger) = spawn_progress_logger(trace_id.to_string());
    installer
        .install(progress)
        .await
        .context("engine install failed")?;
    progress_logger.await.context("progress logger task")?;

    println!("{}", serde_json::json!({ "status": "installed" }));
    Ok(())
}

fn run_up(trace_id: &str, store: SettingsStore) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(store, trace_id);
    let output = orchestrator
        .start_service()
        .context("failed to start the service")?;

    println!(
        "{}",
        serde_json::json!({ "status": "started", "output": output.trim() })
    );
    Ok(())
}

fn run_down(trace_id: &str, store: SettingsStore) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(store, trace_id);
    let output = orchestrator
        .stop_service()
        .context("failed to stop the service")?;

    println!(
        "{}",
        serde_json::json!({ "status": "stopped", "output": output.trim() })
    );
    Ok(())
}

fn run_restart(trace_id: &str, store: SettingsStore) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(store, trace_id);
    let output = orchestrator
        .restart_service()
        .context("failed to restart the service")?;

    println!(
        "{}",
        serde_json::json!({ "status": "restarted", "output": output.trim() })
    );
    Ok(())
}

fn run_status(trace_id: &str, store: SettingsStore) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(store, trace_id);
    let status = orchestrator.service_status();

    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("failed to serialize status")?
    );
    Ok(())
}

fn run_logs(trace_id: &str, store: SettingsStore, tail: u32) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(store, trace_id);
    let logs = orchestrator
        .tail_logs(tail)
        .context("failed to read container logs")?;

    print!("{logs}");
    Ok(())
}

fn run_config(
    mut store: SettingsStore,
    set_port: Option<String>,
    set_workspace_dir: Option<PathBuf>,
    set_state_dir: Option<PathBuf>,
    set_auto_start: Option<Toggle>,
) -> anyhow::Result<()> {
    if let Some(raw) = set_port {
        store
            .set_port(&raw)
            .with_context(|| format!("rejected port value '{raw}'"))?;
    }

    if let Some(dir) = set_workspace_dir {
        store.update(|settings| settings.workspace_dir = dir);
    }

    if let Some(dir) = set_state_dir {
        store.update(|settings| settings.state_dir = dir);
    }

    if let Some(toggle) = set_auto_start {
        store.update(|settings| settings.auto_start = toggle.as_bool());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(store.settings()).context("failed to serialize settings")?
    );
    Ok(())
}

fn spawn_progress_logger(
    trace_id: String,
) -> (mpsc::Sender<InstallProgress>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<InstallProgress>(16);

    let handle = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            log_event(
                &trace_id,
                LogLevel::Info,
                "installer",
                "SV-IN-010",
                "install_progress",
                serde_json::json!({
                    "message": update.message,
                    "percent": update.percent,
                }),
            );
        }
    });

    (tx, handle)
}
