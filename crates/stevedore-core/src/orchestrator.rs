//! The deployment sequence made explicit: prerequisite checks, conditional
//! engine install, environment configuration, readiness gate.
//!
//! Stage transitions are the contract callers (CLI, automation) observe.
//! `ChecksFailed` and `InstallFailed` are terminal for a run; both are
//! retryable by invoking `run_setup` again after remediation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::compose::{ensure_directories, render_config, write_config};
use crate::engine::{EngineManager, ServiceStatus};
use crate::error::SetupError;
use crate::installer::{InstallProgress, Installer};
use crate::observability::{log_event, LogLevel};
use crate::probe::{CheckReport, SystemProbe};
use crate::settings::{Settings, SettingsStore};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    NotStarted,
    Checking,
    ChecksFailed,
    NeedsEngineInstall,
    ChecksPassed,
    Installing,
    InstallFailed,
    ConfiguringEnv,
    ConfigGenerated,
    Ready,
}

#[derive(Debug, Serialize, Clone)]
pub struct SetupOutcome {
    pub stage: SetupStage,
    pub report: CheckReport,
    pub failed_critical: Vec<String>,
    pub install_error: Option<String>,
    pub compose_file: Option<PathBuf>,
    pub engine_running: bool,
}

#[derive(Debug)]
pub struct Orchestrator {
    store: SettingsStore,
    probe: SystemProbe,
    engine: EngineManager,
    installer: Installer,
    stage: SetupStage,
    trace_id: String,
}

impl Orchestrator {
    pub fn new(store: SettingsStore, trace_id: impl Into<String>) -> Self {
        Self {
            store,
            probe: SystemProbe::default(),
            engine: EngineManager::default(),
            installer: Installer::default(),
            stage: SetupStage::NotStarted,
            trace_id: trace_id.into(),
        }
    }

    pub fn stage(&self) -> SetupStage {
        self.stage
    }

    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    pub fn store_mut(&mut self) -> &mut SettingsStore {
        &mut self.store
    }

    pub fn probe(&self) -> &SystemProbe {
        &self.probe
    }

    /// Runs the deployment sequence once. Terminal check/install failures are
    /// reported through the outcome's stage; filesystem failures while
    /// configuring the environment are raised as typed errors.
    pub async fn run_setup(
        &mut self,
        install_if_missing: bool,
        progress: mpsc::Sender<InstallProgress>,
    ) -> Result<SetupOutcome, SetupError> {
        self.transition(SetupStage::Checking);
        let mut report = self.probe.run_all();
        self.log_failed_checks(&report);

        let next = stage_after_checks(&report);
        self.transition(next);

        match next {
            SetupStage::ChecksFailed => return Ok(self.outcome(&report, None, None)),
            SetupStage::NeedsEngineInstall if !install_if_missing => {
                return Ok(self.outcome(&report, None, None));
            }
            SetupStage::NeedsEngineInstall => {
                self.transition(SetupStage::Installing);
                if let Err(err) = self.installer.install(progress).await {
                    self.transition(SetupStage::InstallFailed);
                    return Ok(self.outcome(&report, Some(err.to_string()), None));
                }

                // The pre-install report is stale on the engine checks now;
                // re-query them so the outcome reflects the installed engine.
                report = report.with_engine_checks(
                    self.probe.check_engine_installed(),
                    self.probe.check_engine_running(),
                );
            }
            _ => {}
        }

        self.transition(SetupStage::ConfiguringEnv);
        ensure_directories(self.store.settings())?;

        let config = render_config(self.store.settings());
        let compose_file = self.store.settings().compose_file.clone();
        write_config(&config, &compose_file)?;
        self.transition(SetupStage::ConfigGenerated);

        let engine_running = self.probe.check_engine_running().passed;
        if engine_running {
            self.transition(SetupStage::Ready);
            self.store.update(|settings| settings.setup_completed = true);
        }

        Ok(self.outcome(&report, None, Some(compose_file)))
    }

    /// Caller-driven lifecycle, available once configuration exists. Start is
    /// gated on the engine daemon; a stopped daemon is an explicit typed
    /// outcome rather than an opaque engine-command failure.
    pub fn start_service(&self) -> Result<String, SetupError> {
        if !self.probe.check_engine_running().passed {
            return Err(SetupError::EngineNotRunning);
        }

        self.engine.start(&self.store.settings().compose_file)
    }

    pub fn stop_service(&self) -> Result<String, SetupError> {
        self.engine.stop(&self.store.settings().compose_file)
    }

    pub fn restart_service(&self) -> Result<String, SetupError> {
        if !self.probe.check_engine_running().passed {
            return Err(SetupError::EngineNotRunning);
        }

        self.engine.restart(&self.store.settings().compose_file)
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.engine.status()
    }

    pub fn tail_logs(&self, tail_lines: u32) -> Result<String, SetupError> {
        self.engine.tail_logs(tail_lines)
    }

    fn outcome(
        &self,
        report: &CheckReport,
        install_error: Option<String>,
        compose_file: Option<PathBuf>,
    ) -> SetupOutcome {
        SetupOutcome {
            stage: self.stage,
            failed_critical: report.failed_critical_names(),
            install_error,
            compose_file,
            engine_running: matches!(self.stage, SetupStage::Ready),
            report: report.clone(),
        }
    }

    fn transition(&mut self, to: SetupStage) {
        let from = self.stage;
        self.stage = to;

        log_event(
            &self.trace_id,
            LogLevel::Info,
            "orchestrator",
            "SV-OR-010",
            "stage_transition",
            serde_json::json!({
                "from": format!("{from:?}"),
                "to": format!("{to:?}"),
            }),
        );
    }

    fn log_failed_checks(&self, report: &CheckReport) {
        for check in report.checks.iter().filter(|check| !check.passed) {
            log_event(
                &self.trace_id,
                LogLevel::Warn,
                "probe",
                "SV-PR-020",
                "check_failed",
                serde_json::json!({
                    "check": check.name,
                    "criticality": format!("{:?}", check.criticality),
                    "detail": check.detail,
                }),
            );
        }
    }
}

/// Pure stage resolution after the check battery: critical failures block,
/// a missing engine routes through install, otherwise checks pass.
fn stage_after_checks(report: &CheckReport) -> SetupStage {
    if !report.all_critical_passed {
        SetupStage::ChecksFailed
    } else if !report.engine_installed {
        SetupStage::NeedsEngineInstall
    } else {
        SetupStage::ChecksPassed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{CheckKind, CheckResult};

    fn report(os: bool, virt: bool, disk: bool, installed: bool, running: bool) -> CheckReport {
        CheckReport::from_checks(vec![
            CheckResult::new(CheckKind::OsCompatibility, os, "os"),
            CheckResult::new(CheckKind::Virtualization, virt, "virt"),
            CheckResult::new(CheckKind::Wsl, true, "wsl"),
            CheckResult::new(CheckKind::DiskSpace, disk, "disk"),
            CheckResult::new(CheckKind::EngineInstalled, installed, "engine"),
            CheckResult::new(CheckKind::EngineRunning, running, "daemon"),
        ])
    }

    #[test]
    fn critical_failure_is_terminal() {
        let resolved = stage_after_checks(&report(false, true, true, true, true));
        assert_eq!(resolved, SetupStage::ChecksFailed);
    }

    #[test]
    fn missing_engine_routes_through_install() {
        let resolved = stage_after_checks(&report(true, true, true, false, false));
        assert_eq!(resolved, SetupStage::NeedsEngineInstall);
    }

    #[test]
    fn informational_failures_do_not_block() {
        // WSL and daemon state never gate the checks-passed stage.
        let resolved = stage_after_checks(&report(true, true, true, true, false));
        assert_eq!(resolved, SetupStage::ChecksPassed);
    }
}
