//! Lifecycle control of the containerized workload.
//!
//! All operations shell out to the engine CLI and block until it exits or the
//! deadline fires. Calls against the same container are serialized through an
//! internal lock so start/stop/status cannot interleave destructively.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compose::CONTAINER_NAME;
use crate::error::SetupError;
use crate::process::{run_command, CommandOutcome, CommandSpec, CommandStatus};

const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(300);
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

pub const NOT_RUNNING_DETAIL: &str = "not running";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub running: bool,
    pub raw_status: String,
}

#[derive(Debug)]
pub struct EngineManager {
    container_name: String,
    // Serializes lifecycle calls per manager; the engine itself provides no
    // mutual exclusion for concurrent up/down against one compose file.
    lifecycle_lock: Mutex<()>,
}

impl Default for EngineManager {
    fn default() -> Self {
        Self::new(CONTAINER_NAME)
    }
}

impl EngineManager {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            lifecycle_lock: Mutex::new(()),
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// `docker-compose -f <file> up -d`, cwd set to the compose directory.
    /// Returns captured stdout on success.
    pub fn start(&self, compose_file: &Path) -> Result<String, SetupError> {
        self.compose_command(compose_file, &["up", "-d"])
    }

    /// Symmetric `down`.
    pub fn stop(&self, compose_file: &Path) -> Result<String, SetupError> {
        self.compose_command(compose_file, &["down"])
    }

    /// Stop-then-start with the lock held across both, so no other lifecycle
    /// call interleaves between the `down` and the `up`.
    pub fn restart(&self, compose_file: &Path) -> Result<String, SetupError> {
        let _guard = self.lock();

        self.compose_action(compose_file, &["down"])?;
        self.compose_action(compose_file, &["up", "-d"])
    }

    /// Never an error: an absent or stopped container is the normal
    /// `(false, "not running")` outcome.
    pub fn status(&self) -> ServiceStatus {
        let _guard = self.lock();

        let filter = format!("name={}", self.container_name);
        let outcome = run_command(&CommandSpec::new(
            "docker",
            &["ps", "-a", "--filter", &filter, "--format", "{{.Status}}"],
            QUERY_TIMEOUT,
        ));

        classify_status(&outcome)
    }

    /// Last `tail_lines` lines of the container's combined stdout/stderr.
    pub fn tail_logs(&self, tail_lines: u32) -> Result<String, SetupError> {
        let _guard = self.lock();

        let tail = tail_lines.to_string();
        let spec = CommandSpec::new(
            "docker",
            &["logs", &self.container_name, "--tail", &tail],
            QUERY_TIMEOUT,
        );
        let outcome = run_command(&spec);

        match outcome.status {
            // The engine writes container output to both pipes; combine them
            // the way a terminal would show them.
            CommandStatus::Success => Ok(format!("{}{}", outcome.stdout, outcome.stderr)),
            CommandStatus::TimedOut => Err(timeout_error(&outcome, QUERY_TIMEOUT)),
            _ => Err(engine_error(&outcome)),
        }
    }

    fn compose_command(&self, compose_file: &Path, action: &[&str]) -> Result<String, SetupError> {
        let _guard = self.lock();
        self.compose_action(compose_file, action)
    }

    // Caller holds the lifecycle lock.
    fn compose_action(&self, compose_file: &Path, action: &[&str]) -> Result<String, SetupError> {
        let file = compose_file.display().to_string();
        let mut args = vec!["-f", file.as_str()];
        args.extend_from_slice(action);

        let mut spec = CommandSpec::new("docker-compose", &args, LIFECYCLE_TIMEOUT);
        if let Some(dir) = compose_file.parent() {
            spec = spec.with_cwd(dir.to_path_buf());
        }

        let outcome = run_command(&spec);
        match outcome.status {
            CommandStatus::Success => Ok(outcome.stdout),
            CommandStatus::TimedOut => Err(timeout_error(&outcome, LIFECYCLE_TIMEOUT)),
            _ => Err(engine_error(&outcome)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // A poisoned lock only means another lifecycle call panicked; the
        // guarded state is the external engine, so continuing is safe.
        self.lifecycle_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn classify_status(outcome: &CommandOutcome) -> ServiceStatus {
    if !outcome.success() {
        return ServiceStatus {
            running: false,
            raw_status: NOT_RUNNING_DETAIL.to_string(),
        };
    }

    let raw = outcome.stdout.lines().next().unwrap_or("").trim().to_string();
    if raw.is_empty() {
        return ServiceStatus {
            running: false,
            raw_status: NOT_RUNNING_DETAIL.to_string(),
        };
    }

    ServiceStatus {
        running: raw.starts_with("Up"),
        raw_status: raw,
    }
}

fn engine_error(outcome: &CommandOutcome) -> SetupError {
    let stderr = if outcome.stderr.trim().is_empty() {
        outcome
            .error
            .clone()
            .unwrap_or_else(|| "engine command failed".to_string())
    } else {
        outcome.stderr.trim().to_string()
    };

    SetupError::Engine {
        command: outcome.command_line(),
        stderr,
    }
}

fn timeout_error(outcome: &CommandOutcome, timeout: Duration) -> SetupError {
    SetupError::Timeout {
        command: outcome.command_line(),
        secs: timeout.as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: CommandStatus, stdout: &str) -> CommandOutcome {
        CommandOutcome {
            program: "docker".to_string(),
            args: vec!["ps".to_string()],
            status,
            exit_code: None,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 0,
            error: None,
        }
    }

    #[test]
    fn absent_container_is_not_running_sentinel() {
        let status = classify_status(&outcome(CommandStatus::Success, ""));
        assert_eq!(
            status,
            ServiceStatus {
                running: false,
                raw_status: NOT_RUNNING_DETAIL.to_string(),
            }
        );
    }

    #[test]
    fn failed_query_is_not_running_not_an_error() {
        let status = classify_status(&outcome(CommandStatus::SpawnFailed, ""));
        assert!(!status.running);
        assert_eq!(status.raw_status, NOT_RUNNING_DETAIL);
    }

    #[test]
    fn up_status_is_running_with_raw_detail() {
        let status = classify_status(&outcome(CommandStatus::Success, "Up 3 minutes\n"));
        assert!(status.running);
        assert_eq!(status.raw_status, "Up 3 minutes");
    }

    #[test]
    fn exited_container_reports_raw_status_but_not_running() {
        let status = classify_status(&outcome(CommandStatus::Success, "Exited (0) 2 hours ago\n"));
        assert!(!status.running);
        assert_eq!(status.raw_status, "Exited (0) 2 hours ago");
    }

    #[test]
    fn restart_surfaces_engine_error_when_compose_missing() {
        let manager = EngineManager::new("stevedore-test-container");
        let result = manager.restart(Path::new("/definitely/missing/docker-compose.yaml"));

        // The initial `down` fails the same way `start` does; restart must
        // not mask it or deadlock on the lock it already holds.
        match result {
            Err(SetupError::Engine { command, .. }) => {
                assert!(command.starts_with("docker-compose"));
            }
            Err(SetupError::Timeout { .. }) | Ok(_) => {
                panic!("expected an engine error for a missing compose file")
            }
            Err(other) => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn start_surfaces_engine_error_when_compose_missing() {
        let manager = EngineManager::new("stevedore-test-container");
        let result = manager.start(Path::new("/definitely/missing/docker-compose.yaml"));

        // Either the binary is absent (spawn failure) or compose rejects the
        // missing file; both must surface as a typed engine error.
        match result {
            Err(SetupError::Engine { command, .. }) => {
                assert!(command.starts_with("docker-compose"));
            }
            Err(SetupError::Timeout { .. }) | Ok(_) => {
                panic!("expected an engine error for a missing compose file")
            }
            Err(other) => panic!("unexpected error variant: {other}"),
        }
    }
}
