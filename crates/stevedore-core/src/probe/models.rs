use serde::{Deserialize, Serialize};

use crate::observability::now_utc_rfc3339_millis;

/// The fixed battery of host prerequisite checks, in execution order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    OsCompatibility,
    Virtualization,
    Wsl,
    DiskSpace,
    EngineInstalled,
    EngineRunning,
}

impl CheckKind {
    pub const ALL: [Self; 6] = [
        Self::OsCompatibility,
        Self::Virtualization,
        Self::Wsl,
        Self::DiskSpace,
        Self::EngineInstalled,
        Self::EngineRunning,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::OsCompatibility => "os-compatibility",
            Self::Virtualization => "virtualization",
            Self::Wsl => "wsl",
            Self::DiskSpace => "disk-space",
            Self::EngineInstalled => "engine-installed",
            Self::EngineRunning => "engine-running",
        }
    }

    /// Explicit criticality table: critical checks block progression to
    /// configuration, informational ones never do.
    pub fn criticality(self) -> Criticality {
        match self {
            Self::OsCompatibility | Self::Virtualization | Self::DiskSpace => {
                Criticality::Critical
            }
            Self::Wsl | Self::EngineInstalled | Self::EngineRunning => Criticality::Informational,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    Informational,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub name: String,
    pub criticality: Criticality,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn new(kind: CheckKind, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            criticality: kind.criticality(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Firmware virtualization support as reported by the host, classified into
/// an explicit tri-state instead of a bare substring hit.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum VirtualizationState {
    Supported,
    Unsupported,
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckReport {
    pub generated_at: String,
    pub checks: Vec<CheckResult>,
    pub all_critical_passed: bool,
    pub engine_installed: bool,
    pub engine_running: bool,
}

impl CheckReport {
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let all_critical_passed = checks
            .iter()
            .filter(|check| check.criticality == Criticality::Critical)
            .all(|check| check.passed);
        let engine_installed = check_passed(&checks, CheckKind::EngineInstalled);
        let engine_running = check_passed(&checks, CheckKind::EngineRunning);

        Self {
            generated_at: now_utc_rfc3339_millis(),
            checks,
            all_critical_passed,
            engine_installed,
            engine_running,
        }
    }

    /// Replaces the two engine check results and recomputes the summary
    /// flags, for callers that change engine state after the battery ran.
    pub fn with_engine_checks(&self, installed: CheckResult, running: CheckResult) -> Self {
        let checks = self
            .checks
            .iter()
            .filter(|check| {
                !matches!(
                    check.kind,
                    CheckKind::EngineInstalled | CheckKind::EngineRunning
                )
            })
            .cloned()
            .chain([installed, running])
            .collect();

        Self::from_checks(checks)
    }

    pub fn failed_critical_names(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| check.criticality == Criticality::Critical && !check.passed)
            .map(|check| check.name.clone())
            .collect()
    }
}

fn check_passed(checks: &[CheckResult], kind: CheckKind) -> bool {
    checks
        .iter()
        .find(|check| check.kind == kind)
        .is_some_and(|check| check.passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_report(os: bool, virt: bool, disk: bool, installed: bool) -> CheckReport {
        CheckReport::from_checks(vec![
            CheckResult::new(CheckKind::OsCompatibility, os, "os"),
            CheckResult::new(CheckKind::Virtualization, virt, "virt"),
            CheckResult::new(CheckKind::Wsl, false, "wsl missing"),
            CheckResult::new(CheckKind::DiskSpace, disk, "disk"),
            CheckResult::new(CheckKind::EngineInstalled, installed, "engine"),
            CheckResult::new(CheckKind::EngineRunning, false, "not running"),
        ])
    }

    #[test]
    fn critical_classification_matches_declared_table() {
        assert_eq!(
            CheckKind::OsCompatibility.criticality(),
            Criticality::Critical
        );
        assert_eq!(
            CheckKind::Virtualization.criticality(),
            Criticality::Critical
        );
        assert_eq!(CheckKind::DiskSpace.criticality(), Criticality::Critical);
        assert_eq!(CheckKind::Wsl.criticality(), Criticality::Informational);
        assert_eq!(
            CheckKind::EngineInstalled.criticality(),
            Criticality::Informational
        );
        assert_eq!(
            CheckKind::EngineRunning.criticality(),
            Criticality::Informational
        );
    }

    #[test]
    fn informational_failures_never_block() {
        let report = synthetic_report(true, true, true, false);
        assert!(report.all_critical_passed);
        assert!(!report.engine_installed);
        assert!(report.failed_critical_names().is_empty());
    }

    #[test]
    fn engine_checks_can_be_refreshed_after_state_changes() {
        let stale = synthetic_report(true, true, true, false);
        assert!(!stale.engine_installed);

        let refreshed = stale.with_engine_checks(
            CheckResult::new(CheckKind::EngineInstalled, true, "Docker version 27"),
            CheckResult::new(CheckKind::EngineRunning, true, "engine daemon is running"),
        );

        assert!(refreshed.engine_installed);
        assert!(refreshed.engine_running);
        let kinds: Vec<CheckKind> = refreshed.checks.iter().map(|check| check.kind).collect();
        assert_eq!(kinds, CheckKind::ALL.to_vec());
    }

    #[test]
    fn any_critical_failure_blocks() {
        let report = synthetic_report(true, false, true, true);
        assert!(!report.all_critical_passed);
        assert_eq!(report.failed_critical_names(), vec!["virtualization"]);
    }
}
