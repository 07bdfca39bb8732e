//! Persistent deployment settings.
//!
//! The settings file is a small JSON object under the user config directory.
//! Reads are permissive (unknown keys ignored, missing keys defaulted, parse
//! errors fall back to defaults) and every mutation triggers a full rewrite.
//! Single-process, single-writer: concurrent external edits are not detected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SetupError;
use crate::observability::{log_event, LogLevel};

pub const CONFIG_DIR_NAME: &str = ".stevedore";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yaml";

const DEFAULT_PORT: u16 = 80;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub workspace_dir: PathBuf,
    pub state_dir: PathBuf,
    #[serde(deserialize_with = "deserialize_port_from_string_or_int")]
    pub port: u16,
    pub auto_start: bool,
    pub minimize_to_tray: bool,
    pub check_update: bool,
    pub compose_file: PathBuf,
    pub setup_completed: bool,
    pub last_check: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace_dir: home_dir().join("stevedore-workspace"),
            state_dir: home_dir().join(".openhands-state"),
            port: DEFAULT_PORT,
            auto_start: false,
            minimize_to_tray: true,
            check_update: true,
            compose_file: config_dir().join(COMPOSE_FILE_NAME),
            setup_completed: false,
            last_check: String::new(),
        }
    }
}

/// Owns the settings value and its backing file. There is no ambient global:
/// callers receive `&Settings` and mutate through the store.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    trace_id: String,
}

impl SettingsStore {
    /// Opens the store at the default user-config location.
    pub fn open_default(trace_id: impl Into<String>) -> Self {
        Self::load(config_dir().join(SETTINGS_FILE_NAME), trace_id)
    }

    /// Loads settings from `path`. An absent file is seeded with defaults; an
    /// unreadable or unparsable file degrades to defaults with a warning.
    pub fn load(path: PathBuf, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();

        let settings = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Settings>(&raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log_event(
                        &trace_id,
                        LogLevel::Warn,
                        "settings",
                        "SV-ST-002",
                        "settings_parse_failed_using_defaults",
                        serde_json::json!({
                            "path": path.display().to_string(),
                            "error": err.to_string(),
                        }),
                    );
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };

        let store = Self {
            path,
            settings,
            trace_id,
        };

        if !store.path.exists() {
            store.save_soft();
        }

        store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mutates in memory and immediately persists, fail-soft.
    pub fn update(&mut self, apply: impl FnOnce(&mut Settings)) {
        apply(&mut self.settings);
        self.save_soft();
    }

    /// Validates and persists a new published port. The invariant that `port`
    /// parses to an integer in 1..=65535 is enforced here, before anything is
    /// written or rendered.
    pub fn set_port(&mut self, raw: &str) -> Result<u16, SetupError> {
        let port = validate_port(raw)?;
        self.update(|settings| settings.port = port);
        Ok(port)
    }

    /// Persists and surfaces the I/O error, for callers that must observe it.
    pub fn persist(&self) -> Result<(), SetupError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_vec_pretty(&self.settings)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }

    fn save_soft(&self) {
        if let Err(err) = self.persist() {
            log_event(
                &self.trace_id,
                LogLevel::Warn,
                "settings",
                "SV-ST-003",
                "settings_save_failed",
                serde_json::json!({
                    "path": self.path.display().to_string(),
                    "error": err.to_string(),
                }),
            );
        }
    }
}

pub fn validate_port(raw: &str) -> Result<u16, SetupError> {
    let parsed = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| SetupError::InvalidPort(raw.to_string()))?;

    if parsed < 1 || parsed > u32::from(u16::MAX) {
        return Err(SetupError::InvalidPort(raw.to_string()));
    }

    Ok(parsed as u16)
}

pub fn config_dir() -> PathBuf {
    home_dir().join(CONFIG_DIR_NAME)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// Older settings files persisted the port as a JSON string. Both arms go
// through the same range check: the port invariant holds for every value
// that leaves deserialization, whatever the on-disk representation.
fn deserialize_port_from_string_or_int<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Compat {
        Int(u64),
        Text(String),
    }

    let raw = match Compat::deserialize(deserializer)? {
        Compat::Int(port) => port.to_string(),
        Compat::Text(raw) => raw,
    };

    validate_port(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SettingsStore {
        SettingsStore::load(dir.path().join("settings.json"), "trace-test")
    }

    #[test]
    fn absent_file_seeds_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.settings().port, 80);
        assert!(!store.settings().setup_completed);
        assert!(store.path().exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").expect("write");

        let store = SettingsStore::load(path, "trace-test");
        assert_eq!(store.settings().port, 80);
    }

    #[test]
    fn unknown_keys_are_ignored_and_missing_keys_default() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"port": 8080, "some_future_key": true}"#).expect("write");

        let store = SettingsStore::load(path, "trace-test");
        assert_eq!(store.settings().port, 8080);
        assert!(store.settings().minimize_to_tray);
    }

    #[test]
    fn legacy_string_port_is_accepted() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"port": "3000"}"#).expect("write");

        let store = SettingsStore::load(path, "trace-test");
        assert_eq!(store.settings().port, 3000);
    }

    #[test]
    fn out_of_range_integer_port_falls_back_to_defaults() {
        let dir = TempDir::new().expect("tempdir");

        // An integer-typed port is range-checked like a string-typed one;
        // the fail-soft loader turns the rejection into defaults.
        for raw in [r#"{"port": 0}"#, r#"{"port": 65536}"#] {
            let path = dir.path().join("settings.json");
            fs::write(&path, raw).expect("write");

            assert!(serde_json::from_str::<Settings>(raw).is_err(), "{raw}");
            let store = SettingsStore::load(path, "trace-test");
            assert_eq!(store.settings().port, 80, "{raw}");
        }
    }

    #[test]
    fn port_validation_boundaries() {
        for accepted in ["1", "65535", "3000", "80"] {
            assert!(validate_port(accepted).is_ok(), "expected {accepted} ok");
        }

        for rejected in ["0", "65536", "abc", ""] {
            assert!(
                matches!(validate_port(rejected), Err(SetupError::InvalidPort(_))),
                "expected {rejected:?} rejected"
            );
        }
    }

    #[test]
    fn set_port_rejects_without_mutating() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = store_in(&dir);

        assert!(store.set_port("65536").is_err());
        assert_eq!(store.settings().port, 80);

        assert_eq!(store.set_port("8080").expect("valid port"), 8080);
        assert_eq!(store.settings().port, 8080);
    }

    #[test]
    fn update_round_trips_through_disk() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("settings.json");

        let mut store = SettingsStore::load(path.clone(), "trace-test");
        store.update(|settings| {
            settings.workspace_dir = PathBuf::from("/srv/work");
            settings.setup_completed = true;
        });

        let reloaded = SettingsStore::load(path, "trace-test");
        assert_eq!(reloaded.settings().workspace_dir, PathBuf::from("/srv/work"));
        assert!(reloaded.settings().setup_completed);
    }
}
