use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("critical prerequisite checks failed: {}", failed.join(", "))]
    ChecksFailed { failed: Vec<String> },

    #[error("container engine is installed but not running")]
    EngineNotRunning,

    #[error("engine install failed: {0}")]
    Install(String),

    #[error("engine install cancelled: progress channel closed by caller")]
    InstallCancelled,

    #[error("failed to create directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine command '{command}' failed: {stderr}")]
    Engine { command: String, stderr: String },

    #[error("command '{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("invalid port value '{0}': expected an integer in 1..=65535")]
    InvalidPort(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
