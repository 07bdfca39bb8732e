#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod compose;
pub mod engine;
pub mod error;
pub mod installer;
pub mod observability;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod settings;

pub use error::SetupError;
pub use orchestrator::{Orchestrator, SetupOutcome, SetupStage};
pub use settings::{Settings, SettingsStore};
