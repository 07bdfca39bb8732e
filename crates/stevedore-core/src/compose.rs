//! Rendering of the engine orchestration (compose) file.
//!
//! Rendering is a pure function of [`Settings`]; directory creation is a
//! separate, explicitly sequenced step. The emitted YAML shape must stay
//! byte-compatible with the engine's compose invocation.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::SetupError;
use crate::settings::Settings;

pub const SERVICE_IMAGE: &str = "docker.all-hands.dev/all-hands-ai/openhands:0.27";
pub const SANDBOX_RUNTIME_IMAGE: &str =
    "docker.all-hands.dev/all-hands-ai/runtime:0.27-nikolaik";
pub const CONTAINER_NAME: &str = "openhands-app";
pub const CONTAINER_APP_PORT: u16 = 3000;
pub const WORKSPACE_MOUNT_TARGET: &str = "/opt/workspace_base";
pub const STATE_MOUNT_TARGET: &str = "/.openhands-state";
pub const ENGINE_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub image: String,
    pub container_name: String,
    pub workspace_dir: String,
    pub state_dir: String,
    pub port: u16,
}

impl EngineConfig {
    pub fn to_compose_yaml(&self) -> String {
        format!(
            r#"services:
  openhands-app:
    image: {image}
    container_name: {container_name}
    environment:
      - SANDBOX_RUNTIME_CONTAINER_IMAGE={sandbox_image}
      - LOG_ALL_EVENTS=true
      - SANDBOX_USER_ID="1000"
      - WORKSPACE_MOUNT_PATH={workspace_dir}
    volumes:
      - {socket}:{socket}
      - {state_dir}:{state_target}
      - {workspace_dir}:{workspace_target}
    ports:
      - "{port}:{app_port}"
    extra_hosts:
      - "host.docker.internal:host-gateway"
    tty: true
    stdin_open: true
    restart: "no"
"#,
            image = self.image,
            container_name = self.container_name,
            sandbox_image = SANDBOX_RUNTIME_IMAGE,
            socket = ENGINE_SOCKET,
            state_dir = self.state_dir,
            state_target = STATE_MOUNT_TARGET,
            workspace_dir = self.workspace_dir,
            workspace_target = WORKSPACE_MOUNT_TARGET,
            port = self.port,
            app_port = CONTAINER_APP_PORT,
        )
    }
}

/// Pure: identical settings produce a byte-identical config.
pub fn render_config(settings: &Settings) -> EngineConfig {
    EngineConfig {
        image: SERVICE_IMAGE.to_string(),
        container_name: CONTAINER_NAME.to_string(),
        workspace_dir: normalize_host_path(&settings.workspace_dir),
        state_dir: normalize_host_path(&settings.state_dir),
        port: settings.port,
    }
}

/// Creates the two host-side bind-mount directories. Idempotent: existing
/// directories are a no-op.
pub fn ensure_directories(settings: &Settings) -> Result<(), SetupError> {
    for dir in [&settings.workspace_dir, &settings.state_dir] {
        fs::create_dir_all(dir).map_err(|source| SetupError::Directory {
            path: dir.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

/// Overwrites `path` unconditionally with the rendered UTF-8 text.
pub fn write_config(config: &EngineConfig, path: &Path) -> Result<(), SetupError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config.to_compose_yaml())?;
    Ok(())
}

// Compose wants forward slashes even for Windows host paths.
fn normalize_host_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}
