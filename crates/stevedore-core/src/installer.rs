//! Download-and-run installer for the container engine.
//!
//! The installer binary is streamed to a self-cleaning temporary directory
//! and executed elevated with the vendor's silent flags. Progress is pushed
//! over an mpsc channel; a caller that drops the receiver cancels the install
//! at the next report point. The temporary directory is removed on every exit
//! path, success or failure.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::process::{run_command, CommandSpec, CommandStatus};

pub const ENGINE_INSTALLER_URL: &str =
    "https://desktop.docker.com/win/main/amd64/Docker%20Desktop%20Installer.exe";

const INSTALLER_FILE_NAME: &str = "DockerDesktopInstaller.exe";
const INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const PERCENT_DOWNLOAD_START: u8 = 10;
const PERCENT_INSTALL_START: u8 = 50;
const PERCENT_INSTALL_DONE: u8 = 80;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    pub message: String,
    pub percent: u8,
}

#[derive(Debug)]
pub struct Installer {
    url: String,
    client: reqwest::Client,
    download_root: Option<PathBuf>,
}

impl Default for Installer {
    fn default() -> Self {
        Self::new(ENGINE_INSTALLER_URL)
    }
}

impl Installer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            download_root: None,
        }
    }

    /// Places the temporary download directory under `root` instead of the
    /// system temp location.
    pub fn with_download_root(mut self, root: PathBuf) -> Self {
        self.download_root = Some(root);
        self
    }

    /// True iff the engine version query fails, i.e. the engine is absent.
    pub fn is_needed(&self) -> bool {
        let outcome = run_command(&CommandSpec::new(
            "docker",
            &["--version"],
            VERSION_PROBE_TIMEOUT,
        ));
        !outcome.success()
    }

    /// Downloads and silently runs the engine installer. No internal retry:
    /// a failure surfaces once and the caller decides whether to re-invoke.
    pub async fn install(
        &self,
        progress: mpsc::Sender<InstallProgress>,
    ) -> Result<(), SetupError> {
        // TempDir removal on drop covers every exit path below.
        let temp_dir = match &self.download_root {
            Some(root) => tempfile::tempdir_in(root)?,
            None => tempfile::tempdir()?,
        };
        let installer_path = temp_dir.path().join(INSTALLER_FILE_NAME);

        report(
            &progress,
            "downloading engine installer",
            PERCENT_DOWNLOAD_START,
        )
        .await?;

        self.download(&installer_path, &progress).await?;

        report(&progress, "running engine installer", PERCENT_INSTALL_START).await?;

        let spec = elevated_install_spec(&installer_path);
        let outcome = tokio::task::spawn_blocking(move || run_command(&spec))
            .await
            .map_err(|err| SetupError::Install(err.to_string()))?;

        match outcome.status {
            CommandStatus::Success => {
                report(
                    &progress,
                    "engine installer finished, waiting for the service",
                    PERCENT_INSTALL_DONE,
                )
                .await?;
                Ok(())
            }
            CommandStatus::TimedOut => Err(SetupError::Timeout {
                command: outcome.command_line(),
                secs: INSTALL_TIMEOUT.as_secs(),
            }),
            _ => {
                let detail = if outcome.stderr.trim().is_empty() {
                    outcome
                        .error
                        .unwrap_or_else(|| "installer exited with failure".to_string())
                } else {
                    outcome.stderr.trim().to_string()
                };
                Err(SetupError::Install(detail))
            }
        }
    }

    async fn download(
        &self,
        dest: &std::path::Path,
        progress: &mpsc::Sender<InstallProgress>,
    ) -> Result<(), SetupError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| SetupError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SetupError::Network(format!(
                "installer download returned {}",
                response.status()
            )));
        }

        let total = response.content_length().filter(|len| *len > 0);
        let mut file = std::fs::File::create(dest)?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_percent = PERCENT_DOWNLOAD_START;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| SetupError::Network(err.to_string()))?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total {
                let percent = download_percent(downloaded, total);
                if percent > last_percent {
                    last_percent = percent;
                    report(
                        progress,
                        &format!(
                            "downloading engine installer... {}MB/{}MB",
                            downloaded / (1024 * 1024),
                            total / (1024 * 1024)
                        ),
                        percent,
                    )
                    .await?;
                }
            }
        }

        file.flush()?;
        Ok(())
    }
}

/// Maps downloaded/total onto the 10..=50 band of the overall install.
fn download_percent(downloaded: u64, total: u64) -> u8 {
    let span = u64::from(PERCENT_INSTALL_START - PERCENT_DOWNLOAD_START);
    let scaled = downloaded.min(total) * span / total;
    PERCENT_DOWNLOAD_START + scaled as u8
}

fn elevated_install_spec(installer_path: &std::path::Path) -> CommandSpec {
    let path = installer_path.display().to_string();
    CommandSpec::new(
        "powershell",
        &[
            "Start-Process",
            &path,
            "-ArgumentList",
            "'install --quiet'",
            "-Verb",
            "RunAs",
            "-Wait",
        ],
        INSTALL_TIMEOUT,
    )
}

async fn report(
    progress: &mpsc::Sender<InstallProgress>,
    message: &str,
    percent: u8,
) -> Result<(), SetupError> {
    progress
        .send(InstallProgress {
            message: message.to_string(),
            percent,
        })
        .await
        .map_err(|_| SetupError::InstallCancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn download_percent_spans_ten_to_fifty() {
        assert_eq!(download_percent(0, 100), 10);
        assert_eq!(download_percent(50, 100), 30);
        assert_eq!(download_percent(100, 100), 50);
        // Over-reported byte counts never escape the band.
        assert_eq!(download_percent(150, 100), 50);
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_install() {
        let installer = Installer::new("http://127.0.0.1:1/installer.exe");
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let result = installer.install(tx).await;
        assert!(matches!(result, Err(SetupError::InstallCancelled)));
    }

    #[tokio::test]
    async fn failed_download_cleans_temp_directory() {
        let root = TempDir::new().expect("tempdir");
        // Port 1 is never serving: the download fails fast with a network
        // error and the staging directory must be gone afterwards.
        let installer = Installer::new("http://127.0.0.1:1/installer.exe")
            .with_download_root(root.path().to_path_buf());

        let (tx, mut rx) = mpsc::channel(16);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let result = installer.install(tx).await;
        drain.await.expect("drain task");

        assert!(matches!(result, Err(SetupError::Network(_))));
        let leftovers = std::fs::read_dir(root.path())
            .expect("read root")
            .count();
        assert_eq!(leftovers, 0, "staging directory must be removed");
    }
}
