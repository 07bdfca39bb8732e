//! Blocking child-process execution with captured output and a hard deadline.
//!
//! Every external command in this crate goes through [`run_command`], so no
//! call can hang indefinitely on a wedged engine daemon.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failed,
    TimedOut,
    SpawnFailed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandOutcome {
    pub program: String,
    pub args: Vec<String>,
    pub status: CommandStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        matches!(self.status, CommandStatus::Success)
    }

    /// Rendered `program arg1 arg2 ...` form for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str], timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
            cwd: None,
            timeout,
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

pub fn run_command(spec: &CommandSpec) -> CommandOutcome {
    let start = Instant::now();

    let mut child = match spawn_process(spec) {
        Ok(child) => child,
        Err(err) => {
            return CommandOutcome {
                program: spec.program.clone(),
                args: spec.args.clone(),
                status: CommandStatus::SpawnFailed,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: start.elapsed().as_millis(),
                error: Some(err.to_string()),
            }
        }
    };

    // Drain both pipes on threads so a chatty child cannot deadlock the
    // try_wait polling loop below.
    let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
    let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

    let waited = wait_with_timeout(&mut child, spec.timeout);

    let stdout = collect_pipe(stdout_reader);
    let stderr = collect_pipe(stderr_reader);

    match waited {
        Ok(Some(status)) => CommandOutcome {
            program: spec.program.clone(),
            args: spec.args.clone(),
            status: if status.success() {
                CommandStatus::Success
            } else {
                CommandStatus::Failed
            },
            exit_code: status.code(),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis(),
            error: None,
        },
        Ok(None) => CommandOutcome {
            program: spec.program.clone(),
            args: spec.args.clone(),
            status: CommandStatus::TimedOut,
            exit_code: None,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis(),
            error: Some(format!("timeout after {}s", spec.timeout.as_secs())),
        },
        Err(err) => CommandOutcome {
            program: spec.program.clone(),
            args: spec.args.clone(),
            status: CommandStatus::Failed,
            exit_code: None,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis(),
            error: Some(err.to_string()),
        },
    }
}

fn spawn_process(spec: &CommandSpec) -> Result<Child, std::io::Error> {
    let mut process = Command::new(&spec.program);
    process
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(cwd) = &spec.cwd {
        process.current_dir(cwd);
    }

    process.spawn()
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

/// Invalid text bytes are replaced, never surfaced as an error.
fn collect_pipe(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    let bytes = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<ExitStatus>, std::io::Error> {
    let started = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }

        thread::sleep(Duration::from_millis(100));
    }
}
