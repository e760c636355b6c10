//! Production subprocess host on top of `tokio::process`.
//!
//! Output and exit are pumped onto channels by background tasks so the
//! supervisor can select over them; signals are delivered by pid, which
//! avoids aliasing the child handle owned by the reaper task.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use maslow_core::capabilities::{ChildProcess, SpawnError, SpawnSpec, Subprocess};

/// Buffered lines between the pump tasks and the supervisor.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

pub struct TokioSubprocess;

struct TokioChild {
    pid: Option<u32>,
    output: Option<mpsc::Receiver<String>>,
    exit: Option<oneshot::Receiver<i32>>,
}

impl ChildProcess for TokioChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn take_output(&mut self) -> Option<mpsc::Receiver<String>> {
        self.output.take()
    }

    fn take_exit(&mut self) -> Option<oneshot::Receiver<i32>> {
        self.exit.take()
    }

    fn terminate(&self) {
        self.signal(Signal::SIGTERM);
    }

    fn kill(&self) {
        self.signal(Signal::SIGKILL);
    }
}

impl TokioChild {
    fn signal(&self, sig: Signal) {
        let Some(pid) = self.pid else {
            return;
        };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
            // ESRCH after exit is expected; anything else is worth a line.
            if e != nix::errno::Errno::ESRCH {
                warn!(
                    event = "engine.subprocess.signal_failed",
                    pid = pid,
                    signal = %sig,
                    error = %e,
                );
            }
        }
    }
}

#[async_trait]
impl Subprocess for TokioSubprocess {
    async fn spawn(&self, spec: SpawnSpec) -> Result<Box<dyn ChildProcess>, SpawnError> {
        if which::which(&spec.program).is_err() {
            return Err(SpawnError::ProgramMissing {
                program: spec.program.clone(),
            });
        }

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for name in &spec.env_remove {
            cmd.env_remove(name);
        }
        for (name, value) in &spec.env {
            cmd.env(name, value);
        }

        let mut child = cmd.spawn().map_err(|e| SpawnError::LaunchFailed {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id();

        debug!(
            event = "engine.subprocess.spawned",
            program = %spec.program,
            pid = ?pid,
            cwd = %spec.cwd.display(),
        );

        let (line_tx, line_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_pump(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_pump(stderr, line_tx);
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let program = spec.program.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!(event = "engine.subprocess.wait_failed", program = %program, error = %e);
                    -1
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(Box::new(TokioChild {
            pid,
            output: Some(line_rx),
            exit: Some(exit_rx),
        }))
    }
}

fn spawn_line_pump(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Output of a run-to-completion command.
#[derive(Debug)]
pub struct CommandOutput {
    pub code: i32,
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The last few output lines joined, for error messages.
    pub fn tail(&self, n: usize) -> String {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..].join("\n")
    }
}

/// Spawn a command through the host, drain its output, and wait for exit.
///
/// Used for short git/gh invocations; long-lived agents get their own
/// supervisor instead.
pub async fn run_to_completion(
    host: &dyn Subprocess,
    spec: SpawnSpec,
) -> Result<CommandOutput, SpawnError> {
    let mut child = host.spawn(spec).await?;
    let mut output = child.take_output();
    let mut exit = child.take_exit().ok_or_else(|| SpawnError::WaitFailed {
        message: "exit channel already taken".to_string(),
    })?;

    // Drain output while waiting for exit so a chatty command can never
    // block on a full pipe.
    let mut lines = Vec::new();
    let code = loop {
        match output.as_mut() {
            Some(rx) => tokio::select! {
                maybe_line = rx.recv() => match maybe_line {
                    Some(line) => lines.push(line),
                    None => output = None,
                },
                code = &mut exit => break code.unwrap_or(-1),
            },
            None => break (&mut exit).await.unwrap_or(-1),
        }
    };

    // Pump tasks may still be flushing the tail after exit.
    if let Some(mut rx) = output {
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
    }

    Ok(CommandOutput { code, lines })
}
