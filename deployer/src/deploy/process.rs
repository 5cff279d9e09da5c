//! Subprocess execution with live output forwarding

use std::collections::VecDeque;
use std::future::pending;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::deploy::sink::LogSink;
use crate::errors::DeployerError;

/// Lines of stderr kept for the failure message
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for output pipes after the process exits
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// A command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `program arg1 arg2`, as echoed into deploy logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Default)]
struct Drained {
    captured: String,
    tail: VecDeque<String>,
}

enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

/// Spawns external programs.
///
/// Output of stdout and stderr is forwarded line by line to an optional sink
/// and to the debug log. Only exit code 0 is success.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run to completion, streaming merged output into `sink`.
    ///
    /// When `cancel` fires the child is killed and `Cancelled` is returned.
    pub async fn stream(
        &self,
        spec: &CommandSpec,
        sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Result<(), DeployerError> {
        self.execute(spec, Some(sink), Some(cancel), false)
            .await
            .map(|_| ())
    }

    /// Run to completion and return stdout
    pub async fn output(
        &self,
        spec: &CommandSpec,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, DeployerError> {
        self.execute(spec, None, cancel, true).await
    }

    async fn execute(
        &self,
        spec: &CommandSpec,
        sink: Option<&LogSink>,
        cancel: Option<&CancellationToken>,
        capture: bool,
    ) -> Result<String, DeployerError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(DeployerError::Cancelled);
        }

        debug!("Spawning: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        // Own process group, so an interrupt reaches the whole tree
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| DeployerError::ProcessFailed {
            program: spec.program.clone(),
            code: None,
            message: format!("failed to start: {}", e),
        })?;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_task = tokio::spawn(drain(stdout, sink.cloned(), spec.program.clone(), capture));
        let err_task = tokio::spawn(drain(stderr, sink.cloned(), spec.program.clone(), false));
        let out_abort = out_task.abort_handle();
        let err_abort = err_task.abort_handle();

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };
        let deadline = async {
            match self.timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => pending().await,
            }
        };

        let waited: Result<std::io::Result<ExitStatus>, Interrupt> = tokio::select! {
            status = child.wait() => Ok(status),
            _ = cancelled => Err(Interrupt::Cancelled),
            limit = deadline => Err(Interrupt::TimedOut(limit)),
        };

        let status = match waited {
            Ok(status) => status?,
            Err(interrupt) => {
                kill_group(pid, &spec.program);
                if let Err(e) = child.kill().await {
                    debug!("Kill of {} failed: {}", spec.program, e);
                }
                out_abort.abort();
                err_abort.abort();
                return Err(match interrupt {
                    Interrupt::Cancelled => {
                        debug!("Killed {} after cancellation", spec.program);
                        DeployerError::Cancelled
                    }
                    Interrupt::TimedOut(after) => DeployerError::TimedOut {
                        program: spec.program.clone(),
                        after,
                    },
                });
            }
        };

        // Grandchildren may keep the pipes open after the child exits.
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            let out = out_task.await.unwrap_or_default();
            let err = err_task.await.unwrap_or_default();
            (out, err)
        })
        .await;
        let (out, err) = match drained {
            Ok(pair) => pair,
            Err(_) => {
                debug!("Output of {} still open after exit, killing its group", spec.program);
                kill_group(pid, &spec.program);
                out_abort.abort();
                err_abort.abort();
                (Drained::default(), Drained::default())
            }
        };

        if status.success() {
            return Ok(out.captured);
        }

        let code = status.code();
        let tail = err.tail.into_iter().collect::<Vec<_>>().join("\n");
        let message = match (tail.trim(), code) {
            (tail, _) if !tail.is_empty() => tail.to_string(),
            (_, Some(code)) => format!("exited with code {}", code),
            (_, None) => "terminated by signal".to_string(),
        };

        Err(DeployerError::ProcessFailed {
            program: spec.program.clone(),
            code,
            message,
        })
    }
}

/// SIGKILL the process group led by `pid`
#[cfg(unix)]
fn kill_group(pid: Option<u32>, program: &str) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created at spawn
    if unsafe { libc::killpg(pid, libc::SIGKILL) } != 0 {
        debug!(
            "killpg for {} failed: {}",
            program,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>, _program: &str) {}

async fn drain<R>(reader: Option<R>, sink: Option<LogSink>, program: String, capture: bool) -> Drained
where
    R: AsyncRead + Unpin,
{
    let mut drained = Drained::default();
    let Some(reader) = reader else {
        return drained;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                debug!(target: "motion_deployer::process", "[{}] {}", program, line);

                if let Some(sink) = &sink {
                    sink.line(line).await;
                }
                if capture {
                    drained.captured.push_str(line);
                    drained.captured.push('\n');
                }
                if drained.tail.len() == STDERR_TAIL_LINES {
                    drained.tail.pop_front();
                }
                drained.tail.push_back(line.to_string());
            }
            Err(e) => {
                debug!("Output read error from {}: {}", program, e);
                break;
            }
        }
    }
    drained
}
