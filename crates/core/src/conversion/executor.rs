//! Step executors.
//!
//! - [`CommandExecutor`] runs an external process and streams its output.
//! - [`FnExecutor`] adapts an async closure for in-process work.

use super::error::StepError;
use super::step::{StepExecutor, StepOutputSink};
use async_trait::async_trait;
use lc_protocol::step_models::OutputStream;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Exit code reported when the process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Executes an external process as a pipeline step.
///
/// The command line is echoed to the command sink, stdout and stderr lines
/// are forwarded to their sinks as they arrive, and the process exit code
/// becomes the step's exit code. Cancelling kills the process.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory of the process.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The command line as echoed to the command sink.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| {
                let part = part.to_string_lossy();
                if part.contains(' ') {
                    format!("\"{part}\"")
                } else {
                    part.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn kill(child: &mut Child) {
        if let Err(e) = child.kill().await {
            debug!(error = %e, "Failed to kill cancelled process");
        }
    }
}

#[async_trait]
impl StepExecutor for CommandExecutor {
    async fn execute(
        &self,
        output: &StepOutputSink,
        cancel: &CancellationToken,
    ) -> Result<i32, StepError> {
        let command_line = self.command_line();
        output.command(command_line.clone());
        info!(command = %command_line, "Spawning conversion command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| StepError::Spawn {
            command: self.program.display().to_string(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StepError::failed("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StepError::failed("Failed to capture stderr"))?;

        let stdout_lines = Box::pin(lossy_lines(stdout)).map(|line| (OutputStream::Stdout, line));
        let stderr_lines = Box::pin(lossy_lines(stderr)).map(|line| (OutputStream::Stderr, line));
        let mut lines = stdout_lines.merge(stderr_lines);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Self::kill(&mut child).await;
                    return Err(StepError::Cancelled);
                }
                next = lines.next() => match next {
                    Some((OutputStream::Stderr, Ok(line))) => output.stderr(line),
                    Some((_, Ok(line))) => output.stdout(line),
                    Some((_, Err(e))) => {
                        Self::kill(&mut child).await;
                        return Err(StepError::Io(e));
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Self::kill(&mut child).await;
                return Err(StepError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let exit_code = status.code().unwrap_or(SIGNAL_EXIT_CODE);
        info!(command = %command_line, exit_code, "Conversion command exited");
        Ok(exit_code)
    }
}

/// Lines of `reader` without their terminators.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the
/// stream; tools print progress bars and locale-dependent text.
fn lossy_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::stream! {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    yield Ok(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

type StepFn = Box<
    dyn Fn(
            StepOutputSink,
            CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<i32, StepError>> + Send>>
        + Send
        + Sync,
>;

/// Executes an async closure as a pipeline step.
pub struct FnExecutor {
    f: StepFn,
}

impl FnExecutor {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(StepOutputSink, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<i32, StepError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |output, cancel| Box::pin(f(output, cancel))),
        }
    }
}

#[async_trait]
impl StepExecutor for FnExecutor {
    async fn execute(
        &self,
        output: &StepOutputSink,
        cancel: &CancellationToken,
    ) -> Result<i32, StepError> {
        (self.f)(output.clone(), cancel.clone()).await
    }
}
