//! Subprocess plugin transport speaking the protoc wire protocol.
//!
//! [`ProcessHandler`] implements [`Handler`] by spawning the plugin binary,
//! writing the encoded `CodeGeneratorRequest` to its stdin, and decoding the
//! `CodeGeneratorResponse` from its stdout. Stdin, stdout, and stderr are
//! serviced on helper threads so a chatty plugin cannot deadlock on a full
//! pipe while the calling thread polls for exit and cancellation.
//!
//! On unix each plugin runs in its own process group. Cancellation kills the
//! whole group, so wrapper scripts and the processes they start go down with
//! the plugin instead of holding its pipes open.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use prost::Message;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use tracing::{debug, warn};

use crate::error::GenerateError;
use crate::handler::{Handler, InvocationContext};
use crate::response::ResponseBuilder;

/// Tracing target for plugin process operations.
const PROCESS_TARGET: &str = "protoplug_gen::process";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs a plugin executable once per request.
///
/// # Example
///
/// ```rust,no_run
/// use protoplug_gen::process::ProcessHandler;
///
/// let handler = ProcessHandler::new("/usr/local/bin/protoc-gen-go");
/// assert_eq!(handler.program().to_str(), Some("/usr/local/bin/protoc-gen-go"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandler {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessHandler {
    /// Creates a handler running `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends arguments passed to every invocation.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the executable path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Handler for ProcessHandler {
    fn handle(
        &self,
        context: &InvocationContext,
        request: &CodeGeneratorRequest,
        response: &ResponseBuilder,
    ) -> Result<(), GenerateError> {
        context.check_cancelled()?;
        let name = context.plugin();

        debug!(
            target: PROCESS_TARGET,
            plugin = name,
            executable = %self.program.display(),
            files = request.file_to_generate.len(),
            "spawning plugin process"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|err| GenerateError::SpawnFailed {
                name: name.to_owned(),
                message: format!("{}: {err}", self.program.display()),
                source: Some(Arc::new(err)),
            })?;

        let Exchange {
            status,
            written,
            stdout,
            stderr,
        } = exchange(context, &mut child, request.encode_to_vec())?;

        forward_stderr(context, &stderr)?;

        if !status.success() {
            return Err(GenerateError::NonZeroExit {
                name: name.to_owned(),
                status: status.code().unwrap_or(-1),
            });
        }

        if let Err(err) = written {
            if err.kind() != io::ErrorKind::BrokenPipe {
                return Err(GenerateError::io(name, err));
            }
            debug!(
                target: PROCESS_TARGET,
                plugin = name,
                "plugin exited before reading its whole request"
            );
        }

        let decoded = CodeGeneratorResponse::decode(stdout.as_slice()).map_err(|source| {
            GenerateError::DecodeResponse {
                name: name.to_owned(),
                source,
            }
        })?;

        debug!(
            target: PROCESS_TARGET,
            plugin = name,
            response_bytes = stdout.len(),
            files = decoded.file.len(),
            "decoded plugin response"
        );

        response.add_response(decoded)
    }
}

struct Exchange {
    status: ExitStatus,
    written: io::Result<()>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Feeds the request, drains both output pipes, and waits for exit.
fn exchange(
    context: &InvocationContext,
    child: &mut Child,
    payload: Vec<u8>,
) -> Result<Exchange, GenerateError> {
    let name = context.plugin();
    let missing = |pipe: &str| GenerateError::SpawnFailed {
        name: name.to_owned(),
        message: format!("failed to capture {pipe}"),
        source: None,
    };
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
    let leader = child.id();

    thread::scope(|scope| {
        let writer = scope.spawn(move || write_request(stdin, &payload));
        let out_reader = scope.spawn(move || read_pipe(stdout));
        let err_reader = scope.spawn(move || read_pipe(stderr));

        let waited = wait_for_exit(context, child);

        // Descendants of the plugin may still hold the pipes open.
        let mut interrupted = None;
        while !(writer.is_finished() && out_reader.is_finished() && err_reader.is_finished()) {
            if waited.is_ok() && interrupted.is_none() {
                if let Err(err) = context.check_cancelled() {
                    warn!(
                        target: PROCESS_TARGET,
                        plugin = name,
                        "generation cancelled, killing lingering plugin processes"
                    );
                    kill_group(leader);
                    interrupted = Some(err);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }

        let written = join(name, writer)?;
        let stdout_bytes = join(name, out_reader)?.map_err(|err| GenerateError::io(name, err))?;
        let stderr_bytes = join(name, err_reader)?.map_err(|err| GenerateError::io(name, err))?;
        let status = waited?;
        if let Some(err) = interrupted {
            return Err(err);
        }

        Ok(Exchange {
            status,
            written,
            stdout: stdout_bytes,
            stderr: stderr_bytes,
        })
    })
}

fn join<T>(name: &str, handle: thread::ScopedJoinHandle<'_, T>) -> Result<T, GenerateError> {
    handle.join().map_err(|_| {
        GenerateError::io(name, io::Error::other("plugin pipe thread panicked"))
    })
}

/// Writes the encoded request and closes stdin.
fn write_request(mut stdin: impl Write, payload: &[u8]) -> io::Result<()> {
    stdin.write_all(payload)?;
    stdin.flush()
    // Stdin is dropped here, closing the pipe to signal no more input.
}

fn read_pipe(mut pipe: impl Read) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    pipe.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Polls the child until it exits, killing it once the task is cancelled.
fn wait_for_exit(context: &InvocationContext, child: &mut Child) -> Result<ExitStatus, GenerateError> {
    let name = context.plugin();
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: PROCESS_TARGET,
                    plugin = name,
                    ?status,
                    elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "plugin process exited"
                );
                return Ok(status);
            }
            Ok(None) => {
                if let Err(err) = context.check_cancelled() {
                    warn!(
                        target: PROCESS_TARGET,
                        plugin = name,
                        "generation cancelled, killing plugin process"
                    );
                    terminate(child);
                    return Err(err);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                terminate(child);
                return Err(GenerateError::io(name, err));
            }
        }
    }
}

/// Kills the plugin together with its process group and reaps it.
fn terminate(child: &mut Child) {
    kill_group(child.id());
    drop(child.kill());
    drop(child.wait());
}

/// Sends `SIGKILL` to the process group led by `leader`.
#[cfg(unix)]
fn kill_group(leader: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(leader) else {
        return;
    };
    if let Err(errno) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!(
            target: PROCESS_TARGET,
            leader,
            %errno,
            "plugin process group already gone"
        );
    }
}

#[cfg(not(unix))]
const fn kill_group(_leader: u32) {}

/// Copies plugin stderr to the invocation's diagnostics sink.
fn forward_stderr(context: &InvocationContext, bytes: &[u8]) -> Result<(), GenerateError> {
    if bytes.is_empty() {
        return Ok(());
    }
    debug!(
        target: PROCESS_TARGET,
        plugin = context.plugin(),
        stderr_bytes = bytes.len(),
        "forwarding plugin stderr"
    );
    context
        .stderr()
        .write_all(bytes)
        .map_err(|err| GenerateError::io(context.plugin(), err))
}
