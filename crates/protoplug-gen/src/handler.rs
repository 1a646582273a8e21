//! The capability every plugin transport implements.
//!
//! The [`Generator`](crate::generator::Generator) depends only on [`Handler`],
//! never on how a plugin actually runs. The production transports are
//! [`ProcessHandler`](crate::process::ProcessHandler), which speaks the protoc
//! wire protocol over a child's stdio, and [`FnHandler`], which runs a
//! closure in-process.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use prost_types::compiler::CodeGeneratorRequest;

use crate::cancel::CancellationToken;
use crate::error::GenerateError;
use crate::response::ResponseBuilder;

/// Shared, clonable destination for plugin diagnostics.
#[derive(Clone)]
pub struct StderrSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl StderrSink {
    /// Wraps `writer` so parallel tasks can share it.
    #[must_use]
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Creates a sink that discards everything.
    #[must_use]
    pub fn discard() -> Self {
        Self::new(io::sink())
    }

    /// Writes `bytes` as one uninterrupted block.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the underlying writer.
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(bytes)?;
        writer.flush()
    }
}

impl fmt::Debug for StderrSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StderrSink").finish_non_exhaustive()
    }
}

/// Per-task context passed to a [`Handler`].
#[derive(Debug, Clone)]
pub struct InvocationContext {
    plugin: String,
    cancel: CancellationToken,
    stderr: StderrSink,
}

impl InvocationContext {
    /// Creates a context for `plugin`.
    #[must_use]
    pub fn new(plugin: impl Into<String>, cancel: CancellationToken, stderr: StderrSink) -> Self {
        Self {
            plugin: plugin.into(),
            cancel,
            stderr,
        }
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the cancellation token shared with sibling tasks.
    #[must_use]
    pub const fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the diagnostics sink.
    #[must_use]
    pub const fn stderr(&self) -> &StderrSink {
        &self.stderr
    }

    /// Fails fast when the task should stop.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::DeadlineExceeded`] once the deadline passes,
    /// or [`GenerateError::Cancelled`] after a sibling failed.
    pub fn check_cancelled(&self) -> Result<(), GenerateError> {
        if self.cancel.deadline_passed() {
            return Err(GenerateError::DeadlineExceeded {
                name: self.plugin.clone(),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled {
                name: self.plugin.clone(),
            });
        }
        Ok(())
    }
}

/// Runs a plugin for one request.
///
/// Implementations report files, feature bits, and error strings into the
/// shared [`ResponseBuilder`], and should return promptly once the context's
/// cancellation token fires.
///
/// # Example
///
/// ```
/// use protoplug_gen::{GenerateError, Handler, InvocationContext, ResponseBuilder};
/// use prost_types::compiler::CodeGeneratorRequest;
///
/// struct Silent;
///
/// impl Handler for Silent {
///     fn handle(
///         &self,
///         _context: &InvocationContext,
///         _request: &CodeGeneratorRequest,
///         _response: &ResponseBuilder,
///     ) -> Result<(), GenerateError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Handles `request`, streaming results into `response`.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerateError`] if the plugin cannot run, fails, or is
    /// cancelled.
    fn handle(
        &self,
        context: &InvocationContext,
        request: &CodeGeneratorRequest,
        response: &ResponseBuilder,
    ) -> Result<(), GenerateError>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(
        &self,
        context: &InvocationContext,
        request: &CodeGeneratorRequest,
        response: &ResponseBuilder,
    ) -> Result<(), GenerateError> {
        (**self).handle(context, request, response)
    }
}

/// In-process handler backed by a closure.
pub struct FnHandler<F> {
    function: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&InvocationContext, &CodeGeneratorRequest, &ResponseBuilder) -> Result<(), GenerateError>
        + Send
        + Sync,
{
    /// Wraps `function` as a handler.
    #[must_use]
    pub const fn new(function: F) -> Self {
        Self { function }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&InvocationContext, &CodeGeneratorRequest, &ResponseBuilder) -> Result<(), GenerateError>
        + Send
        + Sync,
{
    fn handle(
        &self,
        context: &InvocationContext,
        request: &CodeGeneratorRequest,
        response: &ResponseBuilder,
    ) -> Result<(), GenerateError> {
        (self.function)(context, request, response)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
