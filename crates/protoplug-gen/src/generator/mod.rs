//! Parallel invocation of one plugin over a set of requests.
//!
//! [`Generator::generate`] runs one task per request on scoped threads. All
//! tasks share a [`ResponseBuilder`] and a child [`CancellationToken`]: the
//! first failing task records its error and cancels the token, tasks that
//! have not started yet skip their request, and in-flight handlers observe
//! the token and stop. Only the first error is returned.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::error::GenerateError;
use crate::handler::{Handler, InvocationContext, StderrSink};
use crate::response::ResponseBuilder;

const GENERATOR_TARGET: &str = "protoplug_gen::generator";

/// Invokes one plugin for every request it is given.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use protoplug_gen::{CancellationToken, FnHandler, Generator, StderrSink};
/// use prost_types::compiler::CodeGeneratorRequest;
/// use prost_types::compiler::code_generator_response::File;
///
/// let handler = FnHandler::new(|_, request: &CodeGeneratorRequest, response| {
///     for name in &request.file_to_generate {
///         response.add_file(File {
///             name: Some(name.replace(".proto", ".txt")),
///             content: Some(String::from("generated\n")),
///             ..File::default()
///         })?;
///     }
///     Ok(())
/// });
/// let generator = Generator::new("txt", Arc::new(handler));
/// let request = CodeGeneratorRequest {
///     file_to_generate: vec![String::from("a/foo.proto")],
///     ..CodeGeneratorRequest::default()
/// };
/// let response = generator
///     .generate(&CancellationToken::new(), &StderrSink::discard(), &[request])
///     .expect("generation succeeds");
/// assert_eq!(response.file.len(), 1);
/// ```
#[derive(Clone)]
pub struct Generator {
    plugin: String,
    handler: Arc<dyn Handler>,
}

impl Generator {
    /// Creates a generator running `handler` under the name `plugin`.
    #[must_use]
    pub fn new(plugin: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            plugin: plugin.into(),
            handler,
        }
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Runs every request in parallel and merges the results.
    ///
    /// Files from one request appear in the order the plugin emitted them;
    /// requests are merged in completion order.
    ///
    /// # Errors
    ///
    /// Returns the first task error, or [`GenerateError::PluginReported`]
    /// when a plugin reported an error string in its response.
    pub fn generate(
        &self,
        cancel: &CancellationToken,
        stderr: &StderrSink,
        requests: &[CodeGeneratorRequest],
    ) -> Result<CodeGeneratorResponse, GenerateError> {
        let started = Instant::now();
        let token = cancel.child();
        let builder = ResponseBuilder::new(self.plugin.as_str());
        let first_error: Mutex<Option<GenerateError>> = Mutex::new(None);

        info!(
            target: GENERATOR_TARGET,
            plugin = self.plugin.as_str(),
            requests = requests.len(),
            "invoking plugin"
        );

        thread::scope(|scope| {
            for (index, request) in requests.iter().enumerate() {
                let context =
                    InvocationContext::new(self.plugin.as_str(), token.clone(), stderr.clone());
                let handler = &self.handler;
                let builder = &builder;
                let first_error = &first_error;
                let token = &token;
                scope.spawn(move || {
                    let outcome = context
                        .check_cancelled()
                        .and_then(|()| handler.handle(&context, request, builder));
                    if let Err(err) = outcome {
                        debug!(
                            target: GENERATOR_TARGET,
                            plugin = context.plugin(),
                            request = index,
                            error = %err,
                            "plugin task failed"
                        );
                        record_first(first_error, err);
                        token.cancel();
                    }
                });
            }
        });

        if let Some(err) = first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(err);
        }

        let response = builder.into_response()?;
        debug!(
            target: GENERATOR_TARGET,
            plugin = self.plugin.as_str(),
            files = response.file.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "plugin finished"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

/// Keeps the earliest error; errors from cancelled siblings arriving later
/// are dropped.
fn record_first(slot: &Mutex<Option<GenerateError>>, err: GenerateError) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_none() {
        *guard = Some(err);
    }
}

#[cfg(test)]
mod tests;
