//! Plugin responses and the accumulator shared by parallel invocations.
//!
//! Handlers report results into a [`ResponseBuilder`]. The builder is shared
//! by every task of one generation, so each addition takes the internal lock
//! once; files from one plugin response are appended contiguously and in the
//! order the plugin emitted them.

use std::sync::Mutex;

use prost_types::compiler::CodeGeneratorResponse;
use prost_types::compiler::code_generator_response::File;

use crate::error::GenerateError;
use crate::paths;

/// A single plugin's consolidated response and where its output goes.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginResponse {
    plugin_name: String,
    plugin_out: String,
    response: CodeGeneratorResponse,
}

impl PluginResponse {
    /// Wraps a response produced by `plugin_name` for output `plugin_out`.
    ///
    /// `plugin_out` is normalized lexically, so `out`, `./out` and `out/`
    /// all name the same location.
    #[must_use]
    pub fn new(
        plugin_name: impl Into<String>,
        plugin_out: impl Into<String>,
        response: CodeGeneratorResponse,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            plugin_out: paths::normalize_out(&plugin_out.into()),
            response,
        }
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn plugin_name(&self) -> &str {
        self.plugin_name.as_str()
    }

    /// Returns the output location (directory, `.zip`, or `.jar`).
    #[must_use]
    pub const fn plugin_out(&self) -> &str {
        self.plugin_out.as_str()
    }

    /// Returns the underlying response.
    #[must_use]
    pub const fn response(&self) -> &CodeGeneratorResponse {
        &self.response
    }

    /// Returns the generated files.
    #[must_use]
    pub fn files(&self) -> &[File] {
        &self.response.file
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    files: Vec<File>,
    errors: Vec<String>,
    supported_features: Option<u64>,
}

/// Concurrency-safe accumulator for one plugin's partial responses.
#[derive(Debug)]
pub struct ResponseBuilder {
    plugin: String,
    inner: Mutex<Accumulator>,
}

impl ResponseBuilder {
    /// Creates an empty builder for `plugin`.
    #[must_use]
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            inner: Mutex::default(),
        }
    }

    /// Returns the plugin name used in error messages.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Adds one named file.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidFileName`] when the name is not a
    /// normalized relative path.
    pub fn add_file(&self, file: File) -> Result<(), GenerateError> {
        self.check_name(file.name())?;
        self.lock().files.push(file);
        Ok(())
    }

    /// Records a response-level error string.
    pub fn add_error(&self, message: impl Into<String>) {
        self.lock().errors.push(message.into());
    }

    /// Records the feature bits one request reported.
    pub fn set_supported_features(&self, features: u64) {
        let mut inner = self.lock();
        inner.supported_features = Some(
            inner
                .supported_features
                .map_or(features, |current| current & features),
        );
    }

    /// Adds everything from one raw plugin response.
    ///
    /// Files without a name continue the previous file of the same response.
    /// The error string and feature bits are recorded as well.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidFileName`] when a name is invalid or
    /// the first file of the response has no name.
    pub fn add_response(&self, response: CodeGeneratorResponse) -> Result<(), GenerateError> {
        let mut merged: Vec<File> = Vec::with_capacity(response.file.len());
        for file in response.file {
            if file.name().is_empty() {
                let previous = merged
                    .last_mut()
                    .ok_or_else(|| GenerateError::InvalidFileName {
                        plugin: self.plugin.clone(),
                        name: String::new(),
                        reason: String::from("first file of a response must have a name"),
                    })?;
                previous
                    .content
                    .get_or_insert_with(String::new)
                    .push_str(file.content());
                continue;
            }
            self.check_name(file.name())?;
            merged.push(file);
        }

        let mut inner = self.lock();
        inner.files.extend(merged);
        if let Some(error) = response.error.filter(|error| !error.is_empty()) {
            inner.errors.push(error);
        }
        if let Some(features) = response.supported_features {
            inner.supported_features = Some(
                inner
                    .supported_features
                    .map_or(features, |current| current & features),
            );
        }
        Ok(())
    }

    /// Consolidates everything added so far into one response.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::PluginReported`] when any error string was
    /// recorded; multiple strings are joined with newlines.
    pub fn into_response(self) -> Result<CodeGeneratorResponse, GenerateError> {
        let plugin = self.plugin;
        let inner = self
            .inner
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !inner.errors.is_empty() {
            return Err(GenerateError::PluginReported {
                name: plugin,
                message: inner.errors.join("\n"),
            });
        }
        Ok(CodeGeneratorResponse {
            supported_features: inner.supported_features,
            file: inner.files,
            ..CodeGeneratorResponse::default()
        })
    }

    fn check_name(&self, name: &str) -> Result<(), GenerateError> {
        paths::check_relative(name).map_err(|reason| GenerateError::InvalidFileName {
            plugin: self.plugin.clone(),
            name: name.to_owned(),
            reason: reason.to_owned(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Accumulator> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
