//! Construction of `CodeGeneratorRequest`s from images.
//!
//! A [`RequestBuilder`] turns one or more images into the ordered list of
//! requests sent to a single plugin: one request per image by default, or one
//! per top-level directory of target files when by-dir mode is enabled.

use prost_types::compiler::{CodeGeneratorRequest, Version};
use tracing::debug;

use crate::error::GenerateError;
use crate::image::Image;

const REQUEST_TARGET: &str = "protoplug_gen::request";

/// Compiler version advertised to plugins.
#[must_use]
pub fn compiler_version() -> Version {
    Version {
        major: Some(3),
        minor: Some(21),
        patch: Some(12),
        suffix: Some(String::new()),
    }
}

/// Joins plugin options into the single parameter string protoc sends.
///
/// Options are kept in encounter order; empty options are skipped. Returns
/// `None` when nothing remains.
///
/// # Example
///
/// ```
/// use protoplug_gen::request::join_parameter;
///
/// let opts = vec!["paths=source_relative".to_owned(), "plugins=grpc".to_owned()];
/// assert_eq!(
///     join_parameter(&opts).as_deref(),
///     Some("paths=source_relative,plugins=grpc")
/// );
/// assert_eq!(join_parameter(&[]), None);
/// ```
#[must_use]
pub fn join_parameter(options: &[String]) -> Option<String> {
    let joined = options
        .iter()
        .filter(|option| !option.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");
    (!joined.is_empty()).then_some(joined)
}

/// Builds the requests for one plugin.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    parameter: Option<String>,
    by_dir: bool,
    compiler_version: Version,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            parameter: None,
            by_dir: false,
            compiler_version: compiler_version(),
        }
    }
}

impl RequestBuilder {
    /// Creates a builder with no parameter and by-dir mode disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the parameter from a list of plugin options.
    #[must_use]
    pub fn with_options(mut self, options: &[String]) -> Self {
        self.parameter = join_parameter(options);
        self
    }

    /// Enables or disables by-dir partitioning.
    #[must_use]
    pub const fn by_dir(mut self, enabled: bool) -> Self {
        self.by_dir = enabled;
        self
    }

    /// Overrides the advertised compiler version.
    #[must_use]
    pub fn with_compiler_version(mut self, version: Version) -> Self {
        self.compiler_version = version;
        self
    }

    /// Returns the joined parameter, if any.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    /// Builds the ordered request list for `images`.
    ///
    /// Images without target files produce no request.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Partition`] when by-dir partitioning fails.
    pub fn build(&self, images: &[Image]) -> Result<Vec<CodeGeneratorRequest>, GenerateError> {
        let mut requests = Vec::new();
        for image in images {
            if self.by_dir {
                for part in image.partition_by_dir()? {
                    requests.extend(self.request_for(&part));
                }
            } else {
                requests.extend(self.request_for(image));
            }
        }
        debug!(
            target: REQUEST_TARGET,
            images = images.len(),
            requests = requests.len(),
            by_dir = self.by_dir,
            "built plugin requests"
        );
        Ok(requests)
    }

    fn request_for(&self, image: &Image) -> Option<CodeGeneratorRequest> {
        let file_to_generate: Vec<String> = image
            .target_paths()
            .into_iter()
            .map(str::to_owned)
            .collect();
        if file_to_generate.is_empty() {
            return None;
        }
        Some(CodeGeneratorRequest {
            file_to_generate,
            parameter: self.parameter.clone(),
            proto_file: image
                .files()
                .iter()
                .map(|file| file.descriptor().clone())
                .collect(),
            compiler_version: Some(self.compiler_version.clone()),
            ..CodeGeneratorRequest::default()
        })
    }
}

#[cfg(test)]
mod tests;
