//! Domain errors raised while generating code from plugins.
//!
//! All errors use a single `thiserror`-derived enum with structured context so
//! callers can inspect the failure programmatically. I/O errors are wrapped in
//! `Arc` to satisfy the `result_large_err` Clippy lint and to keep the enum
//! `Send + Sync`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising anywhere in the request, invocation, validation, writing,
/// or cleanup phases.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The image could not be constructed from its descriptors.
    #[error("invalid image: {message}")]
    InvalidImage {
        /// Description of the problem.
        message: String,
    },

    /// By-dir partitioning could not assign a file to a directory.
    #[error("failed to partition image by directory: {message}")]
    Partition {
        /// Description of the partitioning failure.
        message: String,
    },

    /// A plugin emitted a file whose name is not a normalized relative path.
    #[error("plugin '{plugin}' produced invalid file name {name:?}: {reason}")]
    InvalidFileName {
        /// Plugin that emitted the file.
        plugin: String,
        /// Offending file name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// No handler could be resolved for the plugin name.
    #[error("plugin '{name}' could not be resolved: {message}")]
    HandlerNotFound {
        /// Plugin name that was looked up.
        name: String,
        /// Human-readable description of the lookup failure.
        message: String,
    },

    /// A handler was registered twice under the same name.
    #[error("plugin '{name}' is already registered")]
    DuplicateHandler {
        /// Plugin name.
        name: String,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{name}' failed to start: {message}")]
    SpawnFailed {
        /// Plugin name.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin exited with a non-zero status code.
    #[error("plugin '{name}' exited with non-zero status {status}")]
    NonZeroExit {
        /// Plugin name.
        name: String,
        /// Process exit status, or `-1` when terminated by a signal.
        status: i32,
    },

    /// An I/O error occurred while communicating with the plugin process.
    #[error("I/O error communicating with plugin '{name}': {source}")]
    Io {
        /// Plugin name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin wrote bytes that are not a `CodeGeneratorResponse`.
    #[error("plugin '{name}' wrote an undecodable response: {source}")]
    DecodeResponse {
        /// Plugin name.
        name: String,
        /// Underlying protobuf decode error.
        #[source]
        source: prost::DecodeError,
    },

    /// The plugin reported an error string in its response.
    #[error("plugin '{name}': {message}")]
    PluginReported {
        /// Plugin name.
        name: String,
        /// Error text reported by the plugin, verbatim.
        message: String,
    },

    /// The invocation was cancelled because a sibling task failed.
    #[error("plugin '{name}' was cancelled")]
    Cancelled {
        /// Plugin name.
        name: String,
    },

    /// The caller-supplied deadline passed before the plugin finished.
    #[error("plugin '{name}' did not finish before the deadline")]
    DeadlineExceeded {
        /// Plugin name.
        name: String,
    },

    /// Two plugins both created the same output path.
    #[error(
        "file {path:?} was generated multiple times: once by plugin \"{first}\" \
         and again by plugin \"{second}\""
    )]
    Conflict {
        /// Materialized output path.
        path: String,
        /// Plugin that created the path first.
        first: String,
        /// Plugin that attempted to create it again.
        second: String,
    },

    /// An insertion point was requested but no read bucket was configured.
    #[error("insertion point \"{insertion_point}\" for file {file:?} is not supported here")]
    InsertionPointUnsupported {
        /// Target file name.
        file: String,
        /// Requested insertion point.
        insertion_point: String,
    },

    /// The file targeted by an insertion point does not exist.
    #[error("file {file:?} targeted by insertion point \"{insertion_point}\" not found")]
    InsertionTargetNotFound {
        /// Target file name.
        file: String,
        /// Requested insertion point.
        insertion_point: String,
    },

    /// The target file has no line carrying the insertion point marker.
    #[error("could not find insertion point \"{insertion_point}\" in file {file:?}")]
    InsertionPointNotFound {
        /// Target file name.
        file: String,
        /// Requested insertion point.
        insertion_point: String,
    },

    /// A bucket read, write, or delete failed.
    #[error("bucket operation on {path:?} failed: {source}")]
    Bucket {
        /// Path inside the bucket.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Writing a `.zip` or `.jar` archive failed.
    #[error("failed to write archive {}: {source}", path.display())]
    Archive {
        /// Archive path on disk.
        path: PathBuf,
        /// Underlying archive error.
        #[source]
        source: Arc<zip::result::ZipError>,
    },

    /// Cleanup refused to delete an output location.
    #[error("refusing to clean output {}: {reason}", path.display())]
    UnsafeCleanup {
        /// Output location that failed the safety check.
        path: PathBuf,
        /// Why the location was refused.
        reason: String,
    },
}

impl GenerateError {
    pub(crate) fn bucket(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bucket {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn io(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            name: name.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` for errors caused by sibling cancellation rather than by
    /// the task itself.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
