//! Output destinations: directories, zip archives and jar archives.
//!
//! Each distinct plugin output location gets one [`Bucket`]. Directory
//! locations write straight to disk as files are produced; archive locations
//! buffer in memory and are assembled when the set is flushed. Plugins that
//! share an output location share its bucket, which is what lets one plugin
//! splice into another plugin's file.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use crate::bucket::{Bucket, DirBucket, MemoryBucket};
use crate::error::GenerateError;
use crate::paths;
use crate::response::PluginResponse;
use crate::validate::validate_responses;
use crate::writer::{InsertionTargets, write_response};

const OUTPUT_TARGET: &str = "protoplug_gen::output";

/// Path of the manifest written at the start of every jar.
pub const JAR_MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Manifest content written into every jar.
pub const JAR_MANIFEST: &str = "Manifest-Version: 1.0\nCreated-By: 1.6.0 (protoc)\n\n";

/// How an output location is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A directory tree.
    Directory,
    /// A zip archive.
    Zip,
    /// A jar archive, which is a zip archive carrying a manifest.
    Jar,
}

impl OutputKind {
    /// Infers the kind from the extension of `plugin_out`.
    ///
    /// ```
    /// use protoplug_gen::output::OutputKind;
    ///
    /// assert_eq!(OutputKind::of("gen/java.jar"), OutputKind::Jar);
    /// assert_eq!(OutputKind::of("gen.zip"), OutputKind::Zip);
    /// assert_eq!(OutputKind::of("gen/zip"), OutputKind::Directory);
    /// ```
    #[must_use]
    pub fn of(plugin_out: &str) -> Self {
        match Path::new(plugin_out).extension().and_then(|ext| ext.to_str()) {
            Some("zip") => Self::Zip,
            Some("jar") => Self::Jar,
            _ => Self::Directory,
        }
    }

    /// Returns whether the location is an archive.
    #[must_use]
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::Zip | Self::Jar)
    }
}

#[derive(Debug)]
enum Output {
    Directory(DirBucket),
    Archive {
        path: PathBuf,
        kind: OutputKind,
        bucket: MemoryBucket,
    },
}

impl Output {
    fn bucket_mut(&mut self) -> &mut dyn Bucket {
        match self {
            Self::Directory(bucket) => bucket,
            Self::Archive { bucket, .. } => bucket,
        }
    }
}

/// The set of buckets receiving one run's output.
#[derive(Debug)]
pub struct OutputSet {
    base: PathBuf,
    outputs: BTreeMap<String, Output>,
}

impl OutputSet {
    /// Creates an empty set resolving relative output locations against
    /// `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            outputs: BTreeMap::new(),
        }
    }

    /// Returns the bucket for `plugin_out`, creating it on first use.
    ///
    /// Equivalent spellings of one location share a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Bucket`] if a directory location cannot be
    /// created.
    pub fn bucket(&mut self, plugin_out: &str) -> Result<&mut dyn Bucket, GenerateError> {
        let location = paths::normalize_out(plugin_out);
        if !self.outputs.contains_key(&location) {
            let output = self.open(&location)?;
            self.outputs.insert(location.clone(), output);
        }
        self.outputs
            .get_mut(&location)
            .map(Output::bucket_mut)
            .ok_or_else(|| {
                GenerateError::bucket(
                    location.as_str(),
                    io::Error::new(io::ErrorKind::NotFound, "output location vanished"),
                )
            })
    }

    fn open(&self, plugin_out: &str) -> Result<Output, GenerateError> {
        let path = self.base.join(plugin_out);
        let kind = OutputKind::of(plugin_out);
        debug!(
            target: OUTPUT_TARGET,
            plugin_out,
            ?kind,
            "opening output location"
        );
        if kind.is_archive() {
            Ok(Output::Archive {
                path,
                kind,
                bucket: MemoryBucket::new(),
            })
        } else {
            DirBucket::open(path).map(Output::Directory)
        }
    }

    /// Checks `responses` for conflicts, then writes each into the bucket for
    /// its output location, in slice order.
    ///
    /// Insertion points resolve against everything already written to the
    /// same location, including the output of earlier plugins.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Conflict`] before anything is written when two
    /// plugins create the same path, or any error from
    /// [`write_response`](crate::writer::write_response).
    pub fn write_responses(&mut self, responses: &[PluginResponse]) -> Result<(), GenerateError> {
        validate_responses(responses)?;
        for response in responses {
            let bucket = self.bucket(response.plugin_out())?;
            write_response(bucket, response.response(), InsertionTargets::Output)?;
            debug!(
                target: OUTPUT_TARGET,
                plugin = response.plugin_name(),
                plugin_out = response.plugin_out(),
                files = response.files().len(),
                "wrote plugin response"
            );
        }
        Ok(())
    }

    /// Assembles every archive and returns the materialized locations.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Archive`] or [`GenerateError::Bucket`] if an
    /// archive cannot be built or written.
    pub fn flush(self) -> Result<Vec<PathBuf>, GenerateError> {
        let mut written = Vec::with_capacity(self.outputs.len());
        for output in self.outputs.into_values() {
            match output {
                Output::Directory(bucket) => written.push(bucket.root().to_path_buf()),
                Output::Archive { path, kind, bucket } => {
                    write_archive(&path, kind, &bucket)?;
                    info!(
                        target: OUTPUT_TARGET,
                        archive = %path.display(),
                        entries = bucket.len(),
                        "wrote archive"
                    );
                    written.push(path);
                }
            }
        }
        Ok(written)
    }
}

/// Writes `responses` under `base` and flushes the result.
///
/// # Errors
///
/// Returns the first conflict, insertion or storage error encountered.
pub fn materialize(
    base: impl Into<PathBuf>,
    responses: &[PluginResponse],
) -> Result<Vec<PathBuf>, GenerateError> {
    let mut outputs = OutputSet::new(base);
    outputs.write_responses(responses)?;
    outputs.flush()
}

/// Builds the archive bytes for `bucket`, entries sorted by path.
///
/// # Errors
///
/// Returns [`GenerateError::Archive`] if the archive cannot be encoded.
pub fn archive_bytes(
    path: &Path,
    kind: OutputKind,
    bucket: &MemoryBucket,
) -> Result<Vec<u8>, GenerateError> {
    let archive_error = |err: ZipError| GenerateError::Archive {
        path: path.to_path_buf(),
        source: Arc::new(err),
    };
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    if kind == OutputKind::Jar {
        zip.start_file(JAR_MANIFEST_PATH, entry_options())
            .map_err(archive_error)?;
        zip.write_all(JAR_MANIFEST.as_bytes())
            .map_err(|err| archive_error(ZipError::Io(err)))?;
    }
    for (name, content) in bucket.iter() {
        if kind == OutputKind::Jar && name == JAR_MANIFEST_PATH {
            continue;
        }
        zip.start_file(name, entry_options()).map_err(archive_error)?;
        zip.write_all(content)
            .map_err(|err| archive_error(ZipError::Io(err)))?;
    }
    let cursor = zip.finish().map_err(archive_error)?;
    Ok(cursor.into_inner())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn write_archive(path: &Path, kind: OutputKind, bucket: &MemoryBucket) -> Result<(), GenerateError> {
    let bytes = archive_bytes(path, kind, bucket)?;
    let (parent, name) = split_location(path)?;
    DirBucket::open(parent)?.put(name, &bytes)
}

fn split_location(path: &Path) -> Result<(PathBuf, &str), GenerateError> {
    let name = path.file_name().and_then(|name| name.to_str()).ok_or_else(|| {
        GenerateError::UnsafeCleanup {
            path: path.to_path_buf(),
            reason: "location has no usable file name".to_owned(),
        }
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

/// Deletes prior output at each location, resolved against the current
/// working directory.
///
/// # Errors
///
/// See [`delete_outs_in`].
pub fn delete_outs(plugin_outs: &[String]) -> Result<(), GenerateError> {
    let working_dir = std::env::current_dir().map_err(|err| GenerateError::UnsafeCleanup {
        path: PathBuf::new(),
        reason: format!("cannot determine the working directory: {err}"),
    })?;
    delete_outs_in(&working_dir, plugin_outs)
}

/// Deletes prior output at each location, resolved against `working_dir`.
///
/// Directory locations are removed whole; archive locations remove the
/// archive file from its parent directory. Every location is checked before
/// anything is deleted, and locations that do not exist are skipped.
///
/// # Errors
///
/// Returns [`GenerateError::UnsafeCleanup`] without deleting anything when a
/// location is empty or resolves to the working directory or one of its
/// ancestors, or [`GenerateError::Bucket`] when resolution or deletion fails.
pub fn delete_outs_in(working_dir: &Path, plugin_outs: &[String]) -> Result<(), GenerateError> {
    let cwd = working_dir
        .canonicalize()
        .map_err(|err| GenerateError::UnsafeCleanup {
            path: working_dir.to_path_buf(),
            reason: format!("cannot resolve the working directory: {err}"),
        })?;

    let mut doomed = Vec::with_capacity(plugin_outs.len());
    for plugin_out in plugin_outs {
        if plugin_out.is_empty() {
            return Err(GenerateError::UnsafeCleanup {
                path: PathBuf::new(),
                reason: "output location is empty".to_owned(),
            });
        }
        let candidate = cwd.join(plugin_out);
        let resolved = match candidate.canonicalize() {
            Ok(resolved) => resolved,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target: OUTPUT_TARGET, plugin_out, "nothing to clean");
                continue;
            }
            Err(err) => return Err(GenerateError::bucket(candidate.display().to_string(), err)),
        };
        if cwd.starts_with(&resolved) {
            return Err(GenerateError::UnsafeCleanup {
                path: resolved,
                reason: "refusing to delete the working directory".to_owned(),
            });
        }
        doomed.push(resolved);
    }

    for path in &doomed {
        let (parent, name) = split_location(path)?;
        DirBucket::open(parent)?.delete(name)?;
        info!(target: OUTPUT_TARGET, path = %path.display(), "removed prior output");
    }
    Ok(())
}
