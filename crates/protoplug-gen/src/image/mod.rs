//! Compiled descriptor sets handed to plugins.
//!
//! An [`Image`] is the fully resolved output of an upstream compile: every
//! file descriptor in topological order, each flagged as either a target
//! (generate code for it) or an import (present only so plugins can resolve
//! types). Images are immutable once built; by-dir partitioning produces new
//! images rather than mutating the original.

use std::collections::{BTreeMap, HashMap, HashSet};

use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};

use crate::error::GenerateError;
use crate::paths;

/// One file of an [`Image`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    descriptor: FileDescriptorProto,
    is_import: bool,
}

impl ImageFile {
    /// Wraps a descriptor, flagging whether it is an import.
    #[must_use]
    pub const fn new(descriptor: FileDescriptorProto, is_import: bool) -> Self {
        Self {
            descriptor,
            is_import,
        }
    }

    /// Returns the file path, relative to its include root.
    #[must_use]
    pub fn path(&self) -> &str {
        self.descriptor.name()
    }

    /// Returns the underlying descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &FileDescriptorProto {
        &self.descriptor
    }

    /// Returns `true` when the file is present only to satisfy imports.
    #[must_use]
    pub const fn is_import(&self) -> bool {
        self.is_import
    }

    /// Returns the paths this file imports.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.descriptor.dependency
    }

    fn with_import(&self, is_import: bool) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            is_import,
        }
    }
}

/// A resolved set of file descriptors.
///
/// # Example
///
/// ```
/// use protoplug_gen::{Image, ImageFile};
/// use prost_types::FileDescriptorProto;
///
/// let file = FileDescriptorProto {
///     name: Some("a/foo.proto".into()),
///     ..FileDescriptorProto::default()
/// };
/// let image = Image::new(vec![ImageFile::new(file, false)]).expect("valid image");
/// assert_eq!(image.target_paths(), vec!["a/foo.proto"]);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Image {
    files: Vec<ImageFile>,
}

impl Image {
    /// Builds an image, checking that file paths are valid and unique.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidImage`] when a path is not a normalized
    /// relative path or appears more than once.
    pub fn new(files: Vec<ImageFile>) -> Result<Self, GenerateError> {
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            let path = file.path();
            paths::check_relative(path).map_err(|reason| GenerateError::InvalidImage {
                message: format!("file name {path:?}: {reason}"),
            })?;
            if !seen.insert(path) {
                return Err(GenerateError::InvalidImage {
                    message: format!("duplicate file {path:?}"),
                });
            }
        }
        Ok(Self { files })
    }

    /// Builds an image from a descriptor set, treating every file as a target.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidImage`] under the same conditions as
    /// [`Image::new`].
    pub fn from_file_descriptor_set(set: FileDescriptorSet) -> Result<Self, GenerateError> {
        Self::new(
            set.file
                .into_iter()
                .map(|descriptor| ImageFile::new(descriptor, false))
                .collect(),
        )
    }

    /// Decodes a serialized `FileDescriptorSet` into an image.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidImage`] when the bytes do not decode or
    /// the decoded files are invalid.
    pub fn decode(bytes: &[u8]) -> Result<Self, GenerateError> {
        let set = FileDescriptorSet::decode(bytes).map_err(|err| GenerateError::InvalidImage {
            message: format!("failed to decode descriptor set: {err}"),
        })?;
        Self::from_file_descriptor_set(set)
    }

    /// Returns every file in topological order.
    #[must_use]
    pub fn files(&self) -> &[ImageFile] {
        &self.files
    }

    /// Looks up a file by path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&ImageFile> {
        self.files.iter().find(|file| file.path() == path)
    }

    /// Returns the paths of the non-import files, in image order.
    #[must_use]
    pub fn target_paths(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|file| !file.is_import())
            .map(ImageFile::path)
            .collect()
    }

    /// Returns a copy of the image where exactly `targets` are non-imports.
    ///
    /// An empty `targets` slice leaves the image unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidImage`] when a target is not in the
    /// image.
    pub fn with_targets(&self, targets: &[String]) -> Result<Self, GenerateError> {
        if targets.is_empty() {
            return Ok(self.clone());
        }
        let wanted: HashSet<&str> = targets.iter().map(String::as_str).collect();
        for target in &wanted {
            if self.file(target).is_none() {
                return Err(GenerateError::InvalidImage {
                    message: format!("{target}: file not found in image"),
                });
            }
        }
        let files = self
            .files
            .iter()
            .map(|file| file.with_import(!wanted.contains(file.path())))
            .collect();
        Ok(Self { files })
    }

    /// Converts the image back into a `FileDescriptorSet`.
    ///
    /// Imports are dropped unless `include_imports` is set, and source code
    /// info is stripped unless `include_source_info` is set.
    #[must_use]
    pub fn to_file_descriptor_set(
        &self,
        include_imports: bool,
        include_source_info: bool,
    ) -> FileDescriptorSet {
        let file = self
            .files
            .iter()
            .filter(|file| include_imports || !file.is_import())
            .map(|file| {
                let mut descriptor = file.descriptor().clone();
                if !include_source_info {
                    descriptor.source_code_info = None;
                }
                descriptor
            })
            .collect();
        FileDescriptorSet { file }
    }

    /// Splits the image into one sub-image per top-level directory of its
    /// target files.
    ///
    /// `a/x.proto` and `a/b/y.proto` share the `a` sub-image; files at the
    /// root share the `.` sub-image. Each sub-image contains its targets plus, as
    /// imports, every file they transitively depend on. Sub-images are
    /// ordered by directory name and keep the original file order.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Partition`] when a dependency of a target file
    /// is missing from the image.
    pub fn partition_by_dir(&self) -> Result<Vec<Self>, GenerateError> {
        let mut by_dir: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for path in self.target_paths() {
            by_dir
                .entry(paths::top_dir(path))
                .or_default()
                .insert(path);
        }

        let index: HashMap<&str, &ImageFile> = self
            .files
            .iter()
            .map(|file| (file.path(), file))
            .collect();

        by_dir
            .into_values()
            .map(|targets| {
                let needed = Self::closure(&index, &targets)?;
                let files = self
                    .files
                    .iter()
                    .filter(|file| needed.contains(file.path()))
                    .map(|file| file.with_import(!targets.contains(file.path())))
                    .collect();
                Ok(Self { files })
            })
            .collect()
    }

    fn closure<'a>(
        index: &HashMap<&'a str, &'a ImageFile>,
        roots: &HashSet<&'a str>,
    ) -> Result<HashSet<&'a str>, GenerateError> {
        let mut needed: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = roots.iter().copied().collect();
        while let Some(path) = pending.pop() {
            if !needed.insert(path) {
                continue;
            }
            let file = index.get(path).ok_or_else(|| GenerateError::Partition {
                message: format!("{path}: imported file is not part of the image"),
            })?;
            pending.extend(file.dependencies().iter().map(String::as_str));
        }
        Ok(needed)
    }
}
