//! Path-to-bytes stores that generated output is written into.
//!
//! A [`Bucket`] maps slash-separated relative paths to file content. The
//! [`DirBucket`] writes straight through to a directory on disk using a
//! capability handle, so nothing escapes the output root. The
//! [`MemoryBucket`] buffers content for archives and tests.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use cap_std::ambient_authority;
use cap_std::fs::Dir;

use crate::error::GenerateError;
use crate::paths;

/// A mutable store of generated files.
pub trait Bucket {
    /// Reads a file, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Bucket`] if the read fails for another reason.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, GenerateError>;

    /// Creates or replaces a file.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Bucket`] if the path is invalid or the write
    /// fails.
    fn put(&mut self, path: &str, content: &[u8]) -> Result<(), GenerateError>;

    /// Deletes a file; deleting a missing file succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Bucket`] if the deletion fails.
    fn delete(&mut self, path: &str) -> Result<(), GenerateError>;

    /// Lists every file path in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Bucket`] if the listing fails.
    fn paths(&self) -> Result<Vec<String>, GenerateError>;
}

fn checked(path: &str) -> Result<&str, GenerateError> {
    paths::check_relative(path).map_err(|reason| {
        GenerateError::bucket(path, io::Error::new(io::ErrorKind::InvalidInput, reason))
    })?;
    Ok(path)
}

/// In-memory bucket.
///
/// # Example
///
/// ```
/// use protoplug_gen::{Bucket, MemoryBucket};
///
/// let mut bucket = MemoryBucket::new();
/// bucket.put("a/b.txt", b"hello").expect("put");
/// assert_eq!(bucket.get("a/b.txt").expect("get"), Some(b"hello".to_vec()));
/// assert_eq!(bucket.get("missing").expect("get"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBucket {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryBucket {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_slice()))
    }

    /// Returns the number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` when the bucket holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Bucket for MemoryBucket {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, GenerateError> {
        Ok(self.files.get(path).cloned())
    }

    fn put(&mut self, path: &str, content: &[u8]) -> Result<(), GenerateError> {
        self.files.insert(checked(path)?.to_owned(), content.to_vec());
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), GenerateError> {
        self.files.remove(path);
        Ok(())
    }

    fn paths(&self) -> Result<Vec<String>, GenerateError> {
        Ok(self.files.keys().cloned().collect())
    }
}

/// Bucket rooted at a directory on disk.
#[derive(Debug)]
pub struct DirBucket {
    root: PathBuf,
    dir: Dir,
}

impl DirBucket {
    /// Opens `root`, creating it and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Bucket`] if the directory cannot be created or
    /// opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GenerateError> {
        let root = path.into();
        let display = root.display().to_string();
        std::fs::create_dir_all(&root).map_err(|err| GenerateError::bucket(&display, err))?;
        let dir = Dir::open_ambient_dir(&root, ambient_authority())
            .map_err(|err| GenerateError::bucket(&display, err))?;
        Ok(Self { root, dir })
    }

    /// Returns the directory on disk.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn error(&self, path: &str, err: io::Error) -> GenerateError {
        GenerateError::bucket(self.root.join(path).display().to_string(), err)
    }

    fn walk(&self, prefix: &str, out: &mut Vec<String>) -> Result<(), GenerateError> {
        let listing = if prefix.is_empty() {
            self.dir.entries()
        } else {
            self.dir.read_dir(prefix)
        }
        .map_err(|err| self.error(prefix, err))?;

        for item in listing {
            let entry = item.map_err(|err| self.error(prefix, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = paths::join(prefix, &name);
            let file_type = entry.file_type().map_err(|err| self.error(&path, err))?;
            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl Bucket for DirBucket {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, GenerateError> {
        match self.dir.read(checked(path)?) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.error(path, err)),
        }
    }

    fn put(&mut self, path: &str, content: &[u8]) -> Result<(), GenerateError> {
        let relative = checked(path)?;
        let parent = paths::parent_dir(relative);
        if parent != "." {
            self.dir
                .create_dir_all(parent)
                .map_err(|err| self.error(parent, err))?;
        }
        self.dir
            .write(relative, content)
            .map_err(|err| self.error(relative, err))
    }

    fn delete(&mut self, path: &str) -> Result<(), GenerateError> {
        let relative = checked(path)?;
        let is_dir = self
            .dir
            .symlink_metadata(relative)
            .map(|metadata| metadata.is_dir());
        let removed = match is_dir {
            Ok(true) => self.dir.remove_dir_all(relative),
            Ok(false) => self.dir.remove_file(relative),
            Err(err) => Err(err),
        };
        match removed {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.error(relative, err)),
        }
    }

    fn paths(&self) -> Result<Vec<String>, GenerateError> {
        let mut out = Vec::new();
        self.walk("", &mut out)?;
        out.sort();
        Ok(out)
    }
}
