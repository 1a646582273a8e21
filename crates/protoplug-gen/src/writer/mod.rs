//! Materialization of plugin responses, including insertion points.
//!
//! Files without an insertion point are written verbatim. Files with one are
//! spliced into an existing target: the content is inserted immediately above
//! the first line containing `@@protoc_insertion_point(<name>)`, with every
//! inserted line prefixed by that line's leading whitespace.
//!
//! Lines are rejoined with `\n` whatever the target's original line endings
//! were; a trailing newline on the target is kept.

use prost_types::compiler::CodeGeneratorResponse;
use tracing::debug;

use crate::bucket::Bucket;
use crate::error::GenerateError;

const WRITER_TARGET: &str = "protoplug_gen::writer";

/// Where insertion-point targets are looked up.
#[derive(Clone, Copy, Default)]
pub enum InsertionTargets<'a> {
    /// Insertion points are rejected.
    #[default]
    Unsupported,
    /// Targets are read back from the bucket being written.
    Output,
    /// Targets are read from the bucket being written, falling back to a
    /// separate read-only bucket.
    Bucket(&'a dyn Bucket),
}

impl std::fmt::Debug for InsertionTargets<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => f.write_str("Unsupported"),
            Self::Output => f.write_str("Output"),
            Self::Bucket(_) => f.write_str("Bucket(..)"),
        }
    }
}

/// Returns the marker text that anchors `insertion_point`.
///
/// ```
/// use protoplug_gen::writer::insertion_marker;
///
/// assert_eq!(insertion_marker("imports"), "@@protoc_insertion_point(imports)");
/// ```
#[must_use]
pub fn insertion_marker(insertion_point: &str) -> String {
    format!("@@protoc_insertion_point({insertion_point})")
}

/// Writes every file of `response` into `bucket`, in response order.
///
/// Later entries see the output of earlier ones, so several insertions into
/// the same file chain within one call.
///
/// # Errors
///
/// Returns [`GenerateError::InsertionPointUnsupported`] when insertion points
/// are disabled, [`GenerateError::InsertionTargetNotFound`] when the target is
/// missing, [`GenerateError::InsertionPointNotFound`] when the marker is
/// missing, or [`GenerateError::Bucket`] for storage failures. Files written
/// before the failure stay written.
pub fn write_response(
    bucket: &mut dyn Bucket,
    response: &CodeGeneratorResponse,
    targets: InsertionTargets<'_>,
) -> Result<(), GenerateError> {
    for file in &response.file {
        let name = file.name();
        let insertion_point = file.insertion_point();
        if insertion_point.is_empty() {
            bucket.put(name, file.content().as_bytes())?;
            continue;
        }

        let target = match targets {
            InsertionTargets::Unsupported => {
                return Err(GenerateError::InsertionPointUnsupported {
                    file: name.to_owned(),
                    insertion_point: insertion_point.to_owned(),
                });
            }
            InsertionTargets::Output => bucket.get(name)?,
            InsertionTargets::Bucket(read) => match bucket.get(name)? {
                Some(content) => Some(content),
                None => read.get(name)?,
            },
        }
        .ok_or_else(|| GenerateError::InsertionTargetNotFound {
            file: name.to_owned(),
            insertion_point: insertion_point.to_owned(),
        })?;

        let spliced = insert(&target, insertion_point, file.content()).ok_or_else(|| {
            GenerateError::InsertionPointNotFound {
                file: name.to_owned(),
                insertion_point: insertion_point.to_owned(),
            }
        })?;
        debug!(
            target: WRITER_TARGET,
            file = name,
            insertion_point,
            inserted_bytes = file.content().len(),
            "applied insertion point"
        );
        bucket.put(name, &spliced)?;
    }
    Ok(())
}

/// Splices `content` above the first line of `target` containing the marker
/// for `insertion_point`, or returns `None` when no line does.
#[must_use]
pub fn insert(target: &[u8], insertion_point: &str, content: &str) -> Option<Vec<u8>> {
    let marker = insertion_marker(insertion_point);
    let (lines, trailing_newline) = split_lines(target);
    let position = lines.iter().position(|line| contains(line, marker.as_bytes()))?;
    let indent = lines.get(position).map_or(&[][..], |line| leading_whitespace(line));

    let (inserted, _) = split_lines(content.as_bytes());
    let mut out = Vec::with_capacity(target.len() + content.len() + inserted.len() * indent.len());
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            out.push(b'\n');
        }
        if index == position {
            for new_line in &inserted {
                out.extend_from_slice(indent);
                out.extend_from_slice(new_line);
                out.push(b'\n');
            }
        }
        out.extend_from_slice(line);
    }
    if trailing_newline {
        out.push(b'\n');
    }
    Some(out)
}

/// Splits on `\n`, dropping a `\r` before each break, and reports whether the
/// input ended with a newline.
fn split_lines(bytes: &[u8]) -> (Vec<&[u8]>, bool) {
    if bytes.is_empty() {
        return (Vec::new(), false);
    }
    let trailing_newline = bytes.ends_with(b"\n");
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let lines = body
        .split(|byte| *byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    (lines, trailing_newline)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Returns the run of Unicode whitespace at the start of `line`.
fn leading_whitespace(line: &[u8]) -> &[u8] {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(err) => line
            .get(..err.valid_up_to())
            .and_then(|valid| std::str::from_utf8(valid).ok())
            .unwrap_or_default(),
    };
    let end = text
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(text.len());
    line.get(..end).unwrap_or_default()
}
