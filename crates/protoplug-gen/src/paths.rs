//! Validation of slash-separated relative paths.
//!
//! Image file names and plugin output names share the same rules as protoc:
//! relative, `/`-separated, and free of empty, `.`, or `..` components.
//! Output locations come from the command line instead and are normalized
//! lexically so that equivalent spellings name the same location.

/// Checks that `path` is a normalized relative path, returning the reason on
/// failure.
pub(crate) fn check_relative(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("path is empty");
    }
    if path.contains('\\') {
        return Err("path must use '/' as the separator");
    }
    if path.starts_with('/') {
        return Err("path must be relative");
    }
    for component in path.split('/') {
        match component {
            "" => return Err("path contains an empty component"),
            "." | ".." => return Err("path contains a '.' or '..' component"),
            _ => {}
        }
    }
    Ok(())
}

/// Returns the first directory component of `path`, or `.` for root-level
/// files.
pub(crate) fn top_dir(path: &str) -> &str {
    path.split_once('/').map_or(".", |(dir, _)| dir)
}

/// Returns the directory portion of `path`, or `.` for root-level files.
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or(".", |(dir, _)| dir)
}

const fn is_separator(character: char) -> bool {
    character == '/' || (cfg!(windows) && character == '\\')
}

/// Lexically normalizes an output location.
///
/// `.` components and repeated or trailing separators are dropped, and `..`
/// cancels the preceding named component. Leading `..` components of a
/// relative location are kept, while `..` directly below the root of an
/// absolute location is discarded. An empty result becomes `.`. Symlinks are
/// not resolved.
pub(crate) fn normalize_out(location: &str) -> String {
    let absolute = location.starts_with(is_separator);
    let mut components: Vec<&str> = Vec::new();
    for component in location.split(is_separator) {
        match component {
            "" | "." => {}
            ".." => match components.last() {
                Some(&last) if last != ".." => {
                    components.pop();
                }
                _ if absolute => {}
                _ => components.push(component),
            },
            _ => components.push(component),
        }
    }
    let joined = components.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

/// Joins a plugin output location and a relative file name.
pub(crate) fn join(base: &str, name: &str) -> String {
    if base.is_empty() || base == "." {
        name.to_owned()
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}
