//! Protoc-style plugin flags and argument files.
//!
//! `--<name>_out` and `--<name>_opt` cannot be declared to clap ahead of
//! time, so they are pulled out of the argument list first. What remains is
//! parsed by [`crate::cli::Cli`].

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protoplug_gen::registry::PLUGIN_PREFIX;
use thiserror::Error;

/// Flags that end in `_out` but do not name a plugin.
const RESERVED_OUT_FLAGS: &[&str] = &["descriptor_set"];

/// Errors raised while interpreting protoc-style flags.
#[derive(Debug, Error)]
pub(crate) enum FlagError {
    #[error("--{name}_out may only be passed once")]
    DuplicateOut { name: String },
    #[error("--{name}_opt requires a matching --{name}_out")]
    OptWithoutOut { name: String },
    #[error("{flag} requires a value")]
    MissingValue { flag: String },
    #[error("failed to read argument file {}: {source}", path.display())]
    ArgFile {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("--plugin={value}: give the plugin as NAME=PATH or name the executable protoc-gen-NAME")]
    PluginName { value: String },
    #[error("argument {0:?} is not valid UTF-8")]
    NotUnicode(OsString),
}

/// One plugin requested with `--<name>_out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PluginFlag {
    pub(crate) name: String,
    pub(crate) out: String,
    pub(crate) options: Vec<String>,
}

impl PluginFlag {
    /// Returns the flag the plugin was requested with.
    pub(crate) fn flag(&self) -> String {
        format!("--{}_out", self.name)
    }
}

/// Arguments split into plugin requests and everything else.
#[derive(Debug, Default)]
pub(crate) struct ExtractedFlags {
    pub(crate) plugins: Vec<PluginFlag>,
    pub(crate) remaining: Vec<OsString>,
}

/// Replaces every `@file` argument after the program name with the lines of
/// that file. Blank lines are skipped; files are not expanded recursively.
pub(crate) fn expand_argfiles(args: Vec<OsString>) -> Result<Vec<OsString>, FlagError> {
    let mut expanded = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    expanded.extend(iter.next());
    for arg in iter {
        let Some(path) = arg.to_str().and_then(|text| text.strip_prefix('@')) else {
            expanded.push(arg);
            continue;
        };
        let contents = fs::read_to_string(path).map_err(|source| FlagError::ArgFile {
            path: PathBuf::from(path),
            source: Arc::new(source),
        })?;
        expanded.extend(
            contents
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(OsString::from),
        );
    }
    Ok(expanded)
}

enum PluginFlagKind {
    Out,
    Opt,
}

fn classify(flag: &str) -> Option<(&str, PluginFlagKind)> {
    let body = flag.strip_prefix("--")?;
    let (name, kind) = match body.strip_suffix("_out") {
        Some(name) => (name, PluginFlagKind::Out),
        None => (body.strip_suffix("_opt")?, PluginFlagKind::Opt),
    };
    if name.is_empty() || name.starts_with('-') || RESERVED_OUT_FLAGS.contains(&name) {
        return None;
    }
    Some((name, kind))
}

/// Pulls `--<name>_out` and `--<name>_opt` flags out of `args`.
///
/// Plugins keep the order of their `_out` flags. Options from the `_out`
/// value come first, followed by each `_opt` value in order.
pub(crate) fn extract_plugin_flags(args: &[OsString]) -> Result<ExtractedFlags, FlagError> {
    let mut extracted = ExtractedFlags::default();
    let mut extra_options: Vec<(String, String)> = Vec::new();
    let mut iter = args.iter();
    extracted.remaining.extend(iter.next().cloned());

    while let Some(arg) = iter.next() {
        let Some(text) = arg.to_str() else {
            extracted.remaining.push(arg.clone());
            continue;
        };
        let (flag, inline) = match text.split_once('=') {
            Some((flag, value)) => (flag, Some(value)),
            None => (text, None),
        };
        let Some((name, kind)) = classify(flag) else {
            extracted.remaining.push(arg.clone());
            continue;
        };
        let value = match inline {
            Some(value) => value.to_owned(),
            None => iter
                .next()
                .map(|next| {
                    next.to_str()
                        .map(str::to_owned)
                        .ok_or_else(|| FlagError::NotUnicode(next.clone()))
                })
                .transpose()?
                .ok_or_else(|| FlagError::MissingValue {
                    flag: flag.to_owned(),
                })?,
        };

        match kind {
            PluginFlagKind::Out => {
                if extracted.plugins.iter().any(|plugin| plugin.name == name) {
                    return Err(FlagError::DuplicateOut {
                        name: name.to_owned(),
                    });
                }
                let (options, out) = split_out_value(&value, cfg!(windows));
                extracted.plugins.push(PluginFlag {
                    name: name.to_owned(),
                    out,
                    options,
                });
            }
            PluginFlagKind::Opt => extra_options.push((name.to_owned(), value)),
        }
    }

    for (name, option) in extra_options {
        let plugin = extracted
            .plugins
            .iter_mut()
            .find(|plugin| plugin.name == name)
            .ok_or_else(|| FlagError::OptWithoutOut { name: name.clone() })?;
        plugin.options.push(option);
    }
    Ok(extracted)
}

/// Splits `opt1,opt2:path` into its options and output location.
///
/// With `drive_paths` set, a value such as `C:\out` is a location without
/// options rather than the option `C` for the location `\out`.
pub(crate) fn split_out_value(value: &str, drive_paths: bool) -> (Vec<String>, String) {
    if drive_paths && is_drive_path(value) {
        return (Vec::new(), value.to_owned());
    }
    match value.split_once(':') {
        Some((options, out)) => (
            options
                .split(',')
                .filter(|option| !option.is_empty())
                .map(str::to_owned)
                .collect(),
            out.to_owned(),
        ),
        None => (Vec::new(), value.to_owned()),
    }
}

fn is_drive_path(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(letter), Some(':'), None | Some('\\' | '/')) if letter.is_ascii_alphabetic()
    )
}

/// Parses a `--plugin` value into a plugin name and executable path.
pub(crate) fn parse_plugin_spec(value: &str) -> Result<(String, PathBuf), FlagError> {
    if let Some((name, path)) = value.split_once('=') {
        return Ok((name.to_owned(), PathBuf::from(path)));
    }
    let path = Path::new(value);
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix(PLUGIN_PREFIX))
        .filter(|name| !name.is_empty())
        .map(|name| (name.to_owned(), path.to_path_buf()))
        .ok_or_else(|| FlagError::PluginName {
            value: value.to_owned(),
        })
}
