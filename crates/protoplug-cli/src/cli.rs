//! Static command-line flags.
//!
//! Plugin flags (`--<name>_out`, `--<name>_opt`) are open-ended and are
//! extracted before clap sees the arguments; see `protoc_flags`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// How failures are rendered on standard error.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ErrorFormat {
    /// Plain `message` lines, as GCC-style tools print them.
    #[default]
    Gcc,
    /// Plain lines accepted by Visual Studio's error list.
    Msvs,
    /// Plain text.
    Text,
    /// One JSON object per failure.
    Json,
}

/// Command-line interface for the protoplug generator driver.
#[derive(Parser, Debug)]
#[command(name = "protoplug", version, about)]
pub(crate) struct Cli {
    /// Directory that input file paths are made relative to. May repeat.
    #[arg(short = 'I', long = "proto_path", value_name = "PATH")]
    pub(crate) proto_path: Vec<PathBuf>,
    /// Serialized `FileDescriptorSet` files to read, separated like `PATH`.
    #[arg(long = "descriptor_set_in", value_name = "FILES", required = true)]
    pub(crate) descriptor_set_in: OsString,
    /// Writes the selected files as a `FileDescriptorSet`.
    #[arg(short = 'o', long = "descriptor_set_out", value_name = "FILE")]
    pub(crate) descriptor_set_out: Option<PathBuf>,
    /// Includes imports in `--descriptor_set_out`.
    #[arg(long = "include_imports")]
    pub(crate) include_imports: bool,
    /// Keeps source code info in `--descriptor_set_out`.
    #[arg(long = "include_source_info")]
    pub(crate) include_source_info: bool,
    /// Error rendering.
    #[arg(long = "error_format", value_enum, default_value_t = ErrorFormat::Gcc)]
    pub(crate) error_format: ErrorFormat,
    /// Sends one request per top-level directory of input files.
    #[arg(long = "by-dir")]
    pub(crate) by_dir: bool,
    /// Prints the unused field numbers of every message in the input files.
    #[arg(
        long = "print-free-field-numbers",
        visible_alias = "print_free_field_numbers"
    )]
    pub(crate) print_free_field_numbers: bool,
    /// Deletes prior output at every plugin output location first.
    #[arg(long)]
    pub(crate) clean: bool,
    /// Plugin executable, as `NAME=PATH` or a path to `protoc-gen-NAME`.
    #[arg(long = "plugin", value_name = "PLUGIN")]
    pub(crate) plugins: Vec<String>,
    /// Input files, relative to a `--proto_path` root.
    #[arg(value_name = "PROTO_FILES")]
    pub(crate) files: Vec<PathBuf>,
}
