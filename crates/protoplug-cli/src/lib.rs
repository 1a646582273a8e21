//! Command-line runtime for the protoplug code generator driver.
//!
//! The runtime accepts protoc-compatible flags, reads a compiled image from
//! `--descriptor_set_in`, runs every `--<name>_out` plugin and writes the
//! merged output. The interface is designed to be exercised both from the
//! binary entrypoint and from tests where configuration loading and IO
//! streams can be substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

mod cli;
mod config;
mod errors;
mod free_fields;
mod pipeline;
mod protoc_flags;
pub mod telemetry;

#[cfg(test)]
mod tests;

use clap::Parser;

pub use cli::ErrorFormat;
use cli::Cli;
use config::split_config_arguments;
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;
use protoc_flags::{expand_argfiles, extract_plugin_flags};

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: This list must be kept in sync with the fields of
/// `protoplug_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--plugin-timeout-secs",
];

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader> {
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
}

impl<'a, W, E, L> CliRunner<'a, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    const fn new(io: &'a mut IoStreams<'a, W, E>, loader: &'a L) -> Self {
        Self { io, loader }
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut error_format = ErrorFormat::default();
        match self.try_run(args.into_iter().collect(), &mut error_format) {
            Ok(()) => ExitCode::SUCCESS,
            Err(AppError::CliUsage(error)) if !error.use_stderr() => {
                let _ = write!(self.io.stdout, "{}", error.render());
                ExitCode::SUCCESS
            }
            Err(error) => {
                let _ = errors::report(error_format, &error, self.io.stderr);
                ExitCode::FAILURE
            }
        }
    }

    fn try_run(
        &mut self,
        args: Vec<OsString>,
        error_format: &mut ErrorFormat,
    ) -> Result<(), AppError> {
        let expanded = expand_argfiles(args)?;
        let split = split_config_arguments(&expanded);
        let flags = extract_plugin_flags(&split.remaining)?;
        let cli = Cli::try_parse_from(&flags.remaining).map_err(AppError::CliUsage)?;
        *error_format = cli.error_format;

        let config = self.loader.load(&split.config_arguments)?;
        telemetry::initialise(&config)?;
        pipeline::execute(&cli, &flags.plugins, &config, self.io.stdout)
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
#[must_use]
pub(crate) fn run_with_loader<'a, I, W, E, L>(
    args: I,
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    CliRunner::new(io, loader).run(args)
}
