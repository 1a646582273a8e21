//! CLI entrypoint for the protoplug code generator driver.
//!
//! The binary delegates to [`protoplug_cli::run`], which loads configuration,
//! parses protoc-style flags, runs the requested plugins and writes their
//! output.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    protoplug_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
