//! Error types and failure rendering for the CLI runtime.

use std::error::Error as _;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use protoplug_gen::GenerateError;
use serde::Serialize;
use thiserror::Error;

use crate::cli::ErrorFormat;
use crate::protoc_flags::FlagError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Flags(#[from] FlagError),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("Missing input file.")]
    MissingInput,
    #[error("Missing output directives.")]
    MissingOutput,
    #[error("{}: {source}", path.display())]
    ReadDescriptorSet { path: PathBuf, source: io::Error },
    #[error("{}: failed to decode descriptor set: {source}", path.display())]
    DecodeDescriptorSet {
        path: PathBuf,
        source: prost::DecodeError,
    },
    #[error("{name}: defined differently in two descriptor sets")]
    ConflictingDescriptor { name: String },
    #[error("{}: {source}", path.display())]
    WriteDescriptorSet { path: PathBuf, source: io::Error },
    #[error("{flag}: {source}")]
    Plugin {
        flag: String,
        source: GenerateError,
    },
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("failed to write output: {0}")]
    Output(io::Error),
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    error: &'a str,
    causes: Vec<String>,
}

/// Writes `error` to `stderr` in the requested format.
pub(crate) fn report<E: Write>(
    format: ErrorFormat,
    error: &AppError,
    stderr: &mut E,
) -> io::Result<()> {
    let message = error.to_string();
    match format {
        ErrorFormat::Gcc | ErrorFormat::Msvs | ErrorFormat::Text => writeln!(stderr, "{message}"),
        ErrorFormat::Json => {
            let mut causes = Vec::new();
            let mut source = error.source();
            while let Some(cause) = source {
                causes.push(cause.to_string());
                source = cause.source();
            }
            let report = ErrorReport {
                error: message.as_str(),
                causes,
            };
            let line = serde_json::to_string(&report).map_err(io::Error::other)?;
            writeln!(stderr, "{line}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_errors_are_prefixed_with_their_flag() {
        let error = AppError::Plugin {
            flag: "--go_out".to_owned(),
            source: GenerateError::NonZeroExit {
                name: "go".to_owned(),
                status: 2,
            },
        };
        assert!(error.to_string().starts_with("--go_out: "));
    }

    #[test]
    fn json_reports_carry_the_cause_chain() {
        let error = AppError::Plugin {
            flag: "--go_out".to_owned(),
            source: GenerateError::NonZeroExit {
                name: "go".to_owned(),
                status: 2,
            },
        };
        let mut stderr = Vec::new();
        report(ErrorFormat::Json, &error, &mut stderr).expect("report");

        let value: serde_json::Value = serde_json::from_slice(&stderr).expect("json line");
        assert_eq!(value["error"], serde_json::json!(error.to_string()));
        assert_eq!(value["causes"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn text_reports_are_single_lines() {
        let mut stderr = Vec::new();
        report(ErrorFormat::Gcc, &AppError::MissingInput, &mut stderr).expect("report");
        assert_eq!(String::from_utf8(stderr).expect("utf-8"), "Missing input file.\n");
    }
}
