//! Configuration loading helpers for the protoplug CLI.
//!
//! The logic here filters CLI arguments destined for `ortho-config` so the
//! loader only receives supported flags while the protoc-style parser operates
//! on the remaining tokens.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use protoplug_config::Config;

use crate::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration for the CLI from the configuration flags only.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

#[derive(Debug, Clone, Copy)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

impl OrthoConfigLoader {
    fn process_config_flag(argument: &OsStr) -> FlagAction {
        let argument_text = argument.to_string_lossy();
        if !argument_text.starts_with("--") {
            return FlagAction::Skip;
        }

        let (flag, has_inline_value) = match argument_text.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (&*argument_text, false),
        };

        if super::CONFIG_CLI_FLAGS.contains(&flag) {
            return FlagAction::Include {
                needs_value: !has_inline_value,
            };
        }

        FlagAction::Skip
    }
}

/// Arguments partitioned between the configuration loader and the generator
/// flags. Both lists start with the program name.
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) remaining: Vec<OsString>,
}

/// Moves every configuration flag, wherever it appears, into its own list.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut split = ConfigArgumentSplit {
        config_arguments: Vec::new(),
        remaining: Vec::new(),
    };
    let mut iter = args.iter();
    if let Some(program) = iter.next() {
        split.config_arguments.push(program.clone());
        split.remaining.push(program.clone());
    }

    while let Some(argument) = iter.next() {
        match OrthoConfigLoader::process_config_flag(argument.as_os_str()) {
            FlagAction::Include { needs_value } => {
                split.config_arguments.push(argument.clone());
                if needs_value {
                    split.config_arguments.extend(iter.next().cloned());
                }
            }
            FlagAction::Skip => split.remaining.push(argument.clone()),
        }
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[test]
    fn inline_value_flags_do_not_need_follow_up_value() {
        let result = OrthoConfigLoader::process_config_flag(OsStr::new("--log-filter=debug"));
        assert!(matches!(result, FlagAction::Include { needs_value: false }));
    }

    #[test]
    fn separate_value_flags_consume_following_argument() {
        let result = OrthoConfigLoader::process_config_flag(OsStr::new("--log-filter"));
        assert!(matches!(result, FlagAction::Include { needs_value: true }));
    }

    #[test]
    fn generator_flags_are_skipped() {
        let result = OrthoConfigLoader::process_config_flag(OsStr::new("--go_out=gen"));
        assert!(matches!(result, FlagAction::Skip), "should skip");
    }

    #[test]
    fn config_flags_are_collected_from_anywhere() {
        let split = split_config_arguments(&args(&[
            "protoplug",
            "--go_out=gen",
            "--log-filter",
            "debug",
            "foo.proto",
            "--plugin-timeout-secs=5",
        ]));
        assert_eq!(
            split.config_arguments,
            args(&["protoplug", "--log-filter", "debug", "--plugin-timeout-secs=5"])
        );
        assert_eq!(split.remaining, args(&["protoplug", "--go_out=gen", "foo.proto"]));
    }

    #[test]
    fn empty_arguments_split_into_empty_lists() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert!(split.remaining.is_empty());
    }
}
