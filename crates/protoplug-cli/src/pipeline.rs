//! One generation run: load the image, invoke plugins, write their output.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::thread;

use prost::Message;
use prost_types::compiler::CodeGeneratorResponse;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use protoplug_config::Config;
use protoplug_gen::output::delete_outs;
use protoplug_gen::{
    CancellationToken, GenerateError, Generator, HandlerRegistry, Image, OutputSet,
    PluginResponse, RequestBuilder, StderrSink,
};
use tracing::{debug, info};

use crate::AppError;
use crate::cli::Cli;
use crate::free_fields::write_free_field_numbers;
use crate::protoc_flags::{PluginFlag, parse_plugin_spec};

const PIPELINE_TARGET: &str = "protoplug_cli::pipeline";

/// Runs everything `cli` and `plugins` ask for.
pub(crate) fn execute<W: Write>(
    cli: &Cli,
    plugins: &[PluginFlag],
    config: &Config,
    stdout: &mut W,
) -> Result<(), AppError> {
    if cli.files.is_empty() {
        return Err(AppError::MissingInput);
    }
    if plugins.is_empty() && cli.descriptor_set_out.is_none() && !cli.print_free_field_numbers {
        return Err(AppError::MissingOutput);
    }

    let targets: Vec<String> = cli
        .files
        .iter()
        .map(|file| virtual_path(file, &cli.proto_path))
        .collect();
    let image = load_image(&cli.descriptor_set_in)?.with_targets(&targets)?;
    info!(
        target: PIPELINE_TARGET,
        files = image.files().len(),
        targets = targets.len(),
        plugins = plugins.len(),
        "loaded image"
    );

    if let Some(path) = &cli.descriptor_set_out {
        write_descriptor_set(path, &image, cli)?;
    }
    if cli.print_free_field_numbers {
        write_free_field_numbers(&image, stdout).map_err(AppError::Output)?;
    }
    if plugins.is_empty() {
        return Ok(());
    }

    let registry = build_registry(&cli.plugins)?;
    if cli.clean {
        let outs: Vec<String> = plugins.iter().map(|plugin| plugin.out.clone()).collect();
        delete_outs(&outs)?;
    }

    let cancel = config
        .plugin_timeout()
        .map_or_else(CancellationToken::new, CancellationToken::with_timeout);
    let responses = run_plugins(&registry, plugins, &image, cli.by_dir, &cancel)?;

    let mut outputs = OutputSet::new(".");
    outputs.write_responses(&responses)?;
    let written = outputs.flush()?;
    info!(
        target: PIPELINE_TARGET,
        locations = written.len(),
        "generation complete"
    );
    Ok(())
}

/// Maps an input file to its path inside the image, relative to the first
/// `--proto_path` root containing it.
fn virtual_path(file: &Path, roots: &[PathBuf]) -> String {
    let normalized = normalize(file);
    roots
        .iter()
        .find_map(|root| {
            normalized
                .strip_prefix(normalize(root))
                .ok()
                .filter(|rest| !rest.as_os_str().is_empty())
                .map(to_slash)
        })
        .unwrap_or_else(|| to_slash(&normalized))
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reads every descriptor set named in `sets`, merging files by name.
fn load_image(sets: &OsStr) -> Result<Image, AppError> {
    let mut files: Vec<FileDescriptorProto> = Vec::new();
    for path in std::env::split_paths(sets) {
        let bytes = fs::read(&path).map_err(|source| AppError::ReadDescriptorSet {
            path: path.clone(),
            source,
        })?;
        let set = FileDescriptorSet::decode(bytes.as_slice())
            .map_err(|source| AppError::DecodeDescriptorSet { path, source })?;
        for descriptor in set.file {
            match files.iter().find(|existing| existing.name == descriptor.name) {
                Some(existing) if *existing == descriptor => {}
                Some(_) => {
                    return Err(AppError::ConflictingDescriptor {
                        name: descriptor.name().to_owned(),
                    });
                }
                None => files.push(descriptor),
            }
        }
    }
    Ok(Image::from_file_descriptor_set(FileDescriptorSet { file: files })?)
}

fn write_descriptor_set(path: &Path, image: &Image, cli: &Cli) -> Result<(), AppError> {
    let set = image.to_file_descriptor_set(cli.include_imports, cli.include_source_info);
    fs::write(path, set.encode_to_vec()).map_err(|source| AppError::WriteDescriptorSet {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        target: PIPELINE_TARGET,
        path = %path.display(),
        files = set.file.len(),
        "wrote descriptor set"
    );
    Ok(())
}

fn build_registry(specs: &[String]) -> Result<HandlerRegistry, AppError> {
    let mut registry = HandlerRegistry::new();
    for spec in specs {
        let (name, path) = parse_plugin_spec(spec)?;
        registry.register_path(name, path);
    }
    Ok(registry)
}

fn plugin_error(plugin: &PluginFlag, source: GenerateError) -> AppError {
    AppError::Plugin {
        flag: plugin.flag(),
        source,
    }
}

/// Invokes every plugin concurrently and returns their responses in flag
/// order. The first failure cancels the remaining plugins; a real failure is
/// reported in preference to the cancellations it caused.
fn run_plugins(
    registry: &HandlerRegistry,
    plugins: &[PluginFlag],
    image: &Image,
    by_dir: bool,
    cancel: &CancellationToken,
) -> Result<Vec<PluginResponse>, AppError> {
    let prepared = plugins
        .iter()
        .map(|plugin| {
            let handler = registry
                .resolve(&plugin.name)
                .map_err(|source| plugin_error(plugin, source))?;
            let requests = RequestBuilder::new()
                .with_options(&plugin.options)
                .by_dir(by_dir)
                .build(std::slice::from_ref(image))
                .map_err(|source| plugin_error(plugin, source))?;
            Ok((plugin, Generator::new(plugin.name.as_str(), handler), requests))
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let stderr = StderrSink::new(io::stderr());
    let outcomes: Vec<Result<CodeGeneratorResponse, GenerateError>> = thread::scope(|scope| {
        let handles: Vec<_> = prepared
            .iter()
            .map(|(_, generator, requests)| {
                let stderr = &stderr;
                scope.spawn(move || {
                    let outcome = generator.generate(cancel, stderr, requests);
                    if outcome.is_err() {
                        cancel.cancel();
                    }
                    outcome
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    });

    let mut responses = Vec::with_capacity(plugins.len());
    let mut cancelled = None;
    for ((plugin, _, _), outcome) in prepared.iter().zip(outcomes) {
        match outcome {
            Ok(response) => responses.push(PluginResponse::new(
                plugin.name.as_str(),
                plugin.out.as_str(),
                response,
            )),
            Err(err) if err.is_cancellation() => {
                if cancelled.is_none() {
                    cancelled = Some(plugin_error(plugin, err));
                }
            }
            Err(err) => return Err(plugin_error(plugin, err)),
        }
    }
    cancelled.map_or(Ok(responses), Err)
}
