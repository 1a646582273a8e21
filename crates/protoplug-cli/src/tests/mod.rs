//! In-process tests for the CLI runtime.

use std::ffi::OsString;
use std::path::Path;
use std::process::ExitCode;

use prost::Message;
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use protoplug_config::Config;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::{AppError, ConfigLoader, IoStreams, run_with_loader};

struct StubLoader;

impl ConfigLoader for StubLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(Config::default())
    }
}

struct Outcome {
    exit: ExitCode,
    stdout: String,
    stderr: String,
}

fn invoke(args: &[&str]) -> Outcome {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut io = IoStreams::new(&mut stdout, &mut stderr);
    let exit = run_with_loader(
        std::iter::once("protoplug")
            .chain(args.iter().copied())
            .map(OsString::from),
        &mut io,
        &StubLoader,
    );
    Outcome {
        exit,
        stdout: String::from_utf8(stdout).expect("utf-8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf-8 stderr"),
    }
}

fn descriptor(name: &str, package: &str, deps: &[&str], fields: &[i32]) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_owned()),
        package: Some(package.to_owned()),
        dependency: deps.iter().map(|dep| (*dep).to_owned()).collect(),
        message_type: vec![DescriptorProto {
            name: Some("Msg".to_owned()),
            field: fields
                .iter()
                .map(|number| FieldDescriptorProto {
                    name: Some(format!("f{number}")),
                    number: Some(*number),
                    ..FieldDescriptorProto::default()
                })
                .collect(),
            ..DescriptorProto::default()
        }],
        ..FileDescriptorProto::default()
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn image(&self) -> String {
        self.dir.path().join("image.binpb").display().to_string()
    }

    fn path(&self, relative: &str) -> String {
        self.dir.path().join(relative).display().to_string()
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("temp dir");
    let set = FileDescriptorSet {
        file: vec![
            descriptor("dep/common.proto", "dep", &[], &[1]),
            descriptor("app/a.proto", "app", &["dep/common.proto"], &[1, 2, 5]),
        ],
    };
    std::fs::write(dir.path().join("image.binpb"), set.encode_to_vec()).expect("write image");
    Workspace { dir }
}

#[test]
fn help_is_written_to_stdout() {
    let outcome = invoke(&["--help"]);
    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("--descriptor_set_in"));
}

#[rstest]
fn input_files_are_required(workspace: Workspace) {
    let image = workspace.image();
    let outcome = invoke(&["--descriptor_set_in", image.as_str(), "--go_out=gen"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.stderr, "Missing input file.\n");
}

#[rstest]
fn an_output_directive_is_required(workspace: Workspace) {
    let image = workspace.image();
    let outcome = invoke(&["--descriptor_set_in", image.as_str(), "app/a.proto"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.stderr, "Missing output directives.\n");
}

#[test]
fn duplicate_plugin_outputs_fail_before_any_work() {
    let outcome = invoke(&["--go_out=a", "--go_out=b", "x.proto"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("--go_out may only be passed once"));
}

#[rstest]
fn unknown_input_files_are_reported(workspace: Workspace) {
    let image = workspace.image();
    let outcome = invoke(&[
        "--descriptor_set_in",
        image.as_str(),
        "--print-free-field-numbers",
        "missing.proto",
    ]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("missing.proto"), "{}", outcome.stderr);
}

#[rstest]
fn json_error_format_emits_one_object(workspace: Workspace) {
    let image = workspace.image();
    let outcome = invoke(&[
        "--descriptor_set_in",
        image.as_str(),
        "--error_format=json",
        "app/a.proto",
    ]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    let value: serde_json::Value =
        serde_json::from_str(outcome.stderr.trim_end()).expect("json error");
    assert_eq!(value["error"], "Missing output directives.");
}

#[rstest]
fn free_field_numbers_cover_only_target_files(workspace: Workspace) {
    let image = workspace.image();
    let outcome = invoke(&[
        "--descriptor_set_in",
        image.as_str(),
        "--print_free_field_numbers",
        "app/a.proto",
    ]);
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "{}", outcome.stderr);
    assert_eq!(outcome.stdout, format!("{:<35} free: 3-4 6-INF\n", "app.Msg"));
}

#[rstest]
#[case::targets_only(false, 1)]
#[case::with_imports(true, 2)]
fn descriptor_sets_are_written(
    workspace: Workspace,
    #[case] include_imports: bool,
    #[case] expected_files: usize,
) {
    let image = workspace.image();
    let out = workspace.path("out.binpb");
    let mut args = vec![
        "--descriptor_set_in",
        image.as_str(),
        "--descriptor_set_out",
        out.as_str(),
        "-I",
        ".",
        "./app/a.proto",
    ];
    if include_imports {
        args.push("--include_imports");
    }

    let outcome = invoke(&args);

    assert_eq!(outcome.exit, ExitCode::SUCCESS, "{}", outcome.stderr);
    let bytes = std::fs::read(Path::new(&out)).expect("descriptor set written");
    let set = FileDescriptorSet::decode(bytes.as_slice()).expect("valid set");
    assert_eq!(set.file.len(), expected_files);
    assert_eq!(set.file.last().map(FileDescriptorProto::name), Some("app/a.proto"));
}

#[rstest]
fn missing_plugins_are_named_by_their_flag(workspace: Workspace) {
    let image = workspace.image();
    let out = workspace.path("gen");
    let flag = format!("--protoplug-missing-xyz_out={out}");
    let outcome = invoke(&[
        "--descriptor_set_in",
        image.as_str(),
        flag.as_str(),
        "app/a.proto",
    ]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(
        outcome.stderr.starts_with("--protoplug-missing-xyz_out: "),
        "{}",
        outcome.stderr
    );
}

#[cfg(unix)]
#[rstest]
fn external_plugins_write_into_their_output(workspace: Workspace) {
    use std::os::unix::fs::PermissionsExt;

    let plugin = workspace.dir.path().join("protoc-gen-hello");
    // Emits a response holding one file, `a.txt`, containing `hi`.
    std::fs::write(
        &plugin,
        "#!/bin/sh\ncat >/dev/null\nprintf '\\172\\013\\012\\005a.txt\\172\\002hi'\n",
    )
    .expect("write plugin");
    std::fs::set_permissions(&plugin, std::fs::Permissions::from_mode(0o755)).expect("chmod");

    let image = workspace.image();
    let out = workspace.path("gen");
    let plugin_flag = format!("--plugin={}", plugin.display());
    let out_flag = format!("--hello_out=opt:{out}");
    let outcome = invoke(&[
        "--descriptor_set_in",
        image.as_str(),
        plugin_flag.as_str(),
        out_flag.as_str(),
        "app/a.proto",
    ]);

    assert_eq!(outcome.exit, ExitCode::SUCCESS, "{}", outcome.stderr);
    let written = std::fs::read_to_string(Path::new(&out).join("a.txt")).expect("generated file");
    assert_eq!(written, "hi");
}
