//! Unit tests for cross-plugin conflict detection.

use rstest::rstest;

use super::*;
use crate::tests::support::{file, insertion, response};

fn plugin(name: &str, out: &str, files: Vec<prost_types::compiler::code_generator_response::File>) -> PluginResponse {
    PluginResponse::new(name, out, response(files))
}

#[test]
fn disjoint_names_in_shared_out_are_valid() {
    let responses = [
        plugin("go", "out", vec![file("foo.pb.go", "")]),
        plugin("objc", "out", vec![file("foo.pb.m", "")]),
    ];
    assert!(validate_responses(&responses).is_ok());
}

#[test]
fn same_name_in_shared_out_conflicts() {
    let responses = [
        plugin("go", "out", vec![file("foo.pb.go", "")]),
        plugin("objc", "out", vec![file("foo.pb.go", "")]),
    ];
    let err = validate_responses(&responses).expect_err("conflict");
    match err {
        GenerateError::Conflict {
            path,
            first,
            second,
        } => {
            assert_eq!(path, "out/foo.pb.go");
            assert_eq!(first, "go");
            assert_eq!(second, "objc");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[case("out", "out/")]
#[case("out/", "out")]
#[case("out", "./out")]
#[case("./out/", "out")]
#[case("gen/../out", "out")]
#[case(".", "")]
fn equivalent_locations_do_not_hide_conflicts(#[case] first_out: &str, #[case] second_out: &str) {
    let responses = [
        plugin("a", first_out, vec![file("x.txt", "")]),
        plugin("b", second_out, vec![file("x.txt", "")]),
    ];
    assert!(validate_responses(&responses).is_err());
}

#[test]
fn conflict_reports_the_normalized_path() {
    let responses = [
        plugin("go", "out", vec![file("foo.pb.go", "")]),
        plugin("objc", "./out/", vec![file("foo.pb.go", "")]),
    ];
    let err = validate_responses(&responses).expect_err("conflict");
    assert!(
        matches!(&err, GenerateError::Conflict { path, .. } if path == "out/foo.pb.go"),
        "{err}"
    );
}

#[test]
fn same_name_in_different_outs_is_valid() {
    let responses = [
        plugin("go", "go_out", vec![file("foo.pb.go", "")]),
        plugin("objc", "objc_out", vec![file("foo.pb.go", "")]),
    ];
    assert!(validate_responses(&responses).is_ok());
}

#[test]
fn insertion_points_are_exempt() {
    let responses = [
        plugin("go", "out", vec![file("foo.pb.go", "// @@protoc_insertion_point(imports)\n")]),
        plugin("grpc", "out", vec![insertion("foo.pb.go", "imports", "import \"grpc\"\n")]),
    ];
    assert!(validate_responses(&responses).is_ok());
}

#[test]
fn one_plugin_may_repeat_its_own_file() {
    let responses = [plugin(
        "go",
        "out",
        vec![file("foo.pb.go", "a"), file("foo.pb.go", "b")],
    )];
    assert!(validate_responses(&responses).is_ok());
}

#[test]
fn first_conflict_in_input_order_is_reported() {
    let responses = [
        plugin("a", "out", vec![file("one", ""), file("two", "")]),
        plugin("b", "out", vec![file("two", "")]),
        plugin("c", "out", vec![file("one", "")]),
    ];
    let err = validate_responses(&responses).expect_err("conflict");
    assert!(err.to_string().contains("out/two"), "{err}");
}
