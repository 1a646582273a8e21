//! Unit tests for request construction.

use rstest::{fixture, rstest};

use super::*;
use crate::tests::support::image;

#[fixture]
fn mixed() -> Image {
    image(&[
        ("dep/base.proto", &[], true),
        ("a/one.proto", &["dep/base.proto"], false),
        ("b/two.proto", &[], false),
    ])
}

#[test]
fn join_parameter_skips_empty_options() {
    let options = vec![String::new(), "a=1".to_owned(), String::new(), "b".to_owned()];
    assert_eq!(join_parameter(&options).as_deref(), Some("a=1,b"));
}

#[rstest]
fn default_mode_builds_one_request_per_image(mixed: Image) {
    let requests = RequestBuilder::new()
        .with_options(&["x=y".to_owned()])
        .build(&[mixed.clone(), mixed])
        .expect("build");
    assert_eq!(requests.len(), 2);
    let first = requests.first().expect("request");
    assert_eq!(first.file_to_generate, vec!["a/one.proto", "b/two.proto"]);
    assert_eq!(first.proto_file.len(), 3);
    assert_eq!(first.parameter.as_deref(), Some("x=y"));
    assert_eq!(first.compiler_version, Some(compiler_version()));
}

#[rstest]
fn by_dir_mode_builds_one_request_per_directory(mixed: Image) {
    let requests = RequestBuilder::new()
        .by_dir(true)
        .build(&[mixed])
        .expect("build");
    let targets: Vec<Vec<String>> = requests
        .iter()
        .map(|request| request.file_to_generate.clone())
        .collect();
    assert_eq!(
        targets,
        vec![vec!["a/one.proto".to_owned()], vec!["b/two.proto".to_owned()]]
    );
    let a = requests.first().expect("a request");
    let names: Vec<&str> = a.proto_file.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["dep/base.proto", "a/one.proto"]);
}

#[test]
fn by_dir_mode_groups_nested_directories_under_their_top_level_directory() {
    let nested = image(&[
        ("a/b/x.proto", &[], false),
        ("a/c/y.proto", &[], false),
    ]);
    let requests = RequestBuilder::new()
        .by_dir(true)
        .build(&[nested])
        .expect("build");
    assert_eq!(requests.len(), 1);
    let request = requests.first().expect("request");
    assert_eq!(request.file_to_generate, vec!["a/b/x.proto", "a/c/y.proto"]);
}

#[test]
fn imports_only_image_produces_no_request() {
    let imports = image(&[("dep/base.proto", &[], true)]);
    let requests = RequestBuilder::new().build(&[imports]).expect("build");
    assert!(requests.is_empty());
}

#[test]
fn by_dir_partition_failure_is_fatal() {
    let broken = image(&[("a/one.proto", &["a/gone.proto"], false)]);
    let err = RequestBuilder::new()
        .by_dir(true)
        .build(&[broken])
        .expect_err("partition should fail");
    assert!(matches!(err, GenerateError::Partition { .. }));
}

#[test]
fn no_options_leaves_parameter_unset() {
    let builder = RequestBuilder::new().with_options(&[]);
    assert_eq!(builder.parameter(), None);
}
