//! Crate-level integration and BDD tests.

use std::sync::Arc;

use prost_types::compiler::CodeGeneratorRequest;
use tempfile::TempDir;

use crate::cancel::CancellationToken;
use crate::generator::Generator;
use crate::handler::{FnHandler, StderrSink};
use crate::output::materialize;
use crate::request::RequestBuilder;
use crate::response::{PluginResponse, ResponseBuilder};

pub(crate) mod support;

#[test]
fn end_to_end_image_to_directory() {
    let image = support::image(&[
        ("dep/common.proto", &[], true),
        ("app/a.proto", &["dep/common.proto"], false),
        ("app/b.proto", &[], false),
    ]);
    let requests = RequestBuilder::new()
        .with_options(&["paths=source_relative".to_owned()])
        .build(&[image])
        .expect("requests");
    assert_eq!(requests.len(), 1);

    let handler = FnHandler::new(|_, request: &CodeGeneratorRequest, builder: &ResponseBuilder| {
        let files = request
            .file_to_generate
            .iter()
            .map(|name| support::file(&name.replace(".proto", ".txt"), request.parameter()))
            .collect();
        builder.add_response(support::response(files))
    });
    let response = Generator::new("txt", Arc::new(handler))
        .generate(&CancellationToken::new(), &StderrSink::discard(), &requests)
        .expect("generate");

    let workdir = TempDir::new().expect("temp dir");
    materialize(workdir.path(), &[PluginResponse::new("txt", "gen", response)])
        .expect("materialize");

    let written = std::fs::read_to_string(workdir.path().join("gen/app/a.txt")).expect("read");
    assert_eq!(written, "paths=source_relative");
    assert!(workdir.path().join("gen/app/b.txt").is_file());
    assert!(!workdir.path().join("gen/dep").exists());
}
