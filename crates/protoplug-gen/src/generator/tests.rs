//! Unit tests for parallel plugin invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use mockall::mock;
use mockall::predicate::always;
use prost_types::compiler::code_generator_response::File;
use rstest::{fixture, rstest};

use super::*;
use crate::handler::FnHandler;
use crate::tests::support::{file, response};

mock! {
    Plugin {}
    impl Handler for Plugin {
        fn handle(
            &self,
            context: &InvocationContext,
            request: &CodeGeneratorRequest,
            response: &ResponseBuilder,
        ) -> Result<(), GenerateError>;
    }
}

fn request(files: &[&str]) -> CodeGeneratorRequest {
    CodeGeneratorRequest {
        file_to_generate: files.iter().map(|f| (*f).to_owned()).collect(),
        ..CodeGeneratorRequest::default()
    }
}

#[fixture]
fn echo() -> Generator {
    let handler = FnHandler::new(|_, request: &CodeGeneratorRequest, builder: &ResponseBuilder| {
        let files = request
            .file_to_generate
            .iter()
            .map(|name| file(&name.replace(".proto", ".out"), name))
            .collect();
        builder.add_response(response(files))
    });
    Generator::new("echo", Arc::new(handler))
}

fn run(generator: &Generator, requests: &[CodeGeneratorRequest]) -> Result<CodeGeneratorResponse, GenerateError> {
    generator.generate(&CancellationToken::new(), &StderrSink::discard(), requests)
}

#[rstest]
fn every_request_contributes_files(echo: Generator) {
    let merged = run(
        &echo,
        &[request(&["a/x.proto", "a/y.proto"]), request(&["b/z.proto"])],
    )
    .expect("generate");
    let mut names: Vec<&str> = merged.file.iter().map(File::name).collect();
    let a_files: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| name.starts_with("a/"))
        .collect();
    assert_eq!(a_files, vec!["a/x.out", "a/y.out"], "per-request order kept");
    names.sort_unstable();
    assert_eq!(names, vec!["a/x.out", "a/y.out", "b/z.out"]);
}

#[rstest]
fn no_requests_yields_empty_response(echo: Generator) {
    let merged = run(&echo, &[]).expect("generate");
    assert!(merged.file.is_empty());
}

#[test]
fn handler_is_called_once_per_request() {
    let mut plugin = MockPlugin::new();
    plugin
        .expect_handle()
        .with(always(), always(), always())
        .times(3)
        .returning(|_, _, _| Ok(()));
    let generator = Generator::new("mock", Arc::new(plugin));
    run(&generator, &[request(&["a"]), request(&["b"]), request(&["c"])]).expect("generate");
}

#[test]
fn first_failure_is_returned_and_siblings_are_cancelled() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&cancelled);
    let handler = FnHandler::new(move |context: &InvocationContext, request: &CodeGeneratorRequest, _: &ResponseBuilder| {
        if request.file_to_generate.iter().any(|f| f == "bad") {
            return Err(GenerateError::NonZeroExit {
                name: context.plugin().to_owned(),
                status: 2,
            });
        }
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(10) {
            if context.cancel().is_cancelled() {
                observed.fetch_add(1, Ordering::SeqCst);
                return context.check_cancelled();
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    });
    let generator = Generator::new("flaky", Arc::new(handler));
    let started = Instant::now();
    let err = run(
        &generator,
        &[request(&["slow1"]), request(&["bad"]), request(&["slow2"])],
    )
    .expect_err("generation fails");
    assert!(matches!(err, GenerateError::NonZeroExit { status: 2, .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(cancelled.load(Ordering::SeqCst) <= 2);
}

#[test]
fn cancelled_parent_skips_every_request() {
    let mut plugin = MockPlugin::new();
    plugin.expect_handle().never();
    let generator = Generator::new("mock", Arc::new(plugin));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = generator
        .generate(&cancel, &StderrSink::discard(), &[request(&["a"])])
        .expect_err("cancelled");
    assert!(err.is_cancellation());
}

#[test]
fn reported_error_string_becomes_the_error() {
    let handler = FnHandler::new(|_, _: &CodeGeneratorRequest, builder: &ResponseBuilder| {
        builder.add_response(CodeGeneratorResponse {
            error: Some("unknown parameter: foo".into()),
            ..CodeGeneratorResponse::default()
        })
    });
    let generator = Generator::new("go", Arc::new(handler));
    let err = run(&generator, &[request(&["a.proto"])]).expect_err("reported");
    assert!(matches!(err, GenerateError::PluginReported { .. }));
    assert!(err.to_string().contains("unknown parameter: foo"));
}

#[test]
fn caller_generator_token_is_not_cancelled_by_failure() {
    let handler = FnHandler::new(|context: &InvocationContext, _: &CodeGeneratorRequest, _: &ResponseBuilder| {
        Err(GenerateError::NonZeroExit {
            name: context.plugin().to_owned(),
            status: 1,
        })
    });
    let generator = Generator::new("fail", Arc::new(handler));
    let cancel = CancellationToken::new();
    generator
        .generate(&cancel, &StderrSink::discard(), &[request(&["a"])])
        .expect_err("fails");
    assert!(!cancel.is_cancelled());
}
