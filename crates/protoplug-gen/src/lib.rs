//! Plugin execution and output merging for protoc-compatible code generators.
//!
//! The `protoplug-gen` crate runs code generator plugins over a compiled
//! [`Image`] and turns their responses into files on disk. A plugin is either
//! an external `protoc-gen-*` executable speaking the `CodeGeneratorRequest`
//! and `CodeGeneratorResponse` protobuf protocol over standard I/O, or an
//! in-process [`Handler`].
//!
//! # Architecture
//!
//! A run flows through five stages:
//!
//! 1. [`RequestBuilder`] converts an image into one request, or one request
//!    per top-level directory of target files.
//! 2. [`Generator`] invokes one plugin for every request in parallel,
//!    cancelling outstanding work as soon as one request fails, and merges
//!    the results into a single response.
//! 3. [`validate_responses`] rejects runs where two plugins create the same
//!    output path.
//! 4. [`writer::write_response`] writes files into a [`Bucket`], splicing
//!    insertion-point content into previously generated files.
//! 5. [`OutputSet`] maps every output location to a directory or a zip/jar
//!    archive, and [`output::delete_outs`] clears prior output safely.
//!
//! # Example
//!
//! ```rust,no_run
//! use protoplug_gen::{
//!     CancellationToken, HandlerRegistry, Image, OutputSet, PluginResponse, RequestBuilder,
//!     StderrSink,
//! };
//! use protoplug_gen::generator::Generator;
//!
//! let bytes = std::fs::read("image.binpb").expect("descriptor set");
//! let image = Image::decode(&bytes).expect("valid image");
//! let requests = RequestBuilder::new().build(&[image]).expect("requests");
//!
//! let registry = HandlerRegistry::new();
//! let handler = registry.resolve("go").expect("protoc-gen-go on PATH");
//! let response = Generator::new("go", handler)
//!     .generate(&CancellationToken::new(), &StderrSink::discard(), &requests)
//!     .expect("generation succeeds");
//!
//! let mut outputs = OutputSet::new(".");
//! outputs
//!     .write_responses(&[PluginResponse::new("go", "gen", response)])
//!     .expect("no conflicts");
//! outputs.flush().expect("flushed");
//! ```

pub mod bucket;
pub mod cancel;
pub mod error;
pub mod generator;
pub mod handler;
pub mod image;
pub mod output;
mod paths;
pub mod process;
pub mod registry;
pub mod request;
pub mod response;
pub mod validate;
pub mod writer;

#[cfg(test)]
mod tests;

pub use self::bucket::{Bucket, DirBucket, MemoryBucket};
pub use self::cancel::CancellationToken;
pub use self::error::GenerateError;
pub use self::generator::Generator;
pub use self::handler::{FnHandler, Handler, InvocationContext, StderrSink};
pub use self::image::{Image, ImageFile};
pub use self::output::{OutputKind, OutputSet};
pub use self::process::ProcessHandler;
pub use self::registry::HandlerRegistry;
pub use self::request::RequestBuilder;
pub use self::response::{PluginResponse, ResponseBuilder};
pub use self::validate::validate_responses;
pub use self::writer::InsertionTargets;
