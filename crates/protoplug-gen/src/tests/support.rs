//! Builders shared by unit and behaviour tests.

use prost_types::FileDescriptorProto;
use prost_types::compiler::CodeGeneratorResponse;
use prost_types::compiler::code_generator_response::File;

use crate::image::{Image, ImageFile};

/// Builds a descriptor named `name` importing `dependencies`.
pub(crate) fn descriptor(name: &str, dependencies: &[&str]) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_owned()),
        dependency: dependencies.iter().map(|dep| (*dep).to_owned()).collect(),
        ..FileDescriptorProto::default()
    }
}

/// Builds an image from `(path, dependencies, is_import)` triples.
pub(crate) fn image(files: &[(&str, &[&str], bool)]) -> Image {
    Image::new(
        files
            .iter()
            .map(|(path, deps, is_import)| ImageFile::new(descriptor(path, deps), *is_import))
            .collect(),
    )
    .expect("test image is valid")
}

/// Builds a response file creating `name` with `content`.
pub(crate) fn file(name: &str, content: &str) -> File {
    File {
        name: Some(name.to_owned()),
        content: Some(content.to_owned()),
        ..File::default()
    }
}

/// Builds a response file splicing `content` at `insertion_point` in `name`.
pub(crate) fn insertion(name: &str, insertion_point: &str, content: &str) -> File {
    File {
        name: Some(name.to_owned()),
        insertion_point: Some(insertion_point.to_owned()),
        content: Some(content.to_owned()),
        ..File::default()
    }
}

/// Builds a response carrying `files`.
pub(crate) fn response(files: Vec<File>) -> CodeGeneratorResponse {
    CodeGeneratorResponse {
        file: files,
        ..CodeGeneratorResponse::default()
    }
}
