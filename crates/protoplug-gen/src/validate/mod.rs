//! Cross-plugin output conflict detection.
//!
//! Every creating file entry (one without an insertion point) claims the path
//! formed by joining its plugin's output location with the file name. Two
//! different plugins claiming the same path is an error; insertion-point
//! entries never claim a path because they are expected to target another
//! plugin's file.

use std::collections::HashMap;

use crate::error::GenerateError;
use crate::paths;
use crate::response::PluginResponse;

/// Checks that no two plugins create the same output path.
///
/// Responses are inspected in slice order, so the reported conflict is
/// deterministic for a given input order.
///
/// # Errors
///
/// Returns [`GenerateError::Conflict`] naming both plugins and the path.
///
/// # Example
///
/// ```
/// use protoplug_gen::{PluginResponse, validate_responses};
/// use prost_types::compiler::CodeGeneratorResponse;
/// use prost_types::compiler::code_generator_response::File;
///
/// let response = |name: &str| CodeGeneratorResponse {
///     file: vec![File { name: Some(name.into()), ..File::default() }],
///     ..CodeGeneratorResponse::default()
/// };
/// let go = PluginResponse::new("go", "out", response("foo.pb.go"));
/// let objc = PluginResponse::new("objc", "out", response("foo.pb.go"));
/// assert!(validate_responses(&[go, objc]).is_err());
/// ```
pub fn validate_responses(responses: &[PluginResponse]) -> Result<(), GenerateError> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    for response in responses {
        let plugin = response.plugin_name();
        for file in response.files() {
            if !file.insertion_point().is_empty() {
                continue;
            }
            let path = paths::join(response.plugin_out(), file.name());
            match owners.get(path.as_str()) {
                Some(first) if *first != plugin => {
                    return Err(GenerateError::Conflict {
                        path,
                        first: (*first).to_owned(),
                        second: plugin.to_owned(),
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(path, plugin);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
