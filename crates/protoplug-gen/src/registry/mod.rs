//! Resolution of plugin names to handlers.
//!
//! The [`HandlerRegistry`] decides which transport runs a plugin. Lookup
//! order is: in-process handlers registered by name, then an executable
//! path supplied with `--plugin`, then `protoc-gen-<name>` on the search
//! path. The generator only ever sees the resulting [`Handler`].

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::GenerateError;
use crate::handler::Handler;
use crate::process::ProcessHandler;

const REGISTRY_TARGET: &str = "protoplug_gen::registry";

/// Executable name prefix protoc uses for plugins.
pub const PLUGIN_PREFIX: &str = "protoc-gen-";

/// Registry of plugin transports.
///
/// # Example
///
/// ```
/// use protoplug_gen::{FnHandler, HandlerRegistry};
///
/// let mut registry = HandlerRegistry::new();
/// registry
///     .register("noop", FnHandler::new(|_, _, _| Ok(())))
///     .expect("registration succeeds");
/// assert!(registry.resolve("noop").is_ok());
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    builtins: HashMap<String, Arc<dyn Handler>>,
    paths: HashMap<String, PathBuf>,
    search_path: Option<OsString>,
}

impl HandlerRegistry {
    /// Creates an empty registry that searches the process `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-process handler.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::DuplicateHandler`] if `name` already has an
    /// in-process handler.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<(), GenerateError> {
        let key = name.into();
        if self.builtins.contains_key(&key) {
            return Err(GenerateError::DuplicateHandler { name: key });
        }
        self.builtins.insert(key, Arc::new(handler));
        Ok(())
    }

    /// Records an explicit executable for `name`; later paths replace
    /// earlier ones.
    pub fn register_path(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    /// Overrides the directories searched for `protoc-gen-<name>`.
    #[must_use]
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Resolves the handler for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::HandlerNotFound`] if no transport is known
    /// and no executable is found on the search path.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>, GenerateError> {
        if let Some(handler) = self.builtins.get(name) {
            debug!(target: REGISTRY_TARGET, plugin = name, "using in-process handler");
            return Ok(Arc::clone(handler));
        }
        if let Some(path) = self.paths.get(name) {
            debug!(
                target: REGISTRY_TARGET,
                plugin = name,
                executable = %path.display(),
                "using explicit plugin path"
            );
            return Ok(Arc::new(ProcessHandler::new(path.clone())));
        }
        let executable = self.search(name).ok_or_else(|| GenerateError::HandlerNotFound {
            name: name.to_owned(),
            message: format!(
                "{PLUGIN_PREFIX}{name}: program not found or is not executable; \
                 specify the path with --plugin={PLUGIN_PREFIX}{name}=<path>"
            ),
        })?;
        debug!(
            target: REGISTRY_TARGET,
            plugin = name,
            executable = %executable.display(),
            "found plugin on search path"
        );
        Ok(Arc::new(ProcessHandler::new(executable)))
    }

    fn search(&self, name: &str) -> Option<PathBuf> {
        let search_path = self.search_path.clone().or_else(|| env::var_os("PATH"))?;
        let file_name = format!("{PLUGIN_PREFIX}{name}{}", env::consts::EXE_SUFFIX);
        env::split_paths(&search_path)
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builtins: Vec<&String> = self.builtins.keys().collect();
        builtins.sort();
        f.debug_struct("HandlerRegistry")
            .field("builtins", &builtins)
            .field("paths", &self.paths)
            .field("search_path", &self.search_path)
            .finish()
    }
}
