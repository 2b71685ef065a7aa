//! Runtime - one invocation end-to-end
//!
//! [`Runtime::exec`] walks every snippet through the same steps:
//!
//! ```text
//! REQUESTED → BUILT → LOADED → FRAMED → INVOKED
//! ```
//!
//! A failure before FRAMED leaves the context exactly as it was. Once the
//! frame is pushed the entry point is called and trusted: faults inside the
//! loaded code are not caught.

use std::borrow::Cow;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::abi::ContextHandle;
use crate::build::{BuildConfig, BuildError, Builder, ConfigError, ToolchainBuilder};
use crate::context::{Context, Release};
use crate::module::{LoadError, Loader, NativeLoader};

/// Errors reported by [`Runtime::exec`] and [`Runtime::exec_file`]
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The source file could not be read
    #[error("Failed to read source file {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The builder failed
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The artifact could not be loaded or has no entry point
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Compile-and-run runtime.
///
/// Owns the context shared by all invocations, the build configuration, and
/// the builder and loader collaborators.
pub struct Runtime {
    // Field order matters: the context (and with it every loaded module) is
    // dropped before the builder removes the artifacts from disk.
    context: Context,
    config: BuildConfig,
    builder: Box<dyn Builder>,
    loader: Box<dyn Loader>,
}

impl Runtime {
    /// Create a runtime using the system toolchain and native loader
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(Box::new(ToolchainBuilder::new()), Box::new(NativeLoader::new()))
    }

    /// Create a runtime from custom collaborators
    pub fn with_parts(builder: Box<dyn Builder>, loader: Box<dyn Loader>) -> Self {
        Self {
            context: Context::new(),
            config: BuildConfig::default(),
            builder,
            loader,
        }
    }

    /// Replace the build configuration
    #[must_use]
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Build, load and run a snippet.
    ///
    /// Blocks until the entry point returns. If every frame was popped, the
    /// bottom frame is restored when the module is pushed, so numbering
    /// starts again at 1.
    pub fn exec(&mut self, source: &str) -> Result<(), RuntimeError> {
        let seq = self.context.frame_count().max(1);

        debug!(seq, "building snippet");
        let artifact = self.builder.build(source, seq, &self.config)?;

        debug!(seq, artifact = %artifact.display(), "loading artifact");
        let module = self.loader.load(&artifact)?;
        let entry = module.entry();

        self.context.push_frame(module);

        debug!(seq, "invoking entry point");
        let mut handle = ContextHandle::new(&mut self.context);
        // SAFETY: the module owning `entry` was just pushed and stays mapped
        // until its frame is popped, which cannot happen during the call.
        unsafe { entry.invoke(&mut handle) };

        debug!(seq, variables = self.context.variable_count(), "entry point returned");
        Ok(())
    }

    /// Read a source file and [`exec`](Self::exec) it.
    /// An unreadable file fails without invoking the builder.
    ///
    /// Bytes that are not valid UTF-8 (say a Latin-1 comment) are replaced
    /// with U+FFFD rather than rejected.
    pub fn exec_file(&mut self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| {
            warn!(path = %path.display(), "failed to open source file");
            RuntimeError::Source {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let source = String::from_utf8_lossy(&bytes);
        if matches!(source, Cow::Owned(_)) {
            warn!(path = %path.display(), "source file is not valid UTF-8; invalid bytes replaced");
        }
        self.exec(&source)
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    /// Look up a context variable
    pub fn get_ctx_var(&self, name: &str) -> Option<*mut c_void> {
        self.context.get(name)
    }

    /// Register a context variable in the topmost frame
    pub fn set_ctx_var(&mut self, ptr: *mut c_void, name: &str, release: Option<Release>) -> *mut c_void {
        self.context.set(ptr, name, release)
    }

    /// Register an owned value in the topmost frame
    pub fn set_ctx_value<T: 'static>(&mut self, name: &str, value: Box<T>) -> *mut c_void {
        self.context.set_boxed(name, value)
    }

    /// Tear down the topmost frame and unload its module
    pub fn pop_frame(&mut self) -> bool {
        self.context.pop_frame()
    }

    /// The shared context
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the shared context
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    // ------------------------------------------------------------------
    // Build environment
    // ------------------------------------------------------------------

    /// Current build configuration
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Mutable access to the build configuration
    pub fn config_mut(&mut self) -> &mut BuildConfig {
        &mut self.config
    }

    /// Override an environment variable for the toolchain
    pub fn set_env(&mut self, name: &str, value: &str) {
        self.config.env.set(name, value);
    }

    /// Prepend to a path-list environment variable for the toolchain
    pub fn add_env(&mut self, name: &str, value: &str) {
        self.config.env.add(name, value);
    }

    /// Load environment overrides from a `name=value` file
    pub fn load_env(&mut self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        self.config.env.load_file(path.as_ref())
    }

    /// Use a specific compiler driver
    pub fn set_compiler(&mut self, path: impl Into<PathBuf>) {
        self.config.compiler = Some(path.into());
    }

    /// Replace the preprocessor definitions
    pub fn set_defines(&mut self, defines: Vec<String>) {
        self.config.defines = defines;
    }

    /// Replace the include search path
    pub fn set_include_path(&mut self, dirs: Vec<PathBuf>) {
        self.config.include_path = dirs;
    }

    /// Replace the linked libraries
    pub fn set_libs(&mut self, libs: Vec<String>) {
        self.config.libs = libs;
    }

    /// Replace the auxiliary (pkg-config) libraries
    pub fn set_packages(&mut self, packages: Vec<String>) {
        self.config.packages = packages;
    }

    /// Replace the config flags
    pub fn set_flags(&mut self, flags: Vec<String>) {
        self.config.flags = flags;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
