//! Build module for Kindle
//!
//! Turns source text into a loadable artifact. The runtime only depends on
//! the [`Builder`] contract; [`ToolchainBuilder`] is the implementation that
//! drives the system C compiler:
//!
//! ```text
//! source → a{n}.c → cc -c → a{n}.o → cc -shared → liba{n}.so
//! ```
//!
//! `n` is the sequence number handed in by the runtime, so every build in a
//! session gets its own file names.

mod config;
mod env;
mod toolchain;

pub use config::{BuildConfig, ConfigError};
pub use env::{Environment, PATH_LIST_SEPARATOR};
pub use toolchain::{artifact_name, ToolchainBuilder};

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Turns source text into a loadable artifact
pub trait Builder {
    /// Build `source` and return the path of the artifact.
    ///
    /// `seq` identifies this build within the session and must be used to
    /// name the artifact so that earlier artifacts stay untouched.
    fn build(&mut self, source: &str, seq: usize, config: &BuildConfig) -> Result<PathBuf, BuildError>;
}

/// Toolchain step that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// Querying pkg-config for auxiliary libraries
    Packages,
    /// Compiling the source to an object file
    Compile,
    /// Linking the object file into a shared library
    Link,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Packages => write!(f, "pkg-config"),
            BuildStep::Compile => write!(f, "compile"),
            BuildStep::Link => write!(f, "link"),
        }
    }
}

/// Errors that can occur while building an artifact
#[derive(Debug, Error)]
pub enum BuildError {
    /// I/O error in the build directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable compiler
    #[error("No C compiler found (tried {tried})")]
    CompilerNotFound { tried: String },

    /// A toolchain program could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// A toolchain program ran and failed
    #[error("{step} failed ({status})\n{diagnostics}")]
    Toolchain {
        step: BuildStep,
        status: String,
        diagnostics: String,
    },

    /// Build refused for another reason
    #[error("Build error: {0}")]
    Rejected(String),
}

impl BuildError {
    /// Toolchain output attached to the error, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            BuildError::Toolchain { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}
