//! Kindle Core - compile-and-run runtime for native snippets
//!
//! This crate provides the core functionality:
//! - Context: frame-scoped variable registry shared by all invocations
//! - Module: loading native artifacts and resolving their entry point
//! - Build: turning source text into a loadable artifact
//! - Runtime: one invocation end-to-end (build, load, frame, invoke)
//!
//! ```text
//! source → Builder → artifact → Loader → Module → Frame → Context → kindle_entry(ctx)
//! ```

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point ABI shared with compiled snippets
/// The C handle needs raw pointers and `extern "C"` trampolines
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod abi;

/// Frame-scoped variable registry
/// Variables are type-erased raw pointers with release closures
#[allow(unsafe_code)]
pub mod context;

/// Native module loading (libloading-based)
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod module;

/// Build configuration and the toolchain builder
pub mod build;

/// Runtime orchestration
#[allow(unsafe_code)]
pub mod runtime;

/// Test utilities - fake builders, loaders and scripted entry points
#[allow(unsafe_code)]
pub mod testutil;

/// Convenience re-export of the runtime
pub use runtime::{Runtime, RuntimeError};

/// Convenience re-export of context types
pub use context::{Context, Frame, Release, Variable};

/// Convenience re-export of module loading types
pub use module::{EntryPoint, Image, LoadError, Loader, Module, NativeLoader};

/// Convenience re-export of build types
pub use build::{BuildConfig, BuildError, Builder, ConfigError, Environment, ToolchainBuilder};

/// Convenience re-export of the entry ABI
pub use abi::{ContextHandle, ContextRef, ENTRY_SYMBOL};
