//! Native module loading
//!
//! A [`Module`] is a mapped [`Image`] plus the entry point resolved from it.
//! Loading is all-or-nothing: a [`Loader`] either returns a module whose
//! entry point is known to exist, or an error with the image already closed.

mod native;

pub use native::{NativeImage, NativeLoader};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::abi::ContextHandle;

/// Signature of the exported entry point
pub type EntryFn = unsafe extern "C" fn(ctx: *mut ContextHandle);

/// Errors that can occur while loading or unloading a module
#[derive(Debug, Error)]
pub enum LoadError {
    /// The artifact could not be mapped into the process
    #[error("failed to load {}: {reason}", .path.display())]
    Map { path: PathBuf, reason: String },

    /// The artifact was mapped but does not export the entry point
    #[error("{} does not export {symbol}: {reason}", .path.display())]
    Symbol {
        path: PathBuf,
        symbol: &'static str,
        reason: String,
    },

    /// The image could not be closed
    #[error("failed to unload {}: {reason}", .path.display())]
    Unload { path: PathBuf, reason: String },
}

/// Typed entry point of a loaded module
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint(EntryFn);

impl EntryPoint {
    /// Wrap a function pointer with the entry signature
    pub fn from_fn(entry: EntryFn) -> Self {
        Self(entry)
    }

    /// Call the entry point.
    ///
    /// # Safety
    /// The code behind the pointer must still be mapped and `handle` must
    /// point to a live [`ContextHandle`] for the duration of the call.
    pub(crate) unsafe fn invoke(self, handle: *mut ContextHandle) {
        unsafe { (self.0)(handle) }
    }
}

/// A mapped native image
pub trait Image {
    /// Path of the artifact this image was mapped from
    fn path(&self) -> &Path;

    /// Unmap the image
    fn unload(self: Box<Self>) -> Result<(), LoadError>;
}

/// Maps artifacts into the process
pub trait Loader {
    /// Map `artifact` and resolve its entry point
    fn load(&mut self, artifact: &Path) -> Result<Module, LoadError>;
}

/// A loaded artifact with a resolved entry point
pub struct Module {
    image: Box<dyn Image>,
    entry: EntryPoint,
}

impl Module {
    /// Pair a mapped image with the entry point resolved from it
    pub fn new(image: Box<dyn Image>, entry: EntryPoint) -> Self {
        Self { image, entry }
    }

    /// Artifact path
    pub fn path(&self) -> &Path {
        self.image.path()
    }

    /// The resolved entry point
    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub(crate) fn unload(self) -> Result<(), LoadError> {
        self.image.unload()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module").field("path", &self.path()).finish()
    }
}
