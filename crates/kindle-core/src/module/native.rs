//! Dynamic library loading through libloading

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{EntryFn, EntryPoint, Image, LoadError, Loader, Module};
use crate::abi::ENTRY_SYMBOL;

/// A shared library mapped into the process
pub struct NativeImage {
    path: PathBuf,
    library: libloading::Library,
}

impl NativeImage {
    /// Map the shared library at `path`
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        // SAFETY: running the library's initializers is what loading an
        // artifact means; the runtime trusts code it builds.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| LoadError::Map {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    /// Resolve the fixed entry symbol as a typed function pointer.
    ///
    /// The returned pointer is only valid while this image stays mapped.
    pub fn resolve_entry(&self) -> Result<EntryPoint, LoadError> {
        // SAFETY: the entry ABI fixes the symbol's signature to `EntryFn`.
        let symbol = unsafe { self.library.get::<EntryFn>(ENTRY_SYMBOL.as_bytes()) }.map_err(|e| {
            LoadError::Symbol {
                path: self.path.clone(),
                symbol: ENTRY_SYMBOL,
                reason: e.to_string(),
            }
        })?;

        Ok(EntryPoint::from_fn(*symbol))
    }
}

impl Image for NativeImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn unload(self: Box<Self>) -> Result<(), LoadError> {
        let Self { path, library } = *self;
        library
            .close()
            .map_err(|e| LoadError::Unload { path, reason: e.to_string() })
    }
}

/// Loader for shared libraries produced by a builder
#[derive(Debug, Default)]
pub struct NativeLoader;

impl NativeLoader {
    /// Create a new loader
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Loader for NativeLoader {
    fn load(&mut self, artifact: &Path) -> Result<Module, LoadError> {
        let image = NativeImage::open(artifact)?;
        debug!(path = %artifact.display(), "artifact mapped");

        match image.resolve_entry() {
            Ok(entry) => Ok(Module::new(Box::new(image), entry)),
            Err(err) => {
                if let Err(close_err) = Box::new(image).unload() {
                    warn!("{close_err}");
                }
                Err(err)
            }
        }
    }
}
