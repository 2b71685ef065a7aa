//! Frame-scoped variable registry
//!
//! The [`Context`] is a stack of [`Frame`]s. The bottom frame exists from
//! construction and holds variables registered by the host; every
//! successfully loaded module gets a frame of its own, pushed before its
//! entry point runs, so the variables it registers share its lifetime.
//!
//! # Lookup
//!
//! [`Context::get`] returns the most recently registered variable with the
//! given name, searching frames from the top and variables from the newest.
//! Names are not unique: registering a name again shadows the earlier entry,
//! it never replaces it.
//!
//! # Teardown
//!
//! Frames are popped from the top. Each frame releases its variables newest
//! first and then unloads its module:
//!
//! ```text
//! F1 { v1a, v1b; M1 }, F2 { v2a; M2 }
//!   → release(v2a), unload(M2), release(v1b), release(v1a), unload(M1)
//! ```
//!
//! The registry never looks behind a pointer. Interpreting it is the
//! caller's business.

mod frame;

pub use frame::Frame;

use std::ffi::c_void;

use tracing::{debug, trace};

use crate::module::Module;

/// Release callback owned by a [`Variable`]; receives the variable's pointer
pub type Release = Box<dyn FnOnce(*mut c_void)>;

/// A named, type-erased value owned by the context.
///
/// The release closure, if any, runs exactly once when the variable is
/// dropped.
pub struct Variable {
    name: String,
    ptr: *mut c_void,
    release: Option<Release>,
}

impl Variable {
    /// Create a variable from a raw pointer and an optional release closure
    pub fn new(ptr: *mut c_void, name: impl Into<String>, release: Option<Release>) -> Self {
        Self {
            name: name.into(),
            ptr,
            release,
        }
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque pointer
    pub fn ptr(&self) -> *mut c_void {
        self.ptr
    }
}

impl Drop for Variable {
    fn drop(&mut self) {
        trace!(name = %self.name, "releasing variable");
        if let Some(release) = self.release.take() {
            release(self.ptr);
        }
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("ptr", &self.ptr)
            .field("release", &self.release.is_some())
            .finish()
    }
}

/// Stack of frames shared by every invocation of a runtime
pub struct Context {
    frames: Vec<Frame>,
}

impl Context {
    /// Create a context holding only the bottom frame
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::root()],
        }
    }

    /// Look up the most recently registered variable called `name`
    pub fn get(&self, name: &str) -> Option<*mut c_void> {
        self.frames.iter().rev().find_map(|frame| frame.find(name))
    }

    /// Register `ptr` under `name` in the topmost frame and return it.
    ///
    /// From here on the context owns the pointer: `release` is the only
    /// thing that may free it, and it runs exactly once when the frame is
    /// torn down.
    ///
    /// # Panics
    /// Panics if the frame stack is empty. A fresh context always has its
    /// bottom frame, so this only happens after every frame was popped.
    pub fn set(&mut self, ptr: *mut c_void, name: impl Into<String>, release: Option<Release>) -> *mut c_void {
        let name = name.into();
        let depth = self.frames.len();
        let Some(frame) = self.frames.last_mut() else {
            panic!("context has no frames: cannot register variable '{name}'");
        };
        trace!(name = %name, frame = depth - 1, "registering variable");
        frame.push(Variable::new(ptr, name, release));
        ptr
    }

    /// Register an owned Rust value; it is dropped when its frame is torn down
    pub fn set_boxed<T: 'static>(&mut self, name: impl Into<String>, value: Box<T>) -> *mut c_void {
        let ptr = Box::into_raw(value).cast::<c_void>();
        let release: Release = Box::new(|ptr| {
            // SAFETY: `ptr` came from `Box::<T>::into_raw` above and the
            // context runs each release closure exactly once.
            drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
        });
        self.set(ptr, name, Some(release))
    }

    /// Number of frames, including the bottom frame
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total number of variables across all frames
    pub fn variable_count(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }

    /// Whether every frame has been popped
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames from bottom to top
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Push the frame of a freshly loaded module.
    ///
    /// Module frames always sit above a bottom frame; if every frame was
    /// popped, an empty bottom frame is put back first.
    pub(crate) fn push_frame(&mut self, module: Module) {
        if self.frames.is_empty() {
            debug!("restoring bottom frame");
            self.frames.push(Frame::root());
        }
        debug!(frame = self.frames.len(), path = %module.path().display(), "pushing frame");
        self.frames.push(Frame::with_module(module));
    }

    /// Tear down the topmost frame now.
    ///
    /// The bottom frame can be popped too, which leaves the context empty.
    /// Returns false if there was nothing to pop.
    pub fn pop_frame(&mut self) -> bool {
        match self.frames.pop() {
            Some(frame) => {
                debug!(frame = self.frames.len(), "popping frame");
                drop(frame);
                true
            }
            None => false,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        while self.pop_frame() {}
    }
}
