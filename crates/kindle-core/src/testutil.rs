//! Test utilities for Kindle
//!
//! Stand-ins for the toolchain and the dynamic loader, so the runtime's
//! protocol can be exercised without a compiler:
//! - [`FakeBuilder`] records sequence numbers and sources
//! - [`FakeLoader`] hands out modules whose entry point runs closures queued
//!   with [`script`]
//! - labeled pointers record `destroy(label)` when released, fake images
//!   record `unload(name)`; [`take_events`] drains the log
//!
//! Events and scripts are thread-local, so parallel tests do not interfere.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::abi::{ContextHandle, ContextRef};
use crate::build::{BuildConfig, BuildError, Builder};
use crate::context::Release;
use crate::module::{EntryPoint, Image, LoadError, Loader, Module};

type Script = Box<dyn FnOnce(ContextRef<'_>)>;

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static SCRIPTS: RefCell<VecDeque<Script>> = RefCell::new(VecDeque::new());
}

/// Append an event to this thread's log
pub fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

/// Drain this thread's event log
pub fn take_events() -> Vec<String> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

/// Queue a closure for the next scripted entry point call
pub fn script(f: impl FnOnce(ContextRef<'_>) + 'static) {
    SCRIPTS.with(|scripts| scripts.borrow_mut().push_back(Box::new(f)));
}

/// Entry point of every fake module: runs the next queued script, if any
///
/// # Safety
/// `handle` must be null or point to a live [`ContextHandle`].
pub unsafe extern "C" fn scripted_entry(handle: *mut ContextHandle) {
    let Some(ctx) = (unsafe { ContextRef::from_raw(handle) }) else {
        return;
    };
    if let Some(f) = SCRIPTS.with(|scripts| scripts.borrow_mut().pop_front()) {
        f(ctx);
    }
}

/// Heap-allocated label, to be released with [`destroy_label`]
pub fn label_ptr(label: &str) -> *mut c_void {
    Box::into_raw(Box::new(label.to_string())).cast()
}

/// C deleter for pointers made by [`label_ptr`]; records `destroy(label)`
///
/// # Safety
/// `ptr` must come from [`label_ptr`] and must not be used afterwards.
pub unsafe extern "C" fn destroy_label(ptr: *mut c_void) {
    let label = unsafe { Box::from_raw(ptr.cast::<String>()) };
    record(format!("destroy({label})"));
}

/// Read the label behind a pointer made by [`label_ptr`]
///
/// # Safety
/// `ptr` must come from [`label_ptr`] and not be released yet.
pub unsafe fn read_label(ptr: *mut c_void) -> String {
    unsafe { (*ptr.cast::<String>()).clone() }
}

/// A labeled pointer and a release closure recording `destroy(label)`
pub fn labeled(label: &str) -> (*mut c_void, Release) {
    let release: Release = Box::new(|ptr| unsafe { destroy_label(ptr) });
    (label_ptr(label), release)
}

/// Image that maps nothing and records `unload(name)`
pub struct FakeImage {
    path: PathBuf,
}

impl FakeImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Image for FakeImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn unload(self: Box<Self>) -> Result<(), LoadError> {
        let name = self
            .path
            .file_name()
            .map_or_else(|| self.path.to_string_lossy(), |n| n.to_string_lossy());
        record(format!("unload({name})"));
        Ok(())
    }
}

/// Module backed by a [`FakeImage`] whose entry point is [`scripted_entry`]
pub fn fake_module(name: &str) -> Module {
    Module::new(Box::new(FakeImage::new(name)), EntryPoint::from_fn(scripted_entry))
}

#[derive(Default)]
struct BuilderLog {
    seqs: Vec<usize>,
    sources: Vec<String>,
    fail_next: Option<String>,
}

/// Builder that compiles nothing and returns `fake/a{seq}`.
/// Clones share their log.
#[derive(Clone, Default)]
pub struct FakeBuilder {
    log: Rc<RefCell<BuilderLog>>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next build fail with `diagnostics`
    pub fn fail_next(&self, diagnostics: &str) {
        self.log.borrow_mut().fail_next = Some(diagnostics.to_string());
    }

    /// Sequence numbers of successful builds
    pub fn seqs(&self) -> Vec<usize> {
        self.log.borrow().seqs.clone()
    }

    /// Sources of successful builds
    pub fn sources(&self) -> Vec<String> {
        self.log.borrow().sources.clone()
    }
}

impl Builder for FakeBuilder {
    fn build(&mut self, source: &str, seq: usize, _config: &BuildConfig) -> Result<PathBuf, BuildError> {
        let mut log = self.log.borrow_mut();
        if let Some(diagnostics) = log.fail_next.take() {
            return Err(BuildError::Rejected(diagnostics));
        }
        log.seqs.push(seq);
        log.sources.push(source.to_string());
        Ok(PathBuf::from(format!("fake/a{seq}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeLoadMode {
    Ok,
    FailMap,
    MissingSymbol,
}

/// Loader producing [`fake_module`]s
pub struct FakeLoader {
    mode: FakeLoadMode,
}

impl FakeLoader {
    /// Loader that always succeeds
    pub fn new() -> Self {
        Self { mode: FakeLoadMode::Ok }
    }

    /// Loader that cannot map anything
    pub fn failing_map() -> Self {
        Self {
            mode: FakeLoadMode::FailMap,
        }
    }

    /// Loader whose images lack the entry point
    pub fn missing_symbol() -> Self {
        Self {
            mode: FakeLoadMode::MissingSymbol,
        }
    }
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for FakeLoader {
    fn load(&mut self, artifact: &Path) -> Result<Module, LoadError> {
        match self.mode {
            FakeLoadMode::Ok => Ok(Module::new(
                Box::new(FakeImage::new(artifact)),
                EntryPoint::from_fn(scripted_entry),
            )),
            FakeLoadMode::FailMap => Err(LoadError::Map {
                path: artifact.to_path_buf(),
                reason: "not a shared library".to_string(),
            }),
            FakeLoadMode::MissingSymbol => {
                Box::new(FakeImage::new(artifact)).unload()?;
                Err(LoadError::Symbol {
                    path: artifact.to_path_buf(),
                    symbol: crate::abi::ENTRY_SYMBOL,
                    reason: "undefined symbol".to_string(),
                })
            }
        }
    }
}
