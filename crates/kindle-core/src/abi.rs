//! Entry point ABI
//!
//! Compiled snippets export one function, [`ENTRY_SYMBOL`], taking a pointer
//! to a [`ContextHandle`]. The handle is a C function table over the
//! runtime's [`Context`]; C code uses it through the inline helpers in
//! `kindle.h`, Rust code through [`ContextRef`].
//!
//! # Calling Convention
//!
//! ```c
//! void kindle_entry(kindle_ctx *ctx);
//! void *get(void *ctx, const char *name);              // NULL when absent
//! void *set(void *ctx, void *ptr, const char *name, void (*deleter)(void *));
//! void  log(void *ctx, const char *message);
//! ```
//!
//! A null `deleter` registers a variable without cleanup. Registering into a
//! context whose frames were all popped is a fatal error; the panic cannot
//! unwind through the C frame and aborts the process.

use std::ffi::{c_char, c_void, CStr};
use std::ptr;

use tracing::debug;

use crate::context::{Context, Release};

/// Name of the exported entry point
pub const ENTRY_SYMBOL: &str = "kindle_entry";

/// File name of the C header
pub const HEADER_NAME: &str = "kindle.h";

/// Contents of the C header describing [`ContextHandle`]
pub const HEADER: &str = include_str!("../include/kindle.h");

/// Destructor supplied by C code for a registered pointer
pub type Deleter = unsafe extern "C" fn(ptr: *mut c_void);

/// C view of a [`Context`], passed to the entry point
#[repr(C)]
pub struct ContextHandle {
    /// Opaque pointer to the `Context`
    pub ctx: *mut c_void,
    /// Look up a variable by name
    pub get: unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char) -> *mut c_void,
    /// Register a variable in the topmost frame
    pub set: unsafe extern "C" fn(
        ctx: *mut c_void,
        ptr: *mut c_void,
        name: *const c_char,
        deleter: Option<Deleter>,
    ) -> *mut c_void,
    /// Emit a debug message
    pub log: unsafe extern "C" fn(ctx: *mut c_void, message: *const c_char),
}

impl ContextHandle {
    /// Build a handle over `ctx`.
    ///
    /// The handle stores a raw pointer: it must not outlive `ctx`, and `ctx`
    /// must not be touched through any other path while the handle is in use.
    pub fn new(ctx: &mut Context) -> Self {
        Self {
            ctx: ptr::from_mut(ctx).cast::<c_void>(),
            get: handle_get,
            set: handle_set,
            log: handle_log,
        }
    }
}

unsafe fn name_from_c(name: *const c_char) -> Option<String> {
    if name.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
}

unsafe extern "C" fn handle_get(ctx: *mut c_void, name: *const c_char) -> *mut c_void {
    let ctx = unsafe { &*ctx.cast::<Context>() };
    let Some(name) = (unsafe { name_from_c(name) }) else {
        return ptr::null_mut();
    };
    ctx.get(&name).unwrap_or(ptr::null_mut())
}

unsafe extern "C" fn handle_set(
    ctx: *mut c_void,
    value: *mut c_void,
    name: *const c_char,
    deleter: Option<Deleter>,
) -> *mut c_void {
    let ctx = unsafe { &mut *ctx.cast::<Context>() };
    let name = unsafe { name_from_c(name) }.unwrap_or_default();
    let release = deleter.map(|deleter| -> Release {
        Box::new(move |ptr| unsafe { deleter(ptr) })
    });
    ctx.set(value, name, release)
}

unsafe extern "C" fn handle_log(_ctx: *mut c_void, message: *const c_char) {
    if let Some(message) = unsafe { name_from_c(message) } {
        debug!(target: "kindle::module", "{message}");
    }
}

/// Safe Rust view of a [`ContextHandle`] received by an entry point
#[derive(Clone, Copy)]
pub struct ContextRef<'a> {
    handle: &'a ContextHandle,
}

impl<'a> ContextRef<'a> {
    /// Wrap the raw handle passed to an entry point.
    ///
    /// # Safety
    /// `handle` must be null or point to a live handle that stays valid for
    /// `'a`.
    pub unsafe fn from_raw(handle: *mut ContextHandle) -> Option<Self> {
        unsafe { handle.as_ref() }.map(|handle| Self { handle })
    }

    /// Look up a variable
    pub fn get(&self, name: &CStr) -> Option<*mut c_void> {
        let ptr = unsafe { (self.handle.get)(self.handle.ctx, name.as_ptr()) };
        (!ptr.is_null()).then_some(ptr)
    }

    /// Register a variable in the current frame
    pub fn set(&self, ptr: *mut c_void, name: &CStr, deleter: Option<Deleter>) -> *mut c_void {
        unsafe { (self.handle.set)(self.handle.ctx, ptr, name.as_ptr(), deleter) }
    }

    /// Emit a debug message through the host's logger
    pub fn log(&self, message: &CStr) {
        unsafe { (self.handle.log)(self.handle.ctx, message.as_ptr()) }
    }
}
