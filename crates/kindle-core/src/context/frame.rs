//! Frames - the variables and module attributable to one invocation

use std::ffi::c_void;

use tracing::{debug, warn};

use super::Variable;
use crate::module::Module;

/// One level of the context stack.
///
/// A frame owns the variables registered while it was on top and, for every
/// frame except the bottom one, the module whose entry point populated it.
///
/// Teardown order is fixed: variables are released newest first, and only
/// then is the module unloaded, so a release closure that lives in the
/// module's own code is still mapped when it runs.
pub struct Frame {
    vars: Vec<Variable>,
    module: Option<Module>,
}

impl Frame {
    /// The bottom frame: holds host variables and never owns a module
    pub(crate) fn root() -> Self {
        Self {
            vars: Vec::new(),
            module: None,
        }
    }

    /// A frame owning a fully loaded module
    pub(crate) fn with_module(module: Module) -> Self {
        Self {
            vars: Vec::new(),
            module: Some(module),
        }
    }

    /// The module owned by this frame, if any
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    /// Number of variables registered in this frame
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are registered in this frame
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Names of the registered variables, oldest first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(Variable::name)
    }

    pub(crate) fn push(&mut self, var: Variable) {
        self.vars.push(var);
    }

    /// Newest variable in this frame called `name`
    pub(crate) fn find(&self, name: &str) -> Option<*mut c_void> {
        self.vars
            .iter()
            .rev()
            .find(|var| var.name() == name)
            .map(Variable::ptr)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        while let Some(var) = self.vars.pop() {
            drop(var);
        }

        if let Some(module) = self.module.take() {
            let path = module.path().to_path_buf();
            match module.unload() {
                Ok(()) => debug!(path = %path.display(), "module unloaded"),
                Err(e) => warn!(path = %path.display(), "failed to unload module: {e}"),
            }
        }
    }
}
