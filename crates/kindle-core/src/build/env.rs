//! Environment variables handed to the toolchain

use std::collections::BTreeMap;
use std::path::Path;

use super::ConfigError;

/// Separator used by [`Environment::add`] to join path lists
pub const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// The environment every toolchain process runs with.
///
/// Starts as a snapshot of the process environment; overrides never touch
/// the process itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// An environment with no variables
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    /// Variables that are not valid UTF-8 are skipped.
    #[must_use]
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set `name`, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Prepend `value` to the path list in `name`.
    ///
    /// The separator is only inserted when both the new and the old value
    /// are non-empty.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut value = value.into();
        let old = self.get(&name).unwrap_or_default();
        if !old.is_empty() && !value.is_empty() {
            value.push(PATH_LIST_SEPARATOR);
        }
        value.push_str(old);
        self.vars.insert(name, value);
    }

    /// Remove `name`
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    /// Load `name=value` lines from a file, as written by `env` or `set`.
    /// Returns the number of variables set.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.load_str(&text))
    }

    /// Load `name=value` lines from text.
    ///
    /// Lines are trimmed, the first `=` separates name from value, and lines
    /// without `=` or with an empty name are ignored.
    pub fn load_str(&mut self, text: &str) -> usize {
        let mut count = 0;
        for line in text.lines() {
            let Some((name, value)) = line.trim().split_once('=') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            self.set(name, value);
            count += 1;
        }
        count
    }

    /// Iterate over all variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
