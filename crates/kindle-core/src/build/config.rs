//! Build configuration
//!
//! Everything the builder needs besides the source text. Can be filled in
//! through the runtime's setters or loaded from a `kindle.toml`:
//!
//! ```toml
//! compiler = "clang"
//! defines = ["NDEBUG", "ANSWER=42"]
//! include_path = ["/opt/include"]
//! libs = ["-L/opt/lib", "-lm"]
//! packages = ["zlib"]
//! flags = ["release", "warn_on"]
//!
//! [env]
//! PKG_CONFIG_PATH = "/opt/lib/pkgconfig"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Environment;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File is not valid configuration
    #[error("Invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Build configuration consumed by a [`Builder`](super::Builder)
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Compiler driver; discovered when `None`
    pub compiler: Option<PathBuf>,
    /// Preprocessor definitions, `NAME` or `NAME=VALUE`
    pub defines: Vec<String>,
    /// Include search path
    pub include_path: Vec<PathBuf>,
    /// Raw linker arguments (`-lm`, `-L/opt/lib`, `/path/libfoo.a`)
    pub libs: Vec<String>,
    /// Auxiliary libraries resolved through pkg-config
    pub packages: Vec<String>,
    /// Config flags: `debug`, `release`, `warn_on`, `warn_off`, `cxx`
    pub flags: Vec<String>,
    /// Environment of the toolchain processes
    pub env: Environment,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler: None,
            defines: Vec::new(),
            include_path: Vec::new(),
            libs: Vec::new(),
            packages: Vec::new(),
            flags: Vec::new(),
            env: Environment::from_process(),
        }
    }
}

/// On-disk form of [`BuildConfig`]
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    compiler: Option<PathBuf>,
    defines: Vec<String>,
    include_path: Vec<PathBuf>,
    libs: Vec<String>,
    packages: Vec<String>,
    flags: Vec<String>,
    env: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Configuration with an empty environment instead of the process one
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            env: Environment::empty(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from TOML text.
    /// The `[env]` table overrides the process environment.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut config = Self {
            compiler: file.compiler,
            defines: file.defines,
            include_path: file.include_path,
            libs: file.libs,
            packages: file.packages,
            flags: file.flags,
            ..Default::default()
        };
        for (name, value) in file.env {
            config.env.set(name, value);
        }
        Ok(config)
    }

    /// Whether `flag` is set
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let config = BuildConfig::isolated();
        assert!(config.compiler.is_none());
        assert!(config.defines.is_empty());
        assert!(config.flags.is_empty());
        assert!(config.env.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let config = BuildConfig::from_toml_str(
            r#"
compiler = "clang"
defines = ["NDEBUG", "ANSWER=42"]
include_path = ["/opt/include"]
libs = ["-lm"]
packages = ["zlib"]
flags = ["release"]

[env]
KINDLE_TEST_VAR = "1"
"#,
        )
        .unwrap();

        assert_eq!(config.compiler, Some(PathBuf::from("clang")));
        assert_eq!(config.defines, vec!["NDEBUG", "ANSWER=42"]);
        assert_eq!(config.include_path, vec![PathBuf::from("/opt/include")]);
        assert_eq!(config.libs, vec!["-lm"]);
        assert_eq!(config.packages, vec!["zlib"]);
        assert!(config.has_flag("release"));
        assert!(!config.has_flag("debug"));
        assert_eq!(config.env.get("KINDLE_TEST_VAR"), Some("1"));
    }

    #[test]
    fn missing_fields_default() {
        let config = BuildConfig::from_toml_str("flags = [\"debug\"]").unwrap();
        assert!(config.has_flag("debug"));
        assert!(config.libs.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(BuildConfig::from_toml_str("optimise = true").is_err());
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kindle.toml");
        std::fs::write(&path, "defines = 3").unwrap();

        let err = BuildConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = BuildConfig::from_file(Path::new("/nonexistent/kindle.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
