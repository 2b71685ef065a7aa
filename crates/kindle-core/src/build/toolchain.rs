//! Toolchain builder
//!
//! Compiles snippets with the system C compiler into shared libraries that
//! export `kindle_entry`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{BuildConfig, BuildError, BuildStep, Builder, Environment};
use crate::abi::{HEADER, HEADER_NAME};

/// Compilers probed when none is configured
const C_COMPILERS: &[&str] = &["clang", "gcc", "cc"];
const CXX_COMPILERS: &[&str] = &["clang++", "g++", "c++"];

/// File name of the artifact for sequence number `seq`
pub fn artifact_name(seq: usize) -> String {
    if cfg!(target_os = "windows") {
        format!("a{seq}.dll")
    } else if cfg!(target_os = "macos") {
        format!("liba{seq}.dylib")
    } else {
        format!("liba{seq}.so")
    }
}

/// Builder that drives the system C/C++ compiler.
///
/// All files live in one temporary directory that is removed when the
/// builder is dropped; the runtime keeps the builder alive until every
/// module built here has been unloaded.
#[derive(Debug, Default)]
pub struct ToolchainBuilder {
    dir: Option<TempDir>,
}

impl ToolchainBuilder {
    /// Create a builder; the build directory is created on first use
    #[must_use]
    pub fn new() -> Self {
        Self { dir: None }
    }

    /// The build directory, once created
    pub fn build_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn ensure_dir(&mut self) -> Result<PathBuf, BuildError> {
        if let Some(dir) = &self.dir {
            return Ok(dir.path().to_path_buf());
        }
        let dir = tempfile::Builder::new().prefix("kindle-").tempdir()?;
        debug!(dir = %dir.path().display(), "created build directory");
        let path = dir.path().to_path_buf();
        self.dir = Some(dir);
        Ok(path)
    }
}

impl Builder for ToolchainBuilder {
    fn build(&mut self, source: &str, seq: usize, config: &BuildConfig) -> Result<PathBuf, BuildError> {
        let started = Instant::now();
        let dir = self.ensure_dir()?;
        let cxx = config.has_flag("cxx");

        let source_name = format!("a{seq}.{}", if cxx { "cpp" } else { "c" });
        let object_name = format!("a{seq}.o");
        let artifact = dir.join(artifact_name(seq));

        std::fs::write(dir.join(&source_name), source)?;
        std::fs::write(dir.join(HEADER_NAME), HEADER)?;

        let compiler = resolve_compiler(config, cxx)?;
        let (pkg_cflags, pkg_libs) = package_args(&dir, config)?;

        let mut compile = toolchain_command(&compiler, &dir, &config.env);
        compile.arg("-c");
        if !cfg!(target_os = "windows") {
            compile.arg("-fPIC");
        }
        compile.args(flag_args(&config.flags));
        for define in &config.defines {
            compile.arg(format!("-D{define}"));
        }
        compile.arg("-I").arg(&dir);
        for include in &config.include_path {
            compile.arg("-I").arg(include);
        }
        compile.args(&pkg_cflags).arg(&source_name).arg("-o").arg(&object_name);
        run(&mut compile, BuildStep::Compile, "[cc]")?;

        // A failed attempt with the same sequence number may have left an
        // artifact behind; unlink it instead of overwriting it in place.
        if artifact.exists() {
            std::fs::remove_file(&artifact)?;
        }

        let mut link = toolchain_command(&compiler, &dir, &config.env);
        link.arg("-shared").arg(&object_name).arg("-o").arg(&artifact);
        link.args(&config.libs).args(&pkg_libs);
        run(&mut link, BuildStep::Link, "[ld]")?;

        info!(
            seq,
            artifact = %artifact.display(),
            "Build finished in {:.3} seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(artifact)
    }
}

/// Pick the compiler: explicit setting, then `CC`/`CXX`, then the first
/// known driver that answers `--version`
fn resolve_compiler(config: &BuildConfig, cxx: bool) -> Result<PathBuf, BuildError> {
    if let Some(compiler) = &config.compiler {
        return Ok(compiler.clone());
    }

    let var = if cxx { "CXX" } else { "CC" };
    if let Some(compiler) = config.env.get(var).filter(|c| !c.is_empty()) {
        return Ok(PathBuf::from(compiler));
    }

    let candidates = if cxx { CXX_COMPILERS } else { C_COMPILERS };
    for candidate in candidates {
        let probe = Command::new(candidate)
            .arg("--version")
            .env_clear()
            .envs(config.env.iter())
            .output();
        if probe.is_ok_and(|out| out.status.success()) {
            debug!(compiler = candidate, "discovered compiler");
            return Ok(PathBuf::from(candidate));
        }
    }

    Err(BuildError::CompilerNotFound {
        tried: candidates.join(", "),
    })
}

/// Compiler arguments for the config flags
fn flag_args(flags: &[String]) -> Vec<&'static str> {
    let mut args = Vec::new();
    for flag in flags {
        match flag.as_str() {
            "debug" => args.extend(["-g", "-O0"]),
            "release" => args.push("-O2"),
            "warn_on" => args.extend(["-Wall", "-Wextra"]),
            "warn_off" => args.push("-w"),
            "cxx" => {}
            other => warn!(flag = other, "ignoring unknown build flag"),
        }
    }
    args
}

/// Compile and link arguments for the auxiliary libraries
fn package_args(dir: &Path, config: &BuildConfig) -> Result<(Vec<String>, Vec<String>), BuildError> {
    if config.packages.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let query = |mode: &str| -> Result<Vec<String>, BuildError> {
        let mut cmd = toolchain_command(Path::new("pkg-config"), dir, &config.env);
        cmd.arg(mode).args(&config.packages);
        let output = run(&mut cmd, BuildStep::Packages, "[pkg-config]")?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect())
    };

    Ok((query("--cflags")?, query("--libs")?))
}

fn toolchain_command(program: &Path, dir: &Path, env: &Environment) -> Command {
    let mut cmd = Command::new(program);
    cmd.current_dir(dir).env_clear().envs(env.iter());
    cmd
}

/// Run a toolchain step to completion, logging its output line by line
fn run(cmd: &mut Command, step: BuildStep, tag: &str) -> Result<Output, BuildError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!(step = %step, "running {:?}", cmd);

    let output = cmd.output().map_err(|source| BuildError::Spawn { program, source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().chain(stderr.lines()) {
        debug!("{tag} {}", line.trim_end());
    }

    if !output.status.success() {
        return Err(BuildError::Toolchain {
            step,
            status: output.status.to_string(),
            diagnostics: diagnostics(&stderr, &stdout),
        });
    }

    Ok(output)
}

/// Failure text of a toolchain step: stderr, then any stdout on its own lines
fn diagnostics(stderr: &str, stdout: &str) -> String {
    let mut text = stderr.to_string();
    if !stdout.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(stdout);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_sequenced() {
        assert_ne!(artifact_name(1), artifact_name(2));
        assert!(artifact_name(3).contains("a3"));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn linux_artifact_name() {
        assert_eq!(artifact_name(1), "liba1.so");
    }

    #[test]
    fn flag_args_map_known_flags() {
        let flags = vec!["debug".to_string(), "warn_on".to_string(), "cxx".to_string()];
        assert_eq!(flag_args(&flags), vec!["-g", "-O0", "-Wall", "-Wextra"]);
    }

    #[test]
    fn flag_args_skip_unknown_flags() {
        let flags = vec!["exceptions".to_string(), "release".to_string()];
        assert_eq!(flag_args(&flags), vec!["-O2"]);
    }

    #[test]
    fn diagnostics_keep_streams_on_separate_lines() {
        assert_eq!(diagnostics("a.c:1: error", "note: from stdout\n"), "a.c:1: error\nnote: from stdout\n");
        assert_eq!(diagnostics("a.c:1: error\n", "note\n"), "a.c:1: error\nnote\n");
        assert_eq!(diagnostics("", "only stdout"), "only stdout");
        assert_eq!(diagnostics("only stderr", "  \n"), "only stderr");
    }

    #[test]
    fn explicit_compiler_wins() {
        let mut config = BuildConfig::isolated();
        config.env.set("CC", "gcc");
        config.compiler = Some(PathBuf::from("/opt/bin/tcc"));
        assert_eq!(resolve_compiler(&config, false).unwrap(), PathBuf::from("/opt/bin/tcc"));
    }

    #[test]
    fn cc_variable_used_before_probing() {
        let mut config = BuildConfig::isolated();
        config.env.set("CC", "my-cc");
        config.env.set("CXX", "my-c++");
        assert_eq!(resolve_compiler(&config, false).unwrap(), PathBuf::from("my-cc"));
        assert_eq!(resolve_compiler(&config, true).unwrap(), PathBuf::from("my-c++"));
    }

    #[test]
    fn no_compiler_without_path() {
        // An empty environment has no PATH to find a compiler on
        let config = BuildConfig::isolated();
        if let Err(err) = resolve_compiler(&config, false) {
            assert!(matches!(err, BuildError::CompilerNotFound { .. }));
        }
    }

    #[test]
    fn build_dir_is_created_lazily() {
        let mut builder = ToolchainBuilder::new();
        assert!(builder.build_dir().is_none());
        let dir = builder.ensure_dir().unwrap();
        assert_eq!(builder.build_dir(), Some(dir.as_path()));
        assert_eq!(builder.ensure_dir().unwrap(), dir);
    }

    #[test]
    fn missing_compiler_fails_to_spawn() {
        let mut config = BuildConfig::isolated();
        config.compiler = Some(PathBuf::from("/nonexistent/cc"));

        let mut builder = ToolchainBuilder::new();
        let err = builder.build("int x;", 1, &config).unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
        let dir = builder.build_dir().unwrap();
        assert!(dir.join("a1.c").exists());
        assert!(dir.join(HEADER_NAME).exists());
    }
}
