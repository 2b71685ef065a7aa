//! Kindle CLI - compile and run C snippets against a shared context

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use kindle_core::{BuildConfig, Runtime};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Parser)]
#[command(name = "kindle")]
#[command(version = kindle_core::VERSION)]
#[command(about = "Compile C snippets into native modules and run them", long_about = None)]
struct Cli {
    #[command(flatten)]
    build: BuildArgs,

    /// Log toolchain output and runtime steps
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL
    Repl,

    /// Run source files in order, sharing one context
    Run {
        /// Source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Build environment options shared by all commands
#[derive(Args, Debug, Default)]
struct BuildArgs {
    /// Load build settings from a TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Compiler driver to use
    #[arg(long, global = true)]
    compiler: Option<PathBuf>,

    /// Preprocessor definition (NAME or NAME=VALUE)
    #[arg(short = 'D', long = "define", global = true)]
    defines: Vec<String>,

    /// Include directory
    #[arg(short = 'I', long = "include", global = true)]
    include_path: Vec<PathBuf>,

    /// Linker argument, e.g. m for -lm
    #[arg(short = 'l', long = "lib", global = true)]
    libs: Vec<String>,

    /// Auxiliary library resolved with pkg-config
    #[arg(long = "package", global = true)]
    packages: Vec<String>,

    /// Build flag (debug, release, warn_on, warn_off, cxx)
    #[arg(long = "flag", global = true)]
    flags: Vec<String>,

    /// Environment override for the toolchain (NAME=VALUE)
    #[arg(long = "env", global = true, value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// Load environment overrides from a file of NAME=VALUE lines
    #[arg(long, global = true)]
    env_file: Vec<PathBuf>,
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))
}

impl BuildArgs {
    /// Merge the command-line options over the config file (if any)
    fn to_config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::from_file(path)?,
            None => BuildConfig::default(),
        };

        if let Some(compiler) = &self.compiler {
            config.compiler = Some(compiler.clone());
        }
        config.defines.extend(self.defines.iter().cloned());
        config.include_path.extend(self.include_path.iter().cloned());
        config.libs.extend(self.libs.iter().map(String::as_str).map(lib_arg));
        config.packages.extend(self.packages.iter().cloned());
        config.flags.extend(self.flags.iter().cloned());

        for path in &self.env_file {
            config.env.load_file(path)?;
        }
        for (name, value) in &self.env {
            config.env.set(name.as_str(), value.as_str());
        }

        Ok(config)
    }
}

/// `-l m` means `-lm`; anything already shaped like an argument or a path
/// is passed through
fn lib_arg(lib: &str) -> String {
    if lib.starts_with('-') || lib.contains('/') || lib.contains('.') {
        lib.to_string()
    } else {
        format!("-l{lib}")
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.build.to_config()?;
    let runtime = Runtime::new().with_config(config);

    match cli.command {
        Some(Commands::Run { files }) => run_files(runtime, &files)?,
        Some(Commands::Repl) | None => {
            let mut repl = repl::Repl::new(runtime)?;
            repl.run()?;
        }
    }

    Ok(())
}

/// Run each file in turn; stops at the first failure
fn run_files(mut runtime: Runtime, files: &[PathBuf]) -> Result<()> {
    for file in files {
        debug!(file = %file.display(), "running source file");
        runtime
            .exec_file(file)
            .with_context(|| format!("Failed to run '{}'", file.display()))?;
    }
    Ok(())
}
