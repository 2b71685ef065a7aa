//! REPL (Read-Eval-Print Loop) for Kindle
//!
//! Each snippet is compiled into its own module and run against the shared
//! context, so variables registered by one snippet are visible to the next.

use anyhow::Result;
use kindle_core::Runtime;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::{error, warn};

/// REPL prompt shown at the start of each snippet
const PROMPT: &str = "kindle> ";
/// Continuation prompt for multi-line input
const CONTINUATION_PROMPT: &str = "   ...> ";
/// Line that ends a snippet
const TERMINATOR: &str = ";;";
/// History file name
const HISTORY_FILE: &str = ".kindle_history";

/// Result of processing a REPL command
#[derive(Debug, PartialEq, Eq)]
enum CommandResult {
    /// Not a command; treat as source
    Continue,
    /// Exit the REPL
    Exit,
    /// Input was handled as a command
    Handled,
}

/// The Kindle REPL
pub struct Repl {
    runtime: Runtime,
    editor: Editor<(), DefaultHistory>,
}

impl Repl {
    /// Create a new REPL around `runtime`
    pub fn new(runtime: Runtime) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;

        if let Some(home) = home_dir() {
            let _ = editor.load_history(&home.join(HISTORY_FILE));
        }

        Ok(Self { runtime, editor })
    }

    /// Run the REPL loop
    pub fn run(&mut self) -> Result<()> {
        println!("Kindle v{}", kindle_core::VERSION);
        println!("End a snippet with a line containing only {TERMINATOR}. Type :help for help.");
        println!();

        loop {
            match self.read_input() {
                Ok(Some(input)) => {
                    match handle_command(&mut self.runtime, &input) {
                        CommandResult::Exit => break,
                        CommandResult::Handled => continue,
                        CommandResult::Continue => {}
                    }

                    match self.runtime.exec(&input) {
                        Ok(()) => println!("ok (frame {})", self.runtime.context().frame_count() - 1),
                        Err(err) => error!("{err}"),
                    }
                }
                Ok(None) => continue,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    error!("Error reading input: {err}");
                    break;
                }
            }
        }

        if let Some(home) = home_dir() {
            if let Err(err) = self.editor.save_history(&home.join(HISTORY_FILE)) {
                warn!("Failed to save history: {err}");
            }
        }

        Ok(())
    }

    /// Read one command or one snippet
    fn read_input(&mut self) -> Result<Option<String>, ReadlineError> {
        let mut input = String::new();
        let mut prompt = PROMPT;

        loop {
            let line = self.editor.readline(prompt)?;

            if input.is_empty() {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                if line.trim_start().starts_with(':') {
                    let _ = self.editor.add_history_entry(line.as_str());
                    return Ok(Some(line));
                }
            }

            if line.trim() == TERMINATOR {
                let _ = self.editor.add_history_entry(input.as_str());
                return Ok(Some(input));
            }

            input.push_str(&line);
            input.push('\n');
            prompt = CONTINUATION_PROMPT;
        }
    }
}

/// Handle REPL commands (starting with :)
fn handle_command(runtime: &mut Runtime, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with(':') {
        return CommandResult::Continue;
    }

    let cmd = trimmed.trim_start_matches(':').trim();

    match cmd.to_lowercase().as_str() {
        "quit" | "q" | "exit" => CommandResult::Exit,

        "help" | "h" | "?" => {
            print_help();
            CommandResult::Handled
        }

        "frames" => {
            for (index, frame) in runtime.context().frames().iter().enumerate() {
                let module = frame
                    .module()
                    .map_or_else(|| "host".to_string(), |m| m.path().display().to_string());
                let names: Vec<&str> = frame.names().collect();
                println!("#{index} {module} [{}]", names.join(", "));
            }
            CommandResult::Handled
        }

        "pop" => {
            // the bottom frame holds host variables and stays
            if runtime.context().frame_count() > 1 && runtime.pop_frame() {
                println!("popped, {} frame(s) left", runtime.context().frame_count());
            } else {
                println!("nothing to pop");
            }
            CommandResult::Handled
        }

        _ => {
            warn!("Unknown command: :{cmd}. Type :help for available commands.");
            CommandResult::Handled
        }
    }
}

fn print_help() {
    println!(
        r#"
Kindle REPL Commands:
  :help, :h, :?    Show this help message
  :quit, :q        Exit the REPL
  :frames          List frames, their modules and variables
  :pop             Unload the most recent snippet and its variables

Snippets:
  Type C source, then a line containing only ;; to build and run it.
  The snippet must define its entry point:

    #include "kindle.h"
    KINDLE_ENTRY {{
        kindle_log(ctx, "hello");
    }}
    ;;
"#
    );
}

fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(std::path::PathBuf::from)
}
