//! The interactive shell
//!
//! Reads lines, dispatches shell commands, and evaluates everything else,
//! printing the result unless it is `undefined`. Errors print as
//! `Error: <message>` and are cleared before the next prompt.

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use mink_engine::{Context, value_to_string};

const PROMPT: &str = "mink> ";

pub fn run() -> Result<()> {
    let (runtime, mut ctx) = crate::new_context()?;
    let mut editor = DefaultEditor::new()?;

    print_welcome();

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(input);
                match handle_shell_command(input, &runtime, &ctx) {
                    CommandResult::Handled => continue,
                    CommandResult::Exit => break,
                    CommandResult::NotACommand => evaluate(&mut ctx, input),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        }
    }
    println!("Goodbye!");
    Ok(())
}

enum CommandResult {
    Handled,
    Exit,
    NotACommand,
}

fn print_welcome() {
    println!("Mink Interactive Shell");
    println!("Type 'exit' or 'quit' to exit, 'help' for help");
    println!();
}

fn print_help() {
    println!("Shell commands:");
    println!("  help          - Show this help message");
    println!("  exit, quit    - Exit the shell");
    println!("  clear         - Clear the screen");
    println!("  .gc           - Force garbage collection");
    println!("  .stats        - Show runtime statistics");
    println!();
    println!("Everything else is evaluated as source.");
    println!();
}

fn handle_shell_command(
    input: &str,
    runtime: &mink_engine::Runtime,
    ctx: &Context,
) -> CommandResult {
    match input {
        "help" => {
            print_help();
            CommandResult::Handled
        }
        "exit" | "quit" => CommandResult::Exit,
        "clear" => {
            // ANSI clear screen + cursor home
            print!("\x1b[2J\x1b[H");
            CommandResult::Handled
        }
        ".gc" => {
            ctx.gc();
            println!("Garbage collection completed");
            CommandResult::Handled
        }
        ".stats" => {
            let stats = runtime.heap_stats();
            println!("Runtime statistics:");
            println!("  Memory usage: {} bytes", stats.live_bytes);
            println!("  Live objects: {}", stats.live_objects);
            println!("  Collections:  {}", stats.collections);
            println!("  Last reclaim: {} bytes", stats.last_reclaimed);
            CommandResult::Handled
        }
        _ => CommandResult::NotACommand,
    }
}

fn evaluate(ctx: &mut Context, source: &str) {
    match ctx.evaluate(source, "<shell>") {
        Ok(value) => {
            if !value.is_undefined() {
                println!("{}", value_to_string(&value));
            }
        }
        Err(error) => {
            println!("Error: {}", error);
            ctx.clear_error();
        }
    }
}
