//! Mink CLI - interactive shell and file runner.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

mod repl;

#[derive(Parser)]
#[command(
    name = "mink",
    version,
    about = "An embeddable scripting engine",
    long_about = "Mink is an embeddable engine for an ECMAScript-family scripting language.\n\n\
                  Run a file:    mink script.js\n\
                  Eval code:     mink -e '2 + 3 * 4;'\n\
                  No arguments:  interactive shell"
)]
struct Cli {
    /// File to evaluate
    file: Option<PathBuf>,

    /// Evaluate argument as a script and print the result
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match (cli.eval, cli.file) {
        (Some(code), _) => eval_once(&code),
        (None, Some(file)) => run_file(&file),
        (None, None) => repl::run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn new_context() -> Result<(mink_engine::Runtime, mink_engine::Context)> {
    let runtime = mink_engine::Runtime::new();
    let ctx = runtime
        .new_context()
        .context("failed to initialize the runtime")?;
    Ok((runtime, ctx))
}

fn eval_once(code: &str) -> Result<()> {
    let (_runtime, mut ctx) = new_context()?;
    let value = ctx.evaluate(code, "<eval>")?;
    if !value.is_undefined() {
        println!("{}", mink_engine::value_to_string(&value));
    }
    Ok(())
}

fn run_file(file: &PathBuf) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let (_runtime, mut ctx) = new_context()?;
    ctx.evaluate(&source, &file.display().to_string())?;
    Ok(())
}
