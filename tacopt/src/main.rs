//! `tacopt [--out <path>] <input>` — read a textual IR program, run the
//! optimization pipeline over every function, and print the result.

mod logger;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tacopt_ir::{parse_program, IdGen};
use tacopt_ir_transform::optimize_program;

#[derive(Parser)]
#[command(name = "tacopt", version, about = "Optimizer for three-address IR programs")]
struct Options {
    /// Write the optimized program here instead of stdout.
    #[arg(long, value_name = "path")]
    out: Option<PathBuf>,

    /// The textual IR file to optimize.
    #[arg(value_name = "input")]
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let options = Options::parse();

    let source = std::fs::read_to_string(&options.input)
        .with_context(|| format!("failed to read {}", options.input.display()))?;

    let mut ids = IdGen::new();
    let mut program = parse_program(&source, &mut ids)
        .with_context(|| format!("failed to parse {}", options.input.display()))?;

    optimize_program(&mut program, &mut ids).context("optimization failed")?;

    let output = program.to_string();
    match &options.out {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{output}"),
    }
    Ok(())
}
