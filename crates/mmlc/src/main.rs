//! Main entry point for the MML native backend.
//!
//! `mmlc` consumes a typed-tree file produced by the front end and drives
//! the backend pipeline:
//!
//! 1. **Validation**: checks the executable entry-point contract
//! 2. **Code generation**: emits textual LLVM IR for the module
//! 3. **Toolchain**: assembles, optimizes and links via the external LLVM
//!    tools to produce a native executable or relocatable object
//!
//! ```bash
//! # Compile to an executable
//! mmlc demo.mmlt
//!
//! # Library object (ships the runtime object alongside)
//! mmlc demo.mmlt --emit obj
//!
//! # Inspect the emitted IR without touching the toolchain
//! mmlc demo.mmlt --emit ir
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use mmlc::errors::BuildError;
use mmlc::{CompileOptions, EmitKind, compile_with_options};

#[derive(Parser)]
#[command(name = "mmlc", about = "MML native backend", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Typed-tree input file (.mmlt) produced by the front end
    input: PathBuf,

    /// Artifact to produce: exe, obj, ast or ir
    #[arg(long = "emit", default_value = "exe")]
    emit: String,

    /// Working directory for build artifacts and caches
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Override the output executable/library name
    #[arg(long = "out-name")]
    out_name: Option<String>,

    /// Target triple, used verbatim instead of the cached/queried host triple
    #[arg(long = "target")]
    target: Option<String>,

    /// Optimization level: none, less, default, aggressive
    #[arg(long = "opt-level")]
    opt_level: Option<String>,

    /// Execute the produced binary and forward its exit status
    #[arg(long)]
    run: bool,

    /// Also render the optimized module back to textual IR
    #[arg(long = "emit-opt-ir")]
    emit_opt_ir: bool,

    /// Directory to resolve the LLVM tools from instead of PATH
    #[arg(long = "tools")]
    tools: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let emit = match cli.emit.as_str() {
        "exe" => EmitKind::Executable,
        "obj" => EmitKind::LibraryObject,
        "ast" => EmitKind::AstDump,
        "ir" => EmitKind::IrDump,
        other => anyhow::bail!("unknown --emit kind '{}'", other),
    };

    let options = CompileOptions {
        input: cli.input,
        emit,
        out_dir: cli.out_dir,
        out_name: cli.out_name,
        target_triple: cli.target,
        opt_level: cli.opt_level,
        run: cli.run,
        emit_opt_ir: cli.emit_opt_ir,
        tool_dir: cli.tools,
    };

    match compile_with_options(&options) {
        Ok(Some(artifact)) => {
            println!("{}", artifact.display());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            // The produced program's own exit status passes straight
            // through, so callers observe the program result rather than a
            // compiler error.
            if let Some(BuildError::ProgramExit { code, .. }) = err.downcast_ref::<BuildError>() {
                std::process::exit(*code);
            }
            Err(err)
        }
    }
}
