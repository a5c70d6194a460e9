//! MML native backend.
//!
//! Lowers a fully resolved, typed MML module into textual LLVM IR and
//! drives the external assemble/optimize/codegen/link pipeline to produce a
//! native executable or relocatable object. The front-end phases are
//! upstream collaborators: their output arrives as a [`mml_ast::Program`]
//! read from a `.mmlt` file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use mml_ast::Program;

pub mod codegen;
pub mod diagnostics;
pub mod errors;
pub mod toolchain;
pub mod validator;

use toolchain::BuildConfig;

/// What one compiler invocation produces. The dump modes bypass the
/// toolchain orchestrator entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitKind {
    Executable,
    LibraryObject,
    AstDump,
    IrDump,
}

/// Compilation options, separate from CLI parsing. This is the programmatic
/// entry point for driving the backend.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Typed-tree input file (`.mmlt`).
    pub input: PathBuf,
    pub emit: EmitKind,
    /// Working directory for build artifacts and caches; defaults to `.`.
    pub out_dir: Option<PathBuf>,
    /// Override the artifact base name; defaults to the lowercased module
    /// name.
    pub out_name: Option<String>,
    /// Explicit target triple, used verbatim.
    pub target_triple: Option<String>,
    /// `none`, `less`, `default` or `aggressive`.
    pub opt_level: Option<String>,
    /// Execute the produced binary and forward its exit status.
    pub run: bool,
    /// Also render the optimized module back to textual IR.
    pub emit_opt_ir: bool,
    /// Resolve the LLVM tools from this directory instead of `$PATH`.
    pub tool_dir: Option<PathBuf>,
}

/// Read the typed-tree input and compile it. Returns the produced artifact
/// path, or `None` for modes that only print.
pub fn compile_with_options(options: &CompileOptions) -> Result<Option<PathBuf>> {
    let text = fs::read_to_string(&options.input)
        .with_context(|| format!("could not read {}", options.input.display()))?;
    let program: Program = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid typed-tree file", options.input.display()))?;
    compile_program(&program, options)
}

/// Compile an in-memory program.
pub fn compile_program(program: &Program, options: &CompileOptions) -> Result<Option<PathBuf>> {
    let module = &program.module;

    if options.emit == EmitKind::AstDump {
        println!("{}", serde_json::to_string_pretty(module)?);
        return Ok(None);
    }

    let entry = match validator::validate_entry_point(module, &program.index, options.emit) {
        Ok(entry) => entry,
        Err(d) => {
            diagnostics::emit_diagnostic(&d);
            anyhow::bail!("{}", d.message);
        }
    };

    let work_dir = options
        .out_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let triple = if options.emit == EmitKind::IrDump {
        options
            .target_triple
            .clone()
            .unwrap_or_else(|| toolchain::triple::default_host_triple().to_string())
    } else {
        toolchain::triple::resolve_triple(
            &work_dir,
            options.target_triple.as_deref(),
            options.tool_dir.as_deref(),
        )?
    };

    let emitted = match codegen::emit_module(module, &program.index, &triple, entry.as_ref()) {
        Ok(emitted) => emitted,
        Err(d) => {
            diagnostics::emit_diagnostic(&d);
            anyhow::bail!("{}", d.message);
        }
    };
    for warning in &emitted.warnings {
        log::warn!("{}", warning);
    }

    if options.emit == EmitKind::IrDump {
        fs::create_dir_all(&work_dir)
            .with_context(|| format!("could not create {}", work_dir.display()))?;
        let path = work_dir.join(format!("{}.ll", module.name));
        fs::write(&path, &emitted.ir)
            .with_context(|| format!("could not write {}", path.display()))?;
        return Ok(Some(path));
    }

    let cfg = BuildConfig {
        work_dir,
        module_name: module.name.clone(),
        program_name: options
            .out_name
            .clone()
            .unwrap_or_else(|| module.name.to_lowercase()),
        suffix_triple: options.target_triple.is_some(),
        triple,
        opt_level: options
            .opt_level
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        emit: options.emit,
        run_after_build: options.run,
        emit_opt_ir: options.emit_opt_ir,
        tool_dir: options.tool_dir.clone(),
    };
    let artifact = toolchain::build_module(&cfg, &emitted.ir)?;
    Ok(Some(artifact))
}
