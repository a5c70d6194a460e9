//! Runtime support unit handling.
//!
//! The C runtime source is embedded in the compiler binary and extracted
//! into the per-triple output directory on demand. Compiled forms are
//! cached there: bitcode for executable links, an object file for library
//! builds (the consumer links it separately, so a copy ships alongside the
//! library object).

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::BuildError;

use super::{BuildConfig, run_stage, tools};

const RUNTIME_SOURCE: &str = include_str!("../../resources/mml_runtime.c");

pub const RUNTIME_UNIT: &str = "mml_runtime";

/// Write the embedded runtime source into `out_dir`, skipping the write
/// when the on-disk copy is already current so cached artifacts stay warm.
fn extract_source(out_dir: &Path) -> Result<PathBuf, BuildError> {
    let src = out_dir.join(format!("{}.c", RUNTIME_UNIT));
    let current = fs::read_to_string(&src)
        .map(|text| text == RUNTIME_SOURCE)
        .unwrap_or(false);
    if !current {
        fs::write(&src, RUNTIME_SOURCE)
            .map_err(|e| BuildError::Runtime(format!("{}: {}", src.display(), e)))?;
    }
    Ok(src)
}

/// Compile (or reuse) the runtime unit as bitcode for the target.
pub fn ensure_runtime_bitcode(cfg: &BuildConfig) -> Result<PathBuf, BuildError> {
    let out_dir = cfg.out_dir();
    let bc = out_dir.join(format!("{}.bc", RUNTIME_UNIT));
    if bc.exists() {
        log::debug!("reusing cached runtime bitcode {}", bc.display());
        return Ok(bc);
    }
    let src = extract_source(&out_dir)?;
    let mut cmd = tools::command(cfg.tool_dir.as_deref(), "clang");
    cmd.arg("-c")
        .arg("-emit-llvm")
        .arg("-O2")
        .arg(format!("--target={}", cfg.triple))
        .arg(&src)
        .arg("-o")
        .arg(&bc);
    run_stage(cfg, "runtime", "clang", &mut cmd)?;
    Ok(bc)
}

/// Compile (or reuse) the runtime unit as a relocatable object for the
/// target.
pub fn ensure_runtime_object(cfg: &BuildConfig) -> Result<PathBuf, BuildError> {
    let out_dir = cfg.out_dir();
    let obj = out_dir.join(format!("{}.o", RUNTIME_UNIT));
    if obj.exists() {
        log::debug!("reusing cached runtime object {}", obj.display());
        return Ok(obj);
    }
    let src = extract_source(&out_dir)?;
    let mut cmd = tools::command(cfg.tool_dir.as_deref(), "clang");
    cmd.arg("-c")
        .arg("-O2")
        .arg(format!("--target={}", cfg.triple))
        .arg(&src)
        .arg("-o")
        .arg(&obj);
    run_stage(cfg, "runtime", "clang", &mut cmd)?;
    Ok(obj)
}
