//! Typed error taxonomy for the build pipeline.
//!
//! Code-generation failures travel as [`crate::diagnostics::Diagnostic`];
//! everything that happens after emission — environment discovery, external
//! tool invocations, the produced program itself — is a `BuildError`. The
//! failing stage's name survives to the boundary so callers can tell exactly
//! which external step broke.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// An external pipeline stage exited non-zero or could not be launched.
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: &'static str, message: String },

    /// One or more required external tools are not installed.
    #[error("required LLVM tools not found: {}", .missing.join(", "))]
    ToolsMissing { missing: Vec<String> },

    /// A tool that verification had previously seen disappeared before a
    /// launch. The cached marker is archived before this is reported.
    #[error("tool '{tool}' not found at launch time (stage '{stage}')")]
    ToolVanished { stage: &'static str, tool: String },

    /// The produced executable ran and exited non-zero.
    #[error("program '{name}' exited with status {code}")]
    ProgramExit { name: String, code: i32 },

    /// No usable target triple could be determined.
    #[error("could not resolve a target triple: {0}")]
    Triple(String),

    /// The embedded runtime support unit could not be written out.
    #[error("runtime support resource could not be extracted: {0}")]
    Runtime(String),

    /// Build-directory housekeeping failed.
    #[error("build environment error: {0}")]
    Environment(String),
}

impl BuildError {
    /// Name of the failing pipeline stage, when the error is stage-scoped.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            BuildError::Stage { stage, .. } => Some(stage),
            BuildError::ToolVanished { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
