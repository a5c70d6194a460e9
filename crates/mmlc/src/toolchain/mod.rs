//! External toolchain orchestration.
//!
//! One strictly sequential pipeline per module: assemble the textual IR,
//! link the runtime unit (executables only), optimize, optionally render
//! the optimized module back to text, generate target assembly, and produce
//! the final binary or relocatable object. Each stage is a named,
//! independently timed unit; the first failure short-circuits everything
//! after it and surfaces that stage's error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use crate::EmitKind;
use crate::errors::BuildError;

pub mod runtime;
pub mod tools;
pub mod triple;

/// Configuration for one toolchain run, all paths relative to the
/// caller-supplied working directory.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub work_dir: PathBuf,
    pub module_name: String,
    /// Base name of the produced artifact.
    pub program_name: String,
    pub triple: String,
    /// Append `-<triple>` to the artifact name (set for explicit-triple
    /// cross builds).
    pub suffix_triple: bool,
    /// `none`, `less`, `default` or `aggressive`.
    pub opt_level: String,
    pub emit: EmitKind,
    pub run_after_build: bool,
    /// Render the optimized module back to textual IR for inspection.
    pub emit_opt_ir: bool,
    /// Resolve tools from this directory instead of `$PATH`.
    pub tool_dir: Option<PathBuf>,
}

impl BuildConfig {
    pub fn out_dir(&self) -> PathBuf {
        self.work_dir.join("out").join(&self.triple)
    }

    pub fn target_dir(&self) -> PathBuf {
        self.work_dir.join("target")
    }

    fn artifact_base(&self) -> String {
        if self.suffix_triple {
            format!("{}-{}", self.program_name, self.triple)
        } else {
            self.program_name.clone()
        }
    }

    fn opt_flag(&self) -> &'static str {
        match self.opt_level.as_str() {
            "none" => "-O0",
            "less" => "-O1",
            "aggressive" => "-O3",
            _ => "-O2",
        }
    }
}

/// The tools the current configuration will actually launch.
pub fn required_tools(cfg: &BuildConfig) -> Vec<&'static str> {
    let mut required = vec!["llvm-as", "opt", "llc", "clang"];
    if cfg.emit == EmitKind::Executable {
        required.insert(1, "llvm-link");
    }
    if cfg.emit_opt_ir {
        required.push("llvm-dis");
    }
    required
}

/// Run one named pipeline stage. A launch-time NotFound proactively
/// archives the verification marker before reporting, so the next build
/// re-verifies instead of trusting the stale cache.
pub(crate) fn run_stage(
    cfg: &BuildConfig,
    stage: &'static str,
    tool: &str,
    cmd: &mut Command,
) -> Result<(), BuildError> {
    let started = Instant::now();
    log::debug!("stage '{}': launching {}", stage, tool);
    match cmd.status() {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tools::invalidate_marker(&cfg.work_dir);
            Err(BuildError::ToolVanished {
                stage,
                tool: tool.to_string(),
            })
        }
        Err(e) => Err(BuildError::Stage {
            stage,
            message: format!("failed to launch {}: {}", tool, e),
        }),
        Ok(status) if !status.success() => Err(BuildError::Stage {
            stage,
            message: format!("{} exited with {}", tool, status),
        }),
        Ok(_) => {
            log::info!("stage '{}' finished in {:.1?}", stage, started.elapsed());
            Ok(())
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dir).map_err(|e| BuildError::Environment(format!("{}: {}", dir.display(), e)))
}

/// Drive the full pipeline for one emitted module. Returns the path of the
/// produced artifact.
pub fn build_module(cfg: &BuildConfig, ir: &str) -> Result<PathBuf, BuildError> {
    if matches!(cfg.emit, EmitKind::AstDump | EmitKind::IrDump) {
        return Err(BuildError::Environment(
            "dump modes do not drive the toolchain".to_string(),
        ));
    }
    tools::ensure_tools(&cfg.work_dir, cfg.tool_dir.as_deref(), &required_tools(cfg))?;

    let out_dir = cfg.out_dir();
    let target_dir = cfg.target_dir();
    ensure_dir(&out_dir)?;
    ensure_dir(&target_dir)?;

    let ll = out_dir.join(format!("{}.ll", cfg.module_name));
    fs::write(&ll, ir).map_err(|e| BuildError::Environment(format!("{}: {}", ll.display(), e)))?;

    let bc = out_dir.join(format!("{}.bc", cfg.module_name));
    let mut cmd = tools::command(cfg.tool_dir.as_deref(), "llvm-as");
    cmd.arg(&ll).arg("-o").arg(&bc);
    run_stage(cfg, "llvm-as", "llvm-as", &mut cmd)?;

    // Executables carry the runtime in at the bitcode level so the
    // optimizer sees the whole program.
    let opt_input = if cfg.emit == EmitKind::Executable {
        let runtime_bc = runtime::ensure_runtime_bitcode(cfg)?;
        let linked = out_dir.join(format!("{}_linked.bc", cfg.module_name));
        let mut cmd = tools::command(cfg.tool_dir.as_deref(), "llvm-link");
        cmd.arg(&bc).arg(&runtime_bc).arg("-o").arg(&linked);
        run_stage(cfg, "llvm-link", "llvm-link", &mut cmd)?;
        linked
    } else {
        bc
    };

    let opt_bc = out_dir.join(format!("{}_opt.bc", cfg.module_name));
    let mut cmd = tools::command(cfg.tool_dir.as_deref(), "opt");
    cmd.arg(cfg.opt_flag()).arg(&opt_input).arg("-o").arg(&opt_bc);
    run_stage(cfg, "opt", "opt", &mut cmd)?;

    if cfg.emit_opt_ir {
        let opt_ll = out_dir.join(format!("{}_opt.ll", cfg.module_name));
        let mut cmd = tools::command(cfg.tool_dir.as_deref(), "llvm-dis");
        cmd.arg(&opt_bc).arg("-o").arg(&opt_ll);
        run_stage(cfg, "llvm-dis", "llvm-dis", &mut cmd)?;
    }

    let asm = out_dir.join(format!("{}.s", cfg.module_name));
    let mut cmd = tools::command(cfg.tool_dir.as_deref(), "llc");
    cmd.arg(cfg.opt_flag()).arg(&opt_bc).arg("-o").arg(&asm);
    run_stage(cfg, "llc", "llc", &mut cmd)?;

    match cfg.emit {
        EmitKind::Executable => {
            let binary = target_dir.join(cfg.artifact_base());
            let mut cmd = tools::command(cfg.tool_dir.as_deref(), "clang");
            cmd.arg(&asm).arg("-o").arg(&binary);
            run_stage(cfg, "clang", "clang", &mut cmd)?;
            if cfg.run_after_build {
                run_program(cfg, &binary)?;
            }
            Ok(binary)
        }
        EmitKind::LibraryObject => {
            let object = target_dir.join(format!("{}.o", cfg.artifact_base()));
            let mut cmd = tools::command(cfg.tool_dir.as_deref(), "clang");
            cmd.arg("-c").arg(&asm).arg("-o").arg(&object);
            run_stage(cfg, "clang", "clang", &mut cmd)?;
            // A library consumer links the runtime separately, so ship the
            // compiled runtime object next to the library object.
            let runtime_obj = runtime::ensure_runtime_object(cfg)?;
            let shipped = target_dir.join(format!("{}.o", runtime::RUNTIME_UNIT));
            fs::copy(&runtime_obj, &shipped).map_err(|e| {
                BuildError::Environment(format!("{}: {}", shipped.display(), e))
            })?;
            Ok(object)
        }
        EmitKind::AstDump | EmitKind::IrDump => unreachable!("checked above"),
    }
}

/// Execute the produced binary, forwarding its exit status. A non-zero exit
/// is surfaced as a process error so the driver can propagate the code.
fn run_program(cfg: &BuildConfig, binary: &Path) -> Result<(), BuildError> {
    let started = Instant::now();
    match Command::new(binary).status() {
        Err(e) => Err(BuildError::Stage {
            stage: "run",
            message: format!("failed to launch {}: {}", binary.display(), e),
        }),
        Ok(status) => {
            log::info!("stage 'run' finished in {:.1?}", started.elapsed());
            match status.code() {
                Some(0) => Ok(()),
                Some(code) => Err(BuildError::ProgramExit {
                    name: cfg.program_name.clone(),
                    code,
                }),
                None => Err(BuildError::Stage {
                    stage: "run",
                    message: format!("{} terminated by signal", binary.display()),
                }),
            }
        }
    }
}
