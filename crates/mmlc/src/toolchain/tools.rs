//! External tool discovery and the cached verification marker.
//!
//! Verifying the LLVM tools costs one process launch per tool, so the
//! result is cached in a marker file in the build directory. The marker is
//! trusted only when it lists every tool the current build needs; otherwise
//! the full set is re-verified and the marker rewritten. When a previously
//! verified tool disappears, the marker is archived (not deleted) so the
//! next build re-verifies instead of trusting a stale cache.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::BuildError;

pub const MARKER_FILE: &str = "llvm-check-ok";

/// Inventory from one verification pass: tools found with their captured
/// version line, and the tools that could not be launched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ToolInventory {
    pub found: BTreeMap<String, String>,
    #[serde(default)]
    pub missing: Vec<String>,
}

impl ToolInventory {
    /// Whether the inventory lists every currently required tool.
    pub fn covers(&self, required: &[&str]) -> bool {
        required.iter().all(|tool| self.found.contains_key(*tool))
    }
}

/// Resolve a tool name against the explicit tool directory, falling back to
/// `$PATH` lookup.
pub fn tool_path(tool_dir: Option<&Path>, tool: &str) -> PathBuf {
    match tool_dir {
        Some(dir) => dir.join(tool),
        None => PathBuf::from(tool),
    }
}

pub fn command(tool_dir: Option<&Path>, tool: &str) -> Command {
    Command::new(tool_path(tool_dir, tool))
}

/// Launch every required tool with `--version` and record the outcome.
pub fn verify_tools(tool_dir: Option<&Path>, required: &[&str]) -> ToolInventory {
    let mut inventory = ToolInventory::default();
    for tool in required {
        match command(tool_dir, tool).arg("--version").output() {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                inventory.found.insert(tool.to_string(), version);
            }
            _ => inventory.missing.push(tool.to_string()),
        }
    }
    inventory
}

/// Check tool availability, trusting the marker file when it covers the
/// required set. A fresh verification rewrites the marker on success.
pub fn ensure_tools(
    work_dir: &Path,
    tool_dir: Option<&Path>,
    required: &[&str],
) -> Result<(), BuildError> {
    let marker = work_dir.join(MARKER_FILE);
    if let Ok(text) = fs::read_to_string(&marker)
        && let Ok(inventory) = serde_json::from_str::<ToolInventory>(&text)
        && inventory.covers(required)
    {
        log::debug!("tool verification marker covers all required tools");
        return Ok(());
    }

    log::info!("verifying external tools: {}", required.join(", "));
    let inventory = verify_tools(tool_dir, required);
    if !inventory.missing.is_empty() {
        return Err(BuildError::ToolsMissing {
            missing: inventory.missing,
        });
    }
    let text = serde_json::to_string_pretty(&inventory)
        .map_err(|e| BuildError::Environment(format!("could not encode tool inventory: {}", e)))?;
    fs::create_dir_all(work_dir)
        .map_err(|e| BuildError::Environment(format!("{}: {}", work_dir.display(), e)))?;
    fs::write(&marker, text)
        .map_err(|e| BuildError::Environment(format!("{}: {}", marker.display(), e)))?;
    Ok(())
}

/// Archive the marker with a timestamp suffix. Failures are logged and
/// otherwise ignored; they never mask the error that triggered archival.
pub fn invalidate_marker(work_dir: &Path) {
    let marker = work_dir.join(MARKER_FILE);
    if !marker.exists() {
        return;
    }
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let archived = work_dir.join(format!("{}-{}", MARKER_FILE, stamp));
    if let Err(e) = fs::rename(&marker, &archived) {
        log::warn!("could not archive tool verification marker: {}", e);
    }
}
