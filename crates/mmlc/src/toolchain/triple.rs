//! Target-triple resolution and caching.
//!
//! An explicit caller-supplied triple is used verbatim. Otherwise a
//! previously cached local triple is reused; otherwise the host compiler is
//! queried once and the normalized result cached to disk.

use std::fs;
use std::path::Path;

use crate::errors::BuildError;

use super::tools;

pub const TRIPLE_CACHE_FILE: &str = "local-target-triple";

pub fn resolve_triple(
    work_dir: &Path,
    explicit: Option<&str>,
    tool_dir: Option<&Path>,
) -> Result<String, BuildError> {
    if let Some(triple) = explicit {
        return Ok(triple.trim().to_string());
    }
    let cache = work_dir.join(TRIPLE_CACHE_FILE);
    if let Ok(text) = fs::read_to_string(&cache) {
        let cached = text.trim();
        if !cached.is_empty() {
            log::debug!("using cached target triple '{}'", cached);
            return Ok(cached.to_string());
        }
    }
    let output = tools::command(tool_dir, "clang")
        .arg("-dumpmachine")
        .output()
        .map_err(|e| BuildError::Triple(format!("could not query host compiler: {}", e)))?;
    if !output.status.success() {
        return Err(BuildError::Triple(format!(
            "host compiler exited with {}",
            output.status
        )));
    }
    let raw = String::from_utf8_lossy(&output.stdout);
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BuildError::Triple(
            "host compiler printed an empty triple".to_string(),
        ));
    }
    let normalized = normalize_triple(raw);
    if fs::create_dir_all(work_dir).is_ok()
        && let Err(e) = fs::write(&cache, &normalized)
    {
        log::warn!("could not cache target triple: {}", e);
    }
    Ok(normalized)
}

/// Strip the OS version suffix from the last triple component, so e.g.
/// `arm64-apple-darwin23.6.0` and `arm64-apple-darwin24.1.0` resolve to the
/// same cached value.
pub fn normalize_triple(raw: &str) -> String {
    let mut parts: Vec<&str> = raw.trim().split('-').collect();
    if let Some(last) = parts.last_mut() {
        let stripped = last.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        if !stripped.is_empty() {
            *last = stripped;
        }
    }
    parts.join("-")
}

/// Compile-time host triple used by the dump modes, which bypass the
/// toolchain (and with it the cached resolution) entirely.
pub fn default_host_triple() -> &'static str {
    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    {
        "x86_64-unknown-linux-gnu"
    }
    #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
    {
        "aarch64-unknown-linux-gnu"
    }
    #[cfg(all(target_arch = "x86_64", target_os = "macos"))]
    {
        "x86_64-apple-darwin"
    }
    #[cfg(all(target_arch = "aarch64", target_os = "macos"))]
    {
        "arm64-apple-darwin"
    }
    #[cfg(not(any(
        all(target_arch = "x86_64", target_os = "linux"),
        all(target_arch = "aarch64", target_os = "linux"),
        all(target_arch = "x86_64", target_os = "macos"),
        all(target_arch = "aarch64", target_os = "macos")
    )))]
    {
        "x86_64-unknown-linux-gnu"
    }
}
