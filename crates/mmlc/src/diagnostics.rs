// Print a compact, rustc-like diagnostic to stderr.
//
// The backend receives a resolved tree rather than source text, so instead
// of byte spans a diagnostic may carry a rendering of the offending tree
// node for context.

use std::sync::atomic::{AtomicBool, Ordering};

pub fn report_error(module: Option<&str>, message: &str, note: Option<&str>) {
    // ANSI red for "error"
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    eprintln!("{}error{}: {}", red, reset, message);
    if let Some(m) = module {
        eprintln!("  --> module {}", m);
    }

    if let Some(note) = note {
        // ANSI blue for note
        let blue = "\x1b[34m";
        eprintln!("{}note{}: {}", blue, reset, note);
    }
}

/// Structured error container used by lowering to propagate code-generation
/// failures up to a single emission site.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub module: Option<String>,
    pub note: Option<String>,
    /// Debug rendering of the tree node the lowering rules could not cover,
    /// when one is available.
    pub node: Option<String>,
}

impl Diagnostic {
    pub fn simple(msg: impl Into<String>) -> Self {
        Diagnostic {
            message: msg.into(),
            module: None,
            note: None,
            node: None,
        }
    }

    /// A diagnostic that records the offending tree node alongside the
    /// message.
    pub fn with_node(msg: impl Into<String>, node: &impl std::fmt::Debug) -> Self {
        Diagnostic {
            message: msg.into(),
            module: None,
            note: None,
            node: Some(format!("{:?}", node)),
        }
    }

    pub fn in_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// Emit the diagnostic via the lightweight printer.
pub fn emit_diagnostic(d: &Diagnostic) {
    if DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        report_error(d.module.as_deref(), &d.message, d.note.as_deref());
        if let Some(node) = &d.node {
            eprintln!("  offending node: {}", node);
        }
    }
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Suppress diagnostic printing for the current scope. Returns a guard that
/// restores the previous enabled state when dropped. Tests can call
/// `let _g = diagnostics::suppress();` to silence stderr output while still
/// inspecting returned Diagnostics.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// Internal guard type returned by `suppress()`.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}
