//! Pre-codegen validation of the executable entry-point contract.
//!
//! Only executable-producing compiles are checked: the module must contain
//! a zero-parameter function binding named `main` whose return type resolves
//! (through alias chains) to the unit type or an allowed integer type. The
//! other modes perform no check.

use mml_ast::{BindingOrigin, Definition, Module, NativeRepr, ResolvableIndex};

use crate::EmitKind;
use crate::codegen::EntryPoint;
use crate::codegen::types::resolve_to_definition;
use crate::diagnostics::Diagnostic;

const ALLOWED_INT_REPRS: &[&str] = &["i64", "i32"];

/// Validate the entry point for the requested mode. Returns the bound entry
/// point for executables, `None` for every other mode.
pub fn validate_entry_point(
    module: &Module,
    index: &ResolvableIndex,
    mode: EmitKind,
) -> Result<Option<EntryPoint>, Diagnostic> {
    if mode != EmitKind::Executable {
        return Ok(None);
    }

    let main = module
        .members
        .iter()
        .find(|b| b.origin == BindingOrigin::Function && b.name == "main")
        .ok_or_else(|| {
            Diagnostic::simple("No entry point 'main' found for binary compilation")
                .in_module(&module.name)
        })?;

    if !main.params.is_empty() {
        return Err(
            Diagnostic::simple("Entry point 'main' must have no parameters")
                .in_module(&module.name),
        );
    }

    let ret_repr = match resolve_to_definition(index, &main.ty)? {
        None => None,
        Some(Definition::Native {
            repr: NativeRepr::Scalar(r),
            ..
        }) if ALLOWED_INT_REPRS.contains(&r.as_str()) => Some(r.clone()),
        Some(def) => {
            return Err(Diagnostic::simple(format!(
                "Entry point 'main' must return Unit or an integer type, found '{}'",
                def.name()
            ))
            .in_module(&module.name));
        }
    };

    Ok(Some(EntryPoint {
        symbol: format!("{}_main", module.name.to_lowercase()),
        ret_repr,
    }))
}
