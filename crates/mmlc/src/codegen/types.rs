//! Type lowering: from typed-tree type references to target representation
//! strings, following alias chains through the resolvable index.

use mml_ast::{Definition, NativeRepr, ResolvableIndex, StructDef, TypeRef};

use super::GenState;
use crate::diagnostics::Diagnostic;

/// Classification of one lowered struct field, used by the ABI rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRepr {
    /// A full machine word (`i64`).
    Word(String),
    /// Any pointer representation.
    Pointer(String),
    /// Everything else (narrow integers, floats, nested aggregates).
    Other(String),
}

impl FieldRepr {
    pub fn repr(&self) -> &str {
        match self {
            FieldRepr::Word(r) | FieldRepr::Pointer(r) | FieldRepr::Other(r) => r,
        }
    }

    pub(crate) fn classify(repr: &str) -> FieldRepr {
        if repr.ends_with('*') {
            FieldRepr::Pointer(repr.to_string())
        } else if repr == "i64" {
            FieldRepr::Word(repr.to_string())
        } else {
            FieldRepr::Other(repr.to_string())
        }
    }
}

/// A lowered type: its representation string, and for aggregates the
/// classified field list the ABI rules consult.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub repr: String,
    pub fields: Option<Vec<FieldRepr>>,
}

impl Lowered {
    pub(crate) fn scalar(repr: impl Into<String>) -> Lowered {
        Lowered {
            repr: repr.into(),
            fields: None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.repr == "void"
    }
}

/// Follow alias indirection to a fixed point. Returns `None` for the unit
/// type. A cycle or an unresolved name is a descriptive error, never a loop.
pub(crate) fn resolve_to_definition<'i>(
    index: &'i ResolvableIndex,
    ty: &TypeRef,
) -> Result<Option<&'i Definition>, Diagnostic> {
    let mut current = ty.clone();
    let mut seen: Vec<String> = Vec::new();
    loop {
        let name = match &current {
            TypeRef::Unit => return Ok(None),
            TypeRef::Name(n) => n.clone(),
        };
        if seen.iter().any(|s| *s == name) {
            return Err(Diagnostic::simple(format!(
                "type alias cycle detected while resolving '{}'",
                name
            )));
        }
        seen.push(name.clone());
        match index.resolve(&name) {
            None => {
                return Err(Diagnostic::simple(format!(
                    "unresolved type reference '{}'",
                    name
                )));
            }
            Some(Definition::Alias { target, .. }) => current = target.clone(),
            Some(def) => return Ok(Some(def)),
        }
    }
}

/// Lower a type reference to its target representation. Struct definitions
/// are emitted into the state's named-type registry the first time they are
/// seen; an alias-scope node is registered for each emitted struct.
pub fn lower_type(state: &mut GenState, ty: &TypeRef) -> Result<Lowered, Diagnostic> {
    let index = state.index;
    match resolve_to_definition(index, ty)? {
        None => Ok(Lowered::scalar("void")),
        Some(Definition::Native { repr, .. }) => match repr {
            NativeRepr::Scalar(r) => Ok(Lowered::scalar(r.clone())),
            NativeRepr::Pointer(pointee) => Ok(Lowered::scalar(format!("{}*", pointee))),
        },
        Some(Definition::Struct(sd)) => {
            let sd = sd.clone();
            lower_struct(state, &sd)
        }
        Some(Definition::Function(f)) => Err(Diagnostic::simple(format!(
            "type reference '{}' names a function, not a type",
            f.name
        ))),
        Some(Definition::Alias { name, .. }) => Err(Diagnostic::simple(format!(
            "alias '{}' did not resolve to a concrete definition",
            name
        ))),
    }
}

/// Lower a type by its source-level name.
pub fn lower_type_name(state: &mut GenState, name: &str) -> Result<Lowered, Diagnostic> {
    lower_type(state, &TypeRef::from_name(name))
}

fn lower_struct(state: &mut GenState, sd: &StructDef) -> Result<Lowered, Diagnostic> {
    if !state.structs_in_progress.insert(sd.name.clone()) {
        return Err(Diagnostic::simple(format!(
            "struct '{}' contains itself by value",
            sd.name
        )));
    }
    let mut reprs: Vec<FieldRepr> = Vec::with_capacity(sd.fields.len());
    let mut failed: Option<Diagnostic> = None;
    for field in &sd.fields {
        match lower_type(state, &field.ty) {
            Ok(lt) if lt.is_void() => {
                failed = Some(Diagnostic::simple(format!(
                    "field '{}' of struct '{}' has no value representation",
                    field.name, sd.name
                )));
                break;
            }
            Ok(lt) => reprs.push(FieldRepr::classify(&lt.repr)),
            Err(d) => {
                failed = Some(Diagnostic::simple(format!(
                    "struct '{}' could not be lowered: {}",
                    sd.name, d.message
                )));
                break;
            }
        }
    }
    state.structs_in_progress.remove(&sd.name);
    if let Some(d) = failed {
        return Err(d);
    }
    let body = reprs
        .iter()
        .map(|r| r.repr().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    state.ensure_named_type(&sd.name, &body);
    let _ = state.alias_scope(&sd.name);
    Ok(Lowered {
        repr: format!("%struct.{}", sd.name),
        fields: Some(reprs),
    })
}

/// Byte size used for field-offset computation.
pub(crate) fn size_of_repr(repr: &str) -> u64 {
    match repr {
        "i1" | "i8" => 1,
        "i16" => 2,
        "i32" | "float" => 4,
        _ => 8,
    }
}

/// TBAA field descriptions for a struct: each field's source-level type name
/// and its byte offset, with size-aligned layout.
pub(crate) fn struct_tbaa_fields(
    state: &mut GenState,
    sd: &StructDef,
) -> Result<Vec<(String, u64)>, Diagnostic> {
    let mut out = Vec::with_capacity(sd.fields.len());
    let mut offset = 0u64;
    for field in &sd.fields {
        let lt = lower_type(state, &field.ty)?;
        let size = size_of_repr(&lt.repr);
        offset = offset.div_ceil(size) * size;
        out.push((field.ty.name().to_string(), offset));
        offset += size;
    }
    Ok(out)
}
