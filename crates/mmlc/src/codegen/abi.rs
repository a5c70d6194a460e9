//! Calling-convention adjustment for aggregate values.
//!
//! Per-architecture rules decide whether a multi-field aggregate crossing a
//! function boundary must be repacked. Rules are consulted in a fixed order
//! and the first match wins; an architecture with no matching rule passes
//! the aggregate in its natural form. The pack and unpack transforms are
//! strict inverses, pointer fields round-tripping through an integer cast
//! because pointers cannot appear inside the packed array directly.

use super::GenState;
use super::types::FieldRepr;
use crate::diagnostics::Diagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArch {
    Aarch64,
    X86_64,
    Other,
}

impl TargetArch {
    pub fn from_triple(triple: &str) -> TargetArch {
        match triple.split('-').next().unwrap_or("") {
            "aarch64" | "arm64" => TargetArch::Aarch64,
            "x86_64" | "amd64" => TargetArch::X86_64,
            _ => TargetArch::Other,
        }
    }
}

/// How one packed slot relates to the original field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCast {
    /// The field is stored in the slot as-is.
    None,
    /// The field is a pointer: `ptrtoint` on pack, `inttoptr` on unpack.
    PointerRoundTrip,
}

/// Replacement parameter/return shape for a matched aggregate.
#[derive(Debug, Clone)]
pub struct PackedShape {
    pub repr: String,
    /// Original field representation and the cast each slot needs.
    pub slots: Vec<(String, SlotCast)>,
}

type AbiRule = fn(&[FieldRepr]) -> Option<PackedShape>;

/// A two-field aggregate whose fields are each a full machine word or a
/// pointer travels as `[2 x i64]`.
fn pack_two_words(fields: &[FieldRepr]) -> Option<PackedShape> {
    if fields.len() != 2 {
        return None;
    }
    let mut slots = Vec::with_capacity(2);
    for field in fields {
        match field {
            FieldRepr::Word(r) => slots.push((r.clone(), SlotCast::None)),
            FieldRepr::Pointer(r) => slots.push((r.clone(), SlotCast::PointerRoundTrip)),
            FieldRepr::Other(_) => return None,
        }
    }
    Some(PackedShape {
        repr: "[2 x i64]".to_string(),
        slots,
    })
}

/// The active lowering strategy for one module compile.
#[derive(Debug, Clone, Copy)]
pub struct AbiLowering {
    arch: TargetArch,
}

impl AbiLowering {
    pub fn new(arch: TargetArch) -> AbiLowering {
        AbiLowering { arch }
    }

    fn rules(&self) -> &'static [AbiRule] {
        match self.arch {
            TargetArch::Aarch64 => &[pack_two_words],
            TargetArch::X86_64 | TargetArch::Other => &[],
        }
    }

    /// First matching rule wins; `None` means the aggregate passes in its
    /// natural form.
    pub fn lowered_shape(&self, fields: &[FieldRepr]) -> Option<PackedShape> {
        self.rules().iter().find_map(|rule| rule(fields))
    }
}

/// Extract each field of `src` (an aggregate of representation `agg_repr`),
/// cast pointer fields to integers, and repack into the replacement shape.
/// Returns the register holding the packed value.
pub fn emit_pack(
    state: &mut GenState,
    shape: &PackedShape,
    agg_repr: &str,
    src: &str,
) -> Result<u32, Diagnostic> {
    if shape.slots.is_empty() {
        return Err(Diagnostic::simple(
            "ABI packing precondition violated: empty slot list",
        ));
    }
    let mut packed = "undef".to_string();
    let mut last = 0u32;
    for (i, (orig, cast)) in shape.slots.iter().enumerate() {
        let field = state.fresh_reg();
        state.push(format!(
            "  %r{} = extractvalue {} {}, {}",
            field, agg_repr, src, i
        ));
        let slot_value = match cast {
            SlotCast::None => field,
            SlotCast::PointerRoundTrip => {
                let cast_reg = state.fresh_reg();
                state.push(format!(
                    "  %r{} = ptrtoint {} %r{} to i64",
                    cast_reg, orig, field
                ));
                cast_reg
            }
        };
        let ins = state.fresh_reg();
        state.push(format!(
            "  %r{} = insertvalue {} {}, i64 %r{}, {}",
            ins, shape.repr, packed, slot_value, i
        ));
        packed = format!("%r{}", ins);
        last = ins;
    }
    Ok(last)
}

/// Inverse of [`emit_pack`]: extract each packed slot, cast integers back to
/// pointers where the original field was a pointer, and rebuild the natural
/// aggregate. Returns the register holding the rebuilt value.
pub fn emit_unpack(
    state: &mut GenState,
    shape: &PackedShape,
    agg_repr: &str,
    src: &str,
) -> Result<u32, Diagnostic> {
    if shape.slots.is_empty() {
        return Err(Diagnostic::simple(
            "ABI packing precondition violated: empty slot list",
        ));
    }
    let mut agg = "undef".to_string();
    let mut last = 0u32;
    for (i, (orig, cast)) in shape.slots.iter().enumerate() {
        let slot = state.fresh_reg();
        state.push(format!(
            "  %r{} = extractvalue {} {}, {}",
            slot, shape.repr, src, i
        ));
        let field_value = match cast {
            SlotCast::None => slot,
            SlotCast::PointerRoundTrip => {
                let cast_reg = state.fresh_reg();
                state.push(format!(
                    "  %r{} = inttoptr i64 %r{} to {}",
                    cast_reg, slot, orig
                ));
                cast_reg
            }
        };
        let ins = state.fresh_reg();
        state.push(format!(
            "  %r{} = insertvalue {} {}, {} %r{}, {}",
            ins, agg_repr, agg, orig, field_value, i
        ));
        agg = format!("%r{}", ins);
        last = ins;
    }
    Ok(last)
}
