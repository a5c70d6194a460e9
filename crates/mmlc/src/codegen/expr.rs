//! Recursive term lowering into virtual-register instructions.
//!
//! Dispatch is by node shape over the closed [`Term`] sum. Literals flow as
//! unmaterialized immediates and are rendered inline by their consumer;
//! everything else produces a register. Branching constructs report the
//! block they exit through so an enclosing conditional can list the right
//! predecessor in its join.

use std::collections::HashMap;

use mml_ast::{Definition, Literal, Term, TypeRef};

use super::GenState;
use super::abi;
use super::const_eval::{self, ConstValue};
use super::types::{Lowered, lower_type, lower_type_name, resolve_to_definition, struct_tbaa_fields};
use crate::diagnostics::Diagnostic;

/// A compiled value: a register, a named value (function parameter), or an
/// immediate that has not been materialized.
#[derive(Debug, Clone)]
pub enum Value {
    Reg(u32),
    Named(String),
    Imm(ConstValue),
}

impl Value {
    pub fn render(&self) -> String {
        match self {
            Value::Reg(r) => format!("%r{}", r),
            Value::Named(n) => format!("%{}", n),
            Value::Imm(c) => c.render(),
        }
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, Value::Imm(_))
    }
}

/// Result of compiling one term.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub value: Value,
    /// Source-level type name of the value.
    pub ty: String,
    /// For branching constructs, the block the value is live out of; an
    /// enclosing join uses it as the predecessor label.
    pub exit_block: Option<String>,
}

/// Per-function local-binding record for parameters and `let`s.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub value: Value,
    pub ty: String,
}

pub type Scope = HashMap<String, ScopeEntry>;

/// Fixed operator-symbol table. Returns the instruction mnemonic and
/// whether the result is a comparison (hence `Bool`).
fn instruction_for(op: &str, repr: &str) -> Option<(&'static str, bool)> {
    if repr == "i1" {
        return match op {
            "&&" => Some(("and", false)),
            "||" => Some(("or", false)),
            "==" => Some(("icmp eq", true)),
            "!=" => Some(("icmp ne", true)),
            _ => None,
        };
    }
    if repr.starts_with('i') && !repr.ends_with('*') {
        return match op {
            "+" => Some(("add", false)),
            "-" => Some(("sub", false)),
            "*" => Some(("mul", false)),
            "/" => Some(("sdiv", false)),
            "%" => Some(("srem", false)),
            "==" => Some(("icmp eq", true)),
            "!=" => Some(("icmp ne", true)),
            "<" => Some(("icmp slt", true)),
            "<=" => Some(("icmp sle", true)),
            ">" => Some(("icmp sgt", true)),
            ">=" => Some(("icmp sge", true)),
            _ => None,
        };
    }
    if repr == "double" || repr == "float" {
        return match op {
            "+" => Some(("fadd", false)),
            "-" => Some(("fsub", false)),
            "*" => Some(("fmul", false)),
            "/" => Some(("fdiv", false)),
            "==" => Some(("fcmp oeq", true)),
            "!=" => Some(("fcmp one", true)),
            "<" => Some(("fcmp olt", true)),
            "<=" => Some(("fcmp ole", true)),
            ">" => Some(("fcmp ogt", true)),
            ">=" => Some(("fcmp oge", true)),
            _ => None,
        };
    }
    None
}

/// TBAA access tag for loads/stores of the named type: scalar natives get a
/// tag, aggregates and unit get none.
pub(crate) fn access_tag_for(
    state: &mut GenState,
    type_name: &str,
) -> Result<Option<u32>, Diagnostic> {
    let index = state.index;
    match resolve_to_definition(index, &TypeRef::from_name(type_name))? {
        Some(Definition::Native { name, .. }) => {
            let name = name.clone();
            Ok(Some(state.tbaa_access_tag(&name)))
        }
        _ => Ok(None),
    }
}

/// Compile one term, threading the generation state and the function-local
/// scope.
pub fn compile_term(
    state: &mut GenState,
    scope: &mut Scope,
    term: &Term,
) -> Result<Compiled, Diagnostic> {
    match term {
        Term::Lit(Literal::Str(content)) => compile_string_literal(state, content),
        Term::Lit(lit) => Ok(Compiled {
            value: Value::Imm(ConstValue::from_literal(lit)),
            ty: lit.type_name().to_string(),
            exit_block: None,
        }),

        Term::Ref { name, ty } => compile_ref(state, scope, name, ty),

        Term::BinOp { op, lhs, rhs, .. } => {
            let l = compile_term(state, scope, lhs)?;
            let r = compile_term(state, scope, rhs)?;
            let exit_block = r.exit_block.clone().or(l.exit_block.clone());
            if const_eval::is_arithmetic(op)
                && let (Value::Imm(lc), Value::Imm(rc)) = (&l.value, &r.value)
                && let Some(folded) = const_eval::fold_binop(op, lc, rc)
            {
                let ty = folded.type_name().to_string();
                return Ok(Compiled {
                    value: Value::Imm(folded),
                    ty,
                    exit_block,
                });
            }
            let operand_ty = if l.value.is_imm() && !r.value.is_imm() {
                r.ty.clone()
            } else {
                l.ty.clone()
            };
            let repr = lower_type_name(state, &operand_ty)?.repr;
            let (instr, is_compare) = instruction_for(op, &repr).ok_or_else(|| {
                Diagnostic::with_node(
                    format!("operator '{}' has no lowering for type '{}'", op, operand_ty),
                    term,
                )
            })?;
            let reg = state.fresh_reg();
            state.push(format!(
                "  %r{} = {} {} {}, {}",
                reg,
                instr,
                repr,
                l.value.render(),
                r.value.render()
            ));
            Ok(Compiled {
                value: Value::Reg(reg),
                ty: if is_compare {
                    "Bool".to_string()
                } else {
                    operand_ty
                },
                exit_block,
            })
        }

        Term::UnOp { op, operand, .. } => {
            let v = compile_term(state, scope, operand)?;
            if let Value::Imm(c) = &v.value
                && let Some(folded) = const_eval::fold_unop(op, c)
            {
                let ty = folded.type_name().to_string();
                return Ok(Compiled {
                    value: Value::Imm(folded),
                    ty,
                    exit_block: v.exit_block,
                });
            }
            let repr = lower_type_name(state, &v.ty)?.repr;
            let reg = state.fresh_reg();
            match (op.as_str(), repr.as_str()) {
                ("-", "double" | "float") => {
                    state.push(format!("  %r{} = fneg {} {}", reg, repr, v.value.render()));
                }
                ("-", _) => {
                    state.push(format!("  %r{} = sub {} 0, {}", reg, repr, v.value.render()));
                }
                ("!", "i1") => {
                    state.push(format!("  %r{} = xor i1 {}, true", reg, v.value.render()));
                }
                _ => {
                    return Err(Diagnostic::with_node(
                        format!("operator '{}' has no lowering for type '{}'", op, v.ty),
                        term,
                    ));
                }
            }
            Ok(Compiled {
                value: Value::Reg(reg),
                ty: v.ty,
                exit_block: v.exit_block,
            })
        }

        Term::Apply { .. } => compile_apply(state, scope, term),

        Term::If {
            cond,
            then_term,
            else_term,
            ty,
        } => {
            let c = compile_term(state, scope, cond)?;
            let label = state.fresh_label_id();
            let then_label = format!("if.then{}", label);
            let else_label = format!("if.else{}", label);
            let merge_label = format!("if.merge{}", label);
            state.push(format!(
                "  br i1 {}, label %{}, label %{}",
                c.value.render(),
                then_label,
                else_label
            ));
            state.push(format!("{}:", then_label));
            let t = compile_term(state, scope, then_term)?;
            state.push(format!("  br label %{}", merge_label));
            state.push(format!("{}:", else_label));
            let e = compile_term(state, scope, else_term)?;
            state.push(format!("  br label %{}", merge_label));
            state.push(format!("{}:", merge_label));
            let lt = lower_type_name(state, ty)?;
            if lt.is_void() {
                return Ok(Compiled {
                    value: Value::Imm(ConstValue::Unit),
                    ty: "Unit".to_string(),
                    exit_block: Some(merge_label),
                });
            }
            let then_pred = t.exit_block.unwrap_or(then_label);
            let else_pred = e.exit_block.unwrap_or(else_label);
            let reg = state.fresh_reg();
            state.push(format!(
                "  %r{} = phi {} [ {}, %{} ], [ {}, %{} ]",
                reg,
                lt.repr,
                t.value.render(),
                then_pred,
                e.value.render(),
                else_pred
            ));
            Ok(Compiled {
                value: Value::Reg(reg),
                ty: ty.clone(),
                exit_block: Some(merge_label),
            })
        }

        Term::Let {
            name, value, body, ..
        } => {
            let v = compile_term(state, scope, value)?;
            let previous = scope.insert(
                name.clone(),
                ScopeEntry {
                    value: v.value,
                    ty: v.ty,
                },
            );
            let b = compile_term(state, scope, body);
            match previous {
                Some(entry) => {
                    scope.insert(name.clone(), entry);
                }
                None => {
                    scope.remove(name);
                }
            }
            let b = b?;
            Ok(Compiled {
                exit_block: b.exit_block.or(v.exit_block),
                ..b
            })
        }

        Term::Select {
            target,
            field,
            index: field_index,
            ty,
        } => compile_select(state, scope, term, target, field, *field_index, ty),
    }
}

/// String literals materialize through the runtime constructor so the
/// result is an ordinary `String` aggregate value.
fn compile_string_literal(state: &mut GenState, content: &str) -> Result<Compiled, Diagnostic> {
    let (global, len) = state.string_const(content);
    let pointer = format!(
        "getelementptr inbounds ([{} x i8], [{} x i8]* {}, i64 0, i64 0)",
        len, len, global
    );
    let args = vec![
        (Lowered::scalar("i8*"), pointer),
        (Lowered::scalar("i64"), (len - 1).to_string()),
    ];
    emit_call_raw(
        state,
        "mml_string_lit",
        true,
        args,
        &TypeRef::Name("String".to_string()),
    )
}

fn compile_ref(
    state: &mut GenState,
    scope: &Scope,
    name: &str,
    ty: &str,
) -> Result<Compiled, Diagnostic> {
    if let Some(entry) = scope.get(name) {
        return Ok(Compiled {
            value: entry.value.clone(),
            ty: entry.ty.clone(),
            exit_block: None,
        });
    }
    if state.index.function(name).is_some() {
        return Err(Diagnostic::simple(format!(
            "function '{}' used as a value; partial application is not supported",
            name
        )));
    }
    let lt = lower_type_name(state, ty)?;
    if lt.is_void() {
        return Ok(Compiled {
            value: Value::Imm(ConstValue::Unit),
            ty: "Unit".to_string(),
            exit_block: None,
        });
    }
    let symbol = state.mangle(name);
    let anno = if lt.fields.is_some() {
        let index = state.index;
        let resolved = resolve_to_definition(index, &TypeRef::from_name(ty))?
            .map(|d| d.name().to_string())
            .unwrap_or_else(|| ty.to_string());
        state
            .noalias_set(&resolved)
            .map(|n| format!(", !noalias !{}", n))
            .unwrap_or_default()
    } else {
        access_tag_for(state, ty)?
            .map(|t| format!(", !tbaa !{}", t))
            .unwrap_or_default()
    };
    let reg = state.fresh_reg();
    state.push(format!(
        "  %r{} = load {}, {}* @{}{}",
        reg, lt.repr, lt.repr, symbol, anno
    ));
    Ok(Compiled {
        value: Value::Reg(reg),
        ty: ty.to_string(),
        exit_block: None,
    })
}

/// Flatten a curried application spine into one call with the full argument
/// list, compile the arguments left to right, and emit a single call
/// instruction. ABI-eligible aggregates are packed around the call.
fn compile_apply(
    state: &mut GenState,
    scope: &mut Scope,
    term: &Term,
) -> Result<Compiled, Diagnostic> {
    let mut args_rev: Vec<&Term> = Vec::new();
    let mut cursor = term;
    while let Term::Apply { callee, arg, .. } = cursor {
        args_rev.push(arg.as_ref());
        cursor = callee.as_ref();
    }
    let callee_name = match cursor {
        Term::Ref { name, .. } => name,
        other => {
            return Err(Diagnostic::with_node(
                "call target must be a direct function reference",
                other,
            ));
        }
    };
    if scope.contains_key(callee_name) {
        return Err(Diagnostic::simple(format!(
            "local binding '{}' is not callable",
            callee_name
        )));
    }
    let sig = state
        .index
        .function(callee_name)
        .cloned()
        .ok_or_else(|| {
            Diagnostic::simple(format!("unresolved function reference '{}'", callee_name))
        })?;
    if args_rev.len() != sig.params.len() {
        return Err(Diagnostic::with_node(
            format!(
                "function '{}' applied to {} arguments but its signature takes {}",
                callee_name,
                args_rev.len(),
                sig.params.len()
            ),
            term,
        ));
    }

    let mut compiled_args: Vec<(Lowered, String)> = Vec::with_capacity(args_rev.len());
    let mut last_exit: Option<String> = None;
    for (arg, param_ty) in args_rev.iter().rev().zip(&sig.params) {
        let c = compile_term(state, scope, arg)?;
        last_exit = c.exit_block.clone().or(last_exit);
        let lt = lower_type(state, param_ty)?;
        if lt.is_void() {
            continue;
        }
        compiled_args.push((lt, c.value.render()));
    }

    let symbol = if sig.external {
        sig.name.clone()
    } else {
        state.mangle(&sig.name)
    };
    let mut compiled = emit_call_raw(state, &symbol, sig.external, compiled_args, &sig.ret)?;
    compiled.exit_block = last_exit;
    Ok(compiled)
}

/// Emit one call instruction for already-compiled arguments. Aggregate
/// arguments and returns are packed/unpacked per the active ABI strategy; a
/// unit-returning call emits no result register. External callees get a
/// `declare` line the first time they are referenced.
fn emit_call_raw(
    state: &mut GenState,
    symbol: &str,
    external: bool,
    args: Vec<(Lowered, String)>,
    ret: &TypeRef,
) -> Result<Compiled, Diagnostic> {
    let mut rendered: Vec<String> = Vec::with_capacity(args.len());
    let mut decl_params: Vec<String> = Vec::with_capacity(args.len());
    for (lt, value) in &args {
        let shape = lt.fields.as_ref().and_then(|f| state.abi.lowered_shape(f));
        match shape {
            Some(shape) => {
                let packed = abi::emit_pack(state, &shape, &lt.repr, value)?;
                rendered.push(format!("{} %r{}", shape.repr, packed));
                decl_params.push(shape.repr);
            }
            None => {
                rendered.push(format!("{} {}", lt.repr, value));
                decl_params.push(lt.repr.clone());
            }
        }
    }
    let ret_lt = lower_type(state, ret)?;
    let ret_shape = ret_lt
        .fields
        .as_ref()
        .and_then(|f| state.abi.lowered_shape(f));
    let call_ret = if ret_lt.is_void() {
        "void".to_string()
    } else {
        ret_shape
            .as_ref()
            .map(|s| s.repr.clone())
            .unwrap_or_else(|| ret_lt.repr.clone())
    };
    if external {
        let decl = format!("declare {} @{}({})", call_ret, symbol, decl_params.join(", "));
        state.ensure_extern_fn(symbol, decl);
    }
    if ret_lt.is_void() {
        state.push(format!("  call void @{}({})", symbol, rendered.join(", ")));
        return Ok(Compiled {
            value: Value::Imm(ConstValue::Unit),
            ty: "Unit".to_string(),
            exit_block: None,
        });
    }
    let reg = state.fresh_reg();
    state.push(format!(
        "  %r{} = call {} @{}({})",
        reg,
        call_ret,
        symbol,
        rendered.join(", ")
    ));
    let final_reg = match &ret_shape {
        Some(shape) => abi::emit_unpack(state, shape, &ret_lt.repr, &format!("%r{}", reg))?,
        None => reg,
    };
    Ok(Compiled {
        value: Value::Reg(final_reg),
        ty: ret.name().to_string(),
        exit_block: None,
    })
}

fn compile_select(
    state: &mut GenState,
    scope: &mut Scope,
    term: &Term,
    target: &Term,
    field: &str,
    field_index: u32,
    ty: &str,
) -> Result<Compiled, Diagnostic> {
    // A field read straight off a global struct goes through a pointer, so
    // it can carry the precise struct-field access tag.
    if let Term::Ref { name, ty: target_ty } = target
        && !scope.contains_key(name)
        && state.index.function(name).is_none()
    {
        let index = state.index;
        if let Some(Definition::Struct(sd)) =
            resolve_to_definition(index, &TypeRef::from_name(target_ty))?
        {
            let sd = sd.clone();
            if field_index as usize >= sd.fields.len() {
                return Err(Diagnostic::with_node(
                    format!(
                        "field '{}' (index {}) out of range for struct '{}'",
                        field, field_index, sd.name
                    ),
                    term,
                ));
            }
            let lt = lower_type_name(state, target_ty)?;
            let fields = struct_tbaa_fields(state, &sd)?;
            let tag = state.tbaa_field_access_tag(&sd.name, &fields, field_index as usize);
            let field_lt = lower_type(state, &sd.fields[field_index as usize].ty)?;
            let symbol = state.mangle(name);
            let ptr = state.fresh_reg();
            state.push(format!(
                "  %r{} = getelementptr inbounds {}, {}* @{}, i32 0, i32 {}",
                ptr, lt.repr, lt.repr, symbol, field_index
            ));
            let reg = state.fresh_reg();
            state.push(format!(
                "  %r{} = load {}, {}* %r{}, !tbaa !{}",
                reg, field_lt.repr, field_lt.repr, ptr, tag
            ));
            return Ok(Compiled {
                value: Value::Reg(reg),
                ty: ty.to_string(),
                exit_block: None,
            });
        }
    }

    let t = compile_term(state, scope, target)?;
    let lt = lower_type_name(state, &t.ty)?;
    if lt.fields.is_none() {
        return Err(Diagnostic::with_node(
            format!("field selection on non-struct type '{}'", t.ty),
            term,
        ));
    }
    let reg = state.fresh_reg();
    state.push(format!(
        "  %r{} = extractvalue {} {}, {}",
        reg,
        lt.repr,
        t.value.render(),
        field_index
    ));
    Ok(Compiled {
        value: Value::Reg(reg),
        ty: ty.to_string(),
        exit_block: t.exit_block,
    })
}
