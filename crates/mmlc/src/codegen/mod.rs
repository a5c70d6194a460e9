//! Textual LLVM IR emission for one MML module.
//!
//! A [`GenState`] is created per module compile and threaded through every
//! lowering step. It owns the virtual-register counter, the accumulated
//! output, the string-constant pool, the deduplicated type/extern
//! registries and the optimizer-metadata sub-states. The state is
//! append-only: operations allocate ids and push lines, and nothing emitted
//! is ever rewritten — the only exception is the explicit mark/rollback pair
//! used to discard an exploratory compile of a top-level initializer.

use std::collections::{HashMap, HashSet};

use mml_ast::{Binding, BindingOrigin, Module, ResolvableIndex};

use crate::diagnostics::Diagnostic;

pub mod abi;
pub mod const_eval;
pub mod expr;
pub mod metadata;
pub mod types;

use abi::AbiLowering;
use const_eval::ConstValue;
use expr::{Scope, ScopeEntry, Value};
use metadata::{AliasScopeState, TbaaState};
use types::lower_type;

/// Entry-point description produced by the validator and consumed when the
/// host `main` wrapper is synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Mangled symbol, e.g. `demo_main`.
    pub symbol: String,
    /// Lowered return representation; `None` means the unit type.
    pub ret_repr: Option<String>,
}

/// Finished module output: the rendered IR plus any non-fatal warnings
/// accumulated during emission.
#[derive(Debug, Clone)]
pub struct EmittedModule {
    pub ir: String,
    pub warnings: Vec<String>,
}

/// Snapshot of the rewindable parts of a [`GenState`].
#[derive(Debug, Clone, Copy)]
pub struct StateMark {
    lines: usize,
    next_reg: u32,
    next_label: u32,
}

/// Generation state for one module compile. Never shared across compiles.
pub struct GenState<'a> {
    pub(crate) module_name: String,
    mangle_prefix: String,
    pub(crate) index: &'a ResolvableIndex,
    pub(crate) abi: AbiLowering,
    next_reg: u32,
    next_label: u32,
    header: Option<Vec<String>>,
    lines: Vec<String>,
    init_funcs: Vec<String>,
    string_consts: HashMap<String, String>,
    string_defs: Vec<String>,
    named_types: HashSet<String>,
    pub(crate) structs_in_progress: HashSet<String>,
    type_defs: Vec<String>,
    extern_decls: HashSet<String>,
    extern_defs: Vec<String>,
    warnings: Vec<String>,
    pub(crate) md_next: u32,
    pub(crate) tbaa: TbaaState,
    pub(crate) alias: AliasScopeState,
}

impl<'a> GenState<'a> {
    pub fn new(module_name: &str, index: &'a ResolvableIndex, abi: AbiLowering) -> GenState<'a> {
        GenState {
            module_name: module_name.to_string(),
            mangle_prefix: module_name.to_lowercase(),
            index,
            abi,
            next_reg: 0,
            next_label: 0,
            header: None,
            lines: Vec::new(),
            init_funcs: Vec::new(),
            string_consts: HashMap::new(),
            string_defs: Vec::new(),
            named_types: HashSet::new(),
            structs_in_progress: HashSet::new(),
            type_defs: Vec::new(),
            extern_decls: HashSet::new(),
            extern_defs: Vec::new(),
            warnings: Vec::new(),
            md_next: 0,
            tbaa: TbaaState::default(),
            alias: AliasScopeState::default(),
        }
    }

    /// Module-level symbol mangling: `<lowercased module>_<name>`.
    pub(crate) fn mangle(&self, name: &str) -> String {
        format!("{}_{}", self.mangle_prefix, name)
    }

    /// Set the module header. The header can be set once; further calls are
    /// recorded as a warning and ignored.
    pub fn set_header(&mut self, triple: &str) {
        if self.header.is_some() {
            self.warn("module header already set; ignoring second header");
            return;
        }
        self.header = Some(vec![
            format!("; ModuleID = '{}'", self.module_name),
            format!("; Target:   {}", triple),
            format!("source_filename = \"{}\"", self.module_name),
            format!("target triple = \"{}\"", triple),
        ]);
    }

    pub(crate) fn fresh_reg(&mut self) -> u32 {
        let r = self.next_reg;
        self.next_reg += 1;
        r
    }

    /// One id per branching construct; the then/else/merge labels share it.
    pub(crate) fn fresh_label_id(&mut self) -> u32 {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    pub(crate) fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Snapshot the output position so an exploratory compile can be
    /// discarded with [`GenState::rollback`].
    pub(crate) fn mark(&self) -> StateMark {
        StateMark {
            lines: self.lines.len(),
            next_reg: self.next_reg,
            next_label: self.next_label,
        }
    }

    /// Discard everything emitted since `mark`. Metadata and constant-pool
    /// entries survive; they are memoized and re-used by the next compile.
    pub(crate) fn rollback(&mut self, mark: StateMark) {
        self.lines.truncate(mark.lines);
        self.next_reg = mark.next_reg;
        self.next_label = mark.next_label;
    }

    /// Intern a string constant. Identical contents share one global; the
    /// returned length includes the trailing NUL.
    pub fn string_const(&mut self, content: &str) -> (String, usize) {
        let len = content.len() + 1;
        if let Some(name) = self.string_consts.get(content) {
            return (name.clone(), len);
        }
        let name = format!("@.str.{}", self.string_consts.len());
        self.string_defs.push(format!(
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            name,
            len,
            escape_string(content)
        ));
        self.string_consts.insert(content.to_string(), name.clone());
        (name, len)
    }

    /// Emit a named aggregate definition once.
    pub(crate) fn ensure_named_type(&mut self, name: &str, body: &str) {
        if self.named_types.insert(name.to_string()) {
            self.type_defs
                .push(format!("%struct.{} = type {{ {} }}", name, body));
        }
    }

    /// Emit an external function declaration once, keyed by symbol.
    pub(crate) fn ensure_extern_fn(&mut self, symbol: &str, decl: String) {
        if self.extern_decls.insert(symbol.to_string()) {
            self.extern_defs.push(decl);
        }
    }

    /// Total number of emitted metadata lines, TBAA and alias-scope both.
    pub fn metadata_lines(&self) -> usize {
        self.tbaa.lines.len() + self.alias.lines.len()
    }

    /// Render the accumulated state to the final module text.
    pub fn render(self) -> EmittedModule {
        let mut out: Vec<String> = Vec::new();
        match self.header {
            Some(lines) => out.extend(lines),
            None => out.push(format!("; ModuleID = '{}'", self.module_name)),
        }
        out.push(String::new());
        for section in [&self.string_defs, &self.type_defs, &self.extern_defs] {
            if !section.is_empty() {
                out.extend(section.iter().cloned());
                out.push(String::new());
            }
        }
        out.extend(self.lines);
        if !self.init_funcs.is_empty() {
            let entries: Vec<String> = self
                .init_funcs
                .iter()
                .map(|f| format!("{{ i32 65535, void ()* @{}, i8* null }}", f))
                .collect();
            out.push(format!(
                "@llvm.global_ctors = appending global [{} x {{ i32, void ()*, i8* }}] [{}]",
                entries.len(),
                entries.join(", ")
            ));
            out.push(String::new());
        }
        if self.tbaa.lines.is_empty() && self.alias.lines.is_empty() {
            // no metadata tail
        } else {
            out.extend(self.tbaa.lines);
            out.extend(self.alias.lines);
            out.push(String::new());
        }
        while out.last().is_some_and(|l| l.is_empty()) {
            out.pop();
        }
        let mut ir = out.join("\n");
        ir.push('\n');
        EmittedModule {
            ir,
            warnings: self.warnings,
        }
    }
}

/// Escape a string for a `c"..."` constant: printable ASCII stays, `"` and
/// `\` and everything else become `\XX` hex escapes.
fn escape_string(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for byte in content.bytes() {
        match byte {
            b'"' | b'\\' => out.push_str(&format!("\\{:02X}", byte)),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{:02X}", byte)),
        }
    }
    out
}

/// Lower a whole module to textual IR. `entry` is the validated entry point
/// when producing an executable; a host `main` wrapper is synthesized for it
/// so no external shim object is needed.
pub fn emit_module(
    module: &Module,
    index: &ResolvableIndex,
    triple: &str,
    entry: Option<&EntryPoint>,
) -> Result<EmittedModule, Diagnostic> {
    let arch = abi::TargetArch::from_triple(triple);
    let mut state = GenState::new(&module.name, index, AbiLowering::new(arch));
    if arch == abi::TargetArch::Other {
        state.warn(format!(
            "no ABI lowering rules for target '{}'; aggregates pass in their natural form",
            triple
        ));
    }
    state.set_header(triple);

    for binding in &module.members {
        match binding.origin {
            BindingOrigin::Function => emit_function(&mut state, binding)
                .map_err(|d| d.in_module(&module.name))?,
            BindingOrigin::Let => {
                emit_global(&mut state, binding).map_err(|d| d.in_module(&module.name))?
            }
        }
    }

    if let Some(entry) = entry {
        emit_host_main(&mut state, entry);
    }

    Ok(state.render())
}

/// Emit one function definition: a `define` line, an `entry:` block, the
/// lowered body, a single return.
fn emit_function(state: &mut GenState, binding: &Binding) -> Result<(), Diagnostic> {
    let ret_lt = lower_type(state, &binding.ty)?;
    let ret_shape = ret_lt
        .fields
        .as_ref()
        .and_then(|f| state.abi.lowered_shape(f));
    let symbol = state.mangle(&binding.name);

    // Build the parameter list first; ABI-packed aggregates arrive as the
    // packed shape and are unpacked at the top of the entry block.
    let mut scope = Scope::new();
    let mut sig_parts: Vec<String> = Vec::new();
    let mut pending_unpacks: Vec<(abi::PackedShape, String, String, String)> = Vec::new();
    for param in &binding.params {
        let lt = lower_type(state, &param.ty)?;
        if lt.is_void() {
            scope.insert(
                param.name.clone(),
                ScopeEntry {
                    value: Value::Imm(ConstValue::Unit),
                    ty: "Unit".to_string(),
                },
            );
            continue;
        }
        let shape = lt.fields.as_ref().and_then(|f| state.abi.lowered_shape(f));
        match shape {
            Some(shape) => {
                let coerce = format!("{}.coerce", param.name);
                sig_parts.push(format!("{} %{}", shape.repr, coerce));
                pending_unpacks.push((
                    shape,
                    lt.repr.clone(),
                    coerce,
                    param.name.clone(),
                ));
            }
            None => {
                sig_parts.push(format!("{} %{}", lt.repr, param.name));
                scope.insert(
                    param.name.clone(),
                    ScopeEntry {
                        value: Value::Named(param.name.clone()),
                        ty: param.ty.name().to_string(),
                    },
                );
            }
        }
    }

    let ret_render = if ret_lt.is_void() {
        "void".to_string()
    } else {
        ret_shape
            .as_ref()
            .map(|s| s.repr.clone())
            .unwrap_or_else(|| ret_lt.repr.clone())
    };
    state.push(format!(
        "define {} @{}({}) {{",
        ret_render,
        symbol,
        sig_parts.join(", ")
    ));
    state.push("entry:");

    for (shape, agg_repr, coerce, name) in pending_unpacks {
        let param_ty = binding
            .params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.ty.name().to_string())
            .unwrap_or_default();
        let reg = abi::emit_unpack(state, &shape, &agg_repr, &format!("%{}", coerce))?;
        scope.insert(
            name,
            ScopeEntry {
                value: Value::Reg(reg),
                ty: param_ty,
            },
        );
    }

    let body = expr::compile_term(state, &mut scope, &binding.body)?;

    if ret_lt.is_void() {
        state.push("  ret void");
    } else if let Some(shape) = &ret_shape {
        let packed = abi::emit_pack(state, shape, &ret_lt.repr, &body.value.render())?;
        state.push(format!("  ret {} %r{}", shape.repr, packed));
    } else {
        state.push(format!("  ret {} {}", ret_lt.repr, body.value.render()));
    }
    state.push("}");
    state.push("");
    Ok(())
}

/// Emit a top-level `let`. A literal-reducing initializer becomes a direct
/// global; anything else gets a zero placeholder plus a private initializer
/// function registered for the constructor table. The first compile of the
/// initializer is exploratory and is rolled back, so the value is computed
/// exactly once, inside the initializer.
fn emit_global(state: &mut GenState, binding: &Binding) -> Result<(), Diagnostic> {
    if !binding.params.is_empty() {
        return Err(Diagnostic::with_node(
            format!("let binding '{}' cannot take parameters", binding.name),
            &binding.params,
        ));
    }
    let lt = lower_type(state, &binding.ty)?;
    if lt.is_void() {
        state.warn(format!(
            "binding '{}' has the unit type; no storage emitted",
            binding.name
        ));
        return Ok(());
    }
    let symbol = state.mangle(&binding.name);

    let mark = state.mark();
    let mut probe_scope = Scope::new();
    let probe = expr::compile_term(state, &mut probe_scope, &binding.body)?;
    if let Value::Imm(cv) = &probe.value {
        if let ConstValue::Int(_) | ConstValue::Float(_) | ConstValue::Bool(_) = cv {
            let rendered = cv.render();
            state.rollback(mark);
            state.push(format!("@{} = global {} {}", symbol, lt.repr, rendered));
            state.push("");
            return Ok(());
        }
    }
    state.rollback(mark);

    let zero = if lt.fields.is_some() {
        "zeroinitializer"
    } else if lt.repr.ends_with('*') {
        "null"
    } else if lt.repr == "double" || lt.repr == "float" {
        "0x0000000000000000"
    } else {
        "0"
    };
    state.push(format!("@{} = global {} {}", symbol, lt.repr, zero));

    let init_name = format!("{}_init", symbol);
    state.push(format!("define internal void @{}() {{", init_name));
    state.push("entry:");
    let mut scope = Scope::new();
    let value = expr::compile_term(state, &mut scope, &binding.body)?;
    let tag = expr::access_tag_for(state, binding.ty.name())?;
    let anno = tag.map(|t| format!(", !tbaa !{}", t)).unwrap_or_default();
    state.push(format!(
        "  store {} {}, {}* @{}{}",
        lt.repr,
        value.value.render(),
        lt.repr,
        symbol,
        anno
    ));
    state.push("  ret void");
    state.push("}");
    state.push("");
    state.init_funcs.push(init_name);
    Ok(())
}

/// Synthesize the host `main` that calls the mangled entry point, so the
/// produced executable needs no shim object from the runtime.
fn emit_host_main(state: &mut GenState, entry: &EntryPoint) {
    state.push("define i32 @main() {");
    state.push("entry:");
    match &entry.ret_repr {
        None => {
            state.push(format!("  call void @{}()", entry.symbol));
            state.push("  ret i32 0");
        }
        Some(repr) if repr == "i32" => {
            let r = state.fresh_reg();
            state.push(format!("  %r{} = call i32 @{}()", r, entry.symbol));
            state.push(format!("  ret i32 %r{}", r));
        }
        Some(repr) => {
            let r = state.fresh_reg();
            state.push(format!("  %r{} = call {} @{}()", r, repr, entry.symbol));
            let t = state.fresh_reg();
            state.push(format!("  %r{} = trunc {} %r{} to i32", t, repr, r));
            state.push(format!("  ret i32 %r{}", t));
        }
    }
    state.push("}");
    state.push("");
}
