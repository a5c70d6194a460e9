//! Shared builders for backend tests: a prelude index with a few user
//! definitions on top, and term constructors that keep test modules
//! readable.

#![allow(dead_code)]

use mml_ast::{
    Binding, BindingOrigin, Definition, Field, FunctionSig, Literal, Module, Param,
    ResolvableIndex, StructDef, Term, TypeRef,
};
use mmlc::codegen::{self, EntryPoint};

pub const AARCH64: &str = "arm64-apple-darwin";
pub const X86_64: &str = "x86_64-unknown-linux-gnu";

/// Prelude plus a `Point` struct, a `Meters -> Int` alias chain and a
/// user-defined `add` function.
pub fn demo_index() -> ResolvableIndex {
    let mut index = ResolvableIndex::with_prelude();
    index.register(Definition::Struct(StructDef {
        name: "Point".to_string(),
        fields: vec![
            Field {
                name: "x".to_string(),
                ty: TypeRef::Name("Int".to_string()),
            },
            Field {
                name: "y".to_string(),
                ty: TypeRef::Name("Int".to_string()),
            },
        ],
        native: false,
    }));
    index.register(Definition::Alias {
        name: "Meters".to_string(),
        target: TypeRef::Name("Int".to_string()),
    });
    index.register(Definition::Alias {
        name: "Distance".to_string(),
        target: TypeRef::Name("Meters".to_string()),
    });
    index.register(Definition::Function(FunctionSig {
        name: "add".to_string(),
        params: vec![
            TypeRef::Name("Int".to_string()),
            TypeRef::Name("Int".to_string()),
        ],
        ret: TypeRef::Name("Int".to_string()),
        external: false,
    }));
    index
}

pub fn int(v: i64) -> Term {
    Term::Lit(Literal::Int(v))
}

pub fn boolean(v: bool) -> Term {
    Term::Lit(Literal::Bool(v))
}

pub fn string(s: &str) -> Term {
    Term::Lit(Literal::Str(s.to_string()))
}

pub fn unit() -> Term {
    Term::Lit(Literal::Unit)
}

pub fn var(name: &str, ty: &str) -> Term {
    Term::Ref {
        name: name.to_string(),
        ty: ty.to_string(),
    }
}

pub fn bin(op: &str, lhs: Term, rhs: Term, ty: &str) -> Term {
    Term::BinOp {
        op: op.to_string(),
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        ty: ty.to_string(),
    }
}

pub fn un(op: &str, operand: Term, ty: &str) -> Term {
    Term::UnOp {
        op: op.to_string(),
        operand: Box::new(operand),
        ty: ty.to_string(),
    }
}

pub fn iff(cond: Term, then_term: Term, else_term: Term, ty: &str) -> Term {
    Term::If {
        cond: Box::new(cond),
        then_term: Box::new(then_term),
        else_term: Box::new(else_term),
        ty: ty.to_string(),
    }
}

pub fn let_in(name: &str, value: Term, body: Term, ty: &str) -> Term {
    Term::Let {
        name: name.to_string(),
        value: Box::new(value),
        body: Box::new(body),
        ty: ty.to_string(),
    }
}

pub fn select(target: Term, field: &str, index: u32, ty: &str) -> Term {
    Term::Select {
        target: Box::new(target),
        field: field.to_string(),
        index,
        ty: ty.to_string(),
    }
}

/// Build a curried application spine: `call("concat", [a, b], "String")`
/// becomes `Apply(Apply(concat, a), b)`.
pub fn call(name: &str, args: Vec<Term>, ty: &str) -> Term {
    let mut term = var(name, ty);
    for arg in args {
        term = Term::Apply {
            callee: Box::new(term),
            arg: Box::new(arg),
            ty: ty.to_string(),
        };
    }
    term
}

pub fn func(name: &str, params: &[(&str, &str)], ret: &str, body: Term) -> Binding {
    Binding {
        name: name.to_string(),
        origin: BindingOrigin::Function,
        params: params
            .iter()
            .map(|(n, t)| Param {
                name: n.to_string(),
                ty: TypeRef::from_name(t),
            })
            .collect(),
        ty: TypeRef::from_name(ret),
        body,
    }
}

pub fn global(name: &str, ty: &str, body: Term) -> Binding {
    Binding {
        name: name.to_string(),
        origin: BindingOrigin::Let,
        params: Vec::new(),
        ty: TypeRef::from_name(ty),
        body,
    }
}

pub fn module(name: &str, members: Vec<Binding>) -> Module {
    Module {
        name: name.to_string(),
        members,
    }
}

/// Emit a module with no entry point, panicking on diagnostics so tests
/// read linearly.
pub fn emit(module: &Module, index: &ResolvableIndex, triple: &str) -> String {
    codegen::emit_module(module, index, triple, None)
        .expect("emission should succeed")
        .ir
}

pub fn emit_exe(
    module: &Module,
    index: &ResolvableIndex,
    triple: &str,
    entry: &EntryPoint,
) -> String {
    codegen::emit_module(module, index, triple, Some(entry))
        .expect("emission should succeed")
        .ir
}

/// Count non-overlapping occurrences of `needle`.
pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
