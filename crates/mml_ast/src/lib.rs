//! MML typed-tree definitions.
//!
//! This crate defines the fully resolved, typed program tree the front-end
//! phases (parsing, name resolution, type checking, ownership analysis) hand
//! to the native backend, together with the resolvable index that maps stable
//! symbol ids to type and function definitions. The backend never re-derives
//! types or ownership; everything it needs is in these structures.
//!
//! Trees are plain data with serde derives so a resolved program can be read
//! from a `.mmlt` file produced by the front end.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identifier into the [`ResolvableIndex`], allocated upstream.
pub type SymbolId = u32;

/// A reference to a type, either the built-in unit type or a named
/// definition resolved through the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Unit,
    Name(String),
}

impl TypeRef {
    /// Build a reference from a source-level type name. `Unit` is the only
    /// name that is not index-resolved.
    pub fn from_name(name: &str) -> TypeRef {
        if name == "Unit" {
            TypeRef::Unit
        } else {
            TypeRef::Name(name.to_string())
        }
    }

    /// Source-level display name.
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Unit => "Unit",
            TypeRef::Name(n) => n,
        }
    }
}

/// Target representation of a native type annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeRepr {
    /// A scalar with a fixed target representation, e.g. `i64` or `double`.
    Scalar(String),
    /// A pointer to the given pointee representation, e.g. `i8`.
    Pointer(String),
}

/// One field of a struct definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

/// A struct definition, either declared in MML source or describing a
/// native runtime aggregate such as `String`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub native: bool,
}

/// A function signature known to the resolver. Parameters are listed in
/// application order even when the source syntax is curried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
    /// External functions live in the runtime support unit and are linked
    /// by their unmangled name.
    pub external: bool,
}

/// A definition stored in the resolvable index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Definition {
    /// `type Meters = Int` — a transparent alias to another type.
    Alias { name: String, target: TypeRef },
    /// A type with a fixed target representation.
    Native { name: String, repr: NativeRepr },
    Struct(StructDef),
    Function(FunctionSig),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Alias { name, .. } => name,
            Definition::Native { name, .. } => name,
            Definition::Struct(s) => &s.name,
            Definition::Function(f) => &f.name,
        }
    }
}

/// Arena of definitions keyed by stable symbol id, with a name lookup side
/// table. Cross-references between definitions go through ids or names, so
/// mutually recursive types cannot form an unbreakable reference cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvableIndex {
    defs: HashMap<SymbolId, Definition>,
    by_name: HashMap<String, SymbolId>,
    next_id: SymbolId,
}

impl ResolvableIndex {
    pub fn new() -> ResolvableIndex {
        ResolvableIndex::default()
    }

    /// An index pre-populated with the built-in scalar types and the
    /// runtime support functions every MML program may reference.
    pub fn with_prelude() -> ResolvableIndex {
        let mut index = ResolvableIndex::new();
        index.register(Definition::Native {
            name: "Int".to_string(),
            repr: NativeRepr::Scalar("i64".to_string()),
        });
        index.register(Definition::Native {
            name: "Float".to_string(),
            repr: NativeRepr::Scalar("double".to_string()),
        });
        index.register(Definition::Native {
            name: "Bool".to_string(),
            repr: NativeRepr::Scalar("i1".to_string()),
        });
        index.register(Definition::Native {
            name: "CharPtr".to_string(),
            repr: NativeRepr::Pointer("i8".to_string()),
        });
        index.register(Definition::Struct(StructDef {
            name: "String".to_string(),
            fields: vec![
                Field {
                    name: "length".to_string(),
                    ty: TypeRef::Name("Int".to_string()),
                },
                Field {
                    name: "data".to_string(),
                    ty: TypeRef::Name("CharPtr".to_string()),
                },
            ],
            native: true,
        }));
        for (name, params, ret) in [
            ("print", vec!["String"], TypeRef::Unit),
            ("println", vec!["String"], TypeRef::Unit),
            ("print_int", vec!["Int"], TypeRef::Unit),
            ("concat", vec!["String", "String"], TypeRef::Name("String".to_string())),
            ("string_len", vec!["String"], TypeRef::Name("Int".to_string())),
            ("to_string", vec!["Int"], TypeRef::Name("String".to_string())),
        ] {
            index.register(Definition::Function(FunctionSig {
                name: name.to_string(),
                params: params.into_iter().map(TypeRef::from_name).collect(),
                ret,
                external: true,
            }));
        }
        index
    }

    /// Insert a definition, allocating the next stable id.
    pub fn register(&mut self, def: Definition) -> SymbolId {
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(def.name().to_string(), id);
        self.defs.insert(id, def);
        id
    }

    pub fn lookup(&self, id: SymbolId) -> Option<&Definition> {
        self.defs.get(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> Option<&Definition> {
        self.id_of(name).and_then(|id| self.lookup(id))
    }

    /// Look up a function signature by source name.
    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        match self.resolve(name) {
            Some(Definition::Function(sig)) => Some(sig),
            _ => None,
        }
    }
}

/// Literal values as they appear in the typed tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
}

impl Literal {
    /// Source-level type name of the literal.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "Int",
            Literal::Float(_) => "Float",
            Literal::Bool(_) => "Bool",
            Literal::Str(_) => "String",
            Literal::Unit => "Unit",
        }
    }
}

/// A typed term. Every variant carries the source-level name of its type;
/// the checker upstream guarantees the annotations are consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Lit(Literal),
    /// A reference to a parameter, a local `let`, a top-level binding or a
    /// function.
    Ref { name: String, ty: String },
    /// Built-in binary operator application, e.g. `+` or `<=`.
    BinOp {
        op: String,
        lhs: Box<Term>,
        rhs: Box<Term>,
        ty: String,
    },
    /// Built-in unary operator application: `-` (negation) or `!` (not).
    UnOp {
        op: String,
        operand: Box<Term>,
        ty: String,
    },
    /// Single-argument application; curried calls nest these.
    Apply {
        callee: Box<Term>,
        arg: Box<Term>,
        ty: String,
    },
    If {
        cond: Box<Term>,
        then_term: Box<Term>,
        else_term: Box<Term>,
        ty: String,
    },
    /// Local binding scoped to `body`.
    Let {
        name: String,
        value: Box<Term>,
        body: Box<Term>,
        ty: String,
    },
    /// Struct field read by positional index.
    Select {
        target: Box<Term>,
        field: String,
        index: u32,
        ty: String,
    },
}

impl Term {
    /// Source-level type name of the term.
    pub fn ty(&self) -> &str {
        match self {
            Term::Lit(l) => l.type_name(),
            Term::Ref { ty, .. }
            | Term::BinOp { ty, .. }
            | Term::UnOp { ty, .. }
            | Term::Apply { ty, .. }
            | Term::If { ty, .. }
            | Term::Let { ty, .. }
            | Term::Select { ty, .. } => ty,
        }
    }
}

/// Whether a top-level binding came from a `let` or a function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingOrigin {
    Let,
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

/// A top-level binding. Function-origin bindings may take parameters; a
/// zero-parameter function binding is an ordinary function of no arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub origin: BindingOrigin,
    pub params: Vec<Param>,
    /// Declared type: the value type for lets, the return type for functions.
    pub ty: TypeRef,
    pub body: Term,
}

/// One MML module, fully typed and resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub members: Vec<Binding>,
}

/// The complete backend input: a module plus the index its references
/// resolve through. This is the on-disk `.mmlt` contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub module: Module,
    pub index: ResolvableIndex,
}
