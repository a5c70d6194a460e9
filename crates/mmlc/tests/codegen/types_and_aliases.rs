// Type lowering: alias chains, cycles, pointers, struct definitions,
// field selection.
use super::common::*;

use mml_ast::{Definition, Field, ResolvableIndex, StructDef, TypeRef};

#[test]
fn alias_chains_resolve_to_the_underlying_representation() {
    // Distance -> Meters -> Int -> i64
    let m = module("Demo", vec![global("d", "Distance", int(5))]);
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(ir.contains("@demo_d = global i64 5"));
}

#[test]
fn alias_cycles_fail_with_a_descriptive_error() {
    let _guard = mmlc::diagnostics::suppress();
    let mut index = ResolvableIndex::with_prelude();
    index.register(Definition::Alias {
        name: "A".to_string(),
        target: TypeRef::Name("B".to_string()),
    });
    index.register(Definition::Alias {
        name: "B".to_string(),
        target: TypeRef::Name("A".to_string()),
    });
    let m = module("Demo", vec![global("x", "A", int(1))]);
    let err = mmlc::codegen::emit_module(&m, &index, X86_64, None)
        .expect_err("cycle must not resolve");
    assert!(
        err.message.contains("type alias cycle detected"),
        "{}",
        err.message
    );
}

#[test]
fn unresolved_type_references_name_the_offender() {
    let _guard = mmlc::diagnostics::suppress();
    let m = module("Demo", vec![global("x", "Bogus", int(1))]);
    let err = mmlc::codegen::emit_module(&m, &demo_index(), X86_64, None)
        .expect_err("unresolved type must fail");
    assert!(
        err.message.contains("unresolved type reference 'Bogus'"),
        "{}",
        err.message
    );
}

#[test]
fn native_pointers_lower_with_a_pointer_suffix() {
    let m = module(
        "Demo",
        vec![func("id", &[("p", "CharPtr")], "CharPtr", var("p", "CharPtr"))],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(ir.contains("define i8* @demo_id(i8* %p)"));
    assert!(ir.contains("ret i8* %p"));
}

#[test]
fn struct_definitions_are_emitted_once() {
    let m = module(
        "Demo",
        vec![func(
            "both",
            &[("a", "String"), ("b", "String")],
            "Int",
            call("string_len", vec![var("a", "String")], "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    assert_eq!(count(&ir, "%struct.String = type { i64, i8* }"), 1);
}

#[test]
fn struct_with_unresolvable_field_fails_atomically() {
    let _guard = mmlc::diagnostics::suppress();
    let mut index = ResolvableIndex::with_prelude();
    index.register(Definition::Struct(StructDef {
        name: "Broken".to_string(),
        fields: vec![Field {
            name: "f".to_string(),
            ty: TypeRef::Name("Bogus".to_string()),
        }],
        native: false,
    }));
    let m = module(
        "Demo",
        vec![func("use_broken", &[("b", "Broken")], "Int", int(0))],
    );
    let err = mmlc::codegen::emit_module(&m, &index, X86_64, None)
        .expect_err("struct with a bad field must fail");
    assert!(err.message.contains("Broken"), "{}", err.message);
}

#[test]
fn field_selection_on_a_value_uses_extractvalue() {
    let m = module(
        "Demo",
        vec![func(
            "first",
            &[("p", "Point")],
            "Int",
            select(var("p", "Point"), "x", 0, "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(ir.contains("%struct.Point = type { i64, i64 }"));
    assert!(ir.contains("%r0 = extractvalue %struct.Point %p, 0"));
}

#[test]
fn field_selection_on_a_global_loads_through_a_field_access_tag() {
    let m = module(
        "Demo",
        vec![
            global("origin", "Point", call("mk_point", vec![int(0), int(0)], "Point")),
            func(
                "oy",
                &[],
                "Int",
                select(var("origin", "Point"), "y", 1, "Int"),
            ),
        ],
    );
    let mut index = demo_index();
    index.register(mml_ast::Definition::Function(mml_ast::FunctionSig {
        name: "mk_point".to_string(),
        params: vec![TypeRef::Name("Int".to_string()), TypeRef::Name("Int".to_string())],
        ret: TypeRef::Name("Point".to_string()),
        external: true,
    }));
    let ir = emit(&m, &index, X86_64);

    assert!(ir.contains(
        "getelementptr inbounds %struct.Point, %struct.Point* @demo_origin, i32 0, i32 1"
    ));
    // Field access tag: (struct node, field scalar node, offset 8).
    assert!(ir.contains("i64 8}"), "struct field tag present:\n{}", ir);
    assert!(ir.contains(", !tbaa !"), "load carries a tag:\n{}", ir);
}

#[test]
fn selection_through_a_non_struct_is_rejected() {
    let _guard = mmlc::diagnostics::suppress();
    let m = module(
        "Demo",
        vec![func(
            "bad",
            &[("n", "Int")],
            "Int",
            select(var("n", "Int"), "x", 0, "Int"),
        )],
    );
    let err = mmlc::codegen::emit_module(&m, &demo_index(), X86_64, None)
        .expect_err("selection on a scalar must fail");
    assert!(
        err.message.contains("field selection on non-struct type 'Int'"),
        "{}",
        err.message
    );
}
