// Literal handling: immediates, folding, the string-constant pool.
use super::common::*;

use mml_ast::ResolvableIndex;
use mmlc::codegen::GenState;
use mmlc::codegen::abi::{AbiLowering, TargetArch};

#[test]
fn string_pool_ids_are_shared_for_equal_contents_and_increase_otherwise() {
    let index = ResolvableIndex::with_prelude();
    let mut state = GenState::new("Demo", &index, AbiLowering::new(TargetArch::X86_64));
    let (a, len_a) = state.string_const("hello");
    let (b, _) = state.string_const("hello");
    assert_eq!(a, b);
    assert_eq!(a, "@.str.0");
    assert_eq!(len_a, 6);
    let (c, _) = state.string_const("world");
    assert_eq!(c, "@.str.1");
}

#[test]
fn literal_only_arithmetic_folds_to_a_direct_global() {
    // let x = 1 + 2 * 3;
    let m = module(
        "Demo",
        vec![global(
            "x",
            "Int",
            bin("+", int(1), bin("*", int(2), int(3), "Int"), "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("@demo_x = global i64 7"), "ir:\n{}", ir);
    assert!(!ir.contains("demo_x_init"));
    assert!(!ir.contains("llvm.global_ctors"));
}

#[test]
fn immediates_are_rendered_inline_not_materialized() {
    let m = module(
        "Demo",
        vec![func(
            "inc",
            &[("x", "Int")],
            "Int",
            bin("+", var("x", "Int"), int(1), "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    // The literal 1 appears as an operand, never via its own instruction.
    assert!(ir.contains("add i64 %x, 1"));
    assert_eq!(count(&ir, "%r0"), 2, "one def, one use:\n{}", ir);
}

#[test]
fn identical_string_contents_share_one_constant() {
    let body = let_in(
        "a",
        string("hi"),
        let_in(
            "b",
            string("hi"),
            let_in(
                "c",
                string("ho"),
                call("println", vec![var("a", "String")], "Unit"),
                "Unit",
            ),
            "Unit",
        ),
        "Unit",
    );
    let m = module("Demo", vec![func("greet", &[], "Unit", body)]);
    let ir = emit(&m, &demo_index(), X86_64);

    assert_eq!(
        count(&ir, "private unnamed_addr constant"),
        2,
        "two distinct contents, two constants:\n{}",
        ir
    );
    assert_eq!(count(&ir, "@.str.0 = "), 1);
    assert_eq!(count(&ir, "@.str.1 = "), 1);
    assert!(!ir.contains("@.str.2"));
    // Both "hi" literals reference the same constant.
    assert_eq!(count(&ir, "@.str.0,"), 2);
}

#[test]
fn unary_operators_fold_on_literals_and_lower_otherwise() {
    let m = module(
        "Demo",
        vec![
            global("neg", "Int", un("-", int(7), "Int")),
            func(
                "flip",
                &[("b", "Bool")],
                "Bool",
                un("!", var("b", "Bool"), "Bool"),
            ),
            func(
                "negate",
                &[("n", "Int")],
                "Int",
                un("-", var("n", "Int"), "Int"),
            ),
        ],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("@demo_neg = global i64 -7"));
    assert!(ir.contains("xor i1 %b, true"));
    assert!(ir.contains("sub i64 0, %n"));
}

#[test]
fn unit_returning_call_emits_no_result_register() {
    let m = module(
        "Demo",
        vec![func(
            "say",
            &[],
            "Unit",
            call("println", vec![string("yo")], "Unit"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(ir.contains("call void @println(%struct.String %r"));
    assert!(!ir.contains("= call void"));
    assert!(ir.contains("ret void"));
}

#[test]
fn string_literals_materialize_through_the_runtime_constructor() {
    let m = module(
        "Demo",
        vec![func(
            "say",
            &[],
            "Unit",
            call("print", vec![string("abc")], "Unit"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(ir.contains("[4 x i8] c\"abc\\00\""));
    assert!(ir.contains("declare %struct.String @mml_string_lit(i8*, i64)"));
    assert!(ir.contains("call %struct.String @mml_string_lit(i8* getelementptr inbounds"));
    assert!(ir.contains("i64 3)"));
}
