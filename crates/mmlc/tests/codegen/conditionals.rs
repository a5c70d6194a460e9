// Conditional lowering: block structure, joins, nested exits.
use super::common::*;

#[test]
fn if_expression_branches_and_joins_with_phi() {
    let m = module(
        "Demo",
        vec![func(
            "choose",
            &[("c", "Bool")],
            "Int",
            iff(var("c", "Bool"), int(1), int(2), "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("br i1 %c, label %if.then0, label %if.else0"));
    assert!(ir.contains("if.then0:"));
    assert!(ir.contains("if.else0:"));
    assert!(ir.contains("if.merge0:"));
    assert_eq!(count(&ir, "br label %if.merge0"), 2);
    assert!(
        ir.contains("%r0 = phi i64 [ 1, %if.then0 ], [ 2, %if.else0 ]"),
        "ir:\n{}",
        ir
    );
}

#[test]
fn nested_conditional_join_is_the_outer_predecessor() {
    let m = module(
        "Demo",
        vec![func(
            "pick",
            &[("a", "Bool"), ("b", "Bool")],
            "Int",
            iff(
                var("a", "Bool"),
                iff(var("b", "Bool"), int(1), int(2), "Int"),
                int(3),
                "Int",
            ),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    // The inner conditional's merge block is the predecessor the outer phi
    // lists for the then arm.
    assert!(ir.contains("%r0 = phi i64 [ 1, %if.then1 ], [ 2, %if.else1 ]"));
    assert!(
        ir.contains("%r1 = phi i64 [ %r0, %if.merge1 ], [ 3, %if.else0 ]"),
        "ir:\n{}",
        ir
    );
}

#[test]
fn unit_conditional_joins_without_phi() {
    let m = module(
        "Demo",
        vec![func(
            "maybe_print",
            &[("c", "Bool")],
            "Unit",
            iff(
                var("c", "Bool"),
                call("println", vec![string("yes")], "Unit"),
                unit(),
                "Unit",
            ),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("if.merge0:"));
    assert!(!ir.contains("phi"));
    assert!(ir.contains("ret void"));
}

#[test]
fn comparison_operators_lower_to_icmp_and_produce_bool() {
    let m = module(
        "Demo",
        vec![func(
            "max",
            &[("a", "Int"), ("b", "Int")],
            "Int",
            iff(
                bin("<", var("a", "Int"), var("b", "Int"), "Bool"),
                var("b", "Int"),
                var("a", "Int"),
                "Int",
            ),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("%r0 = icmp slt i64 %a, %b"));
    assert!(ir.contains("br i1 %r0, label %if.then0, label %if.else0"));
    assert!(ir.contains("%r1 = phi i64 [ %b, %if.then0 ], [ %a, %if.else0 ]"));
}

#[test]
fn logical_operators_stay_in_i1() {
    let m = module(
        "Demo",
        vec![func(
            "both",
            &[("a", "Bool"), ("b", "Bool")],
            "Bool",
            bin("&&", var("a", "Bool"), var("b", "Bool"), "Bool"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("define i1 @demo_both(i1 %a, i1 %b)"));
    assert!(ir.contains("%r0 = and i1 %a, %b"));
    assert!(ir.contains("ret i1 %r0"));
}
