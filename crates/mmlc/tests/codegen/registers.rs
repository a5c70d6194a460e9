// Virtual-register allocation over straight-line code.
use super::common::*;

#[test]
fn straight_line_ops_use_dense_registers_in_program_order() {
    let body = bin(
        "/",
        bin(
            "-",
            bin(
                "*",
                bin("+", var("x", "Int"), int(1), "Int"),
                int(2),
                "Int",
            ),
            int(3),
            "Int",
        ),
        int(4),
        "Int",
    );
    let m = module("Demo", vec![func("calc", &[("x", "Int")], "Int", body)]);
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("%r0 = add i64 %x, 1"), "ir:\n{}", ir);
    assert!(ir.contains("%r1 = mul i64 %r0, 2"), "ir:\n{}", ir);
    assert!(ir.contains("%r2 = sub i64 %r1, 3"), "ir:\n{}", ir);
    assert!(ir.contains("%r3 = sdiv i64 %r2, 4"), "ir:\n{}", ir);
    assert!(!ir.contains("%r4"), "no extra register expected:\n{}", ir);
    assert!(ir.contains("ret i64 %r3"));
}

#[test]
fn function_signature_and_entry_block_shape() {
    let m = module(
        "Demo",
        vec![func(
            "add2",
            &[("a", "Int"), ("b", "Int")],
            "Int",
            bin("+", var("a", "Int"), var("b", "Int"), "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);

    assert!(ir.contains("define i64 @demo_add2(i64 %a, i64 %b) {"));
    assert!(ir.contains("entry:"));
    assert!(ir.contains("%r0 = add i64 %a, %b"));
    assert!(ir.contains("ret i64 %r0"));
}

#[test]
fn module_header_names_module_and_triple() {
    let m = module("Demo", vec![]);
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(ir.contains("; ModuleID = 'Demo'"));
    assert!(ir.contains(&format!("target triple = \"{}\"", X86_64)));
}
