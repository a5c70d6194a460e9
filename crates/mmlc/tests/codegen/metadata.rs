// TBAA and alias-scope metadata: dense ids, memoization, on-demand
// no-alias sets.
use super::common::*;

use mml_ast::ResolvableIndex;
use mmlc::codegen::GenState;
use mmlc::codegen::abi::{AbiLowering, TargetArch};

fn fresh_state(index: &ResolvableIndex) -> GenState<'_> {
    GenState::new("Demo", index, AbiLowering::new(TargetArch::X86_64))
}

#[test]
fn module_header_is_one_time_settable() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    state.set_header(X86_64);
    state.set_header(AARCH64);
    assert_eq!(state.warnings().len(), 1);
    assert!(state.warnings()[0].contains("header already set"));

    let ir = state.render().ir;
    assert!(ir.contains(&format!("target triple = \"{}\"", X86_64)));
    assert!(!ir.contains(AARCH64));
}

#[test]
fn metadata_ids_are_dense_from_zero() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    assert_eq!(state.tbaa_root(), 0);
    assert_eq!(state.tbaa_scalar("Int"), 1);
    assert_eq!(state.tbaa_access_tag("Int"), 2);
    assert_eq!(state.alias_domain(), 3);
    assert_eq!(state.alias_scope("String"), 4);
}

#[test]
fn repeated_access_tag_requests_do_not_grow_the_output() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    let first = state.tbaa_access_tag("Int");
    let lines = state.metadata_lines();
    let second = state.tbaa_access_tag("Int");
    assert_eq!(first, second);
    assert_eq!(state.metadata_lines(), lines);
}

#[test]
fn scalar_nodes_are_memoized_by_name() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    let a = state.tbaa_scalar("Int");
    let b = state.tbaa_scalar("Bool");
    assert_ne!(a, b);
    assert_eq!(state.tbaa_scalar("Int"), a);
}

#[test]
fn struct_nodes_list_field_nodes_with_offsets() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    let fields = vec![("Int".to_string(), 0), ("CharPtr".to_string(), 8)];
    let id = state.tbaa_struct("String", &fields);
    let again = state.tbaa_struct("String", &fields);
    assert_eq!(id, again);

    let ir = state.render().ir;
    assert!(ir.contains("!0 = !{!\"mml tbaa root\"}"));
    assert!(ir.contains("!1 = !{!\"Int\", !0, i64 0}"));
    assert!(ir.contains("!2 = !{!\"CharPtr\", !0, i64 0}"));
    assert!(ir.contains("!3 = !{!\"String\", !1, i64 0, !2, i64 8}"));
}

#[test]
fn field_access_tags_are_memoized_by_struct_and_index() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    let fields = vec![("Int".to_string(), 0), ("CharPtr".to_string(), 8)];
    let tag = state.tbaa_field_access_tag("String", &fields, 1);
    let lines = state.metadata_lines();
    assert_eq!(state.tbaa_field_access_tag("String", &fields, 1), tag);
    assert_eq!(state.metadata_lines(), lines);
    assert_ne!(state.tbaa_field_access_tag("String", &fields, 0), tag);
}

#[test]
fn one_domain_per_module_and_scopes_nest_under_it() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    let domain = state.alias_domain();
    let s1 = state.alias_scope("String");
    let s2 = state.alias_scope("Point");
    assert_eq!(state.alias_domain(), domain);
    assert_eq!(state.alias_scope("String"), s1);

    let ir = state.render().ir;
    assert!(ir.contains(&format!(
        "!{} = distinct !{{!{}, !\"Demo alias domain\"}}",
        domain, domain
    )));
    assert!(ir.contains(&format!("!{} = distinct !{{!{}, !{}, !\"String\"}}", s1, s1, domain)));
    assert!(ir.contains(&format!("!{} = distinct !{{!{}, !{}, !\"Point\"}}", s2, s2, domain)));
}

#[test]
fn noalias_set_lists_every_other_scope_in_id_order() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    let s1 = state.alias_scope("String");
    let s2 = state.alias_scope("Point");
    let s3 = state.alias_scope("Pair");

    let set = state.noalias_set("Point").expect("two other scopes");
    let ir_lines = state.metadata_lines();
    // Uncached: a second request emits a fresh node.
    let set2 = state.noalias_set("Point").expect("still two other scopes");
    assert_ne!(set, set2);
    assert!(state.metadata_lines() > ir_lines);

    let ir = state.render().ir;
    assert!(
        ir.contains(&format!("!{} = !{{!{}, !{}}}", set, s1, s3)),
        "ordered by id:\n{}",
        ir
    );
    let _ = s2;
}

#[test]
fn noalias_set_is_empty_with_a_single_scope() {
    let index = demo_index();
    let mut state = fresh_state(&index);
    state.alias_scope("String");
    assert!(state.noalias_set("String").is_none());
}

#[test]
fn metadata_sections_are_omitted_when_empty() {
    let m = module(
        "Demo",
        vec![func(
            "id",
            &[("n", "Int")],
            "Int",
            var("n", "Int"),
        )],
    );
    let ir = emit(&m, &demo_index(), X86_64);
    assert!(!ir.contains("!0"), "no metadata expected:\n{}", ir);
}
