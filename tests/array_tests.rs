mod common;

use common::*;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

fn nums(values: &[f64]) -> sandhopper::NodeRef {
    array_lit(values.iter().map(|n| Some(num(*n))).collect())
}

#[test]
fn for_each_visits_every_element_in_order() {
    let result = run(vec![
        var("arr", Some(nums(&[1.0, 2.0, 3.0]))),
        var("sum", Some(num(0.0))),
        expr_stmt(method_call(
            id("arr"),
            "forEach",
            vec![func_expr(&["v"], vec![expr_stmt(assign("+=", id("sum"), id("v")))])],
        )),
        expr_stmt(id("sum")),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 6.0);
}

#[test]
fn for_each_skips_deleted_holes() {
    // Deleting an element (rather than eliding one in a literal) is what
    // actually produces a sparse array in this object model.
    let result = run(vec![
        var("arr", Some(nums(&[1.0, 2.0, 3.0]))),
        expr_stmt(unary("delete", member_c(id("arr"), num(1.0)), true)),
        var("visits", Some(num(0.0))),
        var("sum", Some(num(0.0))),
        expr_stmt(method_call(
            id("arr"),
            "forEach",
            vec![func_expr(
                &["v"],
                vec![
                    expr_stmt(update("++", id("visits"), false)),
                    expr_stmt(assign("+=", id("sum"), id("v"))),
                ],
            )],
        )),
        expr_stmt(bin("+", bin("*", id("visits"), num(100.0)), id("sum"))),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 204.0);
}

#[test]
fn map_doubles_every_element() {
    let result = run(vec![
        var("arr", Some(nums(&[1.0, 2.0, 3.0]))),
        var("doubled", Some(method_call(id("arr"), "map", vec![func_expr(&["v"], vec![ret(Some(bin("*", id("v"), num(2.0))))])]))),
        expr_stmt(method_call(id("doubled"), "join", vec![str_(",")])),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "2,4,6");
}

#[test]
fn filter_keeps_only_matching_elements() {
    let result = run(vec![
        var("arr", Some(nums(&[1.0, 2.0, 3.0, 4.0, 5.0]))),
        var(
            "evens",
            Some(method_call(
                id("arr"),
                "filter",
                vec![func_expr(&["v"], vec![ret(Some(bin("===", bin("%", id("v"), num(2.0)), num(0.0))))])],
            )),
        ),
        expr_stmt(method_call(id("evens"), "join", vec![str_(",")])),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "2,4");
}

#[test]
fn every_and_some_short_circuit() {
    let result = run(vec![
        var("arr", Some(nums(&[2.0, 4.0, 6.0]))),
        expr_stmt(method_call(
            id("arr"),
            "every",
            vec![func_expr(&["v"], vec![ret(Some(bin("===", bin("%", id("v"), num(2.0)), num(0.0))))])],
        )),
    ])
    .unwrap();
    assert!(as_bool(&result));

    let result = run(vec![
        var("arr", Some(nums(&[1.0, 3.0, 4.0]))),
        expr_stmt(method_call(
            id("arr"),
            "some",
            vec![func_expr(&["v"], vec![ret(Some(bin("===", bin("%", id("v"), num(2.0)), num(0.0))))])],
        )),
    ])
    .unwrap();
    assert!(as_bool(&result));
}

#[test]
fn reduce_sums_with_an_initial_value() {
    let result = run(vec![
        var("arr", Some(nums(&[1.0, 2.0, 3.0, 4.0]))),
        expr_stmt(method_call(
            id("arr"),
            "reduce",
            vec![func_expr(&["acc", "v"], vec![ret(Some(bin("+", id("acc"), id("v"))))]), num(10.0)],
        )),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 20.0);
}

#[test]
fn reduce_with_no_initial_value_on_an_empty_array_throws() {
    let err = run(vec![
        var("arr", Some(array_lit(vec![]))),
        expr_stmt(method_call(id("arr"), "reduce", vec![func_expr(&["acc", "v"], vec![ret(Some(id("acc")))])])),
    ])
    .unwrap_err();
    match err {
        sandhopper::EngineError::GuestException { name, .. } => assert_eq!(name, "TypeError"),
        other => panic!("expected a guest TypeError, got {other:?}"),
    }
}

#[test]
fn reduce_right_processes_from_the_end() {
    let result = run(vec![
        var("arr", Some(array_lit(vec![Some(str_("a")), Some(str_("b")), Some(str_("c"))]))),
        expr_stmt(method_call(
            id("arr"),
            "reduceRight",
            vec![func_expr(&["acc", "v"], vec![ret(Some(bin("+", id("acc"), id("v"))))]), str_("")],
        )),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "cba");
}

#[test]
fn sort_with_a_comparator_orders_numerically() {
    let result = run(vec![
        var("arr", Some(nums(&[10.0, 1.0, 21.0, 2.0]))),
        expr_stmt(method_call(
            method_call(id("arr"), "sort", vec![func_expr(&["a", "b"], vec![ret(Some(bin("-", id("a"), id("b"))))])]),
            "join",
            vec![str_(",")],
        )),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "1,2,10,21");
}

#[test]
fn sort_without_a_comparator_falls_back_to_lexicographic_order() {
    let result = run(vec![
        var("arr", Some(nums(&[10.0, 1.0, 21.0, 2.0]))),
        expr_stmt(method_call(method_call(id("arr"), "sort", vec![]), "join", vec![str_(",")])),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "1,10,2,21");
}
