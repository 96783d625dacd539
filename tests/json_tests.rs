mod common;

use common::*;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn parse_then_stringify_round_trips_an_object() {
    let result = run(vec![
        var("obj", Some(call(member(id("JSON"), "parse"), vec![str_("{\"a\":1,\"b\":[true,false,null]}")]))),
        expr_stmt(bin(
            "+",
            member(id("obj"), "a"),
            bin("+", str_(":"), member_c(member(id("obj"), "b"), num(0.0))),
        )),
    ])
    .unwrap();
    // obj.a (1) coerced via + with the string produces "1:true".
    assert_eq!(as_str(&result), "1:true");
}

#[test]
fn stringify_skips_undefined_and_function_valued_properties() {
    let result = run(vec![
        var("obj", Some(new_(id("Object"), vec![]))),
        expr_stmt(assign("=", member(id("obj"), "kept"), num(1.0))),
        expr_stmt(assign("=", member(id("obj"), "skippedFn"), func_expr(&[], vec![]))),
        expr_stmt(assign("=", member(id("obj"), "skippedUndef"), undef())),
        expr_stmt(call(member(id("JSON"), "stringify"), vec![id("obj")])),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "{\"kept\":1}");
}

#[test]
fn stringify_rejects_a_circular_structure() {
    let err = run(vec![
        var("obj", Some(new_(id("Object"), vec![]))),
        expr_stmt(assign("=", member(id("obj"), "self"), id("obj"))),
        expr_stmt(call(member(id("JSON"), "stringify"), vec![id("obj")])),
    ])
    .unwrap_err();
    match err {
        sandhopper::EngineError::GuestException { name, .. } => assert_eq!(name, "TypeError"),
        other => panic!("expected a guest TypeError, got {other:?}"),
    }
}

#[test]
fn stringify_an_array_of_numbers() {
    let result = run(vec![expr_stmt(call(
        member(id("JSON"), "stringify"),
        vec![array_lit(vec![Some(num(1.0)), Some(num(2.0)), Some(num(3.0))])],
    ))])
    .unwrap();
    assert_eq!(as_str(&result), "[1,2,3]");
}
