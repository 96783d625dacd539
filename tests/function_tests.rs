mod common;

use common::*;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn call_binds_this_and_forwards_arguments() {
    let result = run(vec![
        func_decl("greet", &["greeting"], vec![ret(Some(bin("+", id("greeting"), member(this_(), "name"))))]),
        var("obj", Some(new_(id("Object"), vec![]))),
        expr_stmt(assign("=", member(id("obj"), "name"), str_("world"))),
        expr_stmt(method_call(id("greet"), "call", vec![id("obj"), str_("hello ")])),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "hello world");
}

#[test]
fn apply_spreads_an_arguments_array() {
    let result = run(vec![
        func_decl("sum3", &["a", "b", "c"], vec![ret(Some(bin("+", bin("+", id("a"), id("b")), id("c"))))]),
        expr_stmt(method_call(id("sum3"), "apply", vec![null_(), array_lit(vec![Some(num(1.0)), Some(num(2.0)), Some(num(3.0))])])),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 6.0);
}

#[test]
fn bind_partially_applies_arguments_and_this() {
    let result = run(vec![
        func_decl("add", &["a", "b"], vec![ret(Some(bin("+", id("a"), member(this_(), "base"))))]),
        var("ctx", Some(new_(id("Object"), vec![]))),
        expr_stmt(assign("=", member(id("ctx"), "base"), num(100.0))),
        var("addToCtx", Some(method_call(id("add"), "bind", vec![id("ctx"), num(5.0)]))),
        expr_stmt(call(id("addToCtx"), vec![num(1.0)])),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 105.0);
}

#[test]
fn call_with_no_this_arg_still_runs() {
    let result = run(vec![
        func_decl("identity", &["x"], vec![ret(Some(id("x")))]),
        expr_stmt(method_call(id("identity"), "call", vec![undef(), num(42.0)])),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 42.0);
}
