mod common;

use common::*;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn regexp_test_matches_and_rejects() {
    let result = run(vec![
        var("re", Some(new_(id("RegExp"), vec![str_("^[0-9]+$")]))),
        expr_stmt(call(member(id("re"), "test"), vec![str_("12345")])),
    ])
    .unwrap();
    assert!(as_bool(&result));

    let result = run(vec![
        var("re", Some(new_(id("RegExp"), vec![str_("^[0-9]+$")]))),
        expr_stmt(call(member(id("re"), "test"), vec![str_("abc")])),
    ])
    .unwrap();
    assert!(!as_bool(&result));
}

#[test]
fn regexp_exec_exposes_index_and_input() {
    let result = run(vec![
        var("re", Some(new_(id("RegExp"), vec![str_("wor.d")]))),
        var("m", Some(call(member(id("re"), "exec"), vec![str_("hello world")]))),
        expr_stmt(bin(
            "+",
            bin("+", member_c(id("m"), num(0.0)), str_("@")),
            member(id("m"), "index"),
        )),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "world@6");
}

#[test]
fn replace_with_plain_string_pattern_delegates_to_native() {
    let result = run(vec![expr_stmt(call(member(str_("a-b-c"), "replace"), vec![str_("-"), str_("+")]))]).unwrap();
    assert_eq!(as_str(&result), "a+b-c");
}

#[test]
fn replace_with_a_function_replacer_and_string_pattern() {
    let result = run(vec![expr_stmt(call(
        member(str_("hello world"), "replace"),
        vec![str_("world"), func_expr(&["matched"], vec![ret(Some(call(member(id("matched"), "toUpperCase"), vec![])))])],
    ))])
    .unwrap();
    assert_eq!(as_str(&result), "hello WORLD");
}

#[test]
fn replace_with_a_global_regexp_and_function_replacer() {
    let result = run(vec![
        var("re", Some(new_(id("RegExp"), vec![str_("[0-9]+"), str_("g")]))),
        expr_stmt(call(
            member(str_("a1 b22 c333"), "replace"),
            vec![id("re"), func_expr(&["matched"], vec![ret(Some(bin("+", str_("<"), bin("+", id("matched"), str_(">")))))])],
        )),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "a<1> b<22> c<333>");
}

#[test]
fn replace_with_a_non_global_regexp_and_function_replacer_only_replaces_the_first_match() {
    let result = run(vec![
        var("re", Some(new_(id("RegExp"), vec![str_("[0-9]+")]))),
        expr_stmt(call(
            member(str_("a1 b22 c333"), "replace"),
            vec![id("re"), func_expr(&["matched"], vec![ret(Some(str_("#")))])],
        )),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "a# b22 c333");
}
