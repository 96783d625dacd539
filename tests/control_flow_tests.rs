mod common;

use common::*;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn arithmetic_and_var_bindings() {
    let result = run(vec![
        var("x", Some(num(1.0))),
        var("y", Some(num(2.0))),
        expr_stmt(bin("+", id("x"), id("y"))),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 3.0);
}

#[test]
fn if_else_picks_the_right_branch() {
    let result = run(vec![
        var("x", Some(num(10.0))),
        var("label", Some(str_(""))),
        if_(
            bin(">", id("x"), num(5.0)),
            expr_stmt(assign("=", id("label"), str_("big"))),
            Some(expr_stmt(assign("=", id("label"), str_("small")))),
        ),
        expr_stmt(id("label")),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "big");
}

#[test]
fn while_loop_sums_to_ten() {
    let result = run(vec![
        var("i", Some(num(0.0))),
        var("sum", Some(num(0.0))),
        while_(
            bin("<", id("i"), num(5.0)),
            block(vec![
                expr_stmt(assign("+=", id("sum"), id("i"))),
                expr_stmt(update("++", id("i"), false)),
            ]),
        ),
        expr_stmt(id("sum")),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 10.0);
}

#[test]
fn for_loop_counts_to_five() {
    let result = run(vec![
        var("count", Some(num(0.0))),
        for_(
            Some(var("i", Some(num(0.0)))),
            Some(bin("<", id("i"), num(5.0))),
            Some(update("++", id("i"), false)),
            block(vec![expr_stmt(update("++", id("count"), false))]),
        ),
        expr_stmt(id("count")),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 5.0);
}

#[test]
fn recursive_factorial() {
    let result = run(vec![
        func_decl(
            "fact",
            &["n"],
            vec![if_(
                bin("<=", id("n"), num(1.0)),
                ret(Some(num(1.0))),
                Some(ret(Some(bin("*", id("n"), call(id("fact"), vec![bin("-", id("n"), num(1.0))]))))),
            )],
        ),
        expr_stmt(call(id("fact"), vec![num(5.0)])),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 120.0);
}

#[test]
fn closures_capture_their_defining_scope() {
    // function makeCounter() { var n = 0; return function() { return ++n; }; }
    // var next = makeCounter(); next(); next();
    let result = run(vec![
        func_decl(
            "makeCounter",
            &[],
            vec![var("n", Some(num(0.0))), ret(Some(func_expr(&[], vec![ret(Some(update("++", id("n"), true)))])))],
        ),
        var("next", Some(call(id("makeCounter"), vec![]))),
        expr_stmt(call(id("next"), vec![])),
        expr_stmt(call(id("next"), vec![])),
        expr_stmt(call(id("next"), vec![])),
    ])
    .unwrap();
    assert_eq!(as_num(&result), 3.0);
}

#[test]
fn try_catch_recovers_from_a_thrown_value() {
    let result = run(vec![
        var("caught", Some(bool_(false))),
        var("message", Some(str_(""))),
        try_(
            block(vec![throw_(str_("boom"))]),
            Some((
                Some("e"),
                block(vec![
                    expr_stmt(assign("=", id("caught"), bool_(true))),
                    expr_stmt(assign("=", id("message"), id("e"))),
                ]),
            )),
            None,
        ),
        expr_stmt(logical("&&", id("caught"), id("message"))),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "boom");
}

#[test]
fn try_finally_always_runs() {
    let result = run(vec![
        var("finally_ran", Some(bool_(false))),
        try_(
            block(vec![expr_stmt(num(1.0))]),
            None,
            Some(block(vec![expr_stmt(assign("=", id("finally_ran"), bool_(true)))])),
        ),
        expr_stmt(id("finally_ran")),
    ])
    .unwrap();
    assert!(as_bool(&result));
}

#[test]
fn ternary_and_typeof() {
    let result = run(vec![
        var("x", Some(num(5.0))),
        expr_stmt(cond(bin("===", typeof_(id("x")), str_("number")), str_("yes"), str_("no"))),
    ])
    .unwrap();
    assert_eq!(as_str(&result), "yes");
}
