//! The guest-source half of the two-layer builtins split (spec §4.5 layer
//! 2, §9 supplement F): methods whose implementation must call back into
//! guest code mid-iteration. A native Rust closure runs to completion in a
//! single `step()` and can never push a child frame, so anything that
//! invokes a callback — `Array.prototype.forEach`/`map`/`filter`/`every`/
//! `some`/`reduce`/`reduceRight`/`sort` with a comparator, `String.prototype
//! .replace` with a function replacer, `Function.prototype.call`/`apply`/
//! `bind`, `RegExp.prototype.test` — is written here as a hand-built AST and
//! run through the ordinary step dispatcher exactly once at construction,
//! the same way `append_code` runs any other program.
//!
//! Every statement built here carries no `SourceLoc`, which is how the step
//! dispatcher (`Node::is_polyfill`) knows to keep stepping through bootstrap
//! without surfacing it as a pause-worthy user-code step.

use crate::ast::{build, NodeRef};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::frame::Frame;

mod b {
    use crate::ast::{build, Node, NodeKind, NodeRef};

    pub fn id(name: &str) -> NodeRef {
        build::ident(name)
    }
    pub fn num(n: f64) -> NodeRef {
        build::num(n)
    }
    pub fn str_(s: &str) -> NodeRef {
        build::string(s)
    }
    pub fn this_() -> NodeRef {
        Node::new(NodeKind::ThisExpression)
    }
    pub fn member(obj: NodeRef, prop: &str) -> NodeRef {
        build::member(obj, id(prop), false)
    }
    pub fn member_c(obj: NodeRef, prop: NodeRef) -> NodeRef {
        build::member(obj, prop, true)
    }
    pub fn call(callee: NodeRef, args: Vec<NodeRef>) -> NodeRef {
        build::call(callee, args)
    }
    pub fn new_(callee: NodeRef, args: Vec<NodeRef>) -> NodeRef {
        Node::new(NodeKind::NewExpression { callee, arguments: args })
    }
    pub fn assign(left: NodeRef, right: NodeRef) -> NodeRef {
        build::assign("=", left, right)
    }
    pub fn assign_op(op: &str, left: NodeRef, right: NodeRef) -> NodeRef {
        build::assign(op, left, right)
    }
    pub fn bin(op: &str, l: NodeRef, r: NodeRef) -> NodeRef {
        build::binary(op, l, r)
    }
    pub fn logical(op: &str, l: NodeRef, r: NodeRef) -> NodeRef {
        build::logical(op, l, r)
    }
    pub fn not_(v: NodeRef) -> NodeRef {
        Node::new(NodeKind::UnaryExpression {
            operator: "!".to_string(),
            argument: v,
            prefix: true,
        })
    }
    pub fn typeof_(v: NodeRef) -> NodeRef {
        Node::new(NodeKind::UnaryExpression {
            operator: "typeof".to_string(),
            argument: v,
            prefix: true,
        })
    }
    pub fn delete_(v: NodeRef) -> NodeRef {
        Node::new(NodeKind::UnaryExpression {
            operator: "delete".to_string(),
            argument: v,
            prefix: true,
        })
    }
    pub fn update(op: &str, arg: NodeRef, prefix: bool) -> NodeRef {
        Node::new(NodeKind::UpdateExpression {
            operator: op.to_string(),
            argument: arg,
            prefix,
        })
    }
    pub fn cond(t: NodeRef, c: NodeRef, a: NodeRef) -> NodeRef {
        Node::new(NodeKind::ConditionalExpression { test: t, consequent: c, alternate: a })
    }
    pub fn block(v: Vec<NodeRef>) -> NodeRef {
        build::block(v)
    }
    pub fn expr_stmt(e: NodeRef) -> NodeRef {
        build::expr_stmt(e)
    }
    pub fn if_(t: NodeRef, c: NodeRef, a: Option<NodeRef>) -> NodeRef {
        build::if_stmt(t, c, a)
    }
    pub fn while_(t: NodeRef, body: NodeRef) -> NodeRef {
        build::while_stmt(t, body)
    }
    pub fn for_(init: Option<NodeRef>, test: Option<NodeRef>, update: Option<NodeRef>, body: NodeRef) -> NodeRef {
        Node::new(NodeKind::ForStatement { init, test, update, body })
    }
    pub fn ret(v: Option<NodeRef>) -> NodeRef {
        build::return_stmt(v)
    }
    pub fn var(name: &str, init: Option<NodeRef>) -> NodeRef {
        build::var_decl(name, init)
    }
    pub fn func_expr(params: &[&str], body: Vec<NodeRef>) -> NodeRef {
        build::function_expr(params, body)
    }
    pub fn throw_(e: NodeRef) -> NodeRef {
        build::throw_stmt(e)
    }
    pub fn break_stmt() -> NodeRef {
        Node::new(NodeKind::BreakStatement { label: None })
    }
    pub fn array_lit(items: Vec<NodeRef>) -> NodeRef {
        Node::new(NodeKind::ArrayExpression {
            elements: items.into_iter().map(Some).collect(),
        })
    }
    pub fn object_lit_empty() -> NodeRef {
        Node::new(NodeKind::ObjectExpression { properties: vec![] })
    }
    pub fn undef() -> NodeRef {
        id("undefined")
    }
    pub fn null_() -> NodeRef {
        build::null()
    }
}

use b::*;

/// `fn.prototype.method = function(...) {...};` as a statement.
fn assign_method(ctor_name: &str, method: &str, params: &[&str], body: Vec<NodeRef>) -> NodeRef {
    expr_stmt(assign(member(member(id(ctor_name), "prototype"), method), func_expr(params, body)))
}

/// `var name = ctor.prototype.method;` — captures the current (native)
/// implementation before the polyfill below replaces it.
fn capture_native(var_name: &str, ctor_name: &str, method: &str) -> NodeRef {
    var(var_name, Some(member(member(id(ctor_name), "prototype"), method)))
}

/// `__invoke(fn, thisArg, args)`: calls `fn` as a method of a throwaway (or
/// `Object`-coerced) object so its `this` binding matches `thisArg`, without
/// any engine primitive for indirect invocation. Capped at 5 positional
/// arguments, which covers every ES5 callback shape this crate calls back
/// into (`(value, index, array)`, `(a, b)` comparators, bound partial
/// application).
fn invoke_helper() -> NodeRef {
    let branches: Vec<(i64, Vec<NodeRef>)> = (0..=4)
        .map(|n| (n, (0..n).map(|i| member_c(id("args"), num(i as f64))).collect()))
        .collect();

    let mut chain: Option<NodeRef> = None;
    for (n, call_args) in branches.into_iter().rev() {
        let call_expr = call(member_c(id("obj"), id("key")), call_args);
        let assign_result = assign(id("result"), call_expr);
        let stmt = if n == 4 {
            // default/fallback branch: 4 args and up (computed from args.length at call sites this won't exceed)
            block(vec![expr_stmt(assign_result)])
        } else {
            let test = bin("===", member(id("args"), "length"), num(n as f64));
            if_(test, block(vec![expr_stmt(assign_result)]), chain.take())
        };
        chain = Some(stmt);
    }

    build::function_decl(
        "__invoke",
        &["fn", "thisArg", "args"],
        vec![
            var(
                "obj",
                Some(cond(
                    logical("||", bin("===", id("thisArg"), null_()), bin("===", id("thisArg"), undef())),
                    object_lit_empty(),
                    call(id("Object"), vec![id("thisArg")]),
                )),
            ),
            var("key", Some(str_("@@invoke"))),
            expr_stmt(assign(member_c(id("obj"), id("key")), id("fn"))),
            var("result", Some(undef())),
            chain.unwrap(),
            expr_stmt(delete_(member_c(id("obj"), id("key")))),
            ret(Some(id("result"))),
        ],
    )
}

fn array_foreach() -> NodeRef {
    assign_method(
        "Array",
        "forEach",
        &["callback", "thisArg"],
        vec![
            var("len", Some(member(this_(), "length"))),
            for_(
                Some(var("i", Some(num(0.0)))),
                Some(bin("<", id("i"), id("len"))),
                Some(update("++", id("i"), false)),
                block(vec![if_(
                    bin("in", id("i"), this_()),
                    expr_stmt(call(
                        id("__invoke"),
                        vec![id("callback"), id("thisArg"), array_lit(vec![member_c(this_(), id("i")), id("i"), this_()])],
                    )),
                    None,
                )]),
            ),
        ],
    )
}

fn array_map() -> NodeRef {
    assign_method(
        "Array",
        "map",
        &["callback", "thisArg"],
        vec![
            var("len", Some(member(this_(), "length"))),
            var("out", Some(array_lit(vec![]))),
            for_(
                Some(var("i", Some(num(0.0)))),
                Some(bin("<", id("i"), id("len"))),
                Some(update("++", id("i"), false)),
                block(vec![if_(
                    bin("in", id("i"), this_()),
                    expr_stmt(assign(
                        member_c(id("out"), id("i")),
                        call(
                            id("__invoke"),
                            vec![id("callback"), id("thisArg"), array_lit(vec![member_c(this_(), id("i")), id("i"), this_()])],
                        ),
                    )),
                    None,
                )]),
            ),
            ret(Some(id("out"))),
        ],
    )
}

fn array_filter() -> NodeRef {
    assign_method(
        "Array",
        "filter",
        &["callback", "thisArg"],
        vec![
            var("len", Some(member(this_(), "length"))),
            var("out", Some(array_lit(vec![]))),
            var("j", Some(num(0.0))),
            for_(
                Some(var("i", Some(num(0.0)))),
                Some(bin("<", id("i"), id("len"))),
                Some(update("++", id("i"), false)),
                block(vec![if_(
                    bin("in", id("i"), this_()),
                    block(vec![
                        var("v", Some(member_c(this_(), id("i")))),
                        if_(
                            call(id("__invoke"), vec![id("callback"), id("thisArg"), array_lit(vec![id("v"), id("i"), this_()])]),
                            block(vec![
                                expr_stmt(assign(member_c(id("out"), id("j")), id("v"))),
                                expr_stmt(assign_op("+=", id("j"), num(1.0))),
                            ]),
                            None,
                        ),
                    ]),
                    None,
                )]),
            ),
            ret(Some(id("out"))),
        ],
    )
}

fn array_every_some(name: &str, negate_body: bool, short_circuit_value: bool, end_value: bool) -> NodeRef {
    let test = call(
        id("__invoke"),
        vec![id("callback"), id("thisArg"), array_lit(vec![member_c(this_(), id("i")), id("i"), this_()])],
    );
    let test = if negate_body { not_(test) } else { test };
    assign_method(
        "Array",
        name,
        &["callback", "thisArg"],
        vec![
            var("len", Some(member(this_(), "length"))),
            for_(
                Some(var("i", Some(num(0.0)))),
                Some(bin("<", id("i"), id("len"))),
                Some(update("++", id("i"), false)),
                block(vec![if_(
                    bin("in", id("i"), this_()),
                    if_(test, ret(Some(build::boolean(short_circuit_value))), None),
                    None,
                )]),
            ),
            ret(Some(build::boolean(end_value))),
        ],
    )
}

fn array_reduce(name: &str, descending: bool) -> NodeRef {
    let init_i = if descending { bin("-", id("len"), num(1.0)) } else { num(0.0) };
    let test = if descending { bin(">=", id("i"), num(0.0)) } else { bin("<", id("i"), id("len")) };
    let update_expr = if descending { update("--", id("i"), false) } else { update("++", id("i"), false) };
    let callback_args = if descending {
        array_lit(vec![id("acc"), member_c(this_(), id("i")), id("i"), this_()])
    } else {
        array_lit(vec![id("acc"), member_c(this_(), id("i")), id("i"), this_()])
    };

    assign_method(
        "Array",
        name,
        &["callback", "initialValue"],
        vec![
            var("len", Some(member(this_(), "length"))),
            var("i", Some(init_i)),
            var("acc", Some(undef())),
            var(
                "hasAcc",
                Some(bin(">=", member(id("arguments"), "length"), num(2.0))),
            ),
            if_(
                id("hasAcc"),
                expr_stmt(assign(id("acc"), id("initialValue"))),
                None,
            ),
            while_(
                test,
                block(vec![
                    if_(
                        bin("in", id("i"), this_()),
                        if_(
                            not_(id("hasAcc")),
                            block(vec![
                                expr_stmt(assign(id("acc"), member_c(this_(), id("i")))),
                                expr_stmt(assign(id("hasAcc"), build::boolean(true))),
                            ]),
                            Some(expr_stmt(assign(id("acc"), call(id("__invoke"), vec![id("callback"), undef(), callback_args])))),
                        ),
                        None,
                    ),
                    expr_stmt(update_expr),
                ]),
            ),
            if_(
                not_(id("hasAcc")),
                throw_(new_(id("TypeError"), vec![str_("Reduce of empty array with no initial value")])),
                None,
            ),
            ret(Some(id("acc"))),
        ],
    )
}

fn array_to_locale_string() -> NodeRef {
    assign_method(
        "Array",
        "toLocaleString",
        &[],
        vec![
            var("len", Some(member(this_(), "length"))),
            var("parts", Some(array_lit(vec![]))),
            for_(
                Some(var("i", Some(num(0.0)))),
                Some(bin("<", id("i"), id("len"))),
                Some(update("++", id("i"), false)),
                block(vec![
                    var("v", Some(member_c(this_(), id("i")))),
                    if_(
                        logical("||", bin("===", id("v"), null_()), bin("===", id("v"), undef())),
                        expr_stmt(assign(member_c(id("parts"), id("i")), str_(""))),
                        Some(expr_stmt(assign(
                            member_c(id("parts"), id("i")),
                            cond(
                                member(id("v"), "toLocaleString"),
                                call(member(id("v"), "toLocaleString"), vec![]),
                                call(id("String"), vec![id("v")]),
                            ),
                        ))),
                    ),
                ]),
            ),
            ret(Some(call(member(id("parts"), "join"), vec![str_(",")]))),
        ],
    )
}

fn function_call() -> NodeRef {
    assign_method(
        "Function",
        "call",
        &["thisArg"],
        vec![
            var("args", Some(array_lit(vec![]))),
            for_(
                Some(var("i", Some(num(1.0)))),
                Some(bin("<", id("i"), member(id("arguments"), "length"))),
                Some(update("++", id("i"), false)),
                block(vec![expr_stmt(assign(member_c(id("args"), bin("-", id("i"), num(1.0))), member_c(id("arguments"), id("i"))))]),
            ),
            ret(Some(call(id("__invoke"), vec![this_(), id("thisArg"), id("args")]))),
        ],
    )
}

fn function_apply() -> NodeRef {
    assign_method(
        "Function",
        "apply",
        &["thisArg", "argsArray"],
        vec![
            var("args", Some(array_lit(vec![]))),
            if_(
                logical("&&", bin("!==", id("argsArray"), undef()), bin("!==", id("argsArray"), null_())),
                block(vec![
                    var("len", Some(member(id("argsArray"), "length"))),
                    for_(
                        Some(var("i", Some(num(0.0)))),
                        Some(bin("<", id("i"), id("len"))),
                        Some(update("++", id("i"), false)),
                        block(vec![expr_stmt(assign(member_c(id("args"), id("i")), member_c(id("argsArray"), id("i"))))]),
                    ),
                ]),
                None,
            ),
            ret(Some(call(id("__invoke"), vec![this_(), id("thisArg"), id("args")]))),
        ],
    )
}

fn function_bind() -> NodeRef {
    assign_method(
        "Function",
        "bind",
        &["thisArg"],
        vec![
            var("target", Some(this_())),
            var("boundArgs", Some(array_lit(vec![]))),
            for_(
                Some(var("i", Some(num(1.0)))),
                Some(bin("<", id("i"), member(id("arguments"), "length"))),
                Some(update("++", id("i"), false)),
                block(vec![expr_stmt(assign(
                    member_c(id("boundArgs"), bin("-", id("i"), num(1.0))),
                    member_c(id("arguments"), id("i")),
                ))]),
            ),
            ret(Some(func_expr(
                &[],
                vec![
                    var("callArgs", Some(array_lit(vec![]))),
                    var("n", Some(num(0.0))),
                    for_(
                        Some(var("j", Some(num(0.0)))),
                        Some(bin("<", id("j"), member(id("boundArgs"), "length"))),
                        Some(update("++", id("j"), false)),
                        block(vec![
                            expr_stmt(assign(member_c(id("callArgs"), id("n")), member_c(id("boundArgs"), id("j")))),
                            expr_stmt(update("++", id("n"), false)),
                        ]),
                    ),
                    for_(
                        Some(var("k", Some(num(0.0)))),
                        Some(bin("<", id("k"), member(id("arguments"), "length"))),
                        Some(update("++", id("k"), false)),
                        block(vec![
                            expr_stmt(assign(member_c(id("callArgs"), id("n")), member_c(id("arguments"), id("k")))),
                            expr_stmt(update("++", id("n"), false)),
                        ]),
                    ),
                    ret(Some(call(id("__invoke"), vec![id("target"), id("thisArg"), id("callArgs")]))),
                ],
            ))),
        ],
    )
}

fn regexp_test() -> NodeRef {
    assign_method(
        "RegExp",
        "test",
        &["str"],
        vec![ret(Some(bin("!==", call(member(this_(), "exec"), vec![id("str")]), null_())))],
    )
}

/// `String.prototype.replace` with a function replacer: delegates to the
/// native string-literal implementation when the replacement is not a
/// function, otherwise walks matches itself so it can call back into guest
/// code for each one (spec §9 supplement F).
fn string_replace_with_function() -> Vec<NodeRef> {
    vec![
        capture_native("__nativeReplace", "String", "replace"),
        assign_method(
            "String",
            "replace",
            &["pattern", "replacement"],
            vec![
                if_(
                    bin("!==", typeof_(id("replacement")), str_("function")),
                    ret(Some(call(member(id("__nativeReplace"), "call"), vec![this_(), id("pattern"), id("replacement")]))),
                    None,
                ),
                var("str", Some(call(id("String"), vec![this_()]))),
                if_(
                    not_(bin("instanceof", id("pattern"), id("RegExp"))),
                    block(vec![
                        var("idx", Some(call(member(id("str"), "indexOf"), vec![id("pattern")]))),
                        if_(bin("<", id("idx"), num(0.0)), ret(Some(id("str"))), None),
                        var("matched", Some(id("pattern"))),
                        var(
                            "replaced",
                            Some(call(id("__invoke"), vec![id("replacement"), undef(), array_lit(vec![id("matched"), id("idx"), id("str")])])),
                        ),
                        ret(Some(bin(
                            "+",
                            bin(
                                "+",
                                call(member(id("str"), "slice"), vec![num(0.0), id("idx")]),
                                id("replaced"),
                            ),
                            call(member(id("str"), "slice"), vec![bin("+", id("idx"), member(id("matched"), "length"))]),
                        ))),
                    ]),
                    None,
                ),
                var("flags", Some(str_(""))),
                if_(member(id("pattern"), "global"), expr_stmt(assign_op("+=", id("flags"), str_("g"))), None),
                if_(member(id("pattern"), "ignoreCase"), expr_stmt(assign_op("+=", id("flags"), str_("i"))), None),
                if_(member(id("pattern"), "multiline"), expr_stmt(assign_op("+=", id("flags"), str_("m"))), None),
                var("re", Some(new_(id("RegExp"), vec![member(id("pattern"), "source"), id("flags")]))),
                expr_stmt(assign(member(id("re"), "lastIndex"), num(0.0))),
                var("result", Some(str_(""))),
                var("lastEnd", Some(num(0.0))),
                var("m", Some(undef())),
                while_(
                    bin("!==", assign(id("m"), call(member(id("re"), "exec"), vec![id("str")])), null_()),
                    block(vec![
                        expr_stmt(assign_op(
                            "+=",
                            id("result"),
                            call(member(id("str"), "slice"), vec![id("lastEnd"), member(id("m"), "index")]),
                        )),
                        expr_stmt(assign_op(
                            "+=",
                            id("result"),
                            call(
                                id("__invoke"),
                                vec![id("replacement"), undef(), array_lit(vec![member_c(id("m"), num(0.0)), member(id("m"), "index"), id("str")])],
                            ),
                        )),
                        expr_stmt(assign(id("lastEnd"), bin("+", member(id("m"), "index"), member(member_c(id("m"), num(0.0)), "length")))),
                        if_(
                            bin("===", member(member_c(id("m"), num(0.0)), "length"), num(0.0)),
                            expr_stmt(assign(member(id("re"), "lastIndex"), bin("+", member(id("re"), "lastIndex"), num(1.0)))),
                            None,
                        ),
                        if_(not_(member(id("pattern"), "global")), break_stmt(), None),
                    ]),
                ),
                expr_stmt(assign_op("+=", id("result"), call(member(id("str"), "slice"), vec![id("lastEnd")]))),
                ret(Some(id("result"))),
            ],
        ),
    ]
}

pub(crate) fn bootstrap(engine: &mut Engine) -> Result<(), EngineError> {
    let mut body = vec![invoke_helper()];
    body.push(function_call());
    body.push(function_apply());
    body.push(function_bind());
    body.push(array_foreach());
    body.push(array_map());
    body.push(array_filter());
    body.push(array_every_some("every", true, false, true));
    body.push(array_every_some("some", false, true, false));
    body.push(array_reduce("reduce", false));
    body.push(array_reduce("reduceRight", true));
    body.push(array_to_locale_string());
    body.push(capture_native("__nativeSort", "Array", "sort"));
    body.push(assign_method(
        "Array",
        "sort",
        &["comparator"],
        vec![
            if_(
                bin("!==", typeof_(id("comparator")), str_("function")),
                ret(Some(call(member(id("__nativeSort"), "call"), vec![this_()]))),
                None,
            ),
            var("len", Some(member(this_(), "length"))),
            for_(
                Some(var("i", Some(num(1.0)))),
                Some(bin("<", id("i"), id("len"))),
                Some(update("++", id("i"), false)),
                block(vec![
                    var("key", Some(member_c(this_(), id("i")))),
                    var("j", Some(bin("-", id("i"), num(1.0)))),
                    while_(
                        logical(
                            "&&",
                            bin(">=", id("j"), num(0.0)),
                            bin(
                                ">",
                                call(id("__invoke"), vec![id("comparator"), undef(), array_lit(vec![member_c(this_(), id("j")), id("key")])]),
                                num(0.0),
                            ),
                        ),
                        block(vec![
                            expr_stmt(assign(member_c(this_(), bin("+", id("j"), num(1.0))), member_c(this_(), id("j")))),
                            expr_stmt(update("--", id("j"), false)),
                        ]),
                    ),
                    expr_stmt(assign(member_c(this_(), bin("+", id("j"), num(1.0))), id("key"))),
                ]),
            ),
            ret(Some(this_())),
        ],
    ));
    body.push(regexp_test());
    body.extend(string_replace_with_function());

    let iife = expr_stmt(call(func_expr(&[], body), vec![]));
    let program = build::program(vec![iife]);

    engine.stack.push(Frame::new(program, engine.global_scope.clone()));
    loop {
        match engine.stack.last() {
            None => break,
            Some(top) if engine.stack.len() == 1 && top.done => break,
            _ => {}
        }
        crate::dispatch::dispatch_top(engine);
        if let Some(thrown) = engine.take_root_throw() {
            return Err(engine.guest_value_to_engine_error(thrown));
        }
    }
    engine.stack.clear();
    Ok(())
}
