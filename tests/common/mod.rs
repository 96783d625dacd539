#![allow(dead_code)]

// Hand-built AST helpers for the integration tests: this crate owns no
// parser, so every test script is assembled directly out of `sandhopper`'s
// public `build` module (the same constructors the polyfill bootstrap
// itself uses) plus a handful of node shapes `build` doesn't cover.

use sandhopper::{build, Engine, EngineConfig, EngineError, Node, NodeKind, NodeRef, Value};

pub fn id(name: &str) -> NodeRef {
    build::ident(name)
}
pub fn num(n: f64) -> NodeRef {
    build::num(n)
}
pub fn str_(s: &str) -> NodeRef {
    build::string(s)
}
pub fn bool_(b: bool) -> NodeRef {
    build::boolean(b)
}
pub fn null_() -> NodeRef {
    build::null()
}
pub fn undef() -> NodeRef {
    id("undefined")
}
pub fn this_() -> NodeRef {
    Node::new(NodeKind::ThisExpression)
}

pub fn member(object: NodeRef, name: &str) -> NodeRef {
    build::member(object, id(name), false)
}
pub fn member_c(object: NodeRef, key: NodeRef) -> NodeRef {
    build::member(object, key, true)
}
pub fn call(callee: NodeRef, args: Vec<NodeRef>) -> NodeRef {
    build::call(callee, args)
}
pub fn new_(callee: NodeRef, args: Vec<NodeRef>) -> NodeRef {
    Node::new(NodeKind::NewExpression { callee, arguments: args })
}
pub fn method_call(object: NodeRef, name: &str, args: Vec<NodeRef>) -> NodeRef {
    call(member(object, name), args)
}

pub fn assign(op: &str, left: NodeRef, right: NodeRef) -> NodeRef {
    build::assign(op, left, right)
}
pub fn bin(op: &str, l: NodeRef, r: NodeRef) -> NodeRef {
    build::binary(op, l, r)
}
pub fn logical(op: &str, l: NodeRef, r: NodeRef) -> NodeRef {
    build::logical(op, l, r)
}
pub fn unary(op: &str, arg: NodeRef, prefix: bool) -> NodeRef {
    Node::new(NodeKind::UnaryExpression { operator: op.to_string(), argument: arg, prefix })
}
pub fn not_(arg: NodeRef) -> NodeRef {
    unary("!", arg, true)
}
pub fn typeof_(arg: NodeRef) -> NodeRef {
    unary("typeof", arg, true)
}
pub fn update(op: &str, arg: NodeRef, prefix: bool) -> NodeRef {
    Node::new(NodeKind::UpdateExpression { operator: op.to_string(), argument: arg, prefix })
}
pub fn cond(test: NodeRef, consequent: NodeRef, alternate: NodeRef) -> NodeRef {
    Node::new(NodeKind::ConditionalExpression { test, consequent, alternate })
}

pub fn block(body: Vec<NodeRef>) -> NodeRef {
    build::block(body)
}
pub fn expr_stmt(e: NodeRef) -> NodeRef {
    build::expr_stmt(e)
}
pub fn if_(test: NodeRef, consequent: NodeRef, alternate: Option<NodeRef>) -> NodeRef {
    build::if_stmt(test, consequent, alternate)
}
pub fn while_(test: NodeRef, body: NodeRef) -> NodeRef {
    build::while_stmt(test, body)
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
pub fn func_decl(name: &str, params: &[&str], body: Vec<NodeRef>) -> NodeRef {
    build::function_decl(name, params, body)
}
pub fn throw_(e: NodeRef) -> NodeRef {
    build::throw_stmt(e)
}
pub fn try_(block_node: NodeRef, handler: Option<(Option<&str>, NodeRef)>, finalizer: Option<NodeRef>) -> NodeRef {
    build::try_stmt(block_node, handler, finalizer)
}
pub fn array_lit(elements: Vec<Option<NodeRef>>) -> NodeRef {
    Node::new(NodeKind::ArrayExpression { elements })
}

pub fn program(body: Vec<NodeRef>) -> NodeRef {
    build::program(body)
}

/// Builds a fresh engine over `body` and runs it to completion, returning
/// the completion value of the last top-level expression statement.
pub fn run(body: Vec<NodeRef>) -> Result<Value, EngineError> {
    let mut engine = Engine::new(program(body), EngineConfig::default())?;
    engine.run()?;
    Ok(engine.value().clone())
}

/// As `run`, but hands back the engine itself so a test can register
/// additional host globals (via `engine.global_object()`) before running,
/// or inspect object state after.
pub fn new_engine(body: Vec<NodeRef>) -> Result<Engine, EngineError> {
    Engine::new(program(body), EngineConfig::default())
}

pub fn as_num(v: &Value) -> f64 {
    match v {
        Value::Num(n) => *n,
        other => panic!("expected number, got {other:?}"),
    }
}
pub fn as_str(v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        other => panic!("expected string, got {other:?}"),
    }
}
pub fn as_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        other => panic!("expected bool, got {other:?}"),
    }
}
