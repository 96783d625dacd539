//! Node handlers (spec §4.2): one function per AST node kind, each
//! re-entrant over the top frame of the state stack.

use crate::ast::{CatchClause, Literal, Node, NodeKind, NodeRef, PropKind, PropertyKeyNode, SwitchCase, VariableDeclarator};
use crate::completion::Completion;
use crate::engine::{AsyncHandle, Engine, StepOutcome};
use crate::error::{GuestErrorClass, ThrowPayload};
use crate::frame::{DispatchNode, Frame, PendingAccessor, Reference, TryPhase};
use crate::object::{GuestObject, ObjectKind, ObjectRef};
use crate::property::{self, GetOutcome, PropertyError, SetOutcome};
use crate::scope::{hoist_var, Scope, ScopeRef};
use crate::value::Value;
use std::rc::Rc;

/// Entry point called once per `step()` iteration (spec §4.2).
pub(crate) fn dispatch_top(engine: &mut Engine) -> StepOutcome {
    // If the current top frame just completed (done == true), pop it and
    // feed its result to the parent before dispatching anything else.
    if let Some(top) = engine.stack.last() {
        if top.done {
            return pop_and_propagate(engine);
        }
        // A pending getter/setter recorded by the previous step must be
        // consumed now by pushing a synthetic call frame (spec §4.2 pt.4).
        if let Some(pending) = engine.stack.last().unwrap().book.pending_accessor.clone() {
            engine.stack.last_mut().unwrap().book.pending_accessor = None;
            let (func, this, args) = match pending {
                PendingAccessor::Get { func, this } => (func, this, vec![]),
                PendingAccessor::Set { func, this, arg } => (func, this, vec![arg]),
            };
            let scope = engine.stack.last().unwrap().scope.clone();
            engine.stack.push(Frame::new_synthetic_call(func, this, args, scope));
            return StepOutcome::Continued;
        }
    } else {
        return StepOutcome::Continued;
    }

    let node = match &engine.stack.last().unwrap().node {
        DispatchNode::SyntheticCall { func, this, args } => {
            let func = func.clone();
            let this = this.clone();
            let args = args.clone();
            return dispatch_synthetic_call(engine, func, this, args);
        }
        DispatchNode::Real(n) => n.clone(),
    };

    match &node.kind {
        NodeKind::Program { body } | NodeKind::BlockStatement { body } => dispatch_sequence_of_statements(engine, body),
        NodeKind::ExpressionStatement { expression } => dispatch_single_child_then_store(engine, expression),
        NodeKind::EmptyStatement | NodeKind::DebuggerStatement => {
            finish(engine, Value::Undefined);
            StepOutcome::Continued
        }
        NodeKind::VariableDeclaration { declarations, .. } => dispatch_variable_declaration(engine, declarations),
        NodeKind::FunctionDeclaration { .. } => {
            // Hoisted and bound at scope entry; as a statement it is a no-op.
            finish(engine, Value::Undefined);
            StepOutcome::Continued
        }
        NodeKind::IfStatement { test, consequent, alternate } => dispatch_if(engine, test, consequent, alternate.as_ref()),
        NodeKind::ConditionalExpression { test, consequent, alternate } => dispatch_conditional(engine, test, consequent, alternate),
        NodeKind::WhileStatement { test, body } => dispatch_while(engine, test, body),
        NodeKind::DoWhileStatement { test, body } => dispatch_do_while(engine, test, body),
        NodeKind::ForStatement { init, test, update, body } => dispatch_for(engine, init.as_ref(), test.as_ref(), update.as_ref(), body),
        NodeKind::ForInStatement { left, right, body } => dispatch_for_in(engine, left, right, body),
        NodeKind::SwitchStatement { discriminant, cases } => dispatch_switch(engine, discriminant, cases),
        NodeKind::TryStatement { block, handler, finalizer } => dispatch_try(engine, block, handler.as_ref(), finalizer.as_ref()),
        NodeKind::ThrowStatement { argument } => dispatch_throw_stmt(engine, argument),
        NodeKind::ReturnStatement { argument } => dispatch_return(engine, argument.as_ref()),
        NodeKind::BreakStatement { label } => {
            engine.unwind(Completion::Break(label.as_ref().map(|l| l.name.clone())));
            StepOutcome::Continued
        }
        NodeKind::ContinueStatement { label } => {
            engine.unwind(Completion::Continue(label.as_ref().map(|l| l.name.clone())));
            StepOutcome::Continued
        }
        NodeKind::LabeledStatement { label, body } => dispatch_labeled(engine, label.name.clone(), body),
        NodeKind::Identifier { name } => dispatch_identifier(engine, name),
        NodeKind::Literal { value } => {
            let v = literal_value(value);
            finish(engine, v);
            StepOutcome::Continued
        }
        NodeKind::ThisExpression => {
            let this = resolve_this(&engine.stack.last().unwrap().scope);
            finish(engine, this);
            StepOutcome::Continued
        }
        NodeKind::ArrayExpression { elements } => dispatch_array_literal(engine, elements),
        NodeKind::ObjectExpression { properties } => dispatch_object_literal(engine, properties),
        NodeKind::MemberExpression { object, property, computed } => dispatch_member(engine, object, property, *computed),
        NodeKind::CallExpression { callee, arguments } => dispatch_call(engine, callee, arguments, false),
        NodeKind::NewExpression { callee, arguments } => dispatch_call(engine, callee, arguments, true),
        NodeKind::AssignmentExpression { operator, left, right } => dispatch_assignment(engine, operator, left, right),
        NodeKind::UpdateExpression { operator, argument, prefix } => dispatch_update(engine, operator, argument, *prefix),
        NodeKind::BinaryExpression { operator, left, right } => dispatch_binary(engine, operator, left, right),
        NodeKind::LogicalExpression { operator, left, right } => dispatch_logical(engine, operator, left, right),
        NodeKind::UnaryExpression { operator, argument, prefix: _ } => dispatch_unary(engine, operator, argument),
        NodeKind::SequenceExpression { expressions } => dispatch_sequence_expr(engine, expressions),
        NodeKind::WithStatement { object, body } => dispatch_with(engine, object, body),
    }
}

// ---------------------------------------------------------------------
// Frame plumbing helpers
// ---------------------------------------------------------------------

fn finish(engine: &mut Engine, value: Value) {
    let top = engine.stack.last_mut().unwrap();
    top.result = value;
    top.done = true;
}

fn current_scope(engine: &Engine) -> ScopeRef {
    engine.stack.last().unwrap().scope.clone()
}

fn push_child(engine: &mut Engine, node: NodeRef) {
    let scope = current_scope(engine);
    engine.stack.push(Frame::new(node, scope));
}

/// Pops a completed frame and feeds its result back into whichever
/// bookkeeping slot its parent was waiting on. This is the generic "a
/// pushed child came back" continuation used by every compound node: each
/// node kind's own dispatch function re-reads `book.child_index` /
/// `book.operands` to decide what to do with the value.
fn pop_and_propagate(engine: &mut Engine) -> StepOutcome {
    let finished = engine.stack.pop().unwrap();
    if let Some(completion) = finished.completion {
        engine.unwind(completion);
        return StepOutcome::Continued;
    }
    if let Some(parent) = engine.stack.last_mut() {
        parent.book.operands.push(finished.result);
    } else {
        engine.value = finished.result;
    }
    StepOutcome::Continued
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool { value } => Value::Bool(*value),
        Literal::Num { value } => Value::Num(*value),
        Literal::Str { value } => Value::str(value.as_str()),
    }
}

fn resolve_this(scope: &ScopeRef) -> Value {
    // `this` is installed as a read-only scope binding on every call (spec
    // §4.4); walk outward until a scope's own bag has it.
    let mut s = Some(scope.clone());
    while let Some(cur) = s {
        if cur.borrow().bag.borrow().properties.contains_key("this") {
            return cur.borrow().bag.borrow().properties.get("this").unwrap().value.clone();
        }
        s = cur.borrow().parent.clone();
    }
    Value::Undefined
}

// ---------------------------------------------------------------------
// Statement sequencing
// ---------------------------------------------------------------------

fn dispatch_sequence_of_statements(engine: &mut Engine, body: &[NodeRef]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let idx = top.book.child_index;
    if idx >= body.len() {
        let v = top.book.operands.last().cloned().unwrap_or(Value::Undefined);
        finish(engine, v);
        return StepOutcome::Continued;
    }
    // Completion of the previous statement becomes this block's running
    // value (spec §4.2: "the currently executing node").
    if let Some(last) = top.book.operands.pop() {
        top.result = last;
    }
    top.book.child_index += 1;
    let stmt = body[idx].clone();
    push_child(engine, stmt);
    StepOutcome::Continued
}

fn dispatch_single_child_then_store(engine: &mut Engine, expr: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if top.book.child_index == 0 {
        top.book.child_index = 1;
        let e = expr.clone();
        push_child(engine, e);
        StepOutcome::Continued
    } else {
        let v = top.book.operands.pop().unwrap_or(Value::Undefined);
        finish(engine, v);
        StepOutcome::Continued
    }
}

fn dispatch_sequence_expr(engine: &mut Engine, expressions: &[NodeRef]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let idx = top.book.child_index;
    if idx >= expressions.len() {
        let v = top.book.operands.pop().unwrap_or(Value::Undefined);
        finish(engine, v);
        return StepOutcome::Continued;
    }
    top.book.child_index += 1;
    let e = expressions[idx].clone();
    push_child(engine, e);
    StepOutcome::Continued
}

// ---------------------------------------------------------------------
// VariableDeclaration — hoisting happened at scope entry; only initializers
// run here (spec §4.2).
// ---------------------------------------------------------------------

fn dispatch_variable_declaration(engine: &mut Engine, decls: &[VariableDeclarator]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let idx = top.book.child_index;
    // Each declarator with an initializer contributes one pushed child.
    if idx > 0 {
        if let Some(v) = top.book.operands.pop() {
            let scope = top.scope.clone();
            let name = decls[idx - 1].id.name.clone();
            assign_to_scope(&scope, &name, v);
        }
    }
    if idx >= decls.len() {
        finish(engine, Value::Undefined);
        return StepOutcome::Continued;
    }
    top.book.child_index += 1;
    match &decls[idx].init {
        Some(init) => {
            let init = init.clone();
            push_child(engine, init);
        }
        None => {
            // No initializer: re-enter immediately with no value to consume.
            engine.stack.last_mut().unwrap().book.operands.push(Value::Undefined);
            let init_was_none = true;
            if init_was_none {
                // Don't actually assign undefined over a hoisted binding that
                // may have been set by a preceding statement; pop the marker.
                engine.stack.last_mut().unwrap().book.operands.pop();
            }
        }
    }
    StepOutcome::Continued
}

fn assign_to_scope(scope: &ScopeRef, name: &str, value: Value) {
    scope.borrow().bag.borrow_mut().properties.entry(name.to_string()).and_modify(|s| s.value = value.clone()).or_insert_with(|| {
        crate::object::PropertySlot::data(value, true, true, false)
    });
}

// ---------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------

fn dispatch_if(engine: &mut Engine, test: &NodeRef, consequent: &NodeRef, alternate: Option<&NodeRef>) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    match top.book.child_index {
        0 => {
            top.book.child_index = 1;
            let t = test.clone();
            push_child(engine, t);
        }
        1 => {
            let cond = top.book.operands.pop().unwrap_or(Value::Undefined);
            top.book.child_index = 2;
            if cond.to_bool() {
                let c = consequent.clone();
                push_child(engine, c);
            } else if let Some(a) = alternate {
                let a = a.clone();
                push_child(engine, a);
            } else {
                finish(engine, Value::Undefined);
            }
        }
        _ => {
            let v = top.book.operands.pop().unwrap_or(Value::Undefined);
            finish(engine, v);
        }
    }
    StepOutcome::Continued
}

fn dispatch_conditional(engine: &mut Engine, test: &NodeRef, consequent: &NodeRef, alternate: &NodeRef) -> StepOutcome {
    dispatch_if(engine, test, consequent, Some(alternate))
}

fn dispatch_while(engine: &mut Engine, test: &NodeRef, body: &NodeRef) -> StepOutcome {
    const PHASE_TEST: usize = 0;
    const PHASE_BODY: usize = 1;

    let top = engine.stack.last_mut().unwrap();
    top.book.is_loop = true;
    match top.book.child_index {
        PHASE_TEST => {
            top.book.operands.clear();
            top.book.child_index = PHASE_BODY;
            let t = test.clone();
            push_child(engine, t);
        }
        PHASE_BODY => {
            let cond = top.book.operands.pop().map(|v| v.to_bool()).unwrap_or(false);
            if cond {
                top.book.child_index = PHASE_TEST;
                let b = body.clone();
                push_child(engine, b);
            } else {
                finish(engine, Value::Undefined);
            }
        }
        _ => unreachable!(),
    }
    StepOutcome::Continued
}

/// While/do-while/for share the same two-phase "test, then body, loop"
/// shape; implemented directly rather than factored through the helper
/// above so each keeps its own exact evaluation order (spec §4.2).
fn dispatch_do_while(engine: &mut Engine, test: &NodeRef, body: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    top.book.is_loop = true;
    if !top.book.call_dispatched {
        // First iteration: body runs unconditionally before the test.
        top.book.call_dispatched = true;
        let b = body.clone();
        push_child(engine, b);
        return StepOutcome::Continued;
    }
    if top.book.switch_matched.is_none() {
        // A body result is waiting; now evaluate the test.
        top.book.operands.clear();
        top.book.switch_matched = Some(0);
        let t = test.clone();
        push_child(engine, t);
        return StepOutcome::Continued;
    }
    let cond = engine.stack.last_mut().unwrap().book.operands.pop().unwrap_or(Value::Undefined);
    if cond.to_bool() {
        let top = engine.stack.last_mut().unwrap();
        top.book.switch_matched = None;
        let b = body.clone();
        push_child(engine, b);
    } else {
        finish(engine, Value::Undefined);
    }
    StepOutcome::Continued
}

fn dispatch_for(engine: &mut Engine, init: Option<&NodeRef>, test: Option<&NodeRef>, update: Option<&NodeRef>, body: &NodeRef) -> StepOutcome {
    const PHASE_INIT: usize = 0;
    const PHASE_TEST: usize = 1;
    const PHASE_BODY: usize = 2;
    const PHASE_UPDATE: usize = 3;

    let top = engine.stack.last_mut().unwrap();
    top.book.is_loop = true;
    let phase = top.book.child_index;
    match phase {
        PHASE_INIT => {
            top.book.child_index = PHASE_TEST;
            top.book.operands.clear();
            match init {
                Some(i) => {
                    let i = i.clone();
                    push_child(engine, i);
                }
                None => return dispatch_for(engine, init, test, update, body),
            }
        }
        PHASE_TEST => {
            top.book.operands.clear();
            top.book.child_index = PHASE_BODY;
            match test {
                Some(t) => {
                    let t = t.clone();
                    push_child(engine, t);
                }
                None => return dispatch_for(engine, init, test, update, body),
            }
        }
        PHASE_BODY => {
            let cond = top.book.operands.pop().map(|v| v.to_bool()).unwrap_or(true);
            top.book.operands.clear();
            if !cond {
                finish(engine, Value::Undefined);
                return StepOutcome::Continued;
            }
            top.book.child_index = PHASE_UPDATE;
            let b = body.clone();
            push_child(engine, b);
        }
        PHASE_UPDATE => {
            top.book.operands.clear();
            top.book.child_index = PHASE_TEST;
            match update {
                Some(u) => {
                    let u = u.clone();
                    push_child(engine, u);
                }
                None => return dispatch_for(engine, init, test, update, body),
            }
        }
        _ => unreachable!(),
    }
    StepOutcome::Continued
}

fn dispatch_for_in(engine: &mut Engine, left: &NodeRef, right: &NodeRef, body: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    top.book.is_loop = true;
    if top.book.for_in_object.is_none() && top.book.child_index == 0 {
        top.book.child_index = 1;
        let r = right.clone();
        push_child(engine, r);
        return StepOutcome::Continued;
    }
    if top.book.for_in_object.is_none() {
        let obj_val = engine.stack.last_mut().unwrap().book.operands.pop().unwrap_or(Value::Undefined);
        let top = engine.stack.last_mut().unwrap();
        top.book.for_in_keys = collect_for_in_keys(&obj_val, &mut top.book.for_in_seen);
        top.book.for_in_object = Some(obj_val);
        top.book.operands.clear();
    }
    advance_for_in(engine, left, body)
}

fn collect_for_in_keys(value: &Value, seen: &mut std::collections::HashSet<String>) -> Vec<String> {
    let mut keys = Vec::new();
    match value {
        Value::Obj(obj) => {
            let mut current = Some(obj.clone());
            while let Some(o) = current {
                for k in o.borrow().own_enumerable_keys() {
                    if seen.insert(k.clone()) {
                        keys.push(k);
                    }
                }
                current = o.borrow().proto.clone();
            }
        }
        Value::Str(s) => {
            for i in 0..s.encode_utf16().count() {
                keys.push(i.to_string());
            }
        }
        _ => {}
    }
    keys
}

fn advance_for_in(engine: &mut Engine, left: &NodeRef, body: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    // After a body iteration, drop its result before moving on.
    if top.book.switch_default == Some(1) {
        top.book.switch_default = Some(0);
    }
    let Some(key) = (if top.book.for_in_keys.is_empty() { None } else { Some(top.book.for_in_keys.remove(0)) }) else {
        finish(engine, Value::Undefined);
        return StepOutcome::Continued;
    };
    let scope = top.scope.clone();
    let name = match &left.kind {
        NodeKind::VariableDeclaration { declarations, .. } => declarations[0].id.name.clone(),
        NodeKind::Identifier { name } => name.clone(),
        _ => panic!("unsupported for-in left-hand side"),
    };
    hoist_var(&scope, &name);
    assign_to_scope(&scope, &name, Value::str(key));
    top.book.switch_default = Some(1);
    let b = body.clone();
    push_child(engine, b);
    StepOutcome::Continued
}

/// A `switch` proceeds in three stages tracked by `book.child_index`:
/// 0 evaluates the discriminant, then one step per `case` test expression
/// until a strict-equal match (or the `default` marker) is found, then the
/// matched case's consequent statements run as one flattened stream (spec
/// §4.2 SwitchStatement, fallthrough into subsequent cases).
fn dispatch_switch(engine: &mut Engine, discriminant: &NodeRef, cases: &[SwitchCase]) -> StepOutcome {
    const PHASE_DISCRIMINANT: usize = 0;

    let top = engine.stack.last_mut().unwrap();
    top.book.is_switch = true;
    if top.book.child_index == PHASE_DISCRIMINANT {
        top.book.child_index = 1;
        let d = discriminant.clone();
        push_child(engine, d);
        return StepOutcome::Continued;
    }
    if !top.book.switch_discriminant_ready {
        top.book.switch_discriminant_ready = true;
        top.result = top.book.operands.pop().unwrap_or(Value::Undefined);
    }
    if top.book.switch_matched.is_none() {
        run_switch_search(engine, cases)
    } else {
        run_switch_body(engine, cases)
    }
}

/// Tries case tests `child_index - 1 .. cases.len()` in order; `child_index`
/// during this phase is `1 + test_idx` for whichever test is pending.
fn run_switch_search(engine: &mut Engine, cases: &[SwitchCase]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let disc = top.result.clone();
    let mut test_idx = top.book.child_index - 1;
    if let Some(tested) = top.book.operands.pop() {
        if tested.strict_eq(&disc) {
            top.book.switch_matched = Some(test_idx);
            return run_switch_body(engine, cases);
        }
        test_idx += 1;
    }
    loop {
        if test_idx >= cases.len() {
            top.book.switch_matched = top.book.switch_default.or(Some(cases.len()));
            return run_switch_body(engine, cases);
        }
        match &cases[test_idx].test {
            None => {
                top.book.switch_default = Some(test_idx);
                test_idx += 1;
            }
            Some(t) => {
                top.book.child_index = test_idx + 1;
                let t = t.clone();
                push_child(engine, t);
                return StepOutcome::Continued;
            }
        }
    }
}

fn run_switch_body(engine: &mut Engine, cases: &[SwitchCase]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let matched = top.book.switch_matched.unwrap();
    if matched >= cases.len() {
        finish(engine, Value::Undefined);
        return StepOutcome::Continued;
    }
    let flat: Vec<NodeRef> = cases[matched..].iter().flat_map(|c| c.consequent.iter().cloned()).collect();
    let pos = top.book.switch_body_pos;
    if pos >= flat.len() {
        finish(engine, Value::Undefined);
        return StepOutcome::Continued;
    }
    top.book.switch_body_pos += 1;
    let stmt = flat[pos].clone();
    push_child(engine, stmt);
    StepOutcome::Continued
}

fn dispatch_labeled(engine: &mut Engine, label: String, body: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if !top.book.labels.contains(&label) {
        top.book.labels.push(label);
        top.book.is_loop = true; // so an unlabeled Break targeting loops also matches if body is a loop
        let b = body.clone();
        push_child(engine, b);
        return StepOutcome::Continued;
    }
    let v = top.book.operands.pop().unwrap_or(Value::Undefined);
    finish(engine, v);
    StepOutcome::Continued
}

fn dispatch_with(engine: &mut Engine, object: &NodeRef, body: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if top.book.child_index == 0 {
        top.book.child_index = 1;
        let o = object.clone();
        push_child(engine, o);
        return StepOutcome::Continued;
    }
    if top.book.child_index == 1 {
        let obj_val = top.book.operands.pop().unwrap_or(Value::Undefined);
        let Value::Obj(obj) = obj_val else {
            return engine.throw_type_error("with statement requires an object");
        };
        let parent = top.scope.clone();
        let strict = parent.borrow().strict;
        let with_scope = Rc::new(std::cell::RefCell::new(Scope { parent: Some(parent), strict, bag: obj }));
        top.book.child_index = 2;
        engine.stack.push(Frame::new(body.clone(), with_scope));
        return StepOutcome::Continued;
    }
    let v = engine.stack.last_mut().unwrap().book.operands.pop().unwrap_or(Value::Undefined);
    finish(engine, v);
    StepOutcome::Continued
}

// ---------------------------------------------------------------------
// Exceptions (spec §4.3)
// ---------------------------------------------------------------------

fn dispatch_throw_stmt(engine: &mut Engine, argument: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if top.book.child_index == 0 {
        top.book.child_index = 1;
        let a = argument.clone();
        push_child(engine, a);
        return StepOutcome::Continued;
    }
    let v = top.book.operands.pop().unwrap_or(Value::Undefined);
    engine.unwind(Completion::Throw(v));
    StepOutcome::Continued
}

fn dispatch_return(engine: &mut Engine, argument: Option<&NodeRef>) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    match argument {
        Some(a) if top.book.child_index == 0 => {
            top.book.child_index = 1;
            let a = a.clone();
            push_child(engine, a);
            StepOutcome::Continued
        }
        Some(_) => {
            let v = top.book.operands.pop().unwrap_or(Value::Undefined);
            engine.unwind(Completion::Return(v));
            StepOutcome::Continued
        }
        None => {
            engine.unwind(Completion::Return(Value::Undefined));
            StepOutcome::Continued
        }
    }
}

fn dispatch_try(engine: &mut Engine, block: &NodeRef, handler: Option<&CatchClause>, finalizer: Option<&NodeRef>) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    match top.book.try_phase {
        TryPhase::Block if top.book.child_index == 0 => {
            top.book.child_index = 1;
            let b = block.clone();
            push_child(engine, b);
            StepOutcome::Continued
        }
        TryPhase::Block => {
            top.book.operands.pop();
            match top.book.captured_completion.take() {
                Some(Completion::Throw(v)) if handler.is_some() => {
                    let h = handler.unwrap();
                    let scope = top.scope.clone();
                    let catch_scope = Scope::new_child(&scope, scope.borrow().strict);
                    if let Some(param) = &h.param {
                        catch_scope.borrow().bag.borrow_mut().define_data(&param.name, v, true, true, false);
                    }
                    top.book.try_phase = TryPhase::Catch;
                    engine.stack.push(Frame::new(h.body.clone(), catch_scope));
                    StepOutcome::Continued
                }
                captured => {
                    top.book.captured_completion = captured;
                    enter_finally_or_finish(engine, finalizer)
                }
            }
        }
        TryPhase::Catch => {
            top.book.operands.pop();
            top.book.try_phase = TryPhase::Finally;
            enter_finally_or_finish(engine, finalizer)
        }
        TryPhase::Finally => {
            top.book.operands.pop();
            top.book.try_phase = TryPhase::Done;
            finish_try(engine)
        }
        TryPhase::Done => finish_try(engine),
    }
}

fn enter_finally_or_finish(engine: &mut Engine, finalizer: Option<&NodeRef>) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    top.book.try_phase = TryPhase::Finally;
    match finalizer {
        Some(f) => {
            let f = f.clone();
            push_child(engine, f);
            StepOutcome::Continued
        }
        None => {
            top.book.try_phase = TryPhase::Done;
            finish_try(engine)
        }
    }
}

fn finish_try(engine: &mut Engine) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if let Some(completion) = top.book.captured_completion.take() {
        if completion.is_abrupt() {
            engine.unwind(completion);
            return StepOutcome::Continued;
        }
    }
    finish(engine, Value::Undefined);
    StepOutcome::Continued
}

// ---------------------------------------------------------------------
// Identifiers and references
// ---------------------------------------------------------------------

fn dispatch_identifier(engine: &mut Engine, name: &str) -> StepOutcome {
    let scope = current_scope(engine);
    match resolve_identifier(&scope, name) {
        Ok(GetOutcome::Value(v)) => {
            finish(engine, v);
            StepOutcome::Continued
        }
        Ok(GetOutcome::Pending { func, this }) => {
            engine.stack.last_mut().unwrap().book.pending_accessor = Some(PendingAccessor::Get { func, this });
            StepOutcome::Continued
        }
        Err(Unresolved) => engine.throw_exception(ThrowPayload::Class(GuestErrorClass::ReferenceError, format!("{name} is not defined"))),
    }
}

struct Unresolved;

/// Walks the scope chain outward; on the global scope falls through to
/// property access on the global object, which may invoke a getter (spec
/// §4.4).
fn resolve_identifier(scope: &ScopeRef, name: &str) -> Result<GetOutcome, Unresolved> {
    let mut current = Some(scope.clone());
    while let Some(s) = current {
        let bag = s.borrow().bag.clone();
        let has = bag.borrow().properties.contains_key(name) || bag.borrow().is_accessor(name);
        if has {
            let receiver = Value::Obj(bag.clone());
            return Ok(property::get_property(&receiver, name).unwrap_or(GetOutcome::Value(Value::Undefined)));
        }
        if s.borrow().is_global() {
            return Err(Unresolved);
        }
        current = s.borrow().parent.clone();
    }
    Err(Unresolved)
}

/// `typeof` never throws on an unresolved identifier (spec §4.4, §8).
fn resolve_identifier_for_typeof(scope: &ScopeRef, name: &str) -> Value {
    match resolve_identifier(scope, name) {
        Ok(GetOutcome::Value(v)) => v,
        _ => Value::Undefined,
    }
}

// ---------------------------------------------------------------------
// Literals, arrays, objects
// ---------------------------------------------------------------------

fn dispatch_array_literal(engine: &mut Engine, elements: &[Option<NodeRef>]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let idx = top.book.child_index;
    if idx >= elements.len() {
        let array_proto = engine.protos.array.clone();
        let arr = GuestObject::new("Array", Some(array_proto));
        {
            let mut b = arr.borrow_mut();
            for (i, v) in top.book.operands.drain(..).enumerate() {
                b.properties.insert(i.to_string(), crate::object::PropertySlot::data(v, true, true, true));
            }
            b.properties.insert(
                "length".to_string(),
                crate::object::PropertySlot::data(Value::Num(elements.len() as f64), true, false, false),
            );
        }
        finish(engine, Value::Obj(arr));
        return StepOutcome::Continued;
    }
    top.book.child_index += 1;
    match &elements[idx] {
        Some(e) => {
            let e = e.clone();
            push_child(engine, e);
        }
        None => {
            engine.stack.last_mut().unwrap().book.operands.push(Value::Undefined);
        }
    }
    StepOutcome::Continued
}

fn dispatch_object_literal(engine: &mut Engine, properties: &[crate::ast::ObjectProperty]) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let idx = top.book.child_index;
    if idx > 0 {
        // The previous property's value (or computed key) finished.
    }
    if idx >= properties.len() {
        finish_object_literal(engine, properties)
    } else {
        top.book.child_index += 1;
        let value = properties[idx].value.clone();
        push_child(engine, value);
        StepOutcome::Continued
    }
}

fn finish_object_literal(engine: &mut Engine, properties: &[crate::ast::ObjectProperty]) -> StepOutcome {
    let object_proto = engine.protos.object.clone();
    let obj = GuestObject::new("Object", Some(object_proto));
    let top = engine.stack.last_mut().unwrap();
    let values = std::mem::take(&mut top.book.operands);
    for (prop, value) in properties.iter().zip(values.into_iter()) {
        let key = match &prop.key {
            PropertyKeyNode::Name(n) => n.clone(),
            PropertyKeyNode::Computed(_) => {
                // Computed keys are resolved eagerly to their string form at
                // literal-construction time in this simplified evaluator.
                property::primitive_to_display_string(&value)
            }
        };
        match prop.kind {
            PropKind::Init => {
                obj.borrow_mut().define_data(&key, value, true, true, true);
            }
            PropKind::Get => {
                if let Value::Obj(f) = value {
                    let existing_setter = obj.borrow().setters.get(&key).cloned();
                    obj.borrow_mut().define_accessor(&key, Some(f), existing_setter);
                }
            }
            PropKind::Set => {
                if let Value::Obj(f) = value {
                    let existing_getter = obj.borrow().getters.get(&key).cloned();
                    obj.borrow_mut().define_accessor(&key, existing_getter, Some(f));
                }
            }
        }
    }
    finish(engine, Value::Obj(obj));
    StepOutcome::Continued
}

// ---------------------------------------------------------------------
// MemberExpression (spec §4.2)
// ---------------------------------------------------------------------

fn dispatch_member(engine: &mut Engine, object: &NodeRef, property_node: &NodeRef, computed: bool) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    match top.book.child_index {
        0 => {
            top.book.child_index = 1;
            let o = object.clone();
            push_child(engine, o);
            StepOutcome::Continued
        }
        1 => {
            top.book.child_index = 2;
            if computed {
                let p = property_node.clone();
                push_child(engine, p);
                StepOutcome::Continued
            } else {
                let NodeKind::Identifier { name } = &property_node.kind else {
                    panic!("non-computed member property must be an Identifier");
                };
                engine.stack.last_mut().unwrap().book.operands.push(Value::str(name.as_str()));
                finish_member_read(engine)
            }
        }
        2 => finish_member_read(engine),
        _ => unreachable!(),
    }
}

fn finish_member_read(engine: &mut Engine) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let key_val = top.book.operands.pop().unwrap_or(Value::Undefined);
    let obj_val = top.book.operands.pop().unwrap_or(Value::Undefined);
    let key = property::primitive_to_display_string(&key_val);
    let outcome = property::get_property_full(&obj_val, &key, &engine.protos.string, &engine.protos.number, &engine.protos.boolean);
    match outcome {
        Ok(GetOutcome::Value(v)) => {
            finish(engine, v);
            StepOutcome::Continued
        }
        Ok(GetOutcome::Pending { func, this }) => {
            top.book.pending_accessor = Some(PendingAccessor::Get { func, this });
            StepOutcome::Continued
        }
        Err(e) => engine.throw_from_property_error(e),
    }
}

/// Evaluates a node that must yield a `Reference` rather than a value
/// (spec §4.2: AssignmentExpression/UpdateExpression evaluate the
/// left-hand side as a reference first).
fn dispatch_as_reference(engine: &mut Engine, node: &NodeRef) -> Option<Reference> {
    match &node.kind {
        NodeKind::Identifier { name } => Some(Reference::Binding {
            scope: current_scope(engine),
            name: name.clone(),
        }),
        _ => None, // MemberExpression references are resolved via the two-phase path below
    }
}

// ---------------------------------------------------------------------
// Calls (spec §4.2 CallExpression/NewExpression)
// ---------------------------------------------------------------------

fn dispatch_call(engine: &mut Engine, callee: &NodeRef, arguments: &[NodeRef], is_new: bool) -> StepOutcome {
    const PHASE_CALLEE_OBJECT: usize = 0;
    const PHASE_CALLEE_KEY: usize = 1;
    const PHASE_ARGS: usize = 2;

    let top = engine.stack.last_mut().unwrap();
    top.book.is_loop = false; // CallExpression frames must not be mistaken for loop frames by unwind

    if top.book.callee.is_some() {
        return dispatch_call_arguments(engine, arguments, is_new);
    }

    match &callee.kind {
        // A member callee is evaluated in two steps so `this` is the
        // receiving object (spec §4.2 CallExpression).
        NodeKind::MemberExpression { object, property: prop, computed } => match top.book.child_index {
            PHASE_CALLEE_OBJECT => {
                top.book.child_index = PHASE_CALLEE_KEY;
                push_child(engine, object.clone());
                StepOutcome::Continued
            }
            PHASE_CALLEE_KEY => {
                let object_val = top.book.operands.pop().unwrap_or(Value::Undefined);
                top.book.this_value = Some(object_val.clone());
                if *computed {
                    top.book.callee_awaiting_key = true;
                    top.book.child_index = PHASE_ARGS;
                    push_child(engine, prop.clone());
                    StepOutcome::Continued
                } else {
                    let NodeKind::Identifier { name } = &prop.kind else { panic!("bad member key") };
                    resolve_member_callee(engine, object_val, name.clone())
                }
            }
            _ if top.book.callee_awaiting_key => {
                top.book.callee_awaiting_key = false;
                let key_val = top.book.operands.pop().unwrap_or(Value::Undefined);
                let object_val = top.book.this_value.clone().unwrap_or(Value::Undefined);
                let key = property::primitive_to_display_string(&key_val);
                resolve_member_callee(engine, object_val, key)
            }
            _ => dispatch_call_arguments(engine, arguments, is_new),
        },
        _ => match top.book.child_index {
            PHASE_CALLEE_OBJECT => {
                top.book.child_index = PHASE_ARGS;
                push_child(engine, callee.clone());
                StepOutcome::Continued
            }
            _ => {
                let callee_val = top.book.operands.pop().unwrap_or(Value::Undefined);
                top.book.this_value = Some(Value::Undefined);
                top.book.callee = Some(callee_val);
                dispatch_call_arguments(engine, arguments, is_new)
            }
        },
    }
}

fn resolve_member_callee(engine: &mut Engine, object_val: Value, key: String) -> StepOutcome {
    let outcome = property::get_property_full(&object_val, &key, &engine.protos.string, &engine.protos.number, &engine.protos.boolean);
    match outcome {
        Ok(GetOutcome::Value(v)) => {
            engine.stack.last_mut().unwrap().book.callee = Some(v);
            StepOutcome::Continued
        }
        Ok(GetOutcome::Pending { func, this }) => {
            engine.stack.last_mut().unwrap().book.pending_accessor = Some(PendingAccessor::Get { func, this });
            StepOutcome::Continued
        }
        Err(e) => engine.throw_from_property_error(e),
    }
}

fn dispatch_call_arguments(engine: &mut Engine, arguments: &[NodeRef], is_new: bool) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if top.book.call_dispatched {
        // The pushed call frame (guest function body, or a synthetic getter
        // call triggered while evaluating arguments) just returned. Its
        // result landed in `operands` via normal-completion propagation, so
        // this check must win over the argument-count check below or a
        // multi-argument call re-pushes and re-evaluates a later argument.
        let v = top.result.clone();
        finish(engine, v);
        return StepOutcome::Continued;
    }
    let consumed_so_far = top.book.operands.len();
    if consumed_so_far < arguments.len() {
        let idx = consumed_so_far;
        let a = arguments[idx].clone();
        push_child(engine, a);
        return StepOutcome::Continued;
    }
    top.book.call_dispatched = true;
    let args = std::mem::take(&mut top.book.operands);
    let callee = top.book.callee.clone().unwrap_or(Value::Undefined);
    let this = top.book.this_value.clone().unwrap_or(Value::Undefined);
    perform_call(engine, callee, this, args, is_new)
}

fn perform_call(engine: &mut Engine, callee: Value, this: Value, args: Vec<Value>, is_new: bool) -> StepOutcome {
    let Value::Obj(func) = &callee else {
        return engine.throw_type_error(format!("{} is not a function", property::primitive_to_display_string(&callee)));
    };
    if !GuestObject::is_callable(func) {
        return engine.throw_type_error(format!("{} is not a function", property::primitive_to_display_string(&callee)));
    }
    if is_new && !GuestObject::is_constructor(func) {
        return engine.throw_type_error("not a constructor");
    }
    if is_new && func.borrow().illegal_constructor {
        return engine.throw_type_error("this function cannot be invoked with 'new'");
    }

    let this_for_call = if is_new {
        let proto = func
            .borrow()
            .properties
            .get("prototype")
            .and_then(|s| s.value.as_object().cloned())
            .unwrap_or_else(|| engine.protos.object.clone());
        Value::Obj(GuestObject::new("Object", Some(proto)))
    } else {
        this
    };

    let kind = func.borrow().kind.clone();
    match kind {
        ObjectKind::NativeFn { id, .. } => {
            let imp = engine.native_fns[id].imp.clone();
            match imp(engine, &this_for_call, &args) {
                Ok(v) => {
                    let result = if is_new {
                        match v {
                            Value::Obj(_) => v,
                            _ => this_for_call,
                        }
                    } else {
                        v
                    };
                    finish(engine, result);
                    StepOutcome::Continued
                }
                Err(ThrowPayload::Class(c, m)) => engine.throw_exception(ThrowPayload::Class(c, m)),
                Err(ThrowPayload::Value(v)) => engine.throw_exception(ThrowPayload::Value(v)),
            }
        }
        ObjectKind::AsyncFn { id, .. } => {
            let imp = engine.async_fns[id].imp.clone();
            let handle = engine.new_async_handle();
            match imp(engine, &this_for_call, &args, handle) {
                Ok(()) => StepOutcome::Continued,
                Err(ThrowPayload::Class(c, m)) => {
                    engine.paused = false;
                    engine.pending_async_id = None;
                    engine.throw_exception(ThrowPayload::Class(c, m))
                }
                Err(ThrowPayload::Value(v)) => {
                    engine.paused = false;
                    engine.pending_async_id = None;
                    engine.throw_exception(ThrowPayload::Value(v))
                }
            }
        }
        ObjectKind::GuestFn { node, params, parent_scope, is_strict, .. } => {
            let scope = Scope::new_child(&parent_scope, is_strict);
            bind_call_scope(&scope, &params, &args, &this_for_call, func);
            hoist_function_body(&scope, &node);
            engine.stack.push(Frame::new(node, scope));
            StepOutcome::Continued
        }
        ObjectKind::EvalFn => perform_eval(engine, &args, is_new, this_for_call),
        ObjectKind::Plain => unreachable!("is_callable already checked"),
    }
}

fn bind_call_scope(scope: &ScopeRef, params: &[String], args: &[Value], this: &Value, func: &ObjectRef) {
    let bag = scope.borrow().bag.clone();
    let mut b = bag.borrow_mut();
    b.define_data("this", this.clone(), false, false, false);

    let arguments_obj = GuestObject::new("Arguments", None);
    {
        let mut a = arguments_obj.borrow_mut();
        for (i, v) in args.iter().enumerate() {
            a.properties.insert(i.to_string(), crate::object::PropertySlot::data(v.clone(), true, true, true));
        }
        a.properties.insert(
            "length".to_string(),
            crate::object::PropertySlot::data(Value::Num(args.len() as f64), true, false, true),
        );
    }
    b.define_data("arguments", Value::Obj(arguments_obj), true, false, false);

    for (i, p) in params.iter().enumerate() {
        let v = args.get(i).cloned().unwrap_or(Value::Undefined);
        b.define_data(p, v, true, true, false);
    }
    if let Some(name_slot) = func.borrow().properties.get("name") {
        // A named function expression can refer to itself by name from
        // inside its own body (spec §4.4 closures over the defining scope);
        // bind the function's own name if params did not already use it.
        let name = property::primitive_to_display_string(&name_slot.value);
        if !name.is_empty() && !b.properties.contains_key(&name) {
            b.define_data(&name, Value::Obj(func.clone()), false, true, false);
        }
    }
}

/// Hoists `var`/function declarations into a freshly entered function body
/// (spec §4.4); does not descend into nested function bodies.
fn hoist_function_body(scope: &ScopeRef, body: &NodeRef) {
    let NodeKind::BlockStatement { body } = &body.kind else {
        return;
    };
    promote_strict_from_directive(scope, body);
    for stmt in body {
        hoist_statement(scope, stmt);
    }
}

fn promote_strict_from_directive(scope: &ScopeRef, body: &[NodeRef]) {
    if let Some(first) = body.first() {
        if let NodeKind::ExpressionStatement { expression } = &first.kind {
            if let NodeKind::Literal { value: Literal::Str { value } } = &expression.kind {
                if value == "use strict" {
                    scope.borrow_mut().strict = true;
                }
            }
        }
    }
}

/// Walks a statement list hoisting `var`s and function declarations (spec
/// §4.4); recurses into nested statements but not into function bodies.
pub(crate) fn hoist_statement(scope: &ScopeRef, stmt: &NodeRef) {
    match &stmt.kind {
        NodeKind::VariableDeclaration { declarations, .. } => {
            for d in declarations {
                hoist_var(scope, &d.id.name);
            }
        }
        NodeKind::FunctionDeclaration { id, params, body } => {
            hoist_var(scope, &id.name);
            let func = make_guest_function(scope, params, body, Some(id.name.clone()), scope.borrow().strict);
            scope.borrow().bag.borrow_mut().define_data(&id.name, Value::Obj(func), true, true, false);
        }
        NodeKind::BlockStatement { body } => {
            for s in body {
                hoist_statement(scope, s);
            }
        }
        NodeKind::IfStatement { consequent, alternate, .. } => {
            hoist_statement(scope, consequent);
            if let Some(a) = alternate {
                hoist_statement(scope, a);
            }
        }
        NodeKind::WhileStatement { body, .. } | NodeKind::DoWhileStatement { body, .. } => hoist_statement(scope, body),
        NodeKind::ForStatement { init, body, .. } => {
            if let Some(i) = init {
                hoist_statement(scope, i);
            }
            hoist_statement(scope, body);
        }
        NodeKind::ForInStatement { left, body, .. } => {
            hoist_statement(scope, left);
            hoist_statement(scope, body);
        }
        NodeKind::TryStatement { block, handler, finalizer } => {
            hoist_statement(scope, block);
            if let Some(h) = handler {
                hoist_statement(scope, &h.body);
            }
            if let Some(f) = finalizer {
                hoist_statement(scope, f);
            }
        }
        NodeKind::SwitchStatement { cases, .. } => {
            for c in cases {
                for s in &c.consequent {
                    hoist_statement(scope, s);
                }
            }
        }
        NodeKind::LabeledStatement { body, .. } => hoist_statement(scope, body),
        NodeKind::WithStatement { body, .. } => hoist_statement(scope, body),
        _ => {}
    }
}

fn make_guest_function(parent_scope: &ScopeRef, params: &[crate::ast::Identifier], body: &NodeRef, name: Option<String>, strict: bool) -> ObjectRef {
    let func = GuestObject::new("Function", None); // prototype set by caller context in full builtins::install
    let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    func.borrow_mut().kind = ObjectKind::GuestFn {
        node: body.clone(),
        params: Rc::new(param_names.clone()),
        name: name.clone(),
        parent_scope: parent_scope.clone(),
        is_strict: strict,
    };
    func.borrow_mut().define_data("length", Value::Num(param_names.len() as f64), false, false, true);
    func.borrow_mut().define_data("name", Value::str(name.unwrap_or_default()), false, false, true);
    let proto_obj = GuestObject::new("Object", None);
    proto_obj.borrow_mut().define_data("constructor", Value::Obj(func.clone()), true, false, true);
    func.borrow_mut().define_data("prototype", Value::Obj(proto_obj), true, false, false);
    func
}

/// `eval()` dispatch (spec §4.2 CallExpression, §1): parses the argument
/// through the host-configured `SourceParser`, strips source locations to
/// the call site, and runs it in the caller's scope (or a fresh strict
/// scope, per spec).
fn perform_eval(engine: &mut Engine, args: &[Value], _is_new: bool, _this: Value) -> StepOutcome {
    let Some(Value::Str(src)) = args.first() else {
        let v = args.first().cloned().unwrap_or(Value::Undefined);
        finish(engine, v);
        return StepOutcome::Continued;
    };
    let Some(parser) = &engine.parser else {
        return engine.throw_exception(ThrowPayload::Class(GuestErrorClass::EvalError, "eval() requires a configured source parser".to_string()));
    };
    let parsed = match parser.parse(src) {
        Ok(p) => p,
        Err(msg) => return engine.throw_exception(ThrowPayload::Class(GuestErrorClass::SyntaxError, msg)),
    };
    let NodeKind::Program { body } = &parsed.kind else {
        return engine.throw_exception(ThrowPayload::Class(GuestErrorClass::SyntaxError, "eval() parser must return a Program".to_string()));
    };
    let stripped: Vec<NodeRef> = body.iter().map(|n| strip_locations(n)).collect();
    let caller_scope = current_scope(engine);
    let eval_scope = if caller_scope.borrow().strict {
        Scope::new_child(&caller_scope, true)
    } else {
        caller_scope.clone()
    };
    for s in &stripped {
        hoist_statement(&eval_scope, s);
    }
    let program = Node::new(NodeKind::Program { body: stripped });
    engine.stack.push(Frame::new(program, eval_scope));
    StepOutcome::Continued
}

fn strip_locations(node: &NodeRef) -> NodeRef {
    // A deep clone with `loc: None` so eval'd code is never mistaken for
    // polyfill bootstrap by the dispatcher (spec §4.2 point 5) while still
    // not attributing positions from the call site's own source.
    Rc::new(Node { kind: node.kind.clone(), loc: None })
}

// ---------------------------------------------------------------------
// Assignment / update (spec §4.2)
// ---------------------------------------------------------------------

fn dispatch_assignment(engine: &mut Engine, operator: &str, left: &NodeRef, right: &NodeRef) -> StepOutcome {
    const PHASE_LHS_OBJ: usize = 0;
    const PHASE_LHS_KEY: usize = 1;
    const PHASE_RHS: usize = 2;
    const PHASE_APPLY: usize = 3;

    let top = engine.stack.last_mut().unwrap();
    match top.book.child_index {
        PHASE_LHS_OBJ => {
            if let NodeKind::MemberExpression { object, .. } = &left.kind {
                top.book.child_index = PHASE_LHS_KEY;
                let o = object.clone();
                push_child(engine, o);
            } else {
                top.book.child_index = PHASE_RHS;
                top.book.reference = dispatch_as_reference(engine, left);
                let r = right.clone();
                push_child(engine, r);
            }
            StepOutcome::Continued
        }
        PHASE_LHS_KEY => {
            let NodeKind::MemberExpression { property: prop, computed, .. } = &left.kind else {
                unreachable!()
            };
            let object_val = top.book.operands.pop().unwrap_or(Value::Undefined);
            top.book.this_value = Some(object_val.clone());
            top.book.child_index = PHASE_RHS;
            if *computed {
                let p = prop.clone();
                push_child(engine, p);
            } else {
                let NodeKind::Identifier { name } = &prop.kind else { panic!("bad member key") };
                top.book.reference = Some(Reference::Property { object: object_val, key: name.clone() });
                let r = right.clone();
                push_child(engine, r);
            }
            StepOutcome::Continued
        }
        PHASE_RHS if top.book.reference.is_none() || matches!(&top.book.reference, Some(Reference::Property{key,..}) if key.is_empty()) => {
            // Computed member key just finished; fold it into the reference then push RHS.
            let key_val = top.book.operands.pop().unwrap_or(Value::Undefined);
            let object_val = top.book.this_value.clone().unwrap_or(Value::Undefined);
            top.book.reference = Some(Reference::Property {
                object: object_val,
                key: property::primitive_to_display_string(&key_val),
            });
            top.book.child_index = PHASE_APPLY;
            let r = right.clone();
            push_child(engine, r);
            StepOutcome::Continued
        }
        PHASE_RHS => {
            top.book.child_index = PHASE_APPLY;
            StepOutcome::Continued
        }
        _ => apply_assignment(engine, operator),
    }
}

fn apply_assignment(engine: &mut Engine, operator: &str) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    let rhs = top.book.operands.pop().unwrap_or(Value::Undefined);
    let reference = top.book.reference.clone().expect("assignment reference must be resolved");
    let strict = top.scope.borrow().strict;

    let current = if operator == "=" {
        Value::Undefined
    } else {
        match read_reference(&reference) {
            Ok(v) => v,
            Err(e) => return engine.throw_from_property_error(e),
        }
    };
    let new_value = if operator == "=" { rhs } else { apply_compound_op(operator, &current, &rhs) };

    write_reference(engine, &reference, new_value, strict)
}

fn read_reference(reference: &Reference) -> Result<Value, PropertyError> {
    match reference {
        Reference::Binding { scope, name } => match resolve_identifier(scope, name) {
            Ok(GetOutcome::Value(v)) => Ok(v),
            Ok(GetOutcome::Pending { .. }) => Ok(Value::Undefined), // rare: compound-assign through a getter binding
            Err(_) => Ok(Value::Undefined),
        },
        Reference::Property { object, key } => match property::get_property(object, key) {
            Ok(GetOutcome::Value(v)) => Ok(v),
            Ok(GetOutcome::Pending { .. }) => Ok(Value::Undefined),
            Err(e) => Err(e),
        },
    }
}

fn write_reference(engine: &mut Engine, reference: &Reference, value: Value, strict: bool) -> StepOutcome {
    match reference {
        Reference::Binding { scope, name } => {
            assign_to_scope(scope, name, value.clone());
            finish(engine, value);
            StepOutcome::Continued
        }
        Reference::Property { object, key } => match property::set_property(object, key, value.clone(), strict) {
            Ok(SetOutcome::Done) => {
                finish(engine, value);
                StepOutcome::Continued
            }
            Ok(SetOutcome::Pending { func, this, arg }) => {
                engine.stack.last_mut().unwrap().book.pending_accessor = Some(PendingAccessor::Set { func, this, arg });
                engine.stack.last_mut().unwrap().result = value;
                StepOutcome::Continued
            }
            Err(e) => engine.throw_from_property_error(e),
        },
    }
}

fn apply_compound_op(operator: &str, current: &Value, rhs: &Value) -> Value {
    let op = operator.trim_end_matches('=');
    binary_op(op, current, rhs)
}

fn dispatch_update(engine: &mut Engine, operator: &str, argument: &NodeRef, prefix: bool) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    if top.book.child_index == 0 {
        top.book.child_index = 1;
        if let NodeKind::MemberExpression { object, .. } = &argument.kind {
            let o = object.clone();
            push_child(engine, o);
        } else {
            top.book.reference = dispatch_as_reference(engine, argument);
            top.book.child_index = 2;
        }
        return StepOutcome::Continued;
    }
    if top.book.child_index == 1 {
        let NodeKind::MemberExpression { property: prop, computed, .. } = &argument.kind else {
            unreachable!()
        };
        let object_val = top.book.operands.pop().unwrap_or(Value::Undefined);
        if *computed {
            top.book.this_value = Some(object_val);
            top.book.child_index = 2;
            let p = prop.clone();
            push_child(engine, p);
        } else {
            let NodeKind::Identifier { name } = &prop.kind else { panic!("bad member key") };
            top.book.reference = Some(Reference::Property { object: object_val, key: name.clone() });
            top.book.child_index = 2;
        }
        return StepOutcome::Continued;
    }
    if top.book.reference.is_none() {
        let key_val = top.book.operands.pop().unwrap_or(Value::Undefined);
        let object_val = top.book.this_value.clone().unwrap_or(Value::Undefined);
        top.book.reference = Some(Reference::Property {
            object: object_val,
            key: property::primitive_to_display_string(&key_val),
        });
    }
    let reference = top.book.reference.clone().unwrap();
    let old = match read_reference(&reference) {
        Ok(v) => v,
        Err(e) => return engine.throw_from_property_error(e),
    };
    let old_num = old.to_number_primitive();
    let new_num = if operator == "++" { old_num + 1.0 } else { old_num - 1.0 };
    let strict = top.scope.borrow().strict;
    let result_value = if prefix { Value::Num(new_num) } else { Value::Num(old_num) };
    match write_reference(engine, &reference, Value::Num(new_num), strict) {
        StepOutcome::Threw => StepOutcome::Threw,
        StepOutcome::Continued => {
            if engine.stack.last().unwrap().done {
                engine.stack.last_mut().unwrap().result = result_value;
            }
            StepOutcome::Continued
        }
    }
}

// ---------------------------------------------------------------------
// Binary / logical / unary
// ---------------------------------------------------------------------

fn dispatch_binary(engine: &mut Engine, operator: &str, left: &NodeRef, right: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    match top.book.child_index {
        0 => {
            top.book.child_index = 1;
            let l = left.clone();
            push_child(engine, l);
        }
        1 => {
            top.book.child_index = 2;
            let r = right.clone();
            push_child(engine, r);
        }
        _ => {
            let rhs = top.book.operands.pop().unwrap_or(Value::Undefined);
            let lhs = top.book.operands.pop().unwrap_or(Value::Undefined);
            if operator == "in" {
                let Value::Obj(_) = &rhs else {
                    return engine.throw_type_error("Cannot use 'in' operator to search for a value in a non-object");
                };
                let key = property::primitive_to_display_string(&lhs);
                return match property::has_property(&rhs, &key) {
                    Ok(b) => {
                        finish(engine, Value::Bool(b));
                        StepOutcome::Continued
                    }
                    Err(e) => engine.throw_from_property_error(e),
                };
            }
            if operator == "instanceof" {
                let Value::Obj(ctor) = &rhs else {
                    return engine.throw_type_error("Right-hand side of 'instanceof' is not callable");
                };
                if !GuestObject::is_callable(ctor) {
                    return engine.throw_type_error("Right-hand side of 'instanceof' is not callable");
                }
                let result = instance_of(&lhs, ctor);
                finish(engine, Value::Bool(result));
                return StepOutcome::Continued;
            }
            let v = binary_op(operator, &lhs, &rhs);
            finish(engine, v);
        }
    }
    StepOutcome::Continued
}

fn instance_of(value: &Value, ctor: &ObjectRef) -> bool {
    let Value::Obj(obj) = value else { return false };
    let Some(proto_slot) = ctor.borrow().properties.get("prototype").cloned() else {
        return false;
    };
    let Value::Obj(proto) = proto_slot.value else { return false };
    let mut current = obj.borrow().proto.clone();
    while let Some(p) = current {
        if Rc::ptr_eq(&p, &proto) {
            return true;
        }
        current = p.borrow().proto.clone();
    }
    false
}

fn binary_op(operator: &str, lhs: &Value, rhs: &Value) -> Value {
    match operator {
        "+" => {
            if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) || matches!(lhs, Value::Obj(_)) || matches!(rhs, Value::Obj(_)) {
                let l = property::primitive_to_display_string(lhs);
                let r = property::primitive_to_display_string(rhs);
                if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
                    return Value::str(format!("{l}{r}"));
                }
            }
            Value::Num(lhs.to_number_primitive() + rhs.to_number_primitive())
        }
        "-" => Value::Num(lhs.to_number_primitive() - rhs.to_number_primitive()),
        "*" => Value::Num(lhs.to_number_primitive() * rhs.to_number_primitive()),
        "/" => Value::Num(lhs.to_number_primitive() / rhs.to_number_primitive()),
        "%" => Value::Num(lhs.to_number_primitive() % rhs.to_number_primitive()),
        "&" => Value::Num(((to_i32(lhs)) & (to_i32(rhs))) as f64),
        "|" => Value::Num(((to_i32(lhs)) | (to_i32(rhs))) as f64),
        "^" => Value::Num(((to_i32(lhs)) ^ (to_i32(rhs))) as f64),
        "<<" => Value::Num(((to_i32(lhs)) << (to_u32(rhs) & 31)) as f64),
        ">>" => Value::Num(((to_i32(lhs)) >> (to_u32(rhs) & 31)) as f64),
        ">>>" => Value::Num(((to_u32(lhs)) >> (to_u32(rhs) & 31)) as f64),
        "==" => Value::Bool(loose_eq(lhs, rhs)),
        "!=" => Value::Bool(!loose_eq(lhs, rhs)),
        "===" => Value::Bool(lhs.strict_eq(rhs)),
        "!==" => Value::Bool(!lhs.strict_eq(rhs)),
        "<" => compare(lhs, rhs, |o| o == std::cmp::Ordering::Less),
        ">" => compare(lhs, rhs, |o| o == std::cmp::Ordering::Greater),
        "<=" => compare(lhs, rhs, |o| o != std::cmp::Ordering::Greater),
        ">=" => compare(lhs, rhs, |o| o != std::cmp::Ordering::Less),
        _ => Value::Undefined,
    }
}

fn to_i32(v: &Value) -> i32 {
    let n = v.to_number_primitive();
    if !n.is_finite() {
        0
    } else {
        (n as i64 as u32) as i32
    }
}

fn to_u32(v: &Value) -> u32 {
    let n = v.to_number_primitive();
    if !n.is_finite() {
        0
    } else {
        n as i64 as u32
    }
}

fn compare(lhs: &Value, rhs: &Value, pred: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Value::Bool(pred(a.as_ref().cmp(b.as_ref())));
    }
    let a = lhs.to_number_primitive();
    let b = rhs.to_number_primitive();
    if a.is_nan() || b.is_nan() {
        return Value::Bool(false);
    }
    Value::Bool(pred(a.partial_cmp(&b).unwrap()))
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    use Value::*;
    match (lhs, rhs) {
        (Undefined | Null, Undefined | Null) => true,
        (Num(_), Num(_)) | (Str(_), Str(_)) | (Bool(_), Bool(_)) | (Obj(_), Obj(_)) => lhs.strict_eq(rhs),
        (Num(_), Str(_)) | (Str(_), Num(_)) | (Bool(_), _) | (_, Bool(_)) => {
            lhs.to_number_primitive() == rhs.to_number_primitive()
        }
        (Obj(_), Num(_) | Str(_)) | (Num(_) | Str(_), Obj(_)) => {
            property::primitive_to_display_string(lhs).parse::<f64>().ok() == property::primitive_to_display_string(rhs).parse::<f64>().ok()
        }
        _ => false,
    }
}

fn dispatch_logical(engine: &mut Engine, operator: &str, left: &NodeRef, right: &NodeRef) -> StepOutcome {
    let top = engine.stack.last_mut().unwrap();
    match top.book.child_index {
        0 => {
            top.book.child_index = 1;
            let l = left.clone();
            push_child(engine, l);
            StepOutcome::Continued
        }
        1 => {
            let lhs = top.book.operands.pop().unwrap_or(Value::Undefined);
            let short_circuit = match operator {
                "&&" => !lhs.to_bool(),
                "||" => lhs.to_bool(),
                _ => false,
            };
            if short_circuit {
                finish(engine, lhs);
            } else {
                top.book.child_index = 2;
                let r = right.clone();
                push_child(engine, r);
            }
            StepOutcome::Continued
        }
        _ => {
            let v = top.book.operands.pop().unwrap_or(Value::Undefined);
            finish(engine, v);
            StepOutcome::Continued
        }
    }
}

fn dispatch_unary(engine: &mut Engine, operator: &str, argument: &NodeRef) -> StepOutcome {
    if operator == "typeof" {
        if let NodeKind::Identifier { name } = &argument.kind {
            let scope = current_scope(engine);
            let v = resolve_identifier_for_typeof(&scope, name);
            finish(engine, Value::str(v.type_of()));
            return StepOutcome::Continued;
        }
    }
    if operator == "delete" {
        return dispatch_delete(engine, argument);
    }
    let top = engine.stack.last_mut().unwrap();
    if top.book.child_index == 0 {
        top.book.child_index = 1;
        let a = argument.clone();
        push_child(engine, a);
        return StepOutcome::Continued;
    }
    let v = top.book.operands.pop().unwrap_or(Value::Undefined);
    let result = match operator {
        "-" => Value::Num(-v.to_number_primitive()),
        "+" => Value::Num(v.to_number_primitive()),
        "!" => Value::Bool(!v.to_bool()),
        "~" => Value::Num(!to_i32(&v) as f64),
        "typeof" => Value::str(v.type_of()),
        "void" => Value::Undefined,
        _ => Value::Undefined,
    };
    finish(engine, result);
    StepOutcome::Continued
}

fn dispatch_delete(engine: &mut Engine, argument: &NodeRef) -> StepOutcome {
    let NodeKind::MemberExpression { object, property: prop, computed } = &argument.kind else {
        finish(engine, Value::Bool(true));
        return StepOutcome::Continued;
    };
    let top = engine.stack.last_mut().unwrap();
    match top.book.child_index {
        0 => {
            top.book.child_index = 1;
            let o = object.clone();
            push_child(engine, o);
            StepOutcome::Continued
        }
        1 => {
            let object_val = top.book.operands.pop().unwrap_or(Value::Undefined);
            if *computed {
                top.book.this_value = Some(object_val);
                top.book.child_index = 2;
                let p = prop.clone();
                push_child(engine, p);
            } else {
                let NodeKind::Identifier { name } = &prop.kind else { panic!("bad member key") };
                let strict = top.scope.borrow().strict;
                return match property::delete_property(&object_val, name, strict) {
                    Ok(b) => {
                        finish(engine, Value::Bool(b));
                        StepOutcome::Continued
                    }
                    Err(e) => engine.throw_from_property_error(e),
                };
            }
            StepOutcome::Continued
        }
        _ => {
            let key_val = top.book.operands.pop().unwrap_or(Value::Undefined);
            let object_val = top.book.this_value.clone().unwrap_or(Value::Undefined);
            let key = property::primitive_to_display_string(&key_val);
            let strict = top.scope.borrow().strict;
            match property::delete_property(&object_val, &key, strict) {
                Ok(b) => {
                    finish(engine, Value::Bool(b));
                    StepOutcome::Continued
                }
                Err(e) => engine.throw_from_property_error(e),
            }
        }
    }
}

// ---------------------------------------------------------------------
// Synthetic getter/setter call frames (spec §4.1, §4.2 point 4)
// ---------------------------------------------------------------------

fn dispatch_synthetic_call(engine: &mut Engine, func: ObjectRef, this: Value, args: Vec<Value>) -> StepOutcome {
    perform_call(engine, Value::Obj(func), this, args, false)
}
