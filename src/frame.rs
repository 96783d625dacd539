//! The state stack (spec §3, §4.2): an ordered stack of step frames, each
//! pairing an AST node, a scope, and per-node bookkeeping used to resume a
//! partially evaluated node across multiple `step()` calls.

use crate::ast::NodeRef;
use crate::completion::Completion;
use crate::object::ObjectRef;
use crate::scope::ScopeRef;
use crate::value::Value;

/// What a frame is advancing: either a real AST node from the program, or a
/// synthetic call the engine itself injects to invoke a getter, setter, or
/// resumed async callback without inventing a fake AST node for it (spec
/// §4.1 "records a pending getter call ... pushes a synthetic call frame").
#[derive(Clone)]
pub enum DispatchNode {
    Real(NodeRef),
    SyntheticCall { func: ObjectRef, this: Value, args: Vec<Value> },
}

/// A reference, produced while evaluating the left-hand side of an
/// assignment or `delete`/`typeof`/`++`/`--`: either a scope binding or an
/// object property (spec §4.2, AssignmentExpression/UpdateExpression).
#[derive(Clone, Debug)]
pub enum Reference {
    Binding { scope: ScopeRef, name: String },
    Property { object: Value, key: String },
}

/// A getter or setter invocation the dispatcher must push as a synthetic
/// call frame on the *next* step (spec §4.1, §4.2 point 4). Exactly one of
/// these may be pending at a time; leaving one unconsumed across a step
/// boundary is a programmer error (spec §4.2 point 4, §7.3).
#[derive(Clone, Debug)]
pub enum PendingAccessor {
    Get { func: ObjectRef, this: Value },
    Set { func: ObjectRef, this: Value, arg: Value },
}

/// Per-node-kind bookkeeping. Only the compound nodes that can pause across
/// a child evaluation need an entry; leaf nodes (`Literal`, `Identifier`,
/// `ThisExpression`, ...) complete in a single step with no extra state.
#[derive(Default)]
pub struct Bookkeeping {
    /// Index of the next child to evaluate, for nodes with an ordered list
    /// of sub-expressions/statements (Program/Block, SequenceExpression,
    /// ArrayExpression, ObjectExpression, CallExpression arguments, ...).
    pub child_index: usize,
    /// Accumulated child results, in evaluation order.
    pub operands: Vec<Value>,
    /// Loop/switch bookkeeping (spec: `is_loop`, `is_switch`, `labels`).
    pub is_loop: bool,
    pub is_switch: bool,
    pub labels: Vec<String>,
    /// For `ForInStatement`: the remaining own-enumerable keys to visit and
    /// the set of keys already seen on a descendant (deduplicated across the
    /// prototype walk, spec §4.2 ForInStatement).
    pub for_in_keys: Vec<String>,
    pub for_in_seen: std::collections::HashSet<String>,
    pub for_in_object: Option<Value>,
    /// For `TryStatement`: the completion captured on entry with an active
    /// non-Normal completion (spec §4.3), and which phase is running.
    pub try_phase: TryPhase,
    pub captured_completion: Option<Completion>,
    /// For `SwitchStatement`: index of the matched case (or default) once
    /// found, and whether we are still searching for a match.
    pub switch_matched: Option<usize>,
    pub switch_default: Option<usize>,
    /// `SwitchStatement`: how many statements of the matched-case-onward
    /// consequent stream have already run.
    pub switch_body_pos: usize,
    pub switch_discriminant_ready: bool,
    /// A resolved reference, held between evaluating an assignment/update's
    /// left-hand side and applying the operator once the right-hand side
    /// (if any) has also been evaluated.
    pub reference: Option<Reference>,
    /// The `this` value and resolved callee for Call/New, captured before
    /// arguments are evaluated so evaluation order is observable left to
    /// right (spec §4.2 CallExpression/NewExpression).
    pub this_value: Option<Value>,
    pub callee: Option<Value>,
    /// `CallExpression`/`NewExpression` with a computed `MemberExpression`
    /// callee: true once the object has been evaluated and the property
    /// key expression is still pending (spec §4.2 CallExpression).
    pub callee_awaiting_key: bool,
    /// Set once a guest/native/async call has been dispatched, so a second
    /// step on the same frame does not double-invoke it.
    pub call_dispatched: bool,
    /// Async native calls: sentinel copied onto the engine as `paused_`.
    pub done_exec: bool,
    /// A getter/setter invocation this frame must push as a synthetic call
    /// frame on its next step (spec §4.1, §4.2 point 4). Consumed (set back
    /// to `None`) the step after it is recorded; a handler that returns
    /// leaving this set twice in a row is a programmer error (spec §7.3).
    pub pending_accessor: Option<PendingAccessor>,
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum TryPhase {
    #[default]
    Block,
    Catch,
    Finally,
    Done,
}

pub struct Frame {
    pub node: DispatchNode,
    pub scope: ScopeRef,
    pub result: Value,
    pub book: Bookkeeping,
    /// Set by `unwind` when a non-Normal completion passes through; consumed
    /// by the frame's own handler on its next step (spec §4.3).
    pub completion: Option<Completion>,
    /// True once this frame has produced its final result and should be
    /// popped on the next step rather than dispatched again.
    pub done: bool,
}

impl Frame {
    pub fn new(node: NodeRef, scope: ScopeRef) -> Frame {
        Frame {
            node: DispatchNode::Real(node),
            scope,
            result: Value::Undefined,
            book: Bookkeeping::default(),
            completion: None,
            done: false,
        }
    }

    pub fn new_synthetic_call(func: ObjectRef, this: Value, args: Vec<Value>, scope: ScopeRef) -> Frame {
        Frame {
            node: DispatchNode::SyntheticCall { func, this, args },
            scope,
            result: Value::Undefined,
            book: Bookkeeping::default(),
            completion: None,
            done: false,
        }
    }
}
