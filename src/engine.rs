//! The step machine: state stack, dispatch loop, exception unwinding, and
//! the host-facing `step`/`run`/`append_code` surface (spec §4.2, §4.3,
//! §6.2).

use crate::ast::{Node, NodeKind, NodeRef};
use crate::completion::Completion;
use crate::config::EngineConfig;
use crate::error::{EngineError, GuestErrorClass};
use crate::frame::{DispatchNode, Frame};
use crate::object::{GuestObject, ObjectKind, ObjectRef};
use crate::property::PropertyError;
use crate::regexp_sandbox::{default_sandbox, RegexSandbox};
use crate::scope::{Scope, ScopeRef};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

pub type NativeResult = Result<Value, crate::error::ThrowPayload>;
pub type NativeFnImpl = Rc<dyn Fn(&mut Engine, &Value, &[Value]) -> NativeResult>;
pub type AsyncFnImpl = Rc<dyn Fn(&mut Engine, &Value, &[Value], AsyncHandle) -> Result<(), crate::error::ThrowPayload>>;

/// A conforming parser (spec §1): out of the core's scope except as the
/// trait boundary `eval()` dials through at runtime.
pub trait SourceParser {
    fn parse(&self, source: &str) -> Result<NodeRef, String>;
}

/// Handle passed to an async native function's caller; the host calls back
/// with it once the real asynchronous operation completes (spec §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsyncHandle(pub(crate) u64);

pub(crate) struct NativeEntry {
    pub imp: NativeFnImpl,
    pub arity: usize,
}

pub(crate) struct AsyncEntry {
    pub imp: AsyncFnImpl,
    pub arity: usize,
}

pub struct Prototypes {
    pub object: ObjectRef,
    pub function: ObjectRef,
    pub array: ObjectRef,
    pub string: ObjectRef,
    pub boolean: ObjectRef,
    pub number: ObjectRef,
    pub date: ObjectRef,
    pub regexp: ObjectRef,
    pub errors: HashMap<&'static str, ObjectRef>,
}

pub struct Engine {
    pub(crate) stack: Vec<Frame>,
    pub(crate) paused: bool,
    pub(crate) pending_async_id: Option<u64>,
    pub(crate) next_async_id: u64,
    pub(crate) value: Value,
    pub(crate) pending_root_throw: Option<Value>,

    pub global_scope: ScopeRef,
    pub global_object: ObjectRef,
    pub protos: Prototypes,

    pub(crate) native_fns: Vec<NativeEntry>,
    pub(crate) async_fns: Vec<AsyncEntry>,

    pub config: EngineConfig,
    pub(crate) regex_sandbox: Box<dyn RegexSandbox>,
    pub(crate) parser: Option<Box<dyn SourceParser>>,
    rng_state: u64,
}

/// What a single handler invocation did (Design Notes: `StepOutcome`
/// replaces the teacher's thrown-sentinel escape with an explicit enum the
/// dispatcher inspects and continues from).
pub(crate) enum StepOutcome {
    Continued,
    Threw,
}

impl Engine {
    /// `new_interpreter(ast, init_fn?)` (spec §6.2). `ast` is the root
    /// `Program` node produced by a conforming external parser.
    pub fn new(program: NodeRef, config: EngineConfig) -> Result<Engine, EngineError> {
        let object_proto = GuestObject::new("Object", None);
        let global_object = GuestObject::new("Object", Some(object_proto.clone()));
        let global_scope = Scope::new_global(global_object.clone(), false);

        let function_proto = GuestObject::new("Function", Some(object_proto.clone()));
        let array_proto = GuestObject::new("Array", Some(object_proto.clone()));
        let string_proto = GuestObject::new("String", Some(object_proto.clone()));
        let boolean_proto = GuestObject::new("Boolean", Some(object_proto.clone()));
        let number_proto = GuestObject::new("Number", Some(object_proto.clone()));
        let date_proto = GuestObject::new("Date", Some(object_proto.clone()));
        let regexp_proto = GuestObject::new("RegExp", Some(object_proto.clone()));

        let mut engine = Engine {
            stack: Vec::new(),
            paused: false,
            pending_async_id: None,
            next_async_id: 1,
            value: Value::Undefined,
            pending_root_throw: None,
            global_scope: global_scope.clone(),
            global_object,
            protos: Prototypes {
                object: object_proto,
                function: function_proto,
                array: array_proto,
                string: string_proto,
                boolean: boolean_proto,
                number: number_proto,
                date: date_proto,
                regexp: regexp_proto,
                errors: HashMap::new(),
            },
            native_fns: Vec::new(),
            async_fns: Vec::new(),
            config: config.clone(),
            regex_sandbox: default_sandbox(config.regexp_mode),
            parser: None,
            rng_state: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E3779B97F4A7C15)
                | 1,
        };

        crate::builtins::install(&mut engine)?;
        crate::polyfills::bootstrap(&mut engine)?;

        engine.stack.push(Frame::new(program, global_scope));
        Ok(engine)
    }

    pub fn set_parser(&mut self, parser: Box<dyn SourceParser>) {
        self.parser = Some(parser);
    }

    /// Latest completion value of the program (spec §6.2 `value`).
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn global_object(&self) -> ObjectRef {
        self.global_object.clone()
    }

    /// `append_code(source | ast)` (spec §6.2): only valid while the root
    /// `Program` frame is still live.
    pub fn append_code(&mut self, more: NodeRef) -> Result<(), EngineError> {
        let NodeKind::Program { body: more_body } = &more.kind else {
            panic!("append_code requires a Program node");
        };
        let Some(root) = self.stack.first_mut() else {
            panic!("append_code called after the root frame completed");
        };
        let DispatchNode::Real(root_node) = &root.node else {
            panic!("root frame is not a real Program node");
        };
        let NodeKind::Program { body } = &root_node.kind else {
            panic!("append_code requires the root frame to hold a Program node");
        };
        let mut combined = body.clone();
        combined.extend(more_body.iter().cloned());
        let new_program = Node::new(NodeKind::Program { body: combined });
        let scope = root.scope.clone();
        for stmt in more_body {
            crate::dispatch::hoist_statement(&scope, stmt);
        }
        *root = Frame::new(new_program, scope);
        Ok(())
    }

    /// Advance until the next user-code step or completion (spec §6.2).
    pub fn step(&mut self) -> Result<bool, EngineError> {
        if self.paused {
            return Err(EngineError::SteppedWhilePaused);
        }
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(false);
            };
            if top.done && self.stack.len() == 1 {
                return Ok(false);
            }
            let is_polyfill = match &top.node {
                DispatchNode::Real(n) => n.is_polyfill(),
                DispatchNode::SyntheticCall { .. } => true,
            };
            self.dispatch_once()?;
            if let Some(thrown) = self.take_root_throw() {
                return Err(self.guest_value_to_engine_error(thrown));
            }
            if self.paused {
                return Ok(true);
            }
            if self.stack.is_empty() || (self.stack.len() == 1 && self.stack[0].done) {
                return Ok(false);
            }
            if !is_polyfill {
                return Ok(true);
            }
        }
    }

    /// Converts an unwound guest error into a host-visible error carrying
    /// its `name` and `message` (spec §4.3, §7.2).
    pub(crate) fn guest_value_to_engine_error(&self, thrown: Value) -> EngineError {
        if let Value::Obj(obj) = &thrown {
            let b = obj.borrow();
            let name = b
                .properties
                .get("name")
                .map(|s| crate::property::primitive_to_display_string(&s.value))
                .unwrap_or_else(|| "Error".to_string());
            let message = b
                .properties
                .get("message")
                .map(|s| crate::property::primitive_to_display_string(&s.value))
                .unwrap_or_default();
            return EngineError::from_guest_value(name, message);
        }
        EngineError::from_guest_value("Error", crate::property::primitive_to_display_string(&thrown))
    }

    /// Step until `paused_`, exception, or completion (spec §6.2).
    pub fn run(&mut self) -> Result<bool, EngineError> {
        while self.step()? {}
        Ok(self.paused)
    }

    fn dispatch_once(&mut self) -> Result<(), EngineError> {
        match crate::dispatch::dispatch_top(self) {
            StepOutcome::Continued => Ok(()),
            StepOutcome::Threw => Ok(()),
        }
    }

    /// Constructs (or reuses) a guest error object and unwinds with it
    /// (spec §4.3). Returns `StepOutcome::Threw` for handlers to return.
    pub(crate) fn throw_exception(&mut self, payload: crate::error::ThrowPayload) -> StepOutcome {
        let value = match payload {
            crate::error::ThrowPayload::Value(v) => v,
            crate::error::ThrowPayload::Class(class, message) => self.make_error(class, &message),
        };
        self.unwind(Completion::Throw(value));
        StepOutcome::Threw
    }

    pub(crate) fn throw_type_error(&mut self, message: impl Into<String>) -> StepOutcome {
        self.throw_exception(crate::error::ThrowPayload::Class(GuestErrorClass::TypeError, message.into()))
    }

    pub(crate) fn throw_from_property_error(&mut self, err: PropertyError) -> StepOutcome {
        match err {
            PropertyError::TypeError(m) => self.throw_type_error(m),
            PropertyError::RangeError(m) => self.throw_exception(crate::error::ThrowPayload::Class(GuestErrorClass::RangeError, m)),
        }
    }

    pub fn make_error(&mut self, class: GuestErrorClass, message: &str) -> Value {
        let proto = self.protos.errors.get(class.name()).cloned().unwrap_or_else(|| self.protos.object.clone());
        let obj = GuestObject::new("Error", Some(proto));
        obj.borrow_mut().define_data("message", Value::str(message), true, false, true);
        obj.borrow_mut().define_data("name", Value::str(class.name()), true, false, true);
        Value::Obj(obj)
    }

    /// Pops frames carrying `completion` until it is absorbed (spec §4.3).
    /// If it exhausts the stack with a `Throw`, converts the guest error
    /// into a host-visible `EngineError` and records it so `run`/`step`
    /// report it via `Err` on their *next* call boundary — here we apply it
    /// immediately by truncating the stack and stashing a sentinel.
    pub(crate) fn unwind(&mut self, completion: Completion) {
        let mut completion = completion;
        loop {
            let Some(frame) = self.stack.last_mut() else {
                // Exhausted the stack: becomes the root's problem below.
                break;
            };
            let is_try = matches!(&frame.node, DispatchNode::Real(n) if matches!(n.kind, NodeKind::TryStatement { .. }));
            let is_call = matches!(
                &frame.node,
                DispatchNode::Real(n) if matches!(n.kind, NodeKind::CallExpression { .. } | NodeKind::NewExpression { .. })
            ) || matches!(&frame.node, DispatchNode::SyntheticCall { .. });
            let is_loop = frame.book.is_loop;
            let is_switch = frame.book.is_switch;
            let is_program = self.stack.len() == 1;

            match &completion {
                Completion::Throw(_) if is_try && frame.book.captured_completion.is_none() => {
                    frame.book.captured_completion = Some(completion.clone());
                    frame.completion = None;
                    frame.done = false;
                    return;
                }
                Completion::Return(v) if is_call => {
                    frame.result = v.clone();
                    frame.done = true;
                    return;
                }
                Completion::Break(label) if is_loop || is_switch => {
                    if label.is_none() || frame.book.labels.contains(label.as_ref().unwrap()) {
                        self.stack.pop();
                        if let Some(parent) = self.stack.last_mut() {
                            parent.result = Value::Undefined;
                        }
                        return;
                    }
                }
                Completion::Continue(label) if is_loop => {
                    if label.is_none() || frame.book.labels.contains(label.as_ref().unwrap()) {
                        frame.completion = Some(completion.clone());
                        frame.done = false;
                        return;
                    }
                }
                Completion::Break(label) | Completion::Continue(label) if frame.book.labels.iter().any(|l| Some(l) == label.as_ref()) => {
                    self.stack.pop();
                    return;
                }
                _ => {}
            }

            if is_program {
                frame.done = true;
                if let Completion::Throw(v) = completion {
                    self.value = Value::Undefined;
                    self.pending_root_throw = Some(v);
                } else if let Completion::Return(v) = completion {
                    self.value = v;
                }
                return;
            }

            self.stack.pop();
        }
    }

    pub(crate) fn take_root_throw(&mut self) -> Option<Value> {
        self.pending_root_throw.take()
    }

    pub(crate) fn register_native(&mut self, imp: NativeFnImpl, arity: usize) -> usize {
        self.native_fns.push(NativeEntry { imp, arity });
        self.native_fns.len() - 1
    }

    pub(crate) fn register_async(&mut self, imp: AsyncFnImpl, arity: usize) -> usize {
        self.async_fns.push(AsyncEntry { imp, arity });
        self.async_fns.len() - 1
    }

    /// `create_native_function(fn, is_constructor)` (spec §6.2).
    pub fn create_native_function(
        &mut self,
        name: &str,
        arity: usize,
        is_constructor: bool,
        imp: impl Fn(&mut Engine, &Value, &[Value]) -> NativeResult + 'static,
    ) -> ObjectRef {
        let id = self.register_native(Rc::new(imp), arity);
        let obj = GuestObject::new("Function", Some(self.protos.function.clone()));
        obj.borrow_mut().kind = ObjectKind::NativeFn { id, arity, is_constructor };
        obj.borrow_mut().define_data("length", Value::Num(arity as f64), false, false, true);
        obj.borrow_mut().define_data("name", Value::str(name), false, false, true);
        obj
    }

    /// `create_async_function(fn)` (spec §6.2): `fn` receives the resume
    /// handle as an explicit last parameter value it is responsible for
    /// stashing with the host's own scheduler.
    pub fn create_async_function(
        &mut self,
        name: &str,
        arity: usize,
        imp: impl Fn(&mut Engine, &Value, &[Value], AsyncHandle) -> Result<(), crate::error::ThrowPayload> + 'static,
    ) -> ObjectRef {
        let id = self.register_async(Rc::new(imp), arity);
        let obj = GuestObject::new("Function", Some(self.protos.function.clone()));
        obj.borrow_mut().kind = ObjectKind::AsyncFn { id, arity };
        obj.borrow_mut().define_data("length", Value::Num(arity as f64), false, false, true);
        obj.borrow_mut().define_data("name", Value::str(name), false, false, true);
        obj
    }

    /// The host's resume callback for a paused async native call (spec
    /// §4.5): writes the value into the interrupted frame and clears
    /// `paused_`.
    pub fn resume_ok(&mut self, handle: AsyncHandle, value: Value) {
        assert_eq!(self.pending_async_id, Some(handle.0), "resume handle does not match the pending suspension");
        if let Some(frame) = self.stack.last_mut() {
            frame.result = value;
            frame.done = true;
        }
        self.paused = false;
        self.pending_async_id = None;
    }

    /// As `resume_ok`, but the asynchronous operation failed: the error is
    /// delivered as a guest throw on resume (spec §7 propagation policy).
    pub fn resume_err(&mut self, handle: AsyncHandle, error_message: &str) {
        assert_eq!(self.pending_async_id, Some(handle.0), "resume handle does not match the pending suspension");
        let err = self.make_error(GuestErrorClass::Error, error_message);
        if let Some(frame) = self.stack.last_mut() {
            frame.completion = Some(Completion::Throw(err));
            frame.done = true;
        }
        self.paused = false;
        self.pending_async_id = None;
    }

    /// `Math.random()`'s source: a xorshift64* generator seeded from wall
    /// time at construction. Not cryptographically secure, which ES5 never
    /// requires of `Math.random`.
    pub(crate) fn next_random(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    pub(crate) fn new_async_handle(&mut self) -> AsyncHandle {
        let id = self.next_async_id;
        self.next_async_id += 1;
        self.pending_async_id = Some(id);
        self.paused = true;
        AsyncHandle(id)
    }
}
