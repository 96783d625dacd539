//! The host/guest bridge (spec §4.5): conversions between host-native
//! values and guest values. `native_to_pseudo` never sees cycles (the host
//! is expected to hand over acyclic data); `pseudo_to_native` walks the
//! guest object graph and may legitimately encounter cycles, so it carries
//! a visited map keyed by object identity.

use crate::engine::Engine;
use crate::object::{GuestObject, InternalData, ObjectRef};
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A host callable wrapped for `Native::Function`. Receives already-bridged
/// host arguments and returns a host value; the guest-facing wrapper this
/// crate builds around it runs `pseudo_to_native`/`native_to_pseudo` on each
/// side of the call.
pub type NativeCallback = Rc<dyn Fn(&[Native]) -> Native>;

/// A host-side value, the counterpart of the guest `Value` (spec §4.5
/// "Bridge primitives"). `Array`/`Object` are shared and mutable so a host
/// caller can build (or receive) genuinely cyclic structures.
#[derive(Clone)]
pub enum Native {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Native>>>),
    Object(Rc<RefCell<IndexMap<String, Native>>>),
    /// Milliseconds since epoch, UTC.
    Date(f64),
    Regexp { source: String, flags: String },
    Function(NativeCallback),
}

impl Native {
    pub fn array(items: Vec<Native>) -> Native {
        Native::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: IndexMap<String, Native>) -> Native {
        Native::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn str(s: impl Into<String>) -> Native {
        Native::Str(s.into())
    }
}

/// `native_to_pseudo(v)` (spec §4.5): host functions become native-function
/// guest objects whose wrapper bridges arguments and the return value on
/// each call; host arrays/objects deep-copy into fresh guest equivalents;
/// host dates/regexes mirror into guest objects carrying the matching
/// `InternalData`. Cycles are not supported in this direction (spec §4.5,
/// §7.3: converting an already-cyclic `Native::Array`/`Native::Object`
/// loops forever, which is a programmer error on the host's part, not a
/// guest-visible failure).
pub fn native_to_pseudo(engine: &mut Engine, v: &Native) -> Value {
    match v {
        Native::Undefined => Value::Undefined,
        Native::Null => Value::Null,
        Native::Bool(b) => Value::Bool(*b),
        Native::Num(n) => Value::Num(*n),
        Native::Str(s) => Value::str(s.clone()),
        Native::Array(items) => {
            let obj = GuestObject::new("Array", Some(engine.protos.array.clone()));
            let items = items.borrow();
            for (i, item) in items.iter().enumerate() {
                let guest_item = native_to_pseudo(engine, item);
                obj.borrow_mut().define_data(&i.to_string(), guest_item, true, true, true);
            }
            obj.borrow_mut().define_data("length", Value::Num(items.len() as f64), true, false, false);
            Value::Obj(obj)
        }
        Native::Object(entries) => {
            let obj = GuestObject::new("Object", Some(engine.protos.object.clone()));
            for (k, entry) in entries.borrow().iter() {
                let guest_value = native_to_pseudo(engine, entry);
                obj.borrow_mut().define_data(k, guest_value, true, true, true);
            }
            Value::Obj(obj)
        }
        Native::Date(millis) => {
            let obj = GuestObject::new("Date", Some(engine.protos.date.clone()));
            obj.borrow_mut().data = InternalData::Date(*millis);
            Value::Obj(obj)
        }
        Native::Regexp { source, flags } => {
            let obj = GuestObject::new("RegExp", Some(engine.protos.regexp.clone()));
            obj.borrow_mut().data = InternalData::Regexp {
                source: source.clone(),
                flags: flags.clone(),
                last_index: 0,
            };
            obj.borrow_mut().define_data("source", Value::str(source.clone()), false, false, false);
            obj.borrow_mut().define_data("flags", Value::str(flags.clone()), false, false, false);
            obj.borrow_mut().define_data("lastIndex", Value::Num(0.0), true, false, false);
            Value::Obj(obj)
        }
        Native::Function(callback) => {
            let callback = callback.clone();
            engine.create_native_function("", 0, false, move |engine, _this, args| {
                let native_args: Vec<Native> = args.iter().map(|a| pseudo_to_native(engine, a)).collect();
                let result = callback(&native_args);
                Ok(native_to_pseudo(engine, &result))
            })
        }
    }
}

/// `pseudo_to_native(v)` (spec §4.5): the inverse conversion, recording
/// every guest object already visited (by identity) in `visited` so a
/// cyclic guest structure round-trips into an equally cyclic host one
/// instead of recursing forever.
pub fn pseudo_to_native(engine: &mut Engine, v: &Value) -> Native {
    let mut visited = HashMap::new();
    pseudo_to_native_inner(engine, v, &mut visited)
}

fn pseudo_to_native_inner(engine: &mut Engine, v: &Value, visited: &mut HashMap<*const RefCell<GuestObject>, Native>) -> Native {
    match v {
        Value::Undefined => Native::Undefined,
        Value::Null => Native::Null,
        Value::Bool(b) => Native::Bool(*b),
        Value::Num(n) => Native::Num(*n),
        Value::Str(s) => Native::Str(s.to_string()),
        Value::Obj(obj) => {
            let ptr = Rc::as_ptr(obj);
            if let Some(existing) = visited.get(&ptr) {
                return existing.clone();
            }
            let class = obj.borrow().class;
            match class {
                "Array" => {
                    let placeholder = Native::array(Vec::new());
                    visited.insert(ptr, placeholder.clone());
                    let Native::Array(cell) = &placeholder else { unreachable!() };
                    let len = crate::object::array_current_length(&obj.borrow()) as usize;
                    let mut out = Vec::with_capacity(len);
                    for i in 0..len {
                        let item = obj.borrow().properties.get(&i.to_string()).map(|s| s.value.clone()).unwrap_or(Value::Undefined);
                        out.push(pseudo_to_native_inner(engine, &item, visited));
                    }
                    *cell.borrow_mut() = out;
                    placeholder
                }
                "Date" => {
                    let millis = match obj.borrow().data {
                        InternalData::Date(m) => m,
                        _ => f64::NAN,
                    };
                    Native::Date(millis)
                }
                "RegExp" => {
                    let (source, flags) = match &obj.borrow().data {
                        InternalData::Regexp { source, flags, .. } => (source.clone(), flags.clone()),
                        _ => (String::new(), String::new()),
                    };
                    Native::Regexp { source, flags }
                }
                _ if GuestObject::is_callable(obj) => {
                    let func = obj.clone();
                    Native::Function(Rc::new(move |_args: &[Native]| {
                        // A bridged host callback cannot drive the engine's own
                        // step loop re-entrantly (spec §5 "must not recursively
                        // call step/run"); callers that need to invoke a
                        // round-tripped guest function back should keep the
                        // original `ObjectRef` and push a synthetic call frame
                        // instead of going through this closure.
                        let _ = &func;
                        Native::Undefined
                    }))
                }
                _ => {
                    let placeholder = Native::object(IndexMap::new());
                    visited.insert(ptr, placeholder.clone());
                    let Native::Object(cell) = &placeholder else { unreachable!() };
                    let keys = obj.borrow().own_enumerable_keys();
                    let mut out = IndexMap::new();
                    for key in keys {
                        // A getter cannot be invoked here: the bridge runs
                        // outside the step loop and must not recursively
                        // drive the engine (spec §5 re-entrancy). An
                        // accessor property bridges as `undefined`.
                        let value = match crate::property::get_property(v, &key) {
                            Ok(crate::property::GetOutcome::Value(val)) => val,
                            Ok(crate::property::GetOutcome::Pending { .. }) => Value::Undefined,
                            Err(_) => Value::Undefined,
                        };
                        out.insert(key, pseudo_to_native_inner(engine, &value, visited));
                    }
                    *cell.borrow_mut() = out;
                    placeholder
                }
            }
        }
    }
}

/// Shallow-copies a guest array into a host array, preserving non-index
/// properties (spec §4.5: "e.g. a match result's `index` and `input`").
pub fn array_pseudo_to_native(engine: &mut Engine, arr: &ObjectRef) -> Native {
    let len = crate::object::array_current_length(&arr.borrow()) as usize;
    let mut items = Vec::with_capacity(len);
    for i in 0..len {
        let item = arr.borrow().properties.get(&i.to_string()).map(|s| s.value.clone()).unwrap_or(Value::Undefined);
        items.push(pseudo_to_native(engine, &item));
    }
    let mut extra = IndexMap::new();
    for (key, slot) in arr.borrow().properties.iter() {
        if key == "length" || key.parse::<u64>().is_ok() {
            continue;
        }
        extra.insert(key.clone(), pseudo_to_native(engine, &slot.value));
    }
    if extra.is_empty() {
        return Native::array(items);
    }
    // Non-index properties exist (e.g. a match result's `index`/`input`):
    // return a single object carrying both the numeric keys and the extras,
    // so a host consumer sees `result[0]` and `result.index` alike.
    let mut combined = IndexMap::new();
    for (i, item) in items.iter().enumerate() {
        combined.insert(i.to_string(), item.clone());
    }
    combined.insert("length".to_string(), Native::Num(items.len() as f64));
    combined.extend(extra);
    Native::object(combined)
}

/// Builds a guest array from a host array, preserving any non-index keys
/// already present on `extra` (spec §4.5).
pub fn array_native_to_pseudo(engine: &mut Engine, items: &[Native], extra: &IndexMap<String, Native>) -> Value {
    let obj = GuestObject::new("Array", Some(engine.protos.array.clone()));
    for (i, item) in items.iter().enumerate() {
        let guest_item = native_to_pseudo(engine, item);
        obj.borrow_mut().define_data(&i.to_string(), guest_item, true, true, true);
    }
    obj.borrow_mut().define_data("length", Value::Num(items.len() as f64), true, false, false);
    for (k, v) in extra {
        let guest_value = native_to_pseudo(engine, v);
        obj.borrow_mut().define_data(k, guest_value, true, true, true);
    }
    Value::Obj(obj)
}
