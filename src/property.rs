//! Value and property primitives (spec §4.1).
//!
//! These are pure data-structure operations: they never invoke guest code
//! directly. Where the guest model requires running a getter or setter,
//! they return a `Pending` variant instead, and the caller (always a step
//! handler) records it on the frame so the dispatcher can push a synthetic
//! call frame on the next step (spec §4.2 point 4).

use crate::object::{GuestObject, InternalData, ObjectKind, ObjectRef, array_set_length_raw, walk_proto_chain, would_cycle, MAX_ARRAY_LENGTH};
use crate::value::{number_to_guest_string, Value};

#[derive(Debug)]
pub enum PropertyError {
    TypeError(String),
    RangeError(String),
}

pub enum GetOutcome {
    Value(Value),
    /// A getter was found on the chain; invoke it bound to `this`.
    Pending { func: ObjectRef, this: Value },
}

pub enum SetOutcome {
    Done,
    /// A setter was found on the chain; invoke it bound to `this` with `arg`.
    Pending { func: ObjectRef, this: Value, arg: Value },
}

fn string_char_at(s: &str, index: usize) -> Option<String> {
    s.encode_utf16().nth(index).map(|u| {
        char::from_u32(u as u32).map(|c| c.to_string()).unwrap_or_default()
    })
}

/// `get_property(obj, name)` (spec §4.1).
pub fn get_property(receiver: &Value, name: &str) -> Result<GetOutcome, PropertyError> {
    match receiver {
        Value::Undefined | Value::Null => Err(PropertyError::TypeError(format!(
            "Cannot read properties of {} (reading '{name}')",
            if matches!(receiver, Value::Undefined) { "undefined" } else { "null" }
        ))),
        Value::Str(s) => {
            if name == "length" {
                return Ok(GetOutcome::Value(Value::Num(s.encode_utf16().count() as f64)));
            }
            if let Ok(idx) = name.parse::<usize>() {
                if let Some(ch) = string_char_at(s, idx) {
                    return Ok(GetOutcome::Value(Value::str(ch)));
                }
                return Ok(GetOutcome::Value(Value::Undefined));
            }
            Ok(GetOutcome::Value(Value::Undefined))
        }
        Value::Obj(obj) => get_property_on_object(obj, receiver, name),
        // Number/Boolean primitives: no own properties, fall through as
        // undefined here; method lookup is routed through the relevant
        // prototype by the evaluator (spec Design Notes: boxed view).
        _ => Ok(GetOutcome::Value(Value::Undefined)),
    }
}

fn get_property_on_object(obj: &ObjectRef, receiver: &Value, name: &str) -> Result<GetOutcome, PropertyError> {
    if obj.borrow().class == "String" {
        if let InternalData::Boxed(Value::Str(s)) = &obj.borrow().data {
            if name == "length" {
                return Ok(GetOutcome::Value(Value::Num(s.encode_utf16().count() as f64)));
            }
            if let Ok(idx) = name.parse::<usize>() {
                if let Some(ch) = string_char_at(s, idx) {
                    return Ok(GetOutcome::Value(Value::str(ch)));
                }
            }
        }
    }
    let found = walk_proto_chain(obj, |o| {
        let b = o.borrow();
        if let Some(slot) = b.properties.get(name) {
            return Some(Ok(GetOutcome::Value(slot.value.clone())));
        }
        if let Some(getter) = b.getters.get(name) {
            return Some(Ok(GetOutcome::Pending {
                func: getter.clone(),
                this: receiver.clone(),
            }));
        }
        if b.setters.contains_key(name) {
            // accessor with only a setter: reading yields undefined, spec §4.1
            return Some(Ok(GetOutcome::Value(Value::Undefined)));
        }
        None
    });
    Ok(found.unwrap_or(Ok(GetOutcome::Value(Value::Undefined)))?)
}

/// `get_property`, routed through the relevant primitive prototype chain
/// for boxed-view method lookup on primitive strings/numbers/booleans
/// (spec §9 Design Notes "String prototype on primitive strings"): a
/// primitive never owns properties of its own beyond `length`/numeric
/// indexing on strings, so anything else answers from the matching
/// prototype without ever materializing a boxed wrapper object.
pub fn get_property_full(
    receiver: &Value,
    name: &str,
    string_proto: &ObjectRef,
    number_proto: &ObjectRef,
    boolean_proto: &ObjectRef,
) -> Result<GetOutcome, PropertyError> {
    match receiver {
        Value::Str(s) => {
            if name == "length" {
                return Ok(GetOutcome::Value(Value::Num(s.encode_utf16().count() as f64)));
            }
            if let Ok(idx) = name.parse::<usize>() {
                if let Some(ch) = string_char_at(s, idx) {
                    return Ok(GetOutcome::Value(Value::str(ch)));
                }
                return Ok(GetOutcome::Value(Value::Undefined));
            }
            get_property_on_object(string_proto, receiver, name)
        }
        Value::Num(_) => get_property_on_object(number_proto, receiver, name),
        Value::Bool(_) => get_property_on_object(boolean_proto, receiver, name),
        _ => get_property(receiver, name),
    }
}

/// `has_property(obj, name)` (spec §4.1).
pub fn has_property(receiver: &Value, name: &str) -> Result<bool, PropertyError> {
    match receiver {
        Value::Obj(obj) => Ok(walk_proto_chain(obj, |o| {
            let b = o.borrow();
            if b.properties.contains_key(name) || b.is_accessor(name) {
                Some(())
            } else {
                None
            }
        })
        .is_some()),
        _ => Err(PropertyError::TypeError("Cannot use 'in' operator on a non-object".to_string())),
    }
}

/// `set_property(obj, name, value, strict)` (spec §4.1); descriptor-based
/// assignment (`Object.defineProperty`) lives in `builtins::object`, which
/// operates directly on `GuestObject` and does not go through here.
pub fn set_property(receiver: &Value, name: &str, value: Value, strict: bool) -> Result<SetOutcome, PropertyError> {
    match receiver {
        Value::Undefined | Value::Null => Err(PropertyError::TypeError(format!(
            "Cannot set properties of {} (setting '{name}')",
            if matches!(receiver, Value::Undefined) { "undefined" } else { "null" }
        ))),
        Value::Str(_) => {
            if strict {
                Err(PropertyError::TypeError(format!("Cannot assign to read only property '{name}' of string")))
            } else {
                Ok(SetOutcome::Done)
            }
        }
        Value::Obj(obj) => set_property_on_object(obj, receiver, name, value, strict),
        _ => {
            if strict {
                Err(PropertyError::TypeError(format!("Cannot create property '{name}' on this value")))
            } else {
                Ok(SetOutcome::Done)
            }
        }
    }
}

fn set_property_on_object(obj: &ObjectRef, receiver: &Value, name: &str, value: Value, strict: bool) -> Result<SetOutcome, PropertyError> {
    if obj.borrow().class == "Array" {
        if name == "length" {
            let n = value.to_number_primitive();
            if n.fract() != 0.0 || n < 0.0 || n > MAX_ARRAY_LENGTH as f64 {
                return Err(PropertyError::RangeError("Invalid array length".to_string()));
            }
            array_set_length_raw(&mut obj.borrow_mut(), n as u64);
            return Ok(SetOutcome::Done);
        }
        if let Ok(n) = name.parse::<u64>() {
            if n < MAX_ARRAY_LENGTH {
                let mut b = obj.borrow_mut();
                b.properties.insert(name.to_string(), crate::object::PropertySlot::data(value, true, true, true));
                let cur_len = crate::object::array_current_length(&b);
                if n + 1 > cur_len {
                    b.properties.insert(
                        "length".to_string(),
                        crate::object::PropertySlot::data(Value::Num((n + 1) as f64), true, false, false),
                    );
                }
                return Ok(SetOutcome::Done);
            }
        }
    }

    // Walk the chain: an inherited accessor wins over a plain assignment.
    let inherited_setter = walk_proto_chain(obj, |o| {
        // Stop the search at `obj` itself for own data properties: those are
        // handled below without a chain walk for setters.
        if o.borrow().properties.contains_key(name) && ptr_eq_objs(o, obj) {
            return Some(None);
        }
        if let Some(setter) = o.borrow().setters.get(name) {
            return Some(Some(setter.clone()));
        }
        if o.borrow().getters.contains_key(name) && !o.borrow().setters.contains_key(name) {
            // getter-only accessor found before reaching an own data slot:
            // assignment is a silent no-op (sloppy) or throws (strict).
            return Some(None);
        }
        None
    });

    if let Some(Some(setter)) = inherited_setter {
        return Ok(SetOutcome::Pending {
            func: setter,
            this: receiver.clone(),
            arg: value,
        });
    }
    if let Some(None) = inherited_setter {
        return if strict {
            Err(PropertyError::TypeError(format!("Cannot set property '{name}', which has only a getter")))
        } else {
            Ok(SetOutcome::Done)
        };
    }

    let mut b = obj.borrow_mut();
    if let Some(slot) = b.properties.get(name) {
        if !slot.writable {
            return if strict {
                Err(PropertyError::TypeError(format!("Cannot assign to read only property '{name}'")))
            } else {
                Ok(SetOutcome::Done)
            };
        }
        b.properties.get_mut(name).unwrap().value = value;
        return Ok(SetOutcome::Done);
    }
    if !b.extensible {
        return if strict {
            Err(PropertyError::TypeError(format!("Cannot add property {name}, object is not extensible")))
        } else {
            Ok(SetOutcome::Done)
        };
    }
    b.define_data(name, value, true, true, true);
    Ok(SetOutcome::Done)
}

fn ptr_eq_objs(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::rc::Rc::ptr_eq(a, b)
}

/// `delete obj[name]` (spec §8 boundary behavior).
pub fn delete_property(receiver: &Value, name: &str, strict: bool) -> Result<bool, PropertyError> {
    match receiver {
        Value::Obj(obj) => {
            let mut b = obj.borrow_mut();
            match b.properties.get(name) {
                Some(slot) if !slot.configurable => {
                    if strict {
                        Err(PropertyError::TypeError(format!("Cannot delete property '{name}'")))
                    } else {
                        Ok(false)
                    }
                }
                _ => {
                    b.remove_key(name);
                    Ok(true)
                }
            }
        }
        _ => Ok(true),
    }
}

/// `get_prototype(value)` (spec §4.1): follows the primitive-prototype
/// routing for boxed numbers/booleans/strings described in Design Notes.
pub fn get_prototype(value: &Value, object_proto: &ObjectRef) -> Option<ObjectRef> {
    match value {
        Value::Obj(o) => o.borrow().proto.clone(),
        Value::Undefined | Value::Null => None,
        _ => Some(object_proto.clone()),
    }
}

pub fn set_prototype(obj: &ObjectRef, new_proto: Option<ObjectRef>) -> Result<(), PropertyError> {
    if let Some(p) = &new_proto {
        if would_cycle(obj, p) {
            return Err(PropertyError::TypeError("Cyclic __proto__ value".to_string()));
        }
    }
    obj.borrow_mut().proto = new_proto;
    Ok(())
}

/// `ToString` for values that never need engine access (no user-defined
/// `toString`/`valueOf`); object stringification goes through the evaluator
/// since it may invoke guest methods.
pub fn primitive_to_display_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => number_to_guest_string(*n),
        Value::Str(s) => s.to_string(),
        Value::Obj(_) => "[object Object]".to_string(),
    }
}

pub fn is_guest_fn_or_native(kind: &ObjectKind) -> bool {
    matches!(kind, ObjectKind::GuestFn { .. } | ObjectKind::NativeFn { .. } | ObjectKind::AsyncFn { .. } | ObjectKind::EvalFn)
}

pub fn class_of(value: &Value) -> &'static str {
    match value {
        Value::Obj(o) => {
            let b = o.borrow();
            b.class
        }
        _ => "Object",
    }
}

pub fn is_array(value: &Value) -> bool {
    matches!(value, Value::Obj(o) if o.borrow().class == "Array")
}

/// Guard used by `GuestObject::is_callable`'s friends inside the
/// evaluator: references `GuestObject` so it lives alongside the rest of
/// the property primitives rather than in `object.rs` itself.
pub fn is_function_class(obj: &ObjectRef) -> bool {
    GuestObject::is_callable(obj)
}
