//! `JSON` (spec §4.5 layer 1): `parse` converts a text payload through
//! `serde_json::Value` into guest values; `stringify` walks the guest
//! object graph directly, skipping function/undefined values per JSON
//! semantics, with cycle detection so a self-referential guest object
//! raises a `TypeError` rather than looping forever.

use super::arg;
use crate::engine::Engine;
use crate::error::{GuestErrorClass, ThrowPayload};
use crate::object::GuestObject;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

fn type_error(message: impl Into<String>) -> ThrowPayload {
    ThrowPayload::Class(GuestErrorClass::TypeError, message.into())
}

fn json_to_guest(engine: &mut Engine, v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => {
            let obj = GuestObject::new("Array", Some(engine.protos.array.clone()));
            for (i, item) in items.iter().enumerate() {
                let gv = json_to_guest(engine, item);
                obj.borrow_mut().define_data(&i.to_string(), gv, true, true, true);
            }
            obj.borrow_mut().define_data("length", Value::Num(items.len() as f64), true, false, false);
            Value::Obj(obj)
        }
        serde_json::Value::Object(map) => {
            let obj = GuestObject::new("Object", Some(engine.protos.object.clone()));
            for (k, item) in map.iter() {
                let gv = json_to_guest(engine, item);
                obj.borrow_mut().define_data(k, gv, true, true, true);
            }
            Value::Obj(obj)
        }
    }
}

fn guest_to_json(v: &Value, visiting: &Rc<RefCell<HashSet<*const ()>>>) -> Result<Option<serde_json::Value>, ThrowPayload> {
    Ok(match v {
        Value::Undefined => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Num(n) => Some(serde_json::Number::from_f64(*n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null)),
        Value::Str(s) => Some(serde_json::Value::String(s.to_string())),
        Value::Obj(o) => {
            if GuestObject::is_callable(o) {
                return Ok(None);
            }
            let ptr = Rc::as_ptr(o) as *const ();
            if !visiting.borrow_mut().insert(ptr) {
                return Err(type_error("Converting circular structure to JSON"));
            }
            let result = if o.borrow().class == "Array" {
                let len = crate::object::array_current_length(&o.borrow());
                let mut items = Vec::with_capacity(len as usize);
                for i in 0..len {
                    let item = o.borrow().properties.get(&i.to_string()).map(|s| s.value.clone()).unwrap_or(Value::Undefined);
                    items.push(guest_to_json(&item, visiting)?.unwrap_or(serde_json::Value::Null));
                }
                Some(serde_json::Value::Array(items))
            } else {
                let mut map = serde_json::Map::new();
                for key in o.borrow().own_enumerable_keys() {
                    let value = o.borrow().properties.get(&key).map(|s| s.value.clone()).unwrap_or(Value::Undefined);
                    if let Some(jv) = guest_to_json(&value, visiting)? {
                        map.insert(key, jv);
                    }
                }
                Some(serde_json::Value::Object(map))
            };
            visiting.borrow_mut().remove(&ptr);
            result
        }
    })
}

pub(crate) fn install(engine: &mut Engine) {
    let json = GuestObject::new("Object", Some(engine.protos.object.clone()));

    super::define_method(engine, &json, "parse", 1, |engine, _this, args| {
        let text = crate::property::primitive_to_display_string(&arg(args, 0));
        let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| ThrowPayload::Class(GuestErrorClass::SyntaxError, e.to_string()))?;
        Ok(json_to_guest(engine, &parsed))
    });

    super::define_method(engine, &json, "stringify", 3, |_engine, _this, args| {
        let visiting = Rc::new(RefCell::new(HashSet::new()));
        match guest_to_json(&arg(args, 0), &visiting)? {
            Some(v) => {
                let indent = match arg(args, 2) {
                    Value::Num(n) if n > 0.0 => Some(n as usize),
                    _ => None,
                };
                let text = match indent {
                    Some(n) => serde_json::to_string_pretty(&v).map(|s| reindent(&s, n)).unwrap_or_default(),
                    None => serde_json::to_string(&v).unwrap_or_default(),
                };
                Ok(Value::str(text))
            }
            None => Ok(Value::Undefined),
        }
    });

    engine.global_object.borrow_mut().define_data("JSON", Value::Obj(json), true, false, true);
}

/// `serde_json`'s pretty printer always indents by 2 spaces; re-indent to
/// the guest-requested width rather than depending on an indenter type.
fn reindent(pretty: &str, width: usize) -> String {
    if width == 2 {
        return pretty.to_string();
    }
    pretty
        .lines()
        .map(|line| {
            let stripped = line.trim_start_matches(' ');
            let depth = (line.len() - stripped.len()) / 2;
            format!("{}{}", " ".repeat(depth * width), stripped)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
