//! `RegExp` constructor and prototype (spec §4.5 layer 1, §4.5 bridge
//! "sandboxed regex"). `test` is a guest-source polyfill wrapping `exec`
//! (spec §9 supplement F); everything that only needs one sandboxed match
//! is native.

use super::arg;
use crate::engine::Engine;
use crate::error::{GuestErrorClass, ThrowPayload};
use crate::object::{GuestObject, InternalData, ObjectRef};
use crate::regexp_sandbox::RegexOp;
use crate::value::Value;

fn type_error(message: impl Into<String>) -> ThrowPayload {
    ThrowPayload::Class(GuestErrorClass::TypeError, message.into())
}

fn this_regexp(this: &Value) -> Result<ObjectRef, ThrowPayload> {
    match this {
        Value::Obj(o) if o.borrow().class == "RegExp" => Ok(o.clone()),
        _ => Err(type_error("RegExp.prototype method called on a non-RegExp")),
    }
}

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.regexp.clone();
    proto.borrow_mut().data = InternalData::Regexp { source: String::new(), flags: String::new(), last_index: 0 };

    super::define_method(engine, &proto, "exec", 1, |engine, this, args| {
        let re = this_regexp(this)?;
        let subject = crate::property::primitive_to_display_string(&arg(args, 0));
        let (source, flags, global, last_index) = {
            let b = re.borrow();
            let InternalData::Regexp { source, flags, last_index } = &b.data else { unreachable!() };
            (source.clone(), flags.clone(), flags.contains('g'), *last_index)
        };
        let start = if global { last_index } else { 0 };
        let req = crate::regexp_sandbox::RegexRequest {
            op: RegexOp::Exec,
            source: source.clone(),
            flags: flags.clone(),
            subject: subject.clone(),
            last_index: start,
        };
        let resp = engine.regex_sandbox.run(req, &engine.config).map_err(to_throw)?;
        match resp.matched {
            Some(groups) => {
                if global {
                    re.borrow_mut().data = InternalData::Regexp { source, flags, last_index: resp.new_last_index };
                }
                let matched_text = groups[0].clone().unwrap_or_default();
                let index = subject.find(matched_text.as_str()).unwrap_or(0);
                let mut extra = indexmap::IndexMap::new();
                extra.insert("index".to_string(), crate::bridge::Native::Num(index as f64));
                extra.insert("input".to_string(), crate::bridge::Native::str(subject.clone()));
                Ok(crate::bridge::array_native_to_pseudo(
                    engine,
                    &groups.iter().map(|g| g.clone().map(crate::bridge::Native::str).unwrap_or(crate::bridge::Native::Null)).collect::<Vec<_>>(),
                    &extra,
                ))
            }
            None => {
                if global {
                    re.borrow_mut().data = InternalData::Regexp { source, flags, last_index: 0 };
                }
                Ok(Value::Null)
            }
        }
    });

    super::define_method(engine, &proto, "toString", 0, |_engine, this, _args| {
        let re = this_regexp(this)?;
        let b = re.borrow();
        let InternalData::Regexp { source, flags, .. } = &b.data else { unreachable!() };
        Ok(Value::str(format!("/{source}/{flags}")))
    });

    let ctor = engine.create_native_function("RegExp", 2, true, |engine, this, args| {
        let (source, flags) = match args.first() {
            Some(Value::Obj(o)) if o.borrow().class == "RegExp" => {
                let b = o.borrow();
                let InternalData::Regexp { source, flags, .. } = &b.data else { unreachable!() };
                (source.clone(), flags.clone())
            }
            Some(v) => (crate::property::primitive_to_display_string(v), String::new()),
            None => (String::new(), String::new()),
        };
        let flags = match args.get(1) {
            Some(Value::Undefined) | None => flags,
            Some(v) => crate::property::primitive_to_display_string(v),
        };
        if let Value::Obj(o) = this {
            if o.borrow().proto.as_ref().map(|p| std::rc::Rc::ptr_eq(p, &engine.protos.regexp)).unwrap_or(false) {
                o.borrow_mut().class = "RegExp";
                o.borrow_mut().data = InternalData::Regexp { source: source.clone(), flags: flags.clone(), last_index: 0 };
                o.borrow_mut().define_data("source", Value::str(source.clone()), false, false, false);
                o.borrow_mut().define_data("flags", Value::str(flags.clone()), false, false, false);
                o.borrow_mut().define_data("global", Value::Bool(flags.contains('g')), false, false, false);
                o.borrow_mut().define_data("ignoreCase", Value::Bool(flags.contains('i')), false, false, false);
                o.borrow_mut().define_data("multiline", Value::Bool(flags.contains('m')), false, false, false);
                o.borrow_mut().define_data("lastIndex", Value::Num(0.0), true, false, false);
                return Ok(this.clone());
            }
        }
        let obj = GuestObject::new("RegExp", Some(engine.protos.regexp.clone()));
        obj.borrow_mut().data = InternalData::Regexp { source: source.clone(), flags: flags.clone(), last_index: 0 };
        obj.borrow_mut().define_data("source", Value::str(source.clone()), false, false, false);
        obj.borrow_mut().define_data("flags", Value::str(flags.clone()), false, false, false);
        obj.borrow_mut().define_data("global", Value::Bool(flags.contains('g')), false, false, false);
        obj.borrow_mut().define_data("ignoreCase", Value::Bool(flags.contains('i')), false, false, false);
        obj.borrow_mut().define_data("multiline", Value::Bool(flags.contains('m')), false, false, false);
        obj.borrow_mut().define_data("lastIndex", Value::Num(0.0), true, false, false);
        Ok(Value::Obj(obj))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);
    engine.global_object.borrow_mut().define_data("RegExp", Value::Obj(ctor), true, false, true);
}

fn to_throw(e: crate::error::EngineError) -> ThrowPayload {
    match e {
        crate::error::EngineError::RegexDisabled => type_error("regular expressions are disabled"),
        crate::error::EngineError::RegexTimeout { pattern } => ThrowPayload::Class(GuestErrorClass::Error, format!("regex timed out: /{pattern}/")),
        other => ThrowPayload::Class(GuestErrorClass::Error, other.to_string()),
    }
}
