//! `Error` and its 6 subclasses (spec §4.3, §7.2): each populates
//! `engine.protos.errors` so `Engine::make_error`/`throw_exception` can
//! build a guest exception of the right class without going through guest
//! code.

use super::arg;
use crate::engine::Engine;
use crate::object::GuestObject;
use crate::value::Value;

const SUBCLASSES: &[&str] = &["TypeError", "RangeError", "ReferenceError", "SyntaxError", "EvalError", "URIError"];

pub(crate) fn install(engine: &mut Engine) {
    let object_proto = engine.protos.object.clone();
    let error_proto = GuestObject::new("Error", Some(object_proto.clone()));
    error_proto.borrow_mut().define_data("name", Value::str("Error"), true, false, true);
    error_proto.borrow_mut().define_data("message", Value::str(""), true, false, true);

    super::define_method(engine, &error_proto, "toString", 0, |_engine, this, _args| {
        let Value::Obj(o) = this else { return Ok(Value::str("Error")) };
        let b = o.borrow();
        let name = b.properties.get("name").map(|s| crate::property::primitive_to_display_string(&s.value)).unwrap_or_else(|| "Error".to_string());
        let message = b.properties.get("message").map(|s| crate::property::primitive_to_display_string(&s.value)).unwrap_or_default();
        Ok(Value::str(if message.is_empty() { name } else { format!("{name}: {message}") }))
    });

    let error_ctor = make_ctor(engine, "Error", error_proto.clone());
    engine.protos.errors.insert("Error", error_proto.clone());
    engine.global_object.borrow_mut().define_data("Error", Value::Obj(error_ctor), true, false, true);

    for &name in SUBCLASSES {
        let proto = GuestObject::new("Error", Some(error_proto.clone()));
        proto.borrow_mut().define_data("name", Value::str(name), true, false, true);
        proto.borrow_mut().define_data("message", Value::str(""), true, false, true);
        let ctor = make_ctor(engine, name, proto.clone());
        engine.protos.errors.insert(name, proto);
        engine.global_object.borrow_mut().define_data(name, Value::Obj(ctor), true, false, true);
    }
}

fn make_ctor(engine: &mut Engine, name: &'static str, proto: crate::object::ObjectRef) -> crate::object::ObjectRef {
    let proto_for_ctor = proto.clone();
    let ctor = engine.create_native_function(name, 1, true, move |engine, this, args| {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            v => crate::property::primitive_to_display_string(&v),
        };
        if let Value::Obj(o) = this {
            if o.borrow().proto.as_ref().map(|p| std::rc::Rc::ptr_eq(p, &proto_for_ctor)).unwrap_or(false) {
                o.borrow_mut().class = "Error";
                o.borrow_mut().define_data("message", Value::str(message), true, false, true);
                return Ok(this.clone());
            }
        }
        Ok(engine.make_error(class_for_name(name), &message))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);
    ctor
}

fn class_for_name(name: &str) -> crate::error::GuestErrorClass {
    use crate::error::GuestErrorClass::*;
    match name {
        "TypeError" => TypeError,
        "RangeError" => RangeError,
        "ReferenceError" => ReferenceError,
        "SyntaxError" => SyntaxError,
        "EvalError" => EvalError,
        "URIError" => URIError,
        _ => Error,
    }
}
