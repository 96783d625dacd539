//! `Boolean` constructor and prototype (spec §4.5 layer 1).

use crate::engine::Engine;
use crate::object::InternalData;
use crate::value::Value;

fn this_bool(this: &Value) -> bool {
    match this {
        Value::Bool(b) => *b,
        Value::Obj(o) => match &o.borrow().data {
            InternalData::Boxed(Value::Bool(b)) => *b,
            _ => false,
        },
        other => other.to_bool(),
    }
}

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.boolean.clone();
    proto.borrow_mut().data = InternalData::Boxed(Value::Bool(false));

    super::define_method(engine, &proto, "toString", 0, |_engine, this, _args| Ok(Value::str(this_bool(this).to_string())));
    super::define_method(engine, &proto, "valueOf", 0, |_engine, this, _args| Ok(Value::Bool(this_bool(this))));

    let ctor = engine.create_native_function("Boolean", 1, true, |engine, this, args| {
        let b = args.first().map(|v| v.to_bool()).unwrap_or(false);
        if let Value::Obj(o) = this {
            if o.borrow().proto.as_ref().map(|p| std::rc::Rc::ptr_eq(p, &engine.protos.boolean)).unwrap_or(false) {
                o.borrow_mut().class = "Boolean";
                o.borrow_mut().data = InternalData::Boxed(Value::Bool(b));
                return Ok(this.clone());
            }
        }
        Ok(Value::Bool(b))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);
    engine.global_object.borrow_mut().define_data("Boolean", Value::Obj(ctor), true, false, true);
}
