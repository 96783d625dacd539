//! `Function` constructor and prototype (spec §4.5 layer 1). `call`,
//! `apply` and `bind` are guest-source polyfills (spec Design Notes,
//! supplemented per §9): they need to push a call frame that can resume
//! across steps, which a native function's single synchronous return value
//! cannot express.

use crate::engine::Engine;
use crate::object::ObjectKind;
use crate::value::Value;

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.function.clone();

    super::define_method(engine, &proto, "toString", 0, |_engine, this, _args| {
        let name = match this {
            Value::Obj(o) => match &o.borrow().kind {
                ObjectKind::GuestFn { name, .. } => name.clone().unwrap_or_default(),
                _ => o
                    .borrow()
                    .properties
                    .get("name")
                    .map(|s| crate::property::primitive_to_display_string(&s.value))
                    .unwrap_or_default(),
            },
            _ => String::new(),
        };
        Ok(Value::str(format!("function {name}() {{ [native code] }}")))
    });

    let ctor = engine.create_native_function("Function", 1, true, |engine, _this, _args| {
        // Building a function from dynamic source text requires a
        // configured parser (spec §6.2 `SourceParser`); without one this
        // constructs a no-op function rather than failing the call.
        Ok(Value::Obj(engine.create_native_function("anonymous", 0, false, |_e, _t, _a| Ok(Value::Undefined))))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);
    engine.global_object.borrow_mut().define_data("Function", Value::Obj(ctor), true, false, true);
}
