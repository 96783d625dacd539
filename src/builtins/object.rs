//! `Object` constructor and prototype (spec §4.5 layer 1).

use super::{arg, define_constructor_method, define_method};
use crate::engine::{Engine, NativeResult};
use crate::error::{GuestErrorClass, ThrowPayload};
use crate::object::{GuestObject, ObjectRef};
use crate::value::Value;

fn type_error(message: impl Into<String>) -> ThrowPayload {
    ThrowPayload::Class(GuestErrorClass::TypeError, message.into())
}

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.object.clone();

    define_method(engine, &proto, "toString", 0, |_engine, this, _args| {
        let tag = match this {
            Value::Undefined => "Undefined",
            Value::Null => "Null",
            Value::Obj(o) if o.borrow().class == "Array" => "Array",
            Value::Obj(o) if GuestObject::is_callable(o) => "Function",
            _ => "Object",
        };
        Ok(Value::str(format!("[object {tag}]")))
    });

    define_method(engine, &proto, "valueOf", 0, |_engine, this, _args| Ok(this.clone()));

    define_method(engine, &proto, "hasOwnProperty", 1, |_engine, this, args| {
        let key = crate::property::primitive_to_display_string(&arg(args, 0));
        let Value::Obj(o) = this else { return Ok(Value::Bool(false)) };
        let b = o.borrow();
        Ok(Value::Bool(b.properties.contains_key(&key) || b.is_accessor(&key)))
    });

    define_method(engine, &proto, "isPrototypeOf", 1, |_engine, this, args| {
        let Value::Obj(target) = arg(args, 0) else { return Ok(Value::Bool(false)) };
        let Value::Obj(self_obj) = this else { return Ok(Value::Bool(false)) };
        let mut current = target.borrow().proto.clone();
        while let Some(p) = current {
            if std::rc::Rc::ptr_eq(&p, self_obj) {
                return Ok(Value::Bool(true));
            }
            current = p.borrow().proto.clone();
        }
        Ok(Value::Bool(false))
    });

    define_method(engine, &proto, "propertyIsEnumerable", 1, |_engine, this, args| {
        let key = crate::property::primitive_to_display_string(&arg(args, 0));
        let Value::Obj(o) = this else { return Ok(Value::Bool(false)) };
        Ok(Value::Bool(o.borrow().properties.get(&key).map(|s| s.enumerable).unwrap_or(false)))
    });

    let ctor = define_constructor_method_standalone(engine, "Object", 1, |engine, _this, args| match args.first() {
        Some(Value::Obj(o)) => Ok(Value::Obj(o.clone())),
        Some(Value::Undefined) | Some(Value::Null) | None => Ok(Value::Obj(GuestObject::new("Object", Some(engine.protos.object.clone())))),
        Some(other) => Ok(other.clone()),
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);

    define_method(engine, &ctor, "keys", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let keys = obj.borrow().own_enumerable_keys();
        Ok(make_string_array(_engine, keys))
    });

    define_method(engine, &ctor, "getPrototypeOf", 1, |engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        Ok(obj.borrow().proto.clone().map(Value::Obj).unwrap_or(Value::Null))
    });

    define_method(engine, &ctor, "getOwnPropertyNames", 1, |engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let keys: Vec<String> = obj.borrow().properties.keys().cloned().collect();
        Ok(make_string_array(engine, keys))
    });

    define_method(engine, &ctor, "create", 2, |engine, _this, args| {
        let proto_arg = arg(args, 0);
        let proto = match &proto_arg {
            Value::Null => None,
            Value::Obj(o) => Some(o.clone()),
            _ => return Err(type_error("Object prototype may only be an Object or null")),
        };
        let obj = GuestObject::new("Object", proto);
        if let Value::Obj(props) = arg(args, 1) {
            apply_property_descriptors(engine, &obj, &props)?;
        }
        Ok(Value::Obj(obj))
    });

    define_method(engine, &ctor, "defineProperty", 3, |engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let key = crate::property::primitive_to_display_string(&arg(args, 1));
        let Value::Obj(descriptor) = arg(args, 2) else {
            return Err(type_error("Property description must be an object"));
        };
        apply_one_descriptor(engine, obj, &key, &descriptor)?;
        Ok(Value::Obj(obj.clone()))
    });

    define_method(engine, &ctor, "getOwnPropertyDescriptor", 2, |engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let key = crate::property::primitive_to_display_string(&arg(args, 1));
        Ok(describe_own_property(engine, obj, &key))
    });

    define_method(engine, &ctor, "freeze", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let mut b = obj.borrow_mut();
        b.extensible = false;
        for slot in b.properties.values_mut() {
            slot.writable = false;
            slot.configurable = false;
        }
        Ok(Value::Obj(obj.clone()))
    });

    define_method(engine, &ctor, "isFrozen", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let b = obj.borrow();
        Ok(Value::Bool(!b.extensible && b.properties.values().all(|s| !s.writable && !s.configurable)))
    });

    define_method(engine, &ctor, "seal", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let mut b = obj.borrow_mut();
        b.extensible = false;
        for slot in b.properties.values_mut() {
            slot.configurable = false;
        }
        Ok(Value::Obj(obj.clone()))
    });

    define_method(engine, &ctor, "isSealed", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        let b = obj.borrow();
        Ok(Value::Bool(!b.extensible && b.properties.values().all(|s| !s.configurable)))
    });

    define_method(engine, &ctor, "preventExtensions", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        obj.borrow_mut().extensible = false;
        Ok(Value::Obj(obj.clone()))
    });

    define_method(engine, &ctor, "isExtensible", 1, |_engine, _this, args| {
        let obj = this_as_object_or(&arg(args, 0))?;
        Ok(Value::Bool(obj.borrow().extensible))
    });

    engine.global_object.borrow_mut().define_data("Object", Value::Obj(ctor), true, false, true);
}

fn define_constructor_method_standalone(
    engine: &mut Engine,
    name: &'static str,
    arity: usize,
    imp: impl Fn(&mut Engine, &Value, &[Value]) -> NativeResult + 'static,
) -> ObjectRef {
    engine.create_native_function(name, arity, true, imp)
}

fn this_as_object_or(v: &Value) -> Result<ObjectRef, ThrowPayload> {
    v.as_object()
        .cloned()
        .ok_or_else(|| type_error(format!("{} is not an object", crate::property::primitive_to_display_string(v))))
}

fn make_string_array(engine: &mut Engine, items: Vec<String>) -> Value {
    let obj = GuestObject::new("Array", Some(engine.protos.array.clone()));
    for (i, s) in items.iter().enumerate() {
        obj.borrow_mut().define_data(&i.to_string(), Value::str(s.clone()), true, true, true);
    }
    obj.borrow_mut().define_data("length", Value::Num(items.len() as f64), true, false, false);
    Value::Obj(obj)
}

fn apply_property_descriptors(engine: &mut Engine, obj: &ObjectRef, props: &ObjectRef) -> Result<(), ThrowPayload> {
    let keys: Vec<String> = props.borrow().own_enumerable_keys();
    for key in keys {
        let Some(descriptor) = props.borrow().properties.get(&key).map(|s| s.value.clone()) else { continue };
        let Value::Obj(descriptor) = descriptor else { continue };
        apply_one_descriptor(engine, obj, &key, &descriptor)?;
    }
    Ok(())
}

fn apply_one_descriptor(_engine: &mut Engine, obj: &ObjectRef, key: &str, descriptor: &ObjectRef) -> Result<(), ThrowPayload> {
    let d = descriptor.borrow();
    let get = d.properties.get("get").map(|s| s.value.clone());
    let set = d.properties.get("set").map(|s| s.value.clone());
    if get.is_some() || set.is_some() {
        let get_fn = get.and_then(|v| v.as_object().cloned());
        let set_fn = set.and_then(|v| v.as_object().cloned());
        drop(d);
        obj.borrow_mut().define_accessor(key, get_fn, set_fn);
        return Ok(());
    }
    let value = d.properties.get("value").map(|s| s.value.clone()).unwrap_or(Value::Undefined);
    let writable = d.properties.get("writable").map(|s| s.value.to_bool()).unwrap_or(false);
    let enumerable = d.properties.get("enumerable").map(|s| s.value.to_bool()).unwrap_or(false);
    let configurable = d.properties.get("configurable").map(|s| s.value.to_bool()).unwrap_or(false);
    drop(d);
    obj.borrow_mut().define_data(key, value, writable, enumerable, configurable);
    Ok(())
}

fn describe_own_property(engine: &mut Engine, obj: &ObjectRef, key: &str) -> Value {
    let b = obj.borrow();
    if let Some(slot) = b.properties.get(key) {
        let desc = GuestObject::new("Object", Some(engine.protos.object.clone()));
        desc.borrow_mut().define_data("value", slot.value.clone(), true, true, true);
        desc.borrow_mut().define_data("writable", Value::Bool(slot.writable), true, true, true);
        desc.borrow_mut().define_data("enumerable", Value::Bool(slot.enumerable), true, true, true);
        desc.borrow_mut().define_data("configurable", Value::Bool(slot.configurable), true, true, true);
        return Value::Obj(desc);
    }
    if b.is_accessor(key) {
        let desc = GuestObject::new("Object", Some(engine.protos.object.clone()));
        let getter = b.getters.get(key).cloned().map(Value::Obj).unwrap_or(Value::Undefined);
        let setter = b.setters.get(key).cloned().map(Value::Obj).unwrap_or(Value::Undefined);
        desc.borrow_mut().define_data("get", getter, true, true, true);
        desc.borrow_mut().define_data("set", setter, true, true, true);
        desc.borrow_mut().define_data("enumerable", Value::Bool(true), true, true, true);
        desc.borrow_mut().define_data("configurable", Value::Bool(true), true, true, true);
        return Value::Obj(desc);
    }
    Value::Undefined
}
