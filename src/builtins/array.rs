//! `Array` constructor and the prototype methods that operate purely on
//! indices and the `length` slot (spec §4.5 layer 1, §9 supplement F).
//! Callback-taking methods (`forEach`, `map`, `filter`, `every`, `some`,
//! `reduce`, `reduceRight`, `toLocaleString`) and the comparator branch of
//! `sort` are guest-source polyfills: a native function cannot suspend
//! itself mid-call to let a guest callback run across further `step()`s.

use super::{arg, define_method};
use crate::engine::Engine;
use crate::error::{GuestErrorClass, ThrowPayload};
use crate::object::{array_current_length, array_set_length_raw, GuestObject, ObjectRef};
use crate::value::Value;

fn type_error(message: impl Into<String>) -> ThrowPayload {
    ThrowPayload::Class(GuestErrorClass::TypeError, message.into())
}

fn new_array(engine: &Engine) -> ObjectRef {
    GuestObject::new("Array", Some(engine.protos.array.clone()))
}

fn get_index(obj: &ObjectRef, i: u64) -> Value {
    obj.borrow().properties.get(&i.to_string()).map(|s| s.value.clone()).unwrap_or(Value::Undefined)
}

fn set_index(obj: &ObjectRef, i: u64, v: Value) {
    let mut b = obj.borrow_mut();
    b.properties.insert(i.to_string(), crate::object::PropertySlot::data(v, true, true, true));
    let len = array_current_length(&b);
    if i + 1 > len {
        array_set_length_raw(&mut b, i + 1);
    }
}

fn remove_index(obj: &ObjectRef, i: u64) {
    obj.borrow_mut().properties.shift_remove(&i.to_string());
}

fn this_array(this: &Value) -> Result<ObjectRef, ThrowPayload> {
    match this {
        Value::Obj(o) => Ok(o.clone()),
        _ => Err(type_error("Array.prototype method called on a non-object")),
    }
}

fn to_display_string(engine: &Engine, arr: &ObjectRef) -> String {
    let len = array_current_length(&arr.borrow());
    let mut parts = Vec::with_capacity(len as usize);
    for i in 0..len {
        let v = get_index(arr, i);
        parts.push(match v {
            Value::Undefined | Value::Null => String::new(),
            Value::Obj(o) if o.borrow().class == "Array" => to_display_string(engine, &o),
            other => crate::property::primitive_to_display_string(&other),
        });
    }
    parts.join(",")
}

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.array.clone();
    proto.borrow_mut().define_data("length", Value::Num(0.0), true, false, false);

    define_method(engine, &proto, "toString", 0, |engine, this, _args| {
        let arr = this_array(this)?;
        Ok(Value::str(to_display_string(engine, &arr)))
    });

    define_method(engine, &proto, "join", 1, |engine, this, args| {
        let arr = this_array(this)?;
        let sep = match arg(args, 0) {
            Value::Undefined => ",".to_string(),
            v => crate::property::primitive_to_display_string(&v),
        };
        let len = array_current_length(&arr.borrow());
        let mut parts = Vec::with_capacity(len as usize);
        for i in 0..len {
            let v = get_index(&arr, i);
            parts.push(match v {
                Value::Undefined | Value::Null => String::new(),
                Value::Obj(o) if o.borrow().class == "Array" => to_display_string(engine, &o),
                other => crate::property::primitive_to_display_string(&other),
            });
        }
        Ok(Value::str(parts.join(&sep)))
    });

    define_method(engine, &proto, "push", 1, |_engine, this, args| {
        let arr = this_array(this)?;
        let mut len = array_current_length(&arr.borrow());
        for v in args {
            set_index(&arr, len, v.clone());
            len += 1;
        }
        Ok(Value::Num(len as f64))
    });

    define_method(engine, &proto, "pop", 0, |_engine, this, _args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow());
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = get_index(&arr, len - 1);
        remove_index(&arr, len - 1);
        array_set_length_raw(&mut arr.borrow_mut(), len - 1);
        Ok(last)
    });

    define_method(engine, &proto, "shift", 0, |_engine, this, _args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow());
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let first = get_index(&arr, 0);
        for i in 1..len {
            let v = get_index(&arr, i);
            set_index(&arr, i - 1, v);
        }
        remove_index(&arr, len - 1);
        array_set_length_raw(&mut arr.borrow_mut(), len - 1);
        Ok(first)
    });

    define_method(engine, &proto, "unshift", 1, |_engine, this, args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow());
        let shift = args.len() as u64;
        for i in (0..len).rev() {
            let v = get_index(&arr, i);
            set_index(&arr, i + shift, v);
        }
        for (i, v) in args.iter().enumerate() {
            set_index(&arr, i as u64, v.clone());
        }
        Ok(Value::Num((len + shift) as f64))
    });

    define_method(engine, &proto, "reverse", 0, |_engine, this, _args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow());
        for i in 0..len / 2 {
            let a = get_index(&arr, i);
            let b = get_index(&arr, len - 1 - i);
            set_index(&arr, i, b);
            set_index(&arr, len - 1 - i, a);
        }
        Ok(this.clone())
    });

    define_method(engine, &proto, "concat", 1, |engine, this, args| {
        let arr = this_array(this)?;
        let out = new_array(engine);
        let mut idx = 0u64;
        let push_all = |source: &Value, idx: &mut u64| match source {
            Value::Obj(o) if o.borrow().class == "Array" => {
                let len = array_current_length(&o.borrow());
                for i in 0..len {
                    set_index(&out, *idx, get_index(o, i));
                    *idx += 1;
                }
            }
            other => {
                set_index(&out, *idx, other.clone());
                *idx += 1;
            }
        };
        push_all(&Value::Obj(arr), &mut idx);
        for a in args {
            push_all(a, &mut idx);
        }
        Ok(Value::Obj(out))
    });

    define_method(engine, &proto, "slice", 2, |engine, this, args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow()) as i64;
        let (start, end) = slice_bounds(len, args);
        let out = new_array(engine);
        let mut idx = 0u64;
        for i in start..end {
            set_index(&out, idx, get_index(&arr, i as u64));
            idx += 1;
        }
        Ok(Value::Obj(out))
    });

    define_method(engine, &proto, "splice", 2, |engine, this, args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow()) as i64;
        let start = normalize_index(arg(args, 0).to_number_primitive(), len);
        let delete_count = match arg(args, 1) {
            Value::Undefined => (len - start).max(0),
            v => v.to_number_primitive().max(0.0) as i64,
        }
        .min(len - start);
        let items: Vec<Value> = args.iter().skip(2).cloned().collect();

        let removed = new_array(engine);
        for i in 0..delete_count {
            set_index(&removed, i as u64, get_index(&arr, (start + i) as u64));
        }

        let tail: Vec<Value> = (start + delete_count..len).map(|i| get_index(&arr, i as u64)).collect();
        let mut write = start;
        for v in items.iter().cloned() {
            set_index(&arr, write as u64, v);
            write += 1;
        }
        for v in tail {
            set_index(&arr, write as u64, v);
            write += 1;
        }
        let new_len = write as u64;
        let old_len = len as u64;
        if new_len < old_len {
            for i in new_len..old_len {
                remove_index(&arr, i);
            }
        }
        array_set_length_raw(&mut arr.borrow_mut(), new_len);
        Ok(Value::Obj(removed))
    });

    define_method(engine, &proto, "indexOf", 1, |_engine, this, args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow()) as i64;
        let target = arg(args, 0);
        let start = match arg(args, 1) {
            Value::Undefined => 0,
            v => normalize_index(v.to_number_primitive(), len),
        };
        for i in start.max(0)..len {
            if get_index(&arr, i as u64).strict_eq(&target) {
                return Ok(Value::Num(i as f64));
            }
        }
        Ok(Value::Num(-1.0))
    });

    define_method(engine, &proto, "lastIndexOf", 1, |_engine, this, args| {
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow()) as i64;
        let target = arg(args, 0);
        let start = match arg(args, 1) {
            Value::Undefined => len - 1,
            v => normalize_index(v.to_number_primitive(), len).min(len - 1),
        };
        let mut i = start;
        while i >= 0 {
            if get_index(&arr, i as u64).strict_eq(&target) {
                return Ok(Value::Num(i as f64));
            }
            i -= 1;
        }
        Ok(Value::Num(-1.0))
    });

    define_method(engine, &proto, "sort", 1, |_engine, this, args| {
        // No-comparator case only (spec §9 supplement F); a function
        // argument is handled by the guest-source polyfill wrapping this
        // native method for the plain lexicographic case.
        if !matches!(arg(args, 0), Value::Undefined) {
            return Ok(this.clone());
        }
        let arr = this_array(this)?;
        let len = array_current_length(&arr.borrow());
        let mut items: Vec<Value> = (0..len).map(|i| get_index(&arr, i)).collect();
        items.sort_by(|a, b| {
            let sa = crate::property::primitive_to_display_string(a);
            let sb = crate::property::primitive_to_display_string(b);
            sa.cmp(&sb)
        });
        for (i, v) in items.into_iter().enumerate() {
            set_index(&arr, i as u64, v);
        }
        Ok(this.clone())
    });

    let ctor = engine.create_native_function("Array", 1, true, |engine, _this, args| {
        let out = new_array(engine);
        if args.len() == 1 {
            if let Value::Num(n) = args[0] {
                if n.fract() != 0.0 || n < 0.0 || n > crate::object::MAX_ARRAY_LENGTH as f64 {
                    return Err(ThrowPayload::Class(GuestErrorClass::RangeError, "Invalid array length".to_string()));
                }
                array_set_length_raw(&mut out.borrow_mut(), n as u64);
                return Ok(Value::Obj(out));
            }
        }
        for (i, v) in args.iter().enumerate() {
            set_index(&out, i as u64, v.clone());
        }
        Ok(Value::Obj(out))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);

    define_method(engine, &ctor, "isArray", 1, |_engine, _this, args| Ok(Value::Bool(crate::property::is_array(&arg(args, 0)))));

    engine.global_object.borrow_mut().define_data("Array", Value::Obj(ctor), true, false, true);
}

fn normalize_index(n: f64, len: i64) -> i64 {
    if n.is_nan() {
        return 0;
    }
    let n = n as i64;
    if n < 0 {
        (len + n).max(0)
    } else {
        n.min(len)
    }
}

fn slice_bounds(len: i64, args: &[Value]) -> (i64, i64) {
    let start = match arg(args, 0) {
        Value::Undefined => 0,
        v => normalize_index(v.to_number_primitive(), len),
    };
    let end = match arg(args, 1) {
        Value::Undefined => len,
        v => normalize_index(v.to_number_primitive(), len),
    };
    (start, end.max(start))
}
