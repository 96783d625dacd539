//! `Number` constructor and prototype (spec §4.5 layer 1).

use super::arg;
use crate::engine::Engine;
use crate::object::InternalData;
use crate::value::{number_to_guest_string, Value};

fn this_number(this: &Value) -> f64 {
    match this {
        Value::Num(n) => *n,
        Value::Obj(o) => match &o.borrow().data {
            InternalData::Boxed(Value::Num(n)) => *n,
            _ => f64::NAN,
        },
        other => other.to_number_primitive(),
    }
}

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.number.clone();
    proto.borrow_mut().data = InternalData::Boxed(Value::Num(0.0));

    super::define_method(engine, &proto, "toString", 1, |_engine, this, args| {
        let n = this_number(this);
        let radix = match arg(args, 0) {
            Value::Undefined => 10,
            v => v.to_number_primitive() as u32,
        };
        if radix == 10 {
            Ok(Value::str(number_to_guest_string(n)))
        } else {
            Ok(Value::str(to_radix_string(n, radix)))
        }
    });

    super::define_method(engine, &proto, "valueOf", 0, |_engine, this, _args| Ok(Value::Num(this_number(this))));

    super::define_method(engine, &proto, "toFixed", 1, |_engine, this, args| {
        let n = this_number(this);
        let digits = match arg(args, 0) {
            Value::Undefined => 0,
            v => v.to_number_primitive() as usize,
        };
        if n.is_nan() {
            return Ok(Value::str("NaN"));
        }
        Ok(Value::str(format!("{n:.digits$}")))
    });

    let ctor = engine.create_native_function("Number", 1, true, |engine, this, args| {
        let n = args.first().map(|v| v.to_number_primitive()).unwrap_or(0.0);
        if let Value::Obj(o) = this {
            if o.borrow().proto.as_ref().map(|p| std::rc::Rc::ptr_eq(p, &engine.protos.number)).unwrap_or(false) {
                o.borrow_mut().class = "Number";
                o.borrow_mut().data = InternalData::Boxed(Value::Num(n));
                return Ok(this.clone());
            }
        }
        Ok(Value::Num(n))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);

    ctor.borrow_mut().define_data("MAX_VALUE", Value::Num(f64::MAX), false, false, false);
    ctor.borrow_mut().define_data("MIN_VALUE", Value::Num(f64::MIN_POSITIVE), false, false, false);
    ctor.borrow_mut().define_data("NaN", Value::Num(f64::NAN), false, false, false);
    ctor.borrow_mut().define_data("POSITIVE_INFINITY", Value::Num(f64::INFINITY), false, false, false);
    ctor.borrow_mut().define_data("NEGATIVE_INFINITY", Value::Num(f64::NEG_INFINITY), false, false, false);

    engine.global_object.borrow_mut().define_data("Number", Value::Obj(ctor), true, false, true);
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if !(2..=36).contains(&radix) {
        return number_to_guest_string(n);
    }
    if n.is_nan() {
        return "NaN".to_string();
    }
    let neg = n < 0.0;
    let mut int_part = n.abs().trunc() as u64;
    let digits = "0123456789abcdefghijklmnopqrstuvwxyz".as_bytes();
    let mut out = Vec::new();
    if int_part == 0 {
        out.push(b'0');
    }
    while int_part > 0 {
        out.push(digits[(int_part % radix as u64) as usize]);
        int_part /= radix as u64;
    }
    out.reverse();
    let mut s = String::from_utf8(out).unwrap();
    if neg {
        s.insert(0, '-');
    }
    s
}
