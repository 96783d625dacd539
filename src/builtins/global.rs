//! The global functions that sit directly on the global object rather than
//! on any constructor (spec §9 ambient ES5 completeness, grounded in the
//! teacher's `js_function.rs` global dispatch table: `parseInt`,
//! `parseFloat`, `isNaN`, `isFinite`).

use super::arg;
use crate::engine::Engine;
use crate::value::Value;

pub(crate) fn install(engine: &mut Engine) {
    let global = engine.global_object.clone();

    global.borrow_mut().define_data("undefined", Value::Undefined, false, false, false);
    global.borrow_mut().define_data("NaN", Value::Num(f64::NAN), false, false, false);
    global.borrow_mut().define_data("Infinity", Value::Num(f64::INFINITY), false, false, false);

    let is_nan = engine.create_native_function("isNaN", 1, false, |_engine, _this, args| Ok(Value::Bool(arg(args, 0).to_number_primitive().is_nan())));
    global.borrow_mut().define_data("isNaN", Value::Obj(is_nan), true, false, true);

    let is_finite = engine.create_native_function("isFinite", 1, false, |_engine, _this, args| Ok(Value::Bool(arg(args, 0).to_number_primitive().is_finite())));
    global.borrow_mut().define_data("isFinite", Value::Obj(is_finite), true, false, true);

    let parse_int = engine.create_native_function("parseInt", 2, false, |_engine, _this, args| {
        let s = crate::property::primitive_to_display_string(&arg(args, 0));
        let radix = match arg(args, 1) {
            Value::Undefined => 0,
            v => v.to_number_primitive() as u32,
        };
        Ok(Value::Num(parse_int_impl(s.trim(), radix)))
    });
    global.borrow_mut().define_data("parseInt", Value::Obj(parse_int), true, false, true);

    let parse_float = engine.create_native_function("parseFloat", 1, false, |_engine, _this, args| {
        let s = crate::property::primitive_to_display_string(&arg(args, 0));
        Ok(Value::Num(parse_float_impl(s.trim())))
    });
    global.borrow_mut().define_data("parseFloat", Value::Obj(parse_float), true, false, true);

    // Number.isNaN/isFinite/parseFloat/parseInt must be the same function
    // objects as the globals above, not separate re-implementations.
    let number_ctor = global.borrow().properties.get("Number").map(|s| s.value.clone());
    if let Some(Value::Obj(number)) = number_ctor {
        number.borrow_mut().define_data("isNaN", Value::Obj(is_nan.clone()), true, false, true);
        number.borrow_mut().define_data("isFinite", Value::Obj(is_finite.clone()), true, false, true);
        number.borrow_mut().define_data("parseFloat", Value::Obj(parse_float.clone()), true, false, true);
        number.borrow_mut().define_data("parseInt", Value::Obj(parse_int.clone()), true, false, true);
    }
}

fn parse_int_impl(s: &str, mut radix: u32) -> f64 {
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let rest = if (radix == 0 || radix == 16) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        radix = 16;
        &rest[2..]
    } else {
        if radix == 0 {
            radix = 10;
        }
        rest
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let end = rest.find(|c: char| !c.is_digit(radix)).unwrap_or(rest.len());
    if end == 0 {
        return f64::NAN;
    }
    match i64::from_str_radix(&rest[..end], radix) {
        Ok(n) => if neg { -(n as f64) } else { n as f64 },
        Err(_) => f64::NAN,
    }
}

fn parse_float_impl(s: &str) -> f64 {
    let mut end = 0;
    let bytes = s.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    let mut seen_digit = false;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        let val = if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
        return val;
    }
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c.is_ascii_digit() {
            seen_digit = true;
            end += 1;
        } else if c == '.' && !seen_dot && !seen_exp {
            seen_dot = true;
            end += 1;
        } else if (c == 'e' || c == 'E') && seen_digit && !seen_exp {
            seen_exp = true;
            end += 1;
            if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                end += 1;
            }
        } else {
            break;
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}
