//! `String` constructor and prototype (spec §4.5 layer 1, §9 supplement F).
//! `replace` with a function argument is a guest-source polyfill (it must
//! invoke a guest callback per match); the string-literal replacement case,
//! and `match`/`search` (routed through the regex sandbox), are native.

use super::{arg, define_method};
use crate::engine::Engine;
use crate::error::{GuestErrorClass, ThrowPayload};
use crate::object::{GuestObject, InternalData, ObjectRef};
use crate::regexp_sandbox::{RegexOp, RegexRequest};
use crate::value::Value;

fn type_error(message: impl Into<String>) -> ThrowPayload {
    ThrowPayload::Class(GuestErrorClass::TypeError, message.into())
}

fn this_string(engine: &Engine, this: &Value) -> String {
    match this {
        Value::Str(s) => s.to_string(),
        Value::Obj(o) if o.borrow().class == "String" => match &o.borrow().data {
            InternalData::Boxed(Value::Str(s)) => s.to_string(),
            _ => String::new(),
        },
        other => to_guest_string(engine, other),
    }
}

fn to_guest_string(_engine: &Engine, v: &Value) -> String {
    crate::property::primitive_to_display_string(v)
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn utf16_slice(s: &str, start: usize, end: usize) -> String {
    let units: Vec<u16> = s.encode_utf16().collect();
    let start = start.min(units.len());
    let end = end.min(units.len()).max(start);
    String::from_utf16_lossy(&units[start..end])
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

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.string.clone();
    proto.borrow_mut().data = InternalData::Boxed(Value::str(""));

    define_method(engine, &proto, "toString", 0, |engine, this, _args| Ok(Value::str(this_string(engine, this))));
    define_method(engine, &proto, "valueOf", 0, |engine, this, _args| Ok(Value::str(this_string(engine, this))));

    define_method(engine, &proto, "charAt", 1, |engine, this, args| {
        let s = this_string(engine, this);
        let i = arg(args, 0).to_number_primitive();
        if i < 0.0 || i.is_nan() {
            return Ok(Value::str(""));
        }
        let units: Vec<u16> = s.encode_utf16().collect();
        Ok(match units.get(i as usize) {
            Some(u) => Value::str(String::from_utf16_lossy(&[*u])),
            None => Value::str(""),
        })
    });

    define_method(engine, &proto, "charCodeAt", 1, |engine, this, args| {
        let s = this_string(engine, this);
        let i = arg(args, 0).to_number_primitive();
        if i < 0.0 || i.is_nan() {
            return Ok(Value::Num(f64::NAN));
        }
        let units: Vec<u16> = s.encode_utf16().collect();
        Ok(match units.get(i as usize) {
            Some(u) => Value::Num(*u as f64),
            None => Value::Num(f64::NAN),
        })
    });

    define_method(engine, &proto, "indexOf", 1, |engine, this, args| {
        let s = this_string(engine, this);
        let needle = crate::property::primitive_to_display_string(&arg(args, 0));
        let units: Vec<u16> = s.encode_utf16().collect();
        let needle_units: Vec<u16> = needle.encode_utf16().collect();
        let start = match arg(args, 1) {
            Value::Undefined => 0,
            v => normalize_index(v.to_number_primitive(), units.len() as i64) as usize,
        };
        Ok(Value::Num(find_units(&units, &needle_units, start).map(|i| i as f64).unwrap_or(-1.0)))
    });

    define_method(engine, &proto, "lastIndexOf", 1, |engine, this, args| {
        let s = this_string(engine, this);
        let needle = crate::property::primitive_to_display_string(&arg(args, 0));
        let units: Vec<u16> = s.encode_utf16().collect();
        let needle_units: Vec<u16> = needle.encode_utf16().collect();
        let mut last = None;
        let mut from = 0;
        while let Some(i) = find_units(&units, &needle_units, from) {
            last = Some(i);
            from = i + 1;
        }
        Ok(Value::Num(last.map(|i| i as f64).unwrap_or(-1.0)))
    });

    define_method(engine, &proto, "slice", 2, |engine, this, args| {
        let s = this_string(engine, this);
        let len = utf16_len(&s) as i64;
        let start = match arg(args, 0) {
            Value::Undefined => 0,
            v => normalize_index(v.to_number_primitive(), len),
        };
        let end = match arg(args, 1) {
            Value::Undefined => len,
            v => normalize_index(v.to_number_primitive(), len),
        };
        Ok(Value::str(utf16_slice(&s, start as usize, end.max(start) as usize)))
    });

    define_method(engine, &proto, "substring", 2, |engine, this, args| {
        let s = this_string(engine, this);
        let len = utf16_len(&s) as i64;
        let clamp = |n: f64| -> i64 {
            if n.is_nan() { 0 } else { (n as i64).clamp(0, len) }
        };
        let a = match arg(args, 0) {
            Value::Undefined => 0,
            v => clamp(v.to_number_primitive()),
        };
        let b = match arg(args, 1) {
            Value::Undefined => len,
            v => clamp(v.to_number_primitive()),
        };
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Ok(Value::str(utf16_slice(&s, start as usize, end as usize)))
    });

    define_method(engine, &proto, "substr", 2, |engine, this, args| {
        let s = this_string(engine, this);
        let len = utf16_len(&s) as i64;
        let start = normalize_index(arg(args, 0).to_number_primitive(), len);
        let count = match arg(args, 1) {
            Value::Undefined => len - start,
            v => v.to_number_primitive().max(0.0) as i64,
        };
        let end = (start + count).min(len);
        Ok(Value::str(utf16_slice(&s, start as usize, end.max(start) as usize)))
    });

    define_method(engine, &proto, "concat", 1, |engine, this, args| {
        let mut s = this_string(engine, this);
        for a in args {
            s.push_str(&crate::property::primitive_to_display_string(a));
        }
        Ok(Value::str(s))
    });

    define_method(engine, &proto, "split", 2, |engine, this, args| {
        let s = this_string(engine, this);
        split_string(engine, &s, &arg(args, 0), &arg(args, 1))
    });

    define_method(engine, &proto, "toUpperCase", 0, |engine, this, _args| Ok(Value::str(this_string(engine, this).to_uppercase())));
    define_method(engine, &proto, "toLowerCase", 0, |engine, this, _args| Ok(Value::str(this_string(engine, this).to_lowercase())));
    define_method(engine, &proto, "trim", 0, |engine, this, _args| Ok(Value::str(this_string(engine, this).trim().to_string())));

    define_method(engine, &proto, "replace", 2, |engine, this, args| {
        let s = this_string(engine, this);
        let replacement = arg(args, 1);
        if matches!(replacement, Value::Obj(ref o) if GuestObject::is_callable(o)) {
            // A function replacer runs guest code per match; handled by the
            // guest-source polyfill wrapping this method.
            return Ok(Value::str(s));
        }
        let replacement_str = crate::property::primitive_to_display_string(&replacement);
        match arg(args, 0) {
            Value::Obj(re) if re.borrow().class == "RegExp" => {
                let (pattern, flags, last_index) = regexp_parts(&re);
                let resp = run_regex(engine, RegexOp::Replace, &pattern, &flags, &s, last_index)?;
                match resp.matched {
                    Some(groups) => {
                        let matched_text = groups[0].clone().unwrap_or_default();
                        let pos = s.find(matched_text.as_str()).unwrap_or(0);
                        let mut out = s[..pos].to_string();
                        out.push_str(&replacement_str);
                        out.push_str(&s[pos + matched_text.len()..]);
                        Ok(Value::str(out))
                    }
                    None => Ok(Value::str(s)),
                }
            }
            pattern => {
                let pattern = crate::property::primitive_to_display_string(&pattern);
                match s.find(pattern.as_str()) {
                    Some(pos) => {
                        let mut out = s[..pos].to_string();
                        out.push_str(&replacement_str);
                        out.push_str(&s[pos + pattern.len()..]);
                        Ok(Value::str(out))
                    }
                    None => Ok(Value::str(s)),
                }
            }
        }
    });

    define_method(engine, &proto, "match", 1, |engine, this, args| {
        let s = this_string(engine, this);
        let re = to_regexp_object(engine, &arg(args, 0));
        let (pattern, flags, _) = regexp_parts(&re);
        let resp = run_regex(engine, RegexOp::Match, &pattern, &flags, &s, 0)?;
        match resp.matched {
            Some(groups) => Ok(crate::bridge::array_native_to_pseudo(
                engine,
                &groups.iter().map(|g| g.clone().map(crate::bridge::Native::str).unwrap_or(crate::bridge::Native::Null)).collect::<Vec<_>>(),
                &indexmap::IndexMap::new(),
            )),
            None => Ok(Value::Null),
        }
    });

    define_method(engine, &proto, "search", 1, |engine, this, args| {
        let s = this_string(engine, this);
        let re = to_regexp_object(engine, &arg(args, 0));
        let (pattern, flags, _) = regexp_parts(&re);
        let resp = run_regex(engine, RegexOp::Search, &pattern, &flags, &s, 0)?;
        match resp.matched {
            Some(groups) => {
                let matched_text = groups[0].clone().unwrap_or_default();
                Ok(Value::Num(s.find(matched_text.as_str()).map(|i| i as f64).unwrap_or(-1.0)))
            }
            None => Ok(Value::Num(-1.0)),
        }
    });

    let ctor = engine.create_native_function("String", 1, true, |engine, this, args| {
        let s = match args.first() {
            Some(v) => crate::property::primitive_to_display_string(v),
            None => String::new(),
        };
        if let Value::Obj(o) = this {
            if o.borrow().proto.as_ref().map(|p| std::rc::Rc::ptr_eq(p, &engine.protos.string)).unwrap_or(false) {
                o.borrow_mut().class = "String";
                o.borrow_mut().data = InternalData::Boxed(Value::str(s.clone()));
                o.borrow_mut().define_data("length", Value::Num(utf16_len(&s) as f64), false, false, false);
                return Ok(this.clone());
            }
        }
        Ok(Value::str(s))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);

    define_method(engine, &ctor, "fromCharCode", 1, |_engine, _this, args| {
        let units: Vec<u16> = args.iter().map(|v| v.to_number_primitive() as u16).collect();
        Ok(Value::str(String::from_utf16_lossy(&units)))
    });

    engine.global_object.borrow_mut().define_data("String", Value::Obj(ctor), true, false, true);
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if from >= haystack.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

fn regexp_parts(obj: &ObjectRef) -> (String, String, usize) {
    match &obj.borrow().data {
        InternalData::Regexp { source, flags, last_index } => (source.clone(), flags.clone(), *last_index),
        _ => (String::new(), String::new(), 0),
    }
}

fn to_regexp_object(engine: &mut Engine, v: &Value) -> ObjectRef {
    if let Value::Obj(o) = v {
        if o.borrow().class == "RegExp" {
            return o.clone();
        }
    }
    let pattern = crate::property::primitive_to_display_string(v);
    let obj = GuestObject::new("RegExp", Some(engine.protos.regexp.clone()));
    obj.borrow_mut().data = InternalData::Regexp { source: pattern, flags: String::new(), last_index: 0 };
    obj
}

fn run_regex(
    engine: &mut Engine,
    op: RegexOp,
    pattern: &str,
    flags: &str,
    subject: &str,
    last_index: usize,
) -> Result<crate::regexp_sandbox::RegexResponse, ThrowPayload> {
    let req = RegexRequest {
        op,
        source: pattern.to_string(),
        flags: flags.to_string(),
        subject: subject.to_string(),
        last_index,
    };
    engine.regex_sandbox.run(req, &engine.config).map_err(|e| match e {
        crate::error::EngineError::RegexDisabled => type_error("regular expressions are disabled"),
        crate::error::EngineError::RegexTimeout { pattern } => ThrowPayload::Class(GuestErrorClass::Error, format!("regex timed out: /{pattern}/")),
        other => ThrowPayload::Class(GuestErrorClass::Error, other.to_string()),
    })
}

fn split_string(engine: &mut Engine, s: &str, sep: &Value, limit: &Value) -> Result<Value, ThrowPayload> {
    let limit = match limit {
        Value::Undefined => usize::MAX,
        v => v.to_number_primitive() as usize,
    };
    let parts: Vec<String> = match sep {
        Value::Undefined => vec![s.to_string()],
        Value::Obj(o) if o.borrow().class == "RegExp" => {
            let (pattern, flags, _) = regexp_parts(o);
            let mut opts = regress::Flags::default();
            for c in flags.chars() {
                match c {
                    'i' => opts.icase = true,
                    'm' => opts.multiline = true,
                    's' => opts.dot_matches_new_line = true,
                    _ => {}
                }
            }
            match regress::Regex::with_flags(&pattern, opts) {
                Ok(re) => {
                    let mut out = Vec::new();
                    let mut pos = 0usize;
                    loop {
                        match re.find_from(s, pos).next() {
                            Some(m) if m.range().end > pos || !m.range().is_empty() => {
                                out.push(s[pos..m.range().start].to_string());
                                pos = if m.range().is_empty() { m.range().end + 1 } else { m.range().end };
                            }
                            _ => break,
                        }
                        if pos > s.len() {
                            break;
                        }
                    }
                    out.push(s[pos.min(s.len())..].to_string());
                    out
                }
                Err(_) => vec![s.to_string()],
            }
        }
        other => {
            let needle = crate::property::primitive_to_display_string(other);
            if needle.is_empty() {
                s.chars().map(|c| c.to_string()).collect()
            } else {
                s.split(needle.as_str()).map(|p| p.to_string()).collect()
            }
        }
    };
    let obj = GuestObject::new("Array", Some(engine.protos.array.clone()));
    for (i, p) in parts.into_iter().take(limit).enumerate() {
        obj.borrow_mut().define_data(&i.to_string(), Value::str(p), true, true, true);
    }
    let len = obj.borrow().properties.len() as f64;
    obj.borrow_mut().define_data("length", Value::Num(len), true, false, false);
    Ok(Value::Obj(obj))
}
