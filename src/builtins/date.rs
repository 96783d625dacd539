//! `Date` constructor and prototype (spec §9 supplement F), grounded in the
//! teacher's `js_date.rs` method list and its `chrono`-based timestamp
//! handling, simplified to a single `InternalData::Date` millisecond slot
//! instead of a `__timestamp` guest-visible property.

use super::arg;
use crate::engine::Engine;
use crate::object::InternalData;
use crate::value::Value;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

fn this_millis(this: &Value) -> f64 {
    match this {
        Value::Obj(o) => match o.borrow().data {
            InternalData::Date(m) => m,
            _ => f64::NAN,
        },
        _ => f64::NAN,
    }
}

fn to_datetime(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn parse_date_string(s: &str) -> f64 {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.timestamp_millis() as f64;
    }
    f64::NAN
}

fn format_iso(millis: f64) -> String {
    match to_datetime(millis) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => "Invalid Date".to_string(),
    }
}

pub(crate) fn install(engine: &mut Engine) {
    let proto = engine.protos.date.clone();
    proto.borrow_mut().data = InternalData::Date(f64::NAN);

    macro_rules! field_getter {
        ($name:expr, $extract:expr) => {
            super::define_method(engine, &proto, $name, 0, |_engine, this, _args| {
                let millis = this_millis(this);
                Ok(match to_datetime(millis) {
                    Some(dt) => Value::Num(($extract)(dt) as f64),
                    None => Value::Num(f64::NAN),
                })
            });
        };
    }

    field_getter!("getFullYear", |dt: DateTime<Utc>| dt.year());
    field_getter!("getMonth", |dt: DateTime<Utc>| dt.month() as i32 - 1);
    field_getter!("getDate", |dt: DateTime<Utc>| dt.day());
    field_getter!("getHours", |dt: DateTime<Utc>| dt.hour());
    field_getter!("getMinutes", |dt: DateTime<Utc>| dt.minute());
    field_getter!("getSeconds", |dt: DateTime<Utc>| dt.second());
    field_getter!("getMilliseconds", |dt: DateTime<Utc>| dt.timestamp_subsec_millis());
    field_getter!("getDay", |dt: DateTime<Utc>| dt.weekday().num_days_from_sunday());

    super::define_method(engine, &proto, "getTime", 0, |_engine, this, _args| Ok(Value::Num(this_millis(this))));
    super::define_method(engine, &proto, "valueOf", 0, |_engine, this, _args| Ok(Value::Num(this_millis(this))));

    super::define_method(engine, &proto, "setTime", 1, |_engine, this, args| {
        let n = arg(args, 0).to_number_primitive();
        if let Value::Obj(o) = this {
            o.borrow_mut().data = InternalData::Date(n);
        }
        Ok(Value::Num(n))
    });

    super::define_method(engine, &proto, "toISOString", 0, |_engine, this, _args| Ok(Value::str(format_iso(this_millis(this)))));
    super::define_method(engine, &proto, "toJSON", 0, |_engine, this, _args| Ok(Value::str(format_iso(this_millis(this)))));

    super::define_method(engine, &proto, "toString", 0, |_engine, this, _args| {
        let millis = this_millis(this);
        Ok(Value::str(match to_datetime(millis) {
            Some(dt) => dt.format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)").to_string(),
            None => "Invalid Date".to_string(),
        }))
    });

    let ctor = engine.create_native_function("Date", 0, true, |engine, this, args| {
        let millis = match args.len() {
            0 => Utc::now().timestamp_millis() as f64,
            1 => match &args[0] {
                Value::Str(s) => parse_date_string(s),
                v => v.to_number_primitive(),
            },
            _ => {
                let get = |i: usize, default: f64| args.get(i).map(|v| v.to_number_primitive()).unwrap_or(default);
                let year = get(0, 1970.0) as i32;
                let month = get(1, 0.0) as u32 + 1;
                let day = get(2, 1.0) as u32;
                let hour = get(3, 0.0) as u32;
                let min = get(4, 0.0) as u32;
                let sec = get(5, 0.0) as u32;
                let ms = get(6, 0.0) as u32;
                chrono::NaiveDate::from_ymd_opt(year, month, day)
                    .and_then(|d| d.and_hms_milli_opt(hour, min, sec, ms))
                    .map(|dt| dt.and_utc().timestamp_millis() as f64)
                    .unwrap_or(f64::NAN)
            }
        };
        if let Value::Obj(o) = this {
            if o.borrow().proto.as_ref().map(|p| std::rc::Rc::ptr_eq(p, &engine.protos.date)).unwrap_or(false) {
                o.borrow_mut().class = "Date";
                o.borrow_mut().data = InternalData::Date(millis);
                return Ok(this.clone());
            }
        }
        Ok(Value::str(format_iso(Utc::now().timestamp_millis() as f64)))
    });
    ctor.borrow_mut().define_data("prototype", Value::Obj(proto.clone()), false, false, false);
    proto.borrow_mut().define_data("constructor", Value::Obj(ctor.clone()), true, false, true);

    super::define_method(engine, &ctor, "now", 0, |_engine, _this, _args| Ok(Value::Num(Utc::now().timestamp_millis() as f64)));
    super::define_method(engine, &ctor, "parse", 1, |_engine, _this, args| Ok(Value::Num(parse_date_string(&crate::property::primitive_to_display_string(&arg(args, 0))))));

    engine.global_object.borrow_mut().define_data("Date", Value::Obj(ctor), true, false, true);
}
