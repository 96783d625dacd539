//! `Math` (spec §4.5 layer 1).

use super::arg;
use crate::engine::Engine;
use crate::object::GuestObject;
use crate::value::Value;

pub(crate) fn install(engine: &mut Engine) {
    let math = GuestObject::new("Object", Some(engine.protos.object.clone()));

    math.borrow_mut().define_data("PI", Value::Num(std::f64::consts::PI), false, false, false);
    math.borrow_mut().define_data("E", Value::Num(std::f64::consts::E), false, false, false);
    math.borrow_mut().define_data("LN2", Value::Num(std::f64::consts::LN_2), false, false, false);
    math.borrow_mut().define_data("LN10", Value::Num(std::f64::consts::LN_10), false, false, false);
    math.borrow_mut().define_data("LOG2E", Value::Num(std::f64::consts::LOG2_E), false, false, false);
    math.borrow_mut().define_data("LOG10E", Value::Num(std::f64::consts::LOG10_E), false, false, false);
    math.borrow_mut().define_data("SQRT2", Value::Num(std::f64::consts::SQRT_2), false, false, false);
    math.borrow_mut().define_data("SQRT1_2", Value::Num(std::f64::consts::FRAC_1_SQRT_2), false, false, false);

    macro_rules! unary {
        ($name:expr, $f:expr) => {
            super::define_method(engine, &math, $name, 1, |_engine, _this, args| Ok(Value::Num(($f)(arg(args, 0).to_number_primitive()))));
        };
    }

    unary!("abs", f64::abs);
    unary!("floor", f64::floor);
    unary!("ceil", f64::ceil);
    unary!("sqrt", f64::sqrt);
    unary!("log", f64::ln);
    unary!("exp", f64::exp);
    unary!("sin", f64::sin);
    unary!("cos", f64::cos);
    unary!("tan", f64::tan);

    super::define_method(engine, &math, "round", 1, |_engine, _this, args| {
        let n = arg(args, 0).to_number_primitive();
        Ok(Value::Num((n + 0.5).floor()))
    });

    super::define_method(engine, &math, "max", 2, |_engine, _this, args| {
        if args.is_empty() {
            return Ok(Value::Num(f64::NEG_INFINITY));
        }
        let mut m = f64::NEG_INFINITY;
        for a in args {
            let n = a.to_number_primitive();
            if n.is_nan() {
                return Ok(Value::Num(f64::NAN));
            }
            if n > m {
                m = n;
            }
        }
        Ok(Value::Num(m))
    });

    super::define_method(engine, &math, "min", 2, |_engine, _this, args| {
        if args.is_empty() {
            return Ok(Value::Num(f64::INFINITY));
        }
        let mut m = f64::INFINITY;
        for a in args {
            let n = a.to_number_primitive();
            if n.is_nan() {
                return Ok(Value::Num(f64::NAN));
            }
            if n < m {
                m = n;
            }
        }
        Ok(Value::Num(m))
    });

    super::define_method(engine, &math, "pow", 2, |_engine, _this, args| {
        Ok(Value::Num(arg(args, 0).to_number_primitive().powf(arg(args, 1).to_number_primitive())))
    });

    super::define_method(engine, &math, "atan2", 2, |_engine, _this, args| {
        Ok(Value::Num(arg(args, 0).to_number_primitive().atan2(arg(args, 1).to_number_primitive())))
    });

    super::define_method(engine, &math, "random", 0, |engine, _this, _args| Ok(Value::Num(engine.next_random())));

    engine.global_object.borrow_mut().define_data("Math", Value::Obj(math), true, false, true);
}
