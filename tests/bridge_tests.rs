mod common;

use common::*;
use sandhopper::{native_to_pseudo, Native};
use std::rc::Rc;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[test]
fn a_host_function_injected_as_a_global_is_callable_from_guest_code() {
    let mut engine = new_engine(vec![expr_stmt(call(id("double"), vec![num(21.0)]))]).unwrap();

    let callback: Native = Native::Function(Rc::new(|args: &[Native]| match args.first() {
        Some(Native::Num(n)) => Native::Num(n * 2.0),
        _ => Native::Undefined,
    }));
    let bridged = native_to_pseudo(&mut engine, &callback);
    engine.global_object().borrow_mut().define_data("double", bridged, true, false, true);

    engine.run().unwrap();
    assert_eq!(as_num(engine.value()), 42.0);
}

#[test]
fn native_to_pseudo_round_trips_nested_arrays_and_objects() {
    let mut engine = new_engine(vec![expr_stmt(bin(
        "+",
        member_c(member(id("payload"), "items"), num(1.0)),
        member(id("payload"), "label"),
    ))])
    .unwrap();

    let mut fields = indexmap::IndexMap::new();
    fields.insert("items".to_string(), Native::array(vec![Native::Num(1.0), Native::Num(2.0), Native::Num(3.0)]));
    fields.insert("label".to_string(), Native::str("x"));
    let payload = Native::object(fields);
    let bridged = native_to_pseudo(&mut engine, &payload);
    engine.global_object().borrow_mut().define_data("payload", bridged, true, false, true);

    engine.run().unwrap();
    assert_eq!(as_str(engine.value()), "2x");
}
