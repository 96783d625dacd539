//! Standard library initialization (spec §4.5, §2 component 5): builds the
//! guest global object's native layer. The higher-level, callback-taking
//! methods this layer is tedious to hand-roll for are installed afterward
//! by [`crate::polyfills::bootstrap`], which runs guest source through the
//! engine itself.

mod array;
mod boolean;
mod date;
mod error;
mod function;
mod global;
mod json;
mod math;
mod number;
mod object;
mod regexp;
mod string;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::value::Value;

/// Installs every native constructor/prototype and binds it on the global
/// object, in dependency order (`Object`/`Function` first, since every
/// other prototype chains from `Object.prototype` and every constructor is
/// itself a `Function` instance).
pub(crate) fn install(engine: &mut Engine) -> Result<(), EngineError> {
    object::install(engine);
    function::install(engine);
    array::install(engine);
    string::install(engine);
    boolean::install(engine);
    number::install(engine);
    date::install(engine);
    regexp::install(engine);
    error::install(engine);
    math::install(engine);
    json::install(engine);
    global::install(engine);
    Ok(())
}

/// Shared helper: define a non-enumerable, writable, configurable method on
/// a prototype or constructor object (the attributes ES5 uses for built-in
/// methods).
pub(crate) fn define_method(
    engine: &mut Engine,
    target: &crate::object::ObjectRef,
    name: &'static str,
    arity: usize,
    imp: impl Fn(&mut Engine, &Value, &[Value]) -> crate::engine::NativeResult + 'static,
) {
    let func = engine.create_native_function(name, arity, false, imp);
    target.borrow_mut().define_data(name, Value::Obj(func), true, false, true);
}

/// As [`define_method`] but marks the function as a valid constructor body.
pub(crate) fn define_constructor_method(
    engine: &mut Engine,
    target: &crate::object::ObjectRef,
    name: &'static str,
    arity: usize,
    imp: impl Fn(&mut Engine, &Value, &[Value]) -> crate::engine::NativeResult + 'static,
) {
    let func = engine.create_native_function(name, arity, true, imp);
    target.borrow_mut().define_data(name, Value::Obj(func), true, false, true);
}

pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}
