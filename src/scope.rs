//! The scope model (spec §3, §4.4): a lexically linked chain of scope
//! objects, each wrapping a property bag and a strict-mode flag.

use crate::object::{GuestObject, ObjectRef};
use std::cell::RefCell;
use std::rc::Rc;

pub struct Scope {
    pub parent: Option<ScopeRef>,
    pub strict: bool,
    pub bag: ObjectRef,
}

pub type ScopeRef = Rc<RefCell<Scope>>;

impl Scope {
    /// A non-global scope's bag has a null prototype so lookups never leak
    /// through the object prototype chain (spec §3).
    pub fn new_child(parent: &ScopeRef, strict: bool) -> ScopeRef {
        let bag = GuestObject::new("Object", None);
        Rc::new(RefCell::new(Scope {
            parent: Some(parent.clone()),
            strict,
            bag,
        }))
    }

    pub fn new_global(global_object: ObjectRef, strict: bool) -> ScopeRef {
        Rc::new(RefCell::new(Scope { parent: None, strict, bag: global_object }))
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }
}

/// Declares `name` as `undefined` with a non-configurable, writable,
/// enumerable descriptor if it is not already an own property of `scope`'s
/// bag (hoisting, spec §4.4). Re-declaration of an existing binding is a
/// no-op so that re-entering a function does not clobber a prior value of
/// the same name declared earlier in the same pass.
pub fn hoist_var(scope: &ScopeRef, name: &str) {
    let bag = scope.borrow().bag.clone();
    let mut bag_mut = bag.borrow_mut();
    if !bag_mut.properties.contains_key(name) && !bag_mut.is_accessor(name) {
        bag_mut.define_data(name, crate::value::Value::Undefined, true, true, false);
    }
}
