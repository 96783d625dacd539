//! The guest object (spec §3): property map, accessor maps, prototype link,
//! class tag, internal data slot and capability kind.

use crate::ast::NodeRef;
use crate::scope::ScopeRef;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

pub type ObjectRef = Rc<RefCell<GuestObject>>;

/// One property's attributes, per spec §3.
#[derive(Clone, Debug)]
pub struct PropertySlot {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertySlot {
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertySlot { value, writable, enumerable, configurable }
    }
}

/// Internal slot used by `Date`, `RegExp` and boxed primitives (spec §3).
#[derive(Clone, Debug)]
pub enum InternalData {
    None,
    /// Milliseconds since epoch, UTC, possibly NaN for an invalid Date.
    Date(f64),
    Regexp {
        source: String,
        flags: String,
        last_index: usize,
    },
    Boxed(Value),
}

/// What kind of callable (if any) this object is (spec §3 `kind` field).
#[derive(Clone)]
pub enum ObjectKind {
    Plain,
    GuestFn {
        node: NodeRef,
        params: Rc<Vec<String>>,
        name: Option<String>,
        parent_scope: ScopeRef,
        is_strict: bool,
    },
    /// `id` indexes into `Engine::native_fns`.
    NativeFn { id: usize, arity: usize, is_constructor: bool },
    /// `id` indexes into `Engine::async_fns`.
    AsyncFn { id: usize, arity: usize },
    /// The synthetic function created for a direct `eval()` call site.
    EvalFn,
}

impl std::fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Plain => write!(f, "Plain"),
            ObjectKind::GuestFn { name, .. } => write!(f, "GuestFn({name:?})"),
            ObjectKind::NativeFn { id, .. } => write!(f, "NativeFn({id})"),
            ObjectKind::AsyncFn { id, .. } => write!(f, "AsyncFn({id})"),
            ObjectKind::EvalFn => write!(f, "EvalFn"),
        }
    }
}

#[derive(Debug)]
pub struct GuestObject {
    pub proto: Option<ObjectRef>,
    pub class: &'static str,
    pub properties: IndexMap<String, PropertySlot>,
    pub getters: IndexMap<String, ObjectRef>,
    pub setters: IndexMap<String, ObjectRef>,
    pub extensible: bool,
    pub data: InternalData,
    pub kind: ObjectKind,
    pub illegal_constructor: bool,
}

impl GuestObject {
    pub fn new(class: &'static str, proto: Option<ObjectRef>) -> ObjectRef {
        Rc::new(RefCell::new(GuestObject {
            proto,
            class,
            properties: IndexMap::new(),
            getters: IndexMap::new(),
            setters: IndexMap::new(),
            extensible: true,
            data: InternalData::None,
            kind: ObjectKind::Plain,
            illegal_constructor: false,
        }))
    }

    pub fn is_callable(obj: &ObjectRef) -> bool {
        !matches!(obj.borrow().kind, ObjectKind::Plain)
    }

    pub fn is_constructor(obj: &ObjectRef) -> bool {
        match &obj.borrow().kind {
            ObjectKind::GuestFn { .. } => true,
            ObjectKind::NativeFn { is_constructor, .. } => *is_constructor,
            ObjectKind::AsyncFn { .. } => false,
            ObjectKind::EvalFn => false,
            ObjectKind::Plain => false,
        }
    }

    /// A key is an accessor iff it appears in `getters` or `setters`
    /// (spec invariant: at most one of a data slot / accessor pair per key).
    pub fn is_accessor(&self, key: &str) -> bool {
        self.getters.contains_key(key) || self.setters.contains_key(key)
    }

    pub fn own_enumerable_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .properties
            .iter()
            .filter(|(_, slot)| slot.enumerable)
            .map(|(k, _)| k.clone())
            .collect();
        for (k, _) in self.getters.iter() {
            if !self.properties.contains_key(k) && !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        keys
    }

    pub fn remove_key(&mut self, key: &str) {
        self.properties.shift_remove(key);
        self.getters.shift_remove(key);
        self.setters.shift_remove(key);
    }

    /// Define a plain data property, clearing any accessor pair at the same
    /// key (mutual exclusion of data vs. accessor form, spec §4.1).
    pub fn define_data(&mut self, key: &str, value: Value, writable: bool, enumerable: bool, configurable: bool) {
        self.getters.shift_remove(key);
        self.setters.shift_remove(key);
        self.properties.insert(key.to_string(), PropertySlot::data(value, writable, enumerable, configurable));
    }

    pub fn define_accessor(&mut self, key: &str, getter: Option<ObjectRef>, setter: Option<ObjectRef>) {
        self.properties.shift_remove(key);
        if let Some(g) = getter {
            self.getters.insert(key.to_string(), g);
        } else {
            self.getters.shift_remove(key);
        }
        if let Some(s) = setter {
            self.setters.insert(key.to_string(), s);
        } else {
            self.setters.shift_remove(key);
        }
    }
}

/// Walk the prototype chain starting at `obj` (inclusive), calling `f` for
/// each object until it returns `Some`. Terminates at the null prototype;
/// cycles cannot occur because prototypes are only ever assigned by
/// `set_prototype`, which rejects cycles at creation (spec §3 invariant).
pub fn walk_proto_chain<T>(obj: &ObjectRef, mut f: impl FnMut(&ObjectRef) -> Option<T>) -> Option<T> {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        if let Some(r) = f(&o) {
            return Some(r);
        }
        current = o.borrow().proto.clone();
    }
    None
}

/// Reject an attempt to set `proto` on `obj` that would create a cycle.
pub fn would_cycle(obj: &ObjectRef, new_proto: &ObjectRef) -> bool {
    walk_proto_chain(new_proto, |o| if Rc::ptr_eq(o, obj) { Some(()) } else { None }).is_some()
}

/// Array length invariants (spec §3): `length` is clamped to `[0, 2^32-1]`
/// and raised to cover any numeric key written.
pub const MAX_ARRAY_LENGTH: u64 = 4_294_967_295;

pub fn array_current_length(obj: &GuestObject) -> u64 {
    match obj.properties.get("length") {
        Some(slot) => slot.value.to_number_primitive().max(0.0) as u64,
        None => 0,
    }
}

pub fn array_set_length_raw(obj: &mut GuestObject, new_len: u64) {
    let to_remove: Vec<String> = obj
        .properties
        .keys()
        .filter(|k| matches!(k.parse::<u64>(), Ok(n) if n >= new_len))
        .cloned()
        .collect();
    for k in to_remove {
        obj.properties.shift_remove(&k);
    }
    obj.properties.insert(
        "length".to_string(),
        PropertySlot::data(Value::Num(new_len as f64), true, false, false),
    );
}
