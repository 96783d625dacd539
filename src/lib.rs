#![doc = include_str!("../README.md")]

mod ast;
mod bridge;
mod builtins;
mod completion;
mod config;
mod dispatch;
mod engine;
mod error;
mod frame;
mod object;
mod polyfills;
mod property;
mod regexp_sandbox;
mod scope;
mod value;

pub use ast::{build, Node, NodeKind, NodeRef, SourceLoc};
pub use bridge::{array_native_to_pseudo, array_pseudo_to_native, native_to_pseudo, pseudo_to_native, Native, NativeCallback};
pub use config::{EngineConfig, RegexpMode};
pub use engine::{AsyncHandle, Engine, NativeResult, SourceParser};
pub use error::{EngineError, GuestErrorClass};
pub use object::{GuestObject, ObjectKind, ObjectRef, PropertySlot};
pub use value::Value;
