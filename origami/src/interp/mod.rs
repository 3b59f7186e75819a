//! Runtime for origami programs
//!
//! The evaluator walks the AST directly. Every evaluation returns
//! [`Flow<Value>`]; non-local exits travel in the `Err` side as a
//! [`Control`]. Registries live in the shared [`Vm`]; per-call state lives
//! in a [`Context`].

mod builtins;
pub mod call;
pub mod channel;
pub mod class;
pub mod control;
mod env;
pub mod error;
pub mod eval;
mod object;
mod value;
mod vm;

pub use channel::{Channel, ChannelError};
pub use class::{
    AnnotationTarget, ClassGeneric, ClassStmt, ClassValue, HostObject, InterfaceStmt, Method,
    MethodBody, MethodSig, Modifier, Property,
};
pub use control::{Control, Flow};
pub use env::Context;
pub use object::ObjectValue;
pub use value::{AnyValue, ArrayRef, AsBool, AsFloat, AsInt, AsString, Callable, HostFn, Reference, Value};
pub use vm::{OutputBuffer, ThrowHandler, Vm, DEFAULT_MAX_CALL_DEPTH};
