//! Execution frames

use super::class::{ClassStmt, ClassValue};
use super::control::Flow;
use super::error;
use super::value::{Reference, Value};
use super::vm::Vm;
use crate::ast::{Span, Variable};
use parking_lot::RwLock;
use std::sync::Arc;

/// One executing frame: slot storage addressed by variable index, the
/// current namespace, the bound `$this`, and a handle to the VM.
///
/// Clones share slot storage, so a spawned unit sees (and races with) the
/// frame that spawned it.
#[derive(Clone)]
pub struct Context {
    vm: Arc<Vm>,
    slots: Arc<RwLock<Vec<Value>>>,
    namespace: Arc<RwLock<String>>,
    this: Option<Arc<ClassValue>>,
    class: Option<Arc<ClassStmt>>,
    depth: usize,
}

impl Context {
    pub fn new(vm: Arc<Vm>) -> Self {
        Context {
            vm,
            slots: Arc::new(RwLock::new(Vec::new())),
            namespace: Arc::new(RwLock::new(String::new())),
            this: None,
            class: None,
            depth: 0,
        }
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    /// Fresh frame for a call made from this one.
    pub fn create_context(&self) -> Context {
        Context {
            vm: self.vm.clone(),
            slots: Arc::new(RwLock::new(Vec::new())),
            namespace: Arc::new(RwLock::new(self.get_namespace())),
            this: self.this.clone(),
            class: self.class.clone(),
            depth: self.depth + 1,
        }
    }

    /// Fresh top-level frame on the same VM.
    pub fn create_base_context(&self) -> Context {
        Context::new(self.vm.clone())
    }

    pub fn with_this(mut self, this: Option<Arc<ClassValue>>, class: Option<Arc<ClassStmt>>) -> Self {
        self.this = this;
        self.class = class;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn this(&self) -> Option<&Arc<ClassValue>> {
        self.this.as_ref()
    }

    /// Class whose method is executing.
    pub fn current_class(&self) -> Option<&Arc<ClassStmt>> {
        self.class.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_namespace(&self, namespace: &str) {
        *self.namespace.write() = namespace.to_string();
    }

    pub fn get_namespace(&self) -> String {
        self.namespace.read().clone()
    }

    /// Raw slot read. `None` when the slot was never written.
    pub fn get_index_value(&self, index: usize) -> Option<Value> {
        match self.slots.read().get(index) {
            None | Some(Value::Mixed) => None,
            Some(Value::Reference(cell)) => Some(cell.get()),
            Some(value) => Some(value.clone()),
        }
    }

    /// Read a variable; unset variables read as null.
    pub fn get_variable_value(&self, var: &Variable) -> Flow<Value> {
        Ok(self.get_index_value(var.index).unwrap_or(Value::Null))
    }

    /// Write a variable, checking its declared type. Reference slots are
    /// written through.
    pub fn set_variable_value(&self, var: &Variable, value: Value, span: Span) -> Flow<()> {
        let value = value.deref_value();
        if let Some(ty) = &var.ty {
            let ty = match &self.this {
                Some(this) => ty.resolve(&this.class.bindings),
                None => ty.clone(),
            };
            if !ty.is(&value) {
                return Err(error::type_mismatch(
                    &format!("cannot assign to ${}", var.name),
                    &ty,
                    &value.type_name(),
                    span,
                ));
            }
        }
        self.set_index_value(var.index, value);
        Ok(())
    }

    /// Untyped slot write; honors reference cells.
    pub fn set_index_value(&self, index: usize, value: Value) {
        let mut slots = self.slots.write();
        if slots.len() <= index {
            slots.resize(index + 1, Value::Mixed);
        }
        if let Value::Reference(cell) = &slots[index] {
            cell.set(value);
        } else {
            slots[index] = value;
        }
    }

    /// Cell backing a slot, converting the slot into a reference on first use.
    pub fn reference(&self, index: usize) -> Arc<Reference> {
        let mut slots = self.slots.write();
        if slots.len() <= index {
            slots.resize(index + 1, Value::Mixed);
        }
        if let Value::Reference(cell) = &slots[index] {
            return cell.clone();
        }
        let current = match std::mem::replace(&mut slots[index], Value::Mixed) {
            Value::Mixed => Value::Null,
            other => other,
        };
        let cell = Arc::new(Reference::new(current));
        slots[index] = Value::Reference(cell.clone());
        cell
    }

    /// Make a slot share an existing cell.
    pub fn bind_reference(&self, index: usize, cell: Arc<Reference>) {
        let mut slots = self.slots.write();
        if slots.len() <= index {
            slots.resize(index + 1, Value::Mixed);
        }
        slots[index] = Value::Reference(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn var(name: &str, index: usize, ty: Option<Type>) -> Variable {
        Variable::new(name, index, ty)
    }

    #[test]
    fn test_unset_reads_null() {
        let ctx = Context::new(Vm::new());
        assert!(ctx.get_index_value(3).is_none());
        assert!(matches!(ctx.get_variable_value(&var("x", 3, None)), Ok(Value::Null)));
    }

    #[test]
    fn test_set_and_get() {
        let ctx = Context::new(Vm::new());
        let x = var("x", 2, None);
        ctx.set_variable_value(&x, Value::Int(9), Span::default()).unwrap();
        assert!(matches!(ctx.get_index_value(2), Some(Value::Int(9))));
        // Lower slots were padded but remain unset.
        assert!(ctx.get_index_value(0).is_none());
    }

    #[test]
    fn test_declared_type_is_checked() {
        let ctx = Context::new(Vm::new());
        let x = var("x", 0, Some(Type::Int));
        assert!(ctx.set_variable_value(&x, Value::Int(1), Span::default()).is_ok());
        assert!(ctx.set_variable_value(&x, Value::from("no"), Span::default()).is_err());
        assert!(matches!(ctx.get_index_value(0), Some(Value::Int(1))));
    }

    #[test]
    fn test_reference_slots_write_through() {
        let caller = Context::new(Vm::new());
        caller.set_index_value(0, Value::Int(1));
        let callee = caller.create_context();
        callee.bind_reference(0, caller.reference(0));
        callee.set_index_value(0, Value::Int(42));
        assert!(matches!(caller.get_index_value(0), Some(Value::Int(42))));
    }

    #[test]
    fn test_clones_share_slots_but_child_frames_do_not() {
        let ctx = Context::new(Vm::new());
        let clone = ctx.clone();
        clone.set_index_value(0, Value::Int(5));
        assert!(matches!(ctx.get_index_value(0), Some(Value::Int(5))));
        let child = ctx.create_context();
        assert!(child.get_index_value(0).is_none());
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn test_namespace() {
        let ctx = Context::new(Vm::new());
        ctx.set_namespace("App\\Models");
        assert_eq!(ctx.get_namespace(), "App\\Models");
        assert_eq!(ctx.create_context().get_namespace(), "App\\Models");
        assert_eq!(ctx.create_base_context().get_namespace(), "");
    }
}
