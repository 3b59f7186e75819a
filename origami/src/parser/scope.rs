//! Lexical scopes and slot allocation
//!
//! Every function, method and lambda body gets its own scope; blocks share
//! the enclosing one. Slots are allocated densely from 0 and never reused.
//! A lambda scope records which of its slots are copies of slots in the
//! defining scope; that list becomes the lambda's capture table.

use crate::ast::{Capture, Variable};
use crate::types::Type;
use indexmap::IndexMap;

#[derive(Debug, Default)]
struct Scope {
    variables: IndexMap<String, Variable>,
    next_index: usize,
    is_lambda: bool,
    captures: Vec<Capture>,
}

impl Scope {
    fn add(&mut self, name: &str, ty: Option<Type>) -> Variable {
        if let Some(existing) = self.variables.get(name) {
            return existing.clone();
        }
        let var = Variable::new(name, self.next_index, ty);
        self.next_index += 1;
        self.variables.insert(name.to_string(), var.clone());
        var
    }
}

#[derive(Debug)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeManager {
    /// A manager holding only the file-level scope.
    pub fn new() -> Self {
        ScopeManager {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self, is_lambda: bool) {
        self.scopes.push(Scope {
            is_lambda,
            ..Scope::default()
        });
    }

    /// Pop the current scope and return its capture table. The file-level
    /// scope is never popped.
    pub fn pop_scope(&mut self) -> Vec<Capture> {
        if self.scopes.len() > 1 {
            self.scopes.pop().map(|s| s.captures).unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_lambda(&self) -> bool {
        self.current().is_lambda
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Declare `name` in the current scope. Re-declaring returns the
    /// existing slot; a new type annotation replaces the old one.
    pub fn add_variable(&mut self, name: &str, ty: Option<Type>) -> Variable {
        let scope = self.current_mut();
        if ty.is_some() {
            if let Some(existing) = scope.variables.get_mut(name) {
                existing.ty = ty;
                return existing.clone();
            }
        }
        scope.add(name, ty)
    }

    /// Binding in the current scope only.
    pub fn lookup(&self, name: &str) -> Option<Variable> {
        self.current().variables.get(name).cloned()
    }

    /// Binding in the immediately enclosing scope.
    pub fn lookup_in_parent(&self, name: &str) -> Option<Variable> {
        let len = self.scopes.len();
        if len < 2 {
            return None;
        }
        self.scopes[len - 2].variables.get(name).cloned()
    }

    /// Resolve `name` for a read: the current scope first, then, from inside
    /// a lambda, the defining scopes. A hit in a defining scope declares the
    /// name in each lambda scope on the way down and records the capture.
    pub fn resolve(&mut self, name: &str) -> Option<Variable> {
        let top = self.scopes.len() - 1;
        self.resolve_at(top, name)
    }

    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Variable> {
        if let Some(var) = self.scopes[level].variables.get(name) {
            return Some(var.clone());
        }
        if level == 0 || !self.scopes[level].is_lambda {
            return None;
        }
        let parent = self.resolve_at(level - 1, name)?;
        let scope = &mut self.scopes[level];
        let child = scope.add(name, parent.ty.clone());
        scope.captures.push(Capture {
            child: child.index,
            parent: parent.index,
        });
        Some(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_indices_are_dense_and_idempotent() {
        let mut scopes = ScopeManager::new();
        assert_eq!(scopes.add_variable("a", None).index, 0);
        assert_eq!(scopes.add_variable("b", None).index, 1);
        assert_eq!(scopes.add_variable("a", None).index, 0);
        assert_eq!(scopes.add_variable("c", None).index, 2);
    }

    #[test]
    fn test_function_scope_does_not_see_outer() {
        let mut scopes = ScopeManager::new();
        scopes.add_variable("outer", None);
        scopes.push_scope(false);
        assert!(scopes.resolve("outer").is_none());
        assert_eq!(scopes.lookup_in_parent("outer").map(|v| v.index), Some(0));
        assert_eq!(scopes.add_variable("inner", None).index, 0);
        assert!(scopes.pop_scope().is_empty());
    }

    #[test]
    fn test_lambda_captures_parent_slot() {
        let mut scopes = ScopeManager::new();
        scopes.add_variable("x", None);
        scopes.add_variable("y", None);
        scopes.push_scope(true);
        scopes.add_variable("arg", None);
        let y = scopes.resolve("y").unwrap();
        assert_eq!(y.index, 1);
        let captures = scopes.pop_scope();
        assert_eq!(captures, vec![Capture { child: 1, parent: 1 }]);
    }

    #[test]
    fn test_nested_lambda_captures_through_intermediate() {
        let mut scopes = ScopeManager::new();
        scopes.add_variable("pad", None);
        scopes.add_variable("total", None);
        scopes.push_scope(true);
        scopes.push_scope(true);
        let total = scopes.resolve("total").unwrap();
        assert_eq!(total.index, 0);
        let inner = scopes.pop_scope();
        assert_eq!(inner, vec![Capture { child: 0, parent: 0 }]);
        let outer = scopes.pop_scope();
        assert_eq!(outer, vec![Capture { child: 0, parent: 1 }]);
    }

    #[test]
    fn test_typed_redeclaration_updates_type() {
        let mut scopes = ScopeManager::new();
        scopes.add_variable("n", None);
        let typed = scopes.add_variable("n", Some(Type::Int));
        assert_eq!(typed.index, 0);
        assert_eq!(scopes.lookup("n").unwrap().ty, Some(Type::Int));
    }

    #[test]
    fn test_file_scope_is_never_popped() {
        let mut scopes = ScopeManager::new();
        scopes.add_variable("keep", None);
        scopes.pop_scope();
        assert!(scopes.lookup("keep").is_some());
        assert_eq!(scopes.depth(), 1);
    }
}
