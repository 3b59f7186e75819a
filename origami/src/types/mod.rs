//! Runtime type model
//!
//! Declared types on variables, parameters and return values. A type is a
//! predicate over runtime values (`is`) plus a printable form (`describe`).

use crate::interp::Value;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// Names that map to a built-in type rather than a class.
const BASE_NAMES: [&str; 7] = ["int", "float", "string", "bool", "array", "object", "callable"];

/// A declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Type {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
    Callable,
    /// An instance of the named class, or of a class extending/implementing it.
    Class { name: String },
    /// A generic type parameter (`T`, no args) or a parameterized class
    /// reference (`List<int>`).
    Generic { name: String, args: Vec<Type> },
    Const(Box<Type>),
    Nullable(Box<Type>),
    MultipleReturn(Vec<Type>),
}

impl Type {
    /// Map a type name to a type. Empty, `void` and `mixed` mean "no declared
    /// type"; a leading `?` makes the result nullable; anything unknown is a
    /// class name.
    pub fn from_name(name: &str) -> Option<Type> {
        if let Some(base) = name.strip_prefix('?') {
            return Type::from_name(base).map(|t| Type::Nullable(Box::new(t)));
        }
        let ty = match name {
            "" | "void" | "mixed" => return None,
            "int" => Type::Int,
            "float" => Type::Float,
            "string" => Type::String,
            "bool" => Type::Bool,
            "array" => Type::Array,
            "object" => Type::Object,
            "callable" => Type::Callable,
            class => Type::Class {
                name: class.to_string(),
            },
        };
        Some(ty)
    }

    pub fn is_base_name(name: &str) -> bool {
        BASE_NAMES.contains(&name)
    }

    /// Type parameter placeholder with the given name.
    pub fn param(name: impl Into<String>) -> Type {
        Type::Generic {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Whether `value` satisfies this type.
    pub fn is(&self, value: &Value) -> bool {
        let value = value.deref_value();
        match self {
            Type::Int => matches!(value, Value::Int(_)),
            Type::Float => matches!(value, Value::Float(_)),
            Type::String => matches!(value, Value::Str(_)),
            Type::Bool => matches!(value, Value::Bool(_)),
            Type::Array => matches!(value, Value::Array(_)),
            Type::Object => matches!(value, Value::Object(_) | Value::Class(_)),
            Type::Callable => matches!(value, Value::Func(_)),
            Type::Class { name } => match &value {
                Value::Class(instance) => instance.instance_of(name),
                Value::Throw(_) => matches!(name.as_str(), "Throwable" | "Exception"),
                _ => false,
            },
            // An unbound type parameter accepts anything.
            Type::Generic { args, .. } if args.is_empty() => true,
            Type::Generic { name, args } => match &value {
                Value::Class(instance) => {
                    instance.instance_of(name)
                        && instance
                            .class
                            .bindings
                            .values()
                            .zip(args)
                            .all(|(bound, wanted)| bound == wanted)
                }
                _ => false,
            },
            Type::Const(inner) => inner.is(&value),
            Type::Nullable(base) => matches!(value, Value::Null) || base.is(&value),
            Type::MultipleReturn(elems) => match &value {
                Value::Array(items) => {
                    let items = items.read();
                    items.len() == elems.len() && elems.iter().zip(items.iter()).all(|(t, v)| t.is(v))
                }
                _ => false,
            },
        }
    }

    /// Human-readable form used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Type::Int => "int".into(),
            Type::Float => "float".into(),
            Type::String => "string".into(),
            Type::Bool => "bool".into(),
            Type::Array => "array".into(),
            Type::Object => "object".into(),
            Type::Callable => "callable".into(),
            Type::Class { name } => name.clone(),
            Type::Generic { name, args } if args.is_empty() => name.clone(),
            Type::Generic { name, args } => {
                let args: Vec<String> = args.iter().map(Type::describe).collect();
                format!("{name}<{}>", args.join(", "))
            }
            Type::Const(inner) => format!("const {}", inner.describe()),
            Type::Nullable(base) => format!("?{}", base.describe()),
            Type::MultipleReturn(elems) => {
                let elems: Vec<String> = elems.iter().map(Type::describe).collect();
                elems.join(", ")
            }
        }
    }

    /// Substitute bound type parameters.
    pub fn resolve(&self, bindings: &IndexMap<String, Type>) -> Type {
        if bindings.is_empty() {
            return self.clone();
        }
        match self {
            Type::Generic { name, args } if args.is_empty() => {
                bindings.get(name).cloned().unwrap_or_else(|| self.clone())
            }
            // Parser-side class lookups may have taken a type parameter for a
            // class name when the parameter was not in scope.
            Type::Class { name } => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Generic { name, args } => Type::Generic {
                name: name.clone(),
                args: args.iter().map(|a| a.resolve(bindings)).collect(),
            },
            Type::Const(inner) => Type::Const(Box::new(inner.resolve(bindings))),
            Type::Nullable(base) => Type::Nullable(Box::new(base.resolve(bindings))),
            Type::MultipleReturn(elems) => {
                Type::MultipleReturn(elems.iter().map(|e| e.resolve(bindings)).collect())
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}
