//! Runtime values for the interpreter

use super::class::{ClassValue, Method};
use super::control::Control;
use super::env::Context;
use super::object::ObjectValue;
use crate::ast::{FunctionDecl, Lambda};
use crate::error::Error;
use parking_lot::RwLock;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Shared, mutable sequence. Arrays have reference semantics.
pub type ArrayRef = Arc<RwLock<Vec<Value>>>;

/// Host function callable from language code.
pub type HostFn = Arc<dyn Fn(&Context, Vec<Value>) -> Result<Value, Control> + Send + Sync>;

/// Runtime value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Array(ArrayRef),
    /// Property map (`{a: 1}`, `[k => v]`).
    Object(Arc<ObjectValue>),
    /// Class instance.
    Class(Arc<ClassValue>),
    Func(Arc<Callable>),
    /// Opaque host value.
    Any(AnyValue),
    /// A slot that was declared but never assigned.
    Mixed,
    /// Aliased storage shared between frames (by-reference parameters).
    Reference(Arc<Reference>),
    /// Value returned from a file with an explicit top-level `return`.
    Return(Box<Value>),
    /// A caught error that carried no language-level object.
    Throw(Arc<Error>),
}

/// Something that can be invoked.
pub enum Callable {
    Function(Arc<FunctionDecl>),
    Closure { lambda: Arc<Lambda>, ctx: Context },
    Host { name: String, func: HostFn },
    /// `$obj.method` taken without calling it.
    Bound { this: Arc<ClassValue>, method: Arc<Method> },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Function(decl) => &decl.name,
            Callable::Closure { .. } => "{closure}",
            Callable::Host { name, .. } => name,
            Callable::Bound { method, .. } => &method.name,
        }
    }

    pub fn host(
        name: impl Into<String>,
        func: impl Fn(&Context, Vec<Value>) -> Result<Value, Control> + Send + Sync + 'static,
    ) -> Self {
        Callable::Host {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name())
    }
}

/// Opaque host payload.
#[derive(Clone)]
pub struct AnyValue(pub Arc<dyn Any + Send + Sync>);

impl AnyValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        AnyValue(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

/// Shared cell behind a by-reference binding.
#[derive(Debug)]
pub struct Reference {
    cell: RwLock<Value>,
}

impl Reference {
    pub fn new(value: Value) -> Self {
        Reference {
            cell: RwLock::new(value),
        }
    }

    pub fn get(&self) -> Value {
        self.cell.read().clone()
    }

    pub fn set(&self, value: Value) {
        *self.cell.write() = value;
    }
}

// Coercion capabilities. A variant that returns `None` has no such
// capability and the caller reports a type error.

pub trait AsInt {
    fn as_int(&self) -> Option<i64>;
}

pub trait AsFloat {
    fn as_float(&self) -> Option<f64>;
}

pub trait AsBool {
    fn as_bool(&self) -> Option<bool>;
}

pub trait AsString {
    fn as_string(&self) -> Option<String>;
}

impl AsInt for Value {
    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::Null => Some(0),
            Value::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            Value::Reference(r) => r.get().as_int(),
            _ => None,
        }
    }
}

impl AsFloat for Value {
    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Reference(r) => r.get().as_float(),
            _ => None,
        }
    }
}

impl AsBool for Value {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Null => Some(false),
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => Some(!s.is_empty() && &**s != "0"),
            Value::Array(items) => Some(!items.read().is_empty()),
            Value::Object(_) | Value::Class(_) | Value::Func(_) | Value::Throw(_) => Some(true),
            Value::Reference(r) => r.get().as_bool(),
            Value::Return(inner) => inner.as_bool(),
            Value::Any(_) | Value::Mixed => None,
        }
    }
}

impl AsString for Value {
    fn as_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.to_string()),
            Value::Throw(err) => Some(err.message.clone()),
            Value::Reference(r) => r.get().as_string(),
            Value::Return(inner) => inner.as_string(),
            _ => None,
        }
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn object(object: ObjectValue) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn func(callable: Callable) -> Value {
        Value::Func(Arc::new(callable))
    }

    /// Resolve references and file-level returns to the value they hold.
    pub fn deref_value(&self) -> Value {
        match self {
            Value::Reference(r) => r.get().deref_value(),
            Value::Return(inner) => inner.deref_value(),
            other => other.clone(),
        }
    }

    /// Values evaluate to themselves; references read through their cell.
    pub fn evaluate(&self, _ctx: &Context) -> Result<Value, Control> {
        Ok(self.deref_value())
    }

    pub fn is_null(&self) -> bool {
        matches!(self.deref_value(), Value::Null | Value::Mixed)
    }

    pub fn is_truthy(&self) -> bool {
        self.as_bool().unwrap_or(!matches!(self, Value::Mixed))
    }

    /// Type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "string".into(),
            Value::Array(_) => "array".into(),
            Value::Object(_) => "object".into(),
            Value::Class(instance) => instance.class_name().to_string(),
            Value::Func(_) => "callable".into(),
            Value::Any(_) => "any".into(),
            Value::Mixed => "mixed".into(),
            Value::Reference(r) => r.get().type_name(),
            Value::Return(inner) => inner.type_name(),
            Value::Throw(_) => "throw".into(),
        }
    }

    /// The text `echo` and `.` produce.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Mixed => String::new(),
            other => other.as_string().unwrap_or_else(|| other.to_string()),
        }
    }

    /// Loose equality (`==`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        let (a, b) = (self.deref_value(), other.deref_value());
        match (&a, &b) {
            (Value::Null | Value::Mixed, Value::Null | Value::Mixed) => true,
            (Value::Bool(x), _) => *x == b.is_truthy(),
            (_, Value::Bool(y)) => a.is_truthy() == *y,
            (Value::Null, _) => !b.is_truthy(),
            (_, Value::Null) => !a.is_truthy(),
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                a.as_float() == b.as_float()
            }
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Str(s), Value::Int(_) | Value::Float(_))
            | (Value::Int(_) | Value::Float(_), Value::Str(s)) => {
                let number = if matches!(a, Value::Str(_)) { &b } else { &a };
                match s.trim().parse::<f64>() {
                    Ok(parsed) => Some(parsed) == number.as_float(),
                    Err(_) => **s == number.to_display_string(),
                }
            }
            (Value::Array(x), Value::Array(y)) => {
                if Arc::ptr_eq(x, y) {
                    return true;
                }
                let (x, y) = (x.read(), y.read());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| p.loose_eq(q))
            }
            (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y) || x.loose_eq(y),
            (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
            (Value::Func(x), Value::Func(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Strict equality (`===`): same variant and same value.
    pub fn strict_eq(&self, other: &Value) -> bool {
        let (a, b) = (self.deref_value(), other.deref_value());
        match (&a, &b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => {
                if Arc::ptr_eq(x, y) {
                    return true;
                }
                let (x, y) = (x.read(), y.read());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| p.strict_eq(q))
            }
            (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
            (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
            (Value::Func(x), Value::Func(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Ordering for relational operators.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        let (a, b) = (self.deref_value(), other.deref_value());
        match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            _ => {
                let x = a.as_float()?;
                let y = b.as_float()?;
                x.partial_cmp(&y)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.read().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        Value::Str(s) => write!(f, "{s:?}")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "]")
            }
            Value::Object(object) => {
                write!(f, "{{")?;
                for (i, (key, value)) in object.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Class(instance) => write!(f, "object({})", instance.class_name()),
            Value::Func(callable) => write!(f, "function {}", callable.name()),
            Value::Any(_) => write!(f, "any"),
            Value::Mixed => write!(f, "mixed"),
            Value::Reference(r) => write!(f, "{}", r.get()),
            Value::Return(inner) => write!(f, "{inner}"),
            Value::Throw(err) => write!(f, "{}", err.message),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Array(items) => f.debug_list().entries(items.read().iter()).finish(),
            Value::Object(object) => {
                f.debug_map().entries(object.entries()).finish()
            }
            Value::Class(instance) => write!(f, "Class({})", instance.class_name()),
            Value::Func(callable) => write!(f, "Func({})", callable.name()),
            Value::Any(_) => write!(f, "Any"),
            Value::Mixed => write!(f, "Mixed"),
            Value::Reference(r) => write!(f, "Reference({:?})", r.get()),
            Value::Return(inner) => write!(f, "Return({inner:?})"),
            Value::Throw(err) => write!(f, "Throw({:?})", err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::array(vec![Value::Int(1), Value::from("a")]).to_string(),
            r#"[1, "a"]"#
        );
    }

    #[test]
    fn test_display_string_for_echo() {
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(Value::Mixed.to_display_string(), "");
        assert_eq!(Value::from("hi").to_display_string(), "hi");
        assert_eq!(Value::array(vec![Value::Int(1)]).to_display_string(), "[1]");
    }

    #[test]
    fn test_value_truthy() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from("0").is_truthy());
        assert!(Value::from("a").is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Mixed.is_truthy());
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(Value::from(" 12 ").as_int(), Some(12));
        assert_eq!(Value::Float(2.9).as_int(), Some(2));
        assert_eq!(Value::from("x").as_int(), None);
        assert_eq!(Value::array(vec![]).as_int(), None);
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::array(vec![]).as_string(), None);
        assert_eq!(Value::Mixed.as_bool(), None);
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::from("1").loose_eq(&Value::Int(1)));
        assert!(Value::Null.loose_eq(&Value::Bool(false)));
        assert!(Value::Int(0).loose_eq(&Value::Null));
        assert!(!Value::from("a").loose_eq(&Value::from("b")));
    }

    #[test]
    fn test_strict_equality() {
        assert!(Value::Int(1).strict_eq(&Value::Int(1)));
        assert!(!Value::Int(1).strict_eq(&Value::Float(1.0)));
        assert!(!Value::from("1").strict_eq(&Value::Int(1)));
        let shared = Value::array(vec![Value::Int(1)]);
        assert!(shared.strict_eq(&shared.clone()));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(Value::Float(2.5).compare(&Value::Int(2)), Some(Ordering::Greater));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::array(vec![]).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_reference_reads_through() {
        let cell = Arc::new(Reference::new(Value::Int(1)));
        let value = Value::Reference(cell.clone());
        cell.set(Value::Int(5));
        assert_eq!(value.as_int(), Some(5));
        assert!(matches!(value.deref_value(), Value::Int(5)));
    }

    #[test]
    fn test_arrays_share_storage() {
        let a = Value::array(vec![]);
        let b = a.clone();
        if let Value::Array(items) = &a {
            items.write().push(Value::Int(1));
        }
        if let Value::Array(items) = &b {
            assert_eq!(items.read().len(), 1);
        }
    }

    #[test]
    fn test_any_downcast() {
        let any = AnyValue::new(7u32);
        assert_eq!(any.downcast_ref::<u32>(), Some(&7));
        assert!(any.downcast_ref::<String>().is_none());
    }
}
