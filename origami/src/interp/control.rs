//! Non-local control flow
//!
//! Every evaluation returns `Result<Value, Control>`. `Err` carries a
//! break, continue, return, exit or throw upward until something consumes
//! it. `Control::None` is the "completed normally" signal used by handlers
//! that report an outcome rather than a value; it never travels in `Err`.

use super::value::Value;
use crate::error::Error;

#[derive(Debug, Clone)]
pub enum Control {
    None,
    Break(Option<String>),
    Continue(Option<String>),
    Return(Value),
    /// `return a, b;`
    Returns(Vec<Value>),
    Goto(String),
    Exit(i32),
    Yield(Value, Value),
    Throw(Box<Error>),
}

/// Result of evaluating anything that may exit non-locally.
pub type Flow<T> = Result<T, Control>;

impl Control {
    pub fn throw(error: Error) -> Self {
        Control::Throw(Box::new(error))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Control::None)
    }

    pub fn is_throw(&self) -> bool {
        matches!(self, Control::Throw(_))
    }

    /// The language value carried by a throw: the thrown object when there
    /// is one, otherwise the error itself.
    pub fn thrown_value(&self) -> Option<Value> {
        match self {
            Control::Throw(err) => Some(
                err.thrown
                    .clone()
                    .unwrap_or_else(|| Value::Throw(std::sync::Arc::new((**err).clone()))),
            ),
            _ => None,
        }
    }

    /// Describe a control that escaped to the top level.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Control::None | Control::Return(_) | Control::Returns(_) | Control::Exit(_) => None,
            Control::Throw(err) => Some(*err),
            Control::Break(_) => Some(Error::new(
                crate::error::ErrorKind::Runtime,
                "'break' outside of a loop",
            )),
            Control::Continue(_) => Some(Error::new(
                crate::error::ErrorKind::Runtime,
                "'continue' outside of a loop",
            )),
            Control::Goto(label) => Some(Error::new(
                crate::error::ErrorKind::Runtime,
                format!("undefined label '{label}'"),
            )),
            Control::Yield(..) => Some(Error::new(
                crate::error::ErrorKind::Runtime,
                "'yield' outside of a generator",
            )),
        }
    }
}

impl From<Error> for Control {
    fn from(error: Error) -> Self {
        Control::throw(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::error::ErrorKind;

    #[test]
    fn test_thrown_value_prefers_thrown_object() {
        let ctl = Control::throw(
            Error::runtime("boom", Span::default()).with_thrown(Value::from("payload")),
        );
        assert!(matches!(ctl.thrown_value(), Some(Value::Str(s)) if &*s == "payload"));
    }

    #[test]
    fn test_thrown_value_wraps_plain_error() {
        let ctl = Control::throw(Error::runtime("boom", Span::default()));
        match ctl.thrown_value() {
            Some(Value::Throw(err)) => assert_eq!(err.message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Control::Break(None).thrown_value().is_none());
    }

    #[test]
    fn test_into_error() {
        assert!(Control::Return(Value::Null).into_error().is_none());
        assert!(Control::Exit(3).into_error().is_none());
        let err = Control::Break(None).into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert!(err.message.contains("break"));
    }
}
