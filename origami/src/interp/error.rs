//! Runtime throw constructors

use super::control::Control;
use crate::ast::Span;
use crate::error::Error;
use crate::types::Type;

pub fn runtime(message: impl Into<String>, span: Span) -> Control {
    Control::throw(Error::runtime(message, span))
}

pub fn undefined_function(name: &str, span: Span) -> Control {
    runtime(format!("undefined function: {name}"), span)
}

pub fn undefined_method(class: &str, method: &str, span: Span) -> Control {
    runtime(format!("call to undefined method {class}::{method}()"), span)
}

pub fn undefined_class(name: &str, span: Span) -> Control {
    runtime(format!("class '{name}' not found"), span)
}

pub fn type_mismatch(what: &str, expected: &Type, got: &str, span: Span) -> Control {
    Control::throw(Error::type_error(
        format!("{what}: expected {}, got {got}", expected.describe()),
        span,
    ))
}

pub fn unsupported_operand(op: &str, lhs: &str, rhs: &str, span: Span) -> Control {
    Control::throw(Error::type_error(
        format!("unsupported operand types: {lhs} {op} {rhs}"),
        span,
    ))
}

pub fn division_by_zero(span: Span) -> Control {
    runtime("division by zero", span)
}

pub fn arity(name: &str, expected: usize, got: usize, span: Span) -> Control {
    runtime(
        format!("{name}() expects at least {expected} argument(s), {got} given"),
        span,
    )
}

pub fn call_depth(limit: usize, span: Span) -> Control {
    runtime(format!("maximum call depth of {limit} exceeded"), span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_type_mismatch_message() {
        match type_mismatch("argument $x", &Type::Int, "string", Span::default()) {
            Control::Throw(err) => {
                assert_eq!(err.kind, ErrorKind::Type);
                assert_eq!(err.message, "argument $x: expected int, got string");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_division_by_zero_is_runtime() {
        let Control::Throw(err) = division_by_zero(Span::new(3, 4)) else {
            panic!("expected throw");
        };
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.span, Some(Span::new(3, 4)));
    }
}
