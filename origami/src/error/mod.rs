//! Error types and reporting
//!
//! One structured [`Error`] serves parse errors, runtime throws and loader
//! failures. Errors nest: `cause` is the wrapped error, `children` collects
//! independent errors gathered in one pass (every malformed statement of a
//! file, for instance).

use crate::ast::Span;
use crate::interp::Value;
use std::fmt;
use std::sync::Arc;

/// Result type alias for non-control APIs (loading, configuration, CLI).
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed syntax; aborts the current parse unit.
    Syntax,
    /// Recoverable runtime throw.
    Runtime,
    /// Declared type did not accept a value.
    Type,
    /// Annotation construction or deferred annotation initialization failed.
    Annotation,
    /// No source file found for a class.
    ClassNotFound,
    /// A source file was loaded but did not define the expected class.
    ClassNotDefined,
    /// Filesystem failure.
    Io,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "Syntax",
            ErrorKind::Runtime => "Runtime",
            ErrorKind::Type => "Type",
            ErrorKind::Annotation => "Annotation",
            ErrorKind::ClassNotFound => "Class not found",
            ErrorKind::ClassNotDefined => "Class not defined",
            ErrorKind::Io => "IO",
        }
    }
}

/// Structured error: span, message, optional cause, child errors.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub file: Option<Arc<str>>,
    pub cause: Option<Box<Error>>,
    pub children: Vec<Error>,
    /// The language-level value carried by `throw`, if any.
    pub thrown: Option<Value>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            file: None,
            cause: None,
            children: Vec::new(),
            thrown: None,
        }
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Syntax, message).with_span(span)
    }

    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Runtime, message).with_span(span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type, message).with_span(span)
    }

    pub fn annotation(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Annotation, message).with_span(span)
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_file(mut self, file: Option<Arc<str>>) -> Self {
        if self.file.is_none() {
            self.file = file;
        }
        self
    }

    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_thrown(mut self, value: Value) -> Self {
        self.thrown = Some(value);
        self
    }

    pub fn push_child(&mut self, child: Error) {
        self.children.push(child);
    }

    /// Aggregate several errors under one summary error.
    pub fn aggregate(message: impl Into<String>, mut errors: Vec<Error>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        let kind = errors.first().map(|e| e.kind).unwrap_or(ErrorKind::Syntax);
        let mut err = Self::new(kind, message);
        err.span = errors.first().and_then(|e| e.span);
        err.file = errors.first().and_then(|e| e.file.clone());
        err.children = errors;
        err
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Walk the cause chain looking for a given kind.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind || self.cause.as_deref().is_some_and(|c| c.has_kind(kind))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(file) = &self.file {
            match self.span {
                Some(span) if span.line > 0 => {
                    write!(f, " at file://{}:{}:{}", file, span.line, span.column)?
                }
                _ => write!(f, " at file://{file}")?,
            }
        }
        if let Some(cause) = &self.cause {
            write!(f, "\nCaused by: {cause}")?;
        }
        if !self.children.is_empty() {
            write!(f, "\nRelated errors:")?;
            for child in &self.children {
                write!(f, "\n  - {child}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io_error(err.to_string())
    }
}

/// Report an error with ariadne, including every child error.
pub fn report_error(filename: &str, source: &str, error: &Error) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = error.kind.label();
    let mut message = error.message.clone();
    if let Some(cause) = &error.cause {
        message.push_str(&format!(" (caused by: {})", cause.message));
    }

    let result = match error.span {
        Some(span) => Report::build(ReportKind::Error, (filename, span.start..span.end))
            .with_message(format!("{kind} error"))
            .with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(&message)
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((filename, Source::from(source))),
        None => Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{kind} error: {message}"))
            .finish()
            .eprint((filename, Source::from(source))),
    };
    if result.is_err() {
        eprintln!("{kind} error: {error}");
    }

    for child in &error.children {
        report_error(filename, source, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_message_only() {
        let err = Error::runtime("boom", Span::new(0, 1));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_display_with_file_and_position() {
        let err = Error::syntax("unexpected token", Span::at(4, 5, 2, 3))
            .with_file(Some(Arc::from("main.zy")));
        assert_eq!(err.to_string(), "unexpected token at file://main.zy:2:3");
    }

    #[test]
    fn test_display_cause_and_children() {
        let mut err = Error::runtime("outer", Span::new(0, 1))
            .with_cause(Error::io_error("disk gone"));
        err.push_child(Error::syntax("first", Span::new(0, 1)));
        err.push_child(Error::syntax("second", Span::new(2, 3)));
        assert_eq!(
            err.to_string(),
            "outer\nCaused by: disk gone\nRelated errors:\n  - first\n  - second"
        );
    }

    #[test]
    fn test_with_file_does_not_override() {
        let err = Error::runtime("x", Span::new(0, 1))
            .with_file(Some(Arc::from("a.zy")))
            .with_file(Some(Arc::from("b.zy")));
        assert_eq!(err.file.as_deref(), Some("a.zy"));
    }

    #[test]
    fn test_aggregate_single_is_unwrapped() {
        let err = Error::aggregate("many", vec![Error::syntax("only", Span::new(1, 2))]);
        assert_eq!(err.message(), "only");
        assert!(err.children.is_empty());
    }

    #[test]
    fn test_aggregate_collects_children() {
        let err = Error::aggregate(
            "2 errors",
            vec![
                Error::syntax("a", Span::new(1, 2)),
                Error::syntax("b", Span::new(5, 6)),
            ],
        );
        assert_eq!(err.children.len(), 2);
        assert_eq!(err.span(), Some(Span::new(1, 2)));
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_has_kind_follows_cause_chain() {
        let err = Error::runtime("wrapper", Span::new(0, 0))
            .with_cause(Error::annotation("ctor failed", Span::new(0, 0)));
        assert!(err.has_kind(ErrorKind::Annotation));
        assert!(!err.has_kind(ErrorKind::Io));
    }

    #[test]
    fn test_source_is_cause() {
        use std::error::Error as _;
        let err = Error::runtime("outer", Span::new(0, 0)).with_cause(Error::io_error("inner"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("inner".to_string()));
    }
}
