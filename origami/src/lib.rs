//! origami language library
//!
//! A dynamically typed scripting language with PHP-style variables and
//! classes: a lexer and a hand-written parser that resolves variables to
//! slots at parse time, and a tree-walking runtime with classes,
//! interfaces, generics, annotations and channels.
//!
//! ```no_run
//! let vm = origami::Vm::new();
//! let ctx = vm.create_context();
//! let _ = vm.run_source("echo 1 + 2;", None, &ctx);
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod resolver;
pub mod types;

pub use ast::Span;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use interp::{Context, Control, Flow, Value, Vm};
pub use parser::Parser;
