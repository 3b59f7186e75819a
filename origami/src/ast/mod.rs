//! Abstract Syntax Tree definitions

mod decl;
mod node;
mod span;

pub use decl::*;
pub use node::*;
pub use span::*;

/// A node with its source location.
pub type Ast = Spanned<Node>;

/// A parsed source file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Program {
    pub file: Option<String>,
    pub statements: Vec<Ast>,
}
