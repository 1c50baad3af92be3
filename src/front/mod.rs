//! GLSL front-end: lexer, syntax tree, recursive-descent parser and the
//! source writer that regenerates compilable text.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod writer;

pub use ast::Tree;
pub use lexer::{tokenize, Token, TokenValue};
pub use parser::parse;
pub use writer::write_tree;
