//! UWScript: the high-level dialogue/control-flow language, compiled to
//! conversation VM assembly plus a companion strings file.

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod temps;
pub mod token;

pub use codegen::{compile, CompiledProgram};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("lex error at {line}:{column}: {message}")]
    Lex {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("line {line}: variable '{name}' is not defined")]
    UndefinedVariable { name: String, line: usize },
    #[error("line {line}: function '{name}' is not defined")]
    UndefinedFunction { name: String, line: usize },
    #[error("line {line}: label '{name}' is not defined")]
    UndefinedLabel { name: String, line: usize },
    #[error("line {line}: '{name}' is not an array")]
    NotAnArray { name: String, line: usize },
}
