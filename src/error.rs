//! Error types shared across the pipeline.

use crate::{ShaderId, ShaderStage};
use std::fmt;
use thiserror::Error;

/// Characters of context shown on either side of a syntax error cursor.
pub const DEFAULT_ERROR_CONTEXT: usize = 30;

/// A parse failure, carrying enough of the offending source to render a
/// caret diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    message: String,
    source: String,
    offset: usize,
    context: usize,
}

impl SyntaxError {
    /// `offset` is a byte offset into `source` and must lie on a char
    /// boundary.
    pub fn new(message: impl Into<String>, source: impl Into<String>, offset: usize) -> Self {
        let source = source.into();
        Self {
            message: message.into(),
            offset: offset.min(source.len()),
            source,
            context: DEFAULT_ERROR_CONTEXT,
        }
    }

    pub fn with_context(mut self, chars: usize) -> Self {
        self.context = chars.max(1);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Flattened context window and the caret column within it.
    fn window(&self) -> (String, usize) {
        fn clean(c: char) -> char {
            match c {
                '\n' | '\r' | '\t' => ' ',
                c => c,
            }
        }

        let head = &self.source[..self.offset];
        let tail = &self.source[self.offset..];
        let before: Vec<char> = head.chars().rev().take(self.context).collect();
        let after: Vec<char> = tail.chars().take(self.context).collect();

        let mut line = String::new();
        if head.chars().count() > before.len() {
            line.push_str("...");
        }
        line.extend(before.into_iter().rev().map(clean));
        let caret = line.chars().count();
        let after_len = after.len();
        line.extend(after.into_iter().map(clean));
        if tail.chars().count() > after_len {
            line.push_str("...");
        }
        (line, caret)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (window, caret) = self.window();
        writeln!(f, "{}", self.message)?;
        writeln!(f, "  {window}")?;
        write!(f, "  {:>width$}", "^", width = caret + 1)
    }
}

impl std::error::Error for SyntaxError {}

/// A preprocessor directive failure, positioned in the file being
/// processed at the time.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{file}:{line}:{column}: {message}")]
pub struct DirectiveError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// A modifier script that could not be parsed or applied.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("modifier {script}: {message}")]
pub struct ScriptError {
    pub script: String,
    pub message: String,
}

/// Backend compilation or link failure, carrying the driver log.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("failed to compile {stage} shader: {log}")]
    Stage { stage: ShaderStage, log: String },
    #[error("failed to link program: {log}")]
    Link { log: String },
}

/// A program definition document that cannot be used.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid program definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("program declares no shader stages")]
    NoStages,
    #[error("missing shader source {id}")]
    MissingSource { id: ShaderId },
    #[error("missing program definition {id}")]
    MissingDefinition { id: ShaderId },
}

/// Umbrella error for a single program's compile cycle. Failures are
/// isolated per definition; this never crosses the manager boundary as a
/// panic.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}
