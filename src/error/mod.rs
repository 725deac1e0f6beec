//! Error types for all phases: scanning, compilation, execution.

use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// Scanner errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
        }
    }

    /// The bare message, without location (the compiler supplies that).
    pub fn message(&self) -> String {
        match self {
            Self::UnexpectedChar(c, _) => format!("Unexpected character '{}'.", c),
            Self::UnterminatedString(_) => "Unterminated string.".to_string(),
        }
    }
}

/// A single compile-time diagnostic.
///
/// Rendered exactly as the compiler reports it: `[line N] Error at 'x': msg`,
/// with the token part omitted for scanner-originated errors and replaced by
/// `at end` when the parser ran off the end of the source.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("[line {line}] Error at '{lexeme}': {message}")]
    AtToken {
        line: usize,
        lexeme: String,
        message: String,
    },

    #[error("[line {line}] Error at end: {message}")]
    AtEnd { line: usize, message: String },

    #[error("[line {line}] Error: {message}")]
    Plain { line: usize, message: String },
}

impl CompileError {
    pub fn at_token(line: usize, lexeme: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AtToken {
            line,
            lexeme: lexeme.into(),
            message: message.into(),
        }
    }

    pub fn at_end(line: usize, message: impl Into<String>) -> Self {
        Self::AtEnd {
            line,
            message: message.into(),
        }
    }

    pub fn plain(line: usize, message: impl Into<String>) -> Self {
        Self::Plain {
            line,
            message: message.into(),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::AtToken { line, .. } | Self::AtEnd { line, .. } | Self::Plain { line, .. } => {
                *line
            }
        }
    }
}

/// Every diagnostic recorded in one compilation pass.
///
/// Panic-mode synchronization lets the compiler report several independent
/// errors before giving up; no bytecode from a failed compile is executed.
#[derive(Debug)]
pub struct CompileErrors(pub Vec<CompileError>);

impl std::error::Error for CompileErrors {}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// One frame of a runtime error's call-stack context.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    /// Source line the frame was executing.
    pub line: usize,
    /// Function name, or `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// What went wrong at run time.
#[derive(Debug, Clone, Error)]
pub enum RuntimeErrorKind {
    #[error("{0}")]
    TypeError(String),

    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),

    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),

    #[error("Can only call functions and classes.")]
    NotCallable,

    #[error("Expected {expected} arguments but got {got}.")]
    WrongArity { expected: usize, got: usize },

    #[error("Stack overflow.")]
    StackOverflow,

    #[error("{0}")]
    Native(String),
}

/// A runtime error plus the call-stack context captured when it was raised.
///
/// The trace runs innermost to outermost. The VM resets its stack and frames
/// after raising one of these, so the same instance stays usable.
#[derive(Debug)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub trace: Vec<TraceFrame>,
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, trace: Vec<TraceFrame>) -> Self {
        Self { kind, trace }
    }

    pub fn type_error(message: impl Into<String>, trace: Vec<TraceFrame>) -> Self {
        Self::new(RuntimeErrorKind::TypeError(message.into()), trace)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in &self.trace {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum VesperError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Compile error:\n{0}")]
    Compile(#[from] CompileErrors),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
