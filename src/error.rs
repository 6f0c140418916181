// Error taxonomy for the flux pipeline: lexer, parser, and evaluator each
// raise their own error type; FluxError unifies them for callers that run
// the whole pipeline (see lib.rs::run and src/bin/flux.rs).

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct LexerError {
    pub message: String,
    pub line: u32,
}

impl LexerError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        LexerError { message: message.into(), line }
    }
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lexer error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexerError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        ParseError { message: message.into(), line }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub line: u32,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        RuntimeError { message: message.into(), line }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Umbrella error separating failures by pipeline stage, so a caller can
/// react to "it didn't lex" vs "it didn't parse" vs "it blew up at runtime"
/// without string-matching a single flattened message.
#[derive(Debug, Clone, PartialEq)]
pub enum FluxError {
    Lex(LexerError),
    Parse(ParseError),
    Runtime(RuntimeError),
}

impl fmt::Display for FluxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxError::Lex(e) => write!(f, "{}", e),
            FluxError::Parse(e) => write!(f, "{}", e),
            FluxError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FluxError {}

impl From<LexerError> for FluxError {
    fn from(e: LexerError) -> Self {
        FluxError::Lex(e)
    }
}

impl From<ParseError> for FluxError {
    fn from(e: ParseError) -> Self {
        FluxError::Parse(e)
    }
}

impl From<RuntimeError> for FluxError {
    fn from(e: RuntimeError) -> Self {
        FluxError::Runtime(e)
    }
}

/// Non-local control flow raised during statement execution. Carried inside
/// the `Err` side of the evaluator's internal `Result` so it rides the `?`
/// operator up to the nearest matching handler (loop, call, or
/// `Interpreter::interpret`) without polluting `RuntimeError`.
#[derive(Debug, Clone)]
pub enum Signal {
    Return(crate::value::Value),
    Break,
    Continue,
    Error(RuntimeError),
}

impl From<RuntimeError> for Signal {
    fn from(e: RuntimeError) -> Self {
        Signal::Error(e)
    }
}

pub type EvalResult<T> = Result<T, Signal>;
