//! Error taxonomy shared by the parser, the evaluator and the host boundary.
//!
//! | Type | Raised by | Recovered? |
//! |------|-----------|------------|
//! | [`SyntaxError`] | lexer / parser | never; aborts that parse |
//! | [`RuntimeError`] | evaluator | by `rescue`, otherwise reported per invocation |
//! | [`HostError`] | host objects | wrapped into a `RuntimeError` once |
//!
//! Control-flow signals are not errors; see [`crate::script::signal`].

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::script::lexer::Token;
use crate::script::node::Span;
use crate::script::signal::SignalKind;
use crate::script::value::Value;

// ── SyntaxError ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// The token the parser was looking at when it gave up.
    pub token: Token,
}

impl SyntaxError {
    /// Render the offending source line with the token highlighted between
    /// `>>` and `<<`, plus one line of context on either side.
    pub fn excerpt(&self, code: &str) -> String {
        let lines: Vec<&str> = code.split('\n').collect();
        let idx = self.token.line.saturating_sub(1).min(lines.len().saturating_sub(1));
        let mut out = String::new();

        if idx > 0 {
            out.push_str(lines[idx - 1]);
            out.push('\n');
        }

        let line = lines.get(idx).copied().unwrap_or("");
        let end = self.token.column.min(line.len());
        let start = end.saturating_sub(self.token.value.len());
        match (line.get(..start), line.get(start..end), line.get(end..)) {
            (Some(before), Some(bad), Some(after)) => {
                out.push_str(&format!("{before}>>{bad}<<{after}"));
            }
            _ => out.push_str(line),
        }

        if idx + 1 < lines.len() {
            out.push('\n');
            out.push_str(lines[idx + 1]);
        }
        out
    }
}

// ── HostError ─────────────────────────────────────────────────────────────────

/// A failure reported by a host object or host callable.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError(message.into())
    }
}

// ── RuntimeError ──────────────────────────────────────────────────────────────

/// One level of the evaluation trace: the sentence that was executing when
/// the failure passed through it.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub span: Span,
    pub code: String,
    /// Target the sentence was evaluated against.
    pub computed_target: Value,
    /// Target handed to the enclosing scope.
    pub original_target: Value,
    /// Event payload of the invocation.
    pub event: Value,
}

/// An evaluation failure with its accumulated sentence trace
/// (innermost first).
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    /// Message of the host-level failure this error wraps, if any.
    pub cause: Option<String>,
    /// Span of the expression where the failure originated.
    pub span: Option<Span>,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
            cause: None,
            span: None,
            trace: Vec::new(),
        }
    }

    /// Multi-line report used when an invocation ends with this error.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        for frame in &self.trace {
            let first = frame.code.lines().next().unwrap_or("").trim();
            out.push_str(&format!("\n  at line {}: {first}", frame.span.line));
            if frame.code.lines().nth(1).is_some() {
                out.push_str(" ...");
            }
        }
        out
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{} (line {}, column {})", self.message, span.line, span.column),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<HostError> for RuntimeError {
    fn from(e: HostError) -> Self {
        RuntimeError {
            message: e.0.clone(),
            cause: Some(e.0),
            span: None,
            trace: Vec::new(),
        }
    }
}

// ── Crate-level error ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error {0}")]
    Syntax(#[from] SyntaxError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("unhandled {0} signal")]
    UnhandledSignal(SignalKind),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
