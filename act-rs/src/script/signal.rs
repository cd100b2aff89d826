//! Non-local control flow.
//!
//! Signals travel through the evaluator as ordinary `Err` values alongside
//! runtime errors.  Each construct matches the kinds it understands and
//! hands everything else back unchanged:
//!
//! | Signal | Intercepted by |
//! |--------|----------------|
//! | `Break`, `Continue` | `each`, `for`, `while`, `loop` |
//! | `Stop`, `Repeat` | every scope and template |
//! | `Restart` | the root scope only |
//! | `Return` | `run` blocks and `->` functions |
//! | `Halt` (and an escaping `Stop`) | the top-level runner |

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::RuntimeError;
use crate::script::solved::Solved;
use crate::script::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Break,
    Continue,
    Stop,
    Halt,
    Repeat,
    Restart,
    Return,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::Break => "break",
            SignalKind::Continue => "continue",
            SignalKind::Stop => "stop",
            SignalKind::Halt => "halt",
            SignalKind::Repeat => "repeat",
            SignalKind::Restart => "restart",
            SignalKind::Return => "return",
        };
        f.write_str(s)
    }
}

/// A raised signal and its optional payload.
#[derive(Debug, Clone)]
pub struct Signal {
    pub kind: SignalKind,
    pub payload: Value,
}

impl Signal {
    pub fn new(kind: SignalKind) -> Self {
        Signal { kind, payload: Value::Undefined }
    }

    pub fn with_payload(kind: SignalKind, payload: Value) -> Self {
        Signal { kind, payload }
    }
}

/// Why an evaluation did not produce a value.
#[derive(Debug, Clone)]
pub enum Unwind {
    Signal(Signal),
    Error(RuntimeError),
}

impl Unwind {
    pub fn signal(kind: SignalKind) -> Self {
        Unwind::Signal(Signal::new(kind))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Unwind::Error(RuntimeError::new(message))
    }

    /// The signal kind, or `None` for an error.
    pub fn kind(&self) -> Option<SignalKind> {
        match self {
            Unwind::Signal(s) => Some(s.kind),
            Unwind::Error(_) => None,
        }
    }
}

impl From<RuntimeError> for Unwind {
    fn from(e: RuntimeError) -> Self {
        Unwind::Error(e)
    }
}

impl From<crate::error::HostError> for Unwind {
    fn from(e: crate::error::HostError) -> Self {
        Unwind::Error(e.into())
    }
}

impl From<Signal> for Unwind {
    fn from(s: Signal) -> Self {
        Unwind::Signal(s)
    }
}

/// Outcome of evaluating one node.
pub type Flow<T = Solved> = Result<T, Unwind>;

/// Boxed local future returned by every evaluation step.  Never `Send`:
/// the evaluator runs on a single-threaded runtime.
pub type EvalFuture<'a, T = Solved> = Pin<Box<dyn Future<Output = Flow<T>> + 'a>>;

/// Outcome of a loop body: keep going, or leave the loop with a value.
pub enum LoopStep {
    Next,
    Exit(Value),
}

/// Loop-level interception: `Break` exits with its payload, `Continue` moves
/// to the next iteration, everything else propagates.
pub fn loop_step<T>(outcome: Flow<T>) -> Flow<LoopStep> {
    match outcome {
        Ok(_) => Ok(LoopStep::Next),
        Err(Unwind::Signal(Signal { kind: SignalKind::Break, payload })) => Ok(LoopStep::Exit(payload)),
        Err(Unwind::Signal(Signal { kind: SignalKind::Continue, .. })) => Ok(LoopStep::Next),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_exits_with_payload() {
        let out: Flow<()> = Err(Signal::with_payload(SignalKind::Break, 3.0.into()).into());
        match loop_step(out) {
            Ok(LoopStep::Exit(v)) => assert_eq!(v, Value::Number(3.0)),
            _ => panic!("expected exit"),
        }
    }

    #[test]
    fn continue_moves_on() {
        let out: Flow<()> = Err(Unwind::signal(SignalKind::Continue));
        assert!(matches!(loop_step(out), Ok(LoopStep::Next)));
    }

    #[test]
    fn other_signals_pass_through() {
        for kind in [SignalKind::Stop, SignalKind::Return, SignalKind::Halt, SignalKind::Restart] {
            let out: Flow<()> = Err(Unwind::signal(kind));
            match loop_step(out) {
                Err(u) => assert_eq!(u.kind(), Some(kind)),
                Ok(_) => panic!("{kind} must propagate"),
            }
        }
        let out: Flow<()> = Err(Unwind::error("boom"));
        assert!(matches!(loop_step(out), Err(Unwind::Error(_))));
    }

    #[test]
    fn display_names() {
        assert_eq!(SignalKind::Restart.to_string(), "restart");
    }
}
