//! Control signals used to unwind out of handler code.
//!
//! A handler returns [`Flow`]. Finalization methods on the context return
//! `Err(Interrupt::Signal(Signal::Done))` so that `?` short-circuits out of
//! any helper depth, and [`Context::eject`](crate::Context::eject) returns
//! `Err(Interrupt::Signal(Signal::Eject))`. Neither signal is an error: the
//! dispatch loop matches on the variant and never logs them as failures.

use crate::error::JetError;
use crate::router::ValidationError;
use std::fmt;

/// Unwinding signal raised by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The response has been finalized inline; stop running handler code.
    Done,
    /// The handler abandons the synchronous completion path. Something else
    /// (a [`Deferred`](crate::Deferred) responder) finalizes later, if at all.
    Eject,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Done => write!(f, "done"),
            Signal::Eject => write!(f, "eject"),
        }
    }
}

/// Why a handler stopped before returning `Ok(())`.
#[derive(Debug)]
pub enum Interrupt {
    /// Intentional unwinding.
    Signal(Signal),
    /// A genuine application error.
    Error(JetError),
}

impl Interrupt {
    /// The `Done` signal.
    pub const DONE: Interrupt = Interrupt::Signal(Signal::Done);
    /// The `Eject` signal.
    pub const EJECT: Interrupt = Interrupt::Signal(Signal::Eject);

    /// Returns the carried signal, if this is not an error.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            Interrupt::Signal(signal) => Some(*signal),
            Interrupt::Error(_) => None,
        }
    }

    /// Whether this interrupt is a control signal rather than an error.
    pub fn is_signal(&self) -> bool {
        self.signal().is_some()
    }

    /// Returns the carried error, if any.
    pub fn into_error(self) -> Option<JetError> {
        match self {
            Interrupt::Error(err) => Some(err),
            Interrupt::Signal(_) => None,
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Signal(signal) => write!(f, "signal: {}", signal),
            Interrupt::Error(err) => write!(f, "{}", err),
        }
    }
}

impl From<Signal> for Interrupt {
    fn from(signal: Signal) -> Self {
        Interrupt::Signal(signal)
    }
}

impl From<JetError> for Interrupt {
    fn from(err: JetError) -> Self {
        Interrupt::Error(err)
    }
}

impl From<ValidationError> for Interrupt {
    fn from(err: ValidationError) -> Self {
        Interrupt::Error(err.into())
    }
}

impl From<serde_json::Error> for Interrupt {
    fn from(err: serde_json::Error) -> Self {
        Interrupt::Error(err.into())
    }
}

impl From<std::io::Error> for Interrupt {
    fn from(err: std::io::Error) -> Self {
        Interrupt::Error(err.into())
    }
}

/// Result of running handler code.
pub type Flow<T = ()> = Result<T, Interrupt>;
