//! Core runtime types for tokio-sm.

use std::{any::Any, fmt, future::Future, pin::Pin, sync::Arc};

/// Identity that means "no state": a selector returning it (or `None`)
/// declines to advance, and switching to it is a no-op.
pub const NO_STATE: &str = "";

/// A boxed, sendable future as stored by state callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which watchdog or callback an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The state's `on_enter` callback.
    Enter,
    /// The state's `on_leave` callback.
    Leave,
    /// Time spent at the state itself (dwell timeout).
    State,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => f.write_str("enter"),
            Self::Leave => f.write_str("leave"),
            Self::State => f.write_str("state"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

/// Failure of a single enter/leave callback.
///
/// A callback either returns one of these explicitly or panics; in the latter
/// case the panic payload is captured as [`Fault::Panic`]. Faults are cheap to
/// clone so the same value can be handed to the error handler and returned
/// to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Fault {
    /// The callback returned an error.
    #[error("{0}")]
    Error(Arc<dyn std::error::Error + Send + Sync>),
    /// The callback panicked; holds the panic message when it was a string.
    #[error("callback panicked: {0}")]
    Panic(String),
    /// The callback task was cancelled before it completed.
    #[error("callback task was cancelled")]
    Cancelled,
}

impl Fault {
    /// Wraps any error value.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Error(Arc::new(error))
    }

    /// Builds a fault from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Converts a panic payload into a fault.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panic(message)
    }

    /// Returns the wrapped error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Error(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for Fault {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::from_panic(err.into_panic())
        } else {
            Self::Cancelled
        }
    }
}

/// Error returned by `start`, `advance` and `emergency_switch`.
///
/// The two variants are deliberately asymmetric: after a [`Leave`] failure
/// the machine is still at `state`, after an [`Enter`] failure it has already
/// moved to `state`.
///
/// [`Leave`]: TransitionError::Leave
/// [`Enter`]: TransitionError::Enter
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    /// `on_leave` of the current state failed; the transition was aborted.
    #[error("leaving state `{state}` failed: {fault}")]
    Leave {
        state: String,
        #[source]
        fault: Fault,
    },
    /// `on_enter` of the new state failed; the state is occupied regardless.
    #[error("entering state `{state}` failed: {fault}")]
    Enter {
        state: String,
        #[source]
        fault: Fault,
    },
}

impl TransitionError {
    /// The callback fault behind this error.
    pub fn fault(&self) -> &Fault {
        match self {
            Self::Leave { fault, .. } | Self::Enter { fault, .. } => fault,
        }
    }

    /// The state whose callback failed.
    pub fn state(&self) -> &str {
        match self {
            Self::Leave { state, .. } | Self::Enter { state, .. } => state,
        }
    }

    /// Which callback failed.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Leave { .. } => EventKind::Leave,
            Self::Enter { .. } => EventKind::Enter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display() {
        assert_eq!(Fault::msg("disk full").to_string(), "disk full");
        assert_eq!(
            Fault::Panic("boom".into()).to_string(),
            "callback panicked: boom"
        );
    }

    #[test]
    fn transition_error_accessors() {
        let err = TransitionError::Enter {
            state: "02".into(),
            fault: Fault::msg("nope"),
        };
        assert_eq!(err.kind(), EventKind::Enter);
        assert_eq!(err.state(), "02");
        assert_eq!(err.to_string(), "entering state `02` failed: nope");
    }

    #[test]
    fn downcast_recovers_error_type() {
        let fault = Fault::new(std::io::Error::other("io"));
        assert!(fault.downcast_ref::<std::io::Error>().is_some());
        assert!(Fault::Cancelled.downcast_ref::<std::io::Error>().is_none());
    }

    #[tokio::test]
    async fn join_error_panic_becomes_fault() {
        let handle = tokio::spawn(async {
            if true {
                panic!("explicit panic");
            }
        });
        let err = handle.await.unwrap_err();
        match Fault::from(err) {
            Fault::Panic(msg) => assert_eq!(msg, "explicit panic"),
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_error_abort_becomes_cancelled() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let err = handle.await.unwrap_err();
        assert!(matches!(Fault::from(err), Fault::Cancelled));
    }
}
