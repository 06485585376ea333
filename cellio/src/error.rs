//! Error types shared by the runtime and the socket wrappers.

use std::io;
use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by actors, timers and sockets.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operating system I/O error not covered by a more specific variant.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The remote end actively refused the connection.
    #[error("connection refused: {addr}")]
    ConnectionRefused {
        /// Address that refused the connection.
        addr: String,
    },

    /// A partial read found the end of the stream.
    #[error("end of file reached")]
    Eof,

    /// The socket was closed locally.
    #[error("closed stream")]
    Closed,

    /// A task did not finish within its [`timeout`](crate::timeout).
    #[error("task timed out after {0:?}")]
    TaskTimeout(Duration),

    /// An [`ActorFuture`](crate::ActorFuture) had no value before the caller's deadline.
    #[error("no value from actor future within {0:?}")]
    FutureTimeout(Duration),

    /// The actor is no longer running.
    #[error("actor '{name}' is dead")]
    DeadActor {
        /// Name the actor was spawned with.
        name: String,
    },

    /// A task panicked and took its actor down.
    #[error("actor '{name}' crashed: {reason}")]
    ActorPanicked {
        /// Name the actor was spawned with.
        name: String,
        /// Panic message of the task that crashed the actor.
        reason: String,
    },

    /// An actor-only operation was used outside of an actor.
    #[error("not running inside an actor")]
    NotInActor,

    /// An actor did not exit within the configured shutdown timeout.
    #[error("actor '{name}' did not stop within {timeout:?}")]
    ShutdownTimeout {
        /// Name the actor was spawned with.
        name: String,
        /// The shutdown timeout that elapsed.
        timeout: Duration,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The metrics exporter could not be installed.
    #[error("metrics exporter: {0}")]
    Metrics(String),
}

impl Error {
    /// Rewrites a refused connection into [`Error::ConnectionRefused`] for `addr`.
    pub(crate) fn on_connect(self, addr: impl ToString) -> Self {
        match self {
            Self::Io(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
                Self::ConnectionRefused { addr: addr.to_string() }
            }
            other => other,
        }
    }

    /// Whether this error is a refused connection.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::ConnectionRefused { .. } => true,
            Self::Io(err) => err.kind() == io::ErrorKind::ConnectionRefused,
            _ => false,
        }
    }
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
