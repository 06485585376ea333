//! Evented socket I/O for a cooperative actor runtime.
//!
//! Sockets from [`net`] behave like ordinary blocking sockets on a plain thread. Inside an
//! [`Actor`], the same calls suspend only the calling task while the actor's other tasks keep
//! running on the same OS thread ("evented mode", see [`evented`]). The crate consists of:
//!
//! - [`runtime`]: the [`Runtime`] that spawns actors, plus [`block_on`] and [`spawn`]
//! - [`actor`]: actor handles, synchronous calls and [`ActorFuture`]s
//! - `executor`: the per-actor cooperative scheduler and the thread that drives it
//! - `reactor`: per-actor readiness notification on top of `mio`
//! - [`io`]: mode-aware readiness waits used by every socket
//! - [`time`]: [`sleep`] and task [`timeout`]s
//! - [`net`]: TCP, UNIX and UDP sockets

pub mod actor;
pub mod config;
pub(crate) mod context;
pub mod error;
pub(crate) mod executor;
pub mod io;
pub mod logging;
pub mod net;
pub(crate) mod reactor;
pub mod runtime;
pub(crate) mod task;
pub mod time;
pub(crate) mod waker;

pub use actor::{Actor, ActorFuture};
pub use config::Config;
pub use context::{current_actor_name, evented};
pub use error::{Error, Result};
pub use io::{wait_readable, wait_writable};
pub use net::{Stream, TcpServer, TcpSocket, UdpSocket, UnixServer, UnixSocket};
pub use runtime::{Runtime, block_on, spawn};
pub use time::{sleep, timeout};

pub use cellio_macros::{main, test};
