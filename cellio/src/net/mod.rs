//! Sockets that block outside an actor and suspend only the calling task inside one.

pub mod stream;
pub mod tcp;
pub mod udp;
pub mod unix;

pub use stream::{READ_CHUNK, Stream, StreamIo};
pub use tcp::{TcpServer, TcpSocket};
pub use udp::UdpSocket;
pub use unix::{UnixServer, UnixSocket};
