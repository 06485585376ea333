//! Fixtures shared by the socket and actor tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use cellio::{Config, Runtime, TcpServer, TcpSocket};

pub const PAYLOAD: &[u8] = b"ohai";

pub fn runtime() -> Runtime {
    let config = Config::default().with_shutdown_timeout(Duration::from_secs(1));
    Runtime::new(config).expect("failed to start runtime")
}

/// Runs `f()` inside a short-lived actor and returns its value.
pub fn within_io_actor<F, Fut, T>(f: F) -> cellio::Result<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + 'static,
    T: Send + 'static,
{
    let runtime = runtime();
    let actor = runtime.spawn_actor("example")?;
    let result = actor.call(f);
    let _ = actor.terminate();
    result
}

/// Hands `f` a socket accepted by a [`TcpServer`] and the plain client connected to it.
pub fn with_connected_sockets<R>(f: impl FnOnce(TcpSocket, TcpStream) -> R) -> R {
    let mut server = TcpServer::bind("127.0.0.1:0").expect("bind");
    let addr = server.local_addr().expect("local addr");
    let peer = TcpStream::connect(addr).expect("connect");
    let (subject, _) = cellio::block_on(server.accept()).expect("accept");
    f(subject, peer)
}

/// A loopback address nothing listens on.
pub fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

/// A plain listener plus a thread accepting exactly one connection.
pub fn plain_server() -> (SocketAddr, std::thread::JoinHandle<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let accepted = std::thread::spawn(move || listener.accept().expect("accept").0);
    (addr, accepted)
}
