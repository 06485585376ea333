use mio::Interest;
use std::future::{Future, poll_fn};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::io::IoSource;
use crate::net::stream::Stream;

/// A TCP connection.
///
/// ```ignore
/// let mut socket = TcpSocket::connect("127.0.0.1:12345").await?;
/// socket.write_all(b"ohai").await?;
/// let reply = socket.read_partial(1024).await?;
/// ```
pub type TcpSocket = Stream<mio::net::TcpStream>;

impl Stream<mio::net::TcpStream> {
    /// Connects to the first address `addr` resolves to that accepts the connection.
    ///
    /// Name resolution itself is blocking.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionRefused`] when the last address tried refused the connection.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match Self::connect_addr(addr).await {
                Ok(socket) => return Ok(socket),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "could not resolve to any address").into()
        }))
    }

    async fn connect_addr(addr: SocketAddr) -> Result<Self> {
        let stream = mio::net::TcpStream::connect(addr).map_err(|e| Error::from(e).on_connect(addr))?;
        Self::connected(stream).await.map_err(|e| e.on_connect(addr))
    }

    /// Connects, hands the socket to `f` and returns what `f` returns.
    ///
    /// The socket is closed when `f` drops it.
    pub async fn open<A, F, Fut, T>(addr: A, f: F) -> Result<T>
    where
        A: ToSocketAddrs,
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = T>,
    {
        let socket = Self::connect(addr).await?;
        Ok(f(socket).await)
    }

    /// Wraps a connected standard library stream, switching it to non-blocking mode.
    pub fn from_std(stream: std::net::TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::new(mio::net::TcpStream::from_std(stream)))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.io()?.peer_addr()?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.io()?.local_addr()?)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Ok(self.io()?.set_nodelay(nodelay)?)
    }
}

/// A listening TCP socket.
pub struct TcpServer {
    source: Option<IoSource<mio::net::TcpListener>>,
}

impl TcpServer {
    /// Binds to the first address `addr` resolves to that is available.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match mio::net::TcpListener::bind(addr) {
                Ok(listener) => return Ok(Self { source: Some(IoSource::new(listener)) }),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "could not resolve to any address"))
            .into())
    }

    /// Wraps a bound standard library listener, switching it to non-blocking mode.
    pub fn from_std(listener: std::net::TcpListener) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self { source: Some(IoSource::new(mio::net::TcpListener::from_std(listener))) })
    }

    /// Waits for the next connection.
    pub async fn accept(&mut self) -> Result<(TcpSocket, SocketAddr)> {
        let source = self.source.as_mut().ok_or(Error::Closed)?;
        let (stream, addr) = poll_fn(|cx| source.poll_io(cx, Interest::READABLE, |l| l.accept())).await?;
        tracing::trace!(%addr, "accepted connection");
        Ok((Stream::new(stream), addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let source = self.source.as_ref().ok_or(Error::Closed)?;
        Ok(source.get_ref().local_addr()?)
    }

    /// Stops listening. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.source = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}
