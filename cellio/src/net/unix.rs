use mio::Interest;
use std::future::{Future, poll_fn};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::io::IoSource;
use crate::net::stream::Stream;

/// A connected UNIX domain stream socket.
pub type UnixSocket = Stream<mio::net::UnixStream>;

impl Stream<mio::net::UnixStream> {
    /// Connects to the socket bound at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionRefused`] when nothing listens on `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream =
            mio::net::UnixStream::connect(path).map_err(|e| Error::from(e).on_connect(path.display()))?;
        Self::connected(stream).await.map_err(|e| e.on_connect(path.display()))
    }

    /// Connects, hands the socket to `f` and returns what `f` returns.
    pub async fn open<P, F, Fut, T>(path: P, f: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = T>,
    {
        let socket = Self::connect(path).await?;
        Ok(f(socket).await)
    }

    /// An unnamed pair of connected sockets.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = mio::net::UnixStream::pair()?;
        Ok((Self::new(a), Self::new(b)))
    }

    /// Wraps a connected standard library stream, switching it to non-blocking mode.
    pub fn from_std(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::new(mio::net::UnixStream::from_std(stream)))
    }

    /// Filesystem path of the peer, if it is bound to one.
    pub fn peer_path(&self) -> Result<Option<PathBuf>> {
        let addr = self.io()?.peer_addr()?;
        Ok(addr.as_pathname().map(Path::to_path_buf))
    }
}

/// A listening UNIX domain stream socket.
///
/// The socket file is left in place on close, as with `bind(2)`.
pub struct UnixServer {
    source: Option<IoSource<mio::net::UnixListener>>,
    path: PathBuf,
}

impl UnixServer {
    /// Binds a new socket file at `path`; fails if the path exists.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let listener = mio::net::UnixListener::bind(path)?;
        Ok(Self { source: Some(IoSource::new(listener)), path: path.to_path_buf() })
    }

    /// Waits for the next connection.
    pub async fn accept(&mut self) -> Result<UnixSocket> {
        let source = self.source.as_mut().ok_or(Error::Closed)?;
        let (stream, _addr) = poll_fn(|cx| source.poll_io(cx, Interest::READABLE, |l| l.accept())).await?;
        Ok(Stream::new(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the listener is bound to, as reported by the socket.
    pub fn local_addr(&self) -> Result<PathBuf> {
        let source = self.source.as_ref().ok_or(Error::Closed)?;
        let addr = source.get_ref().local_addr()?;
        Ok(addr.as_pathname().map_or_else(|| self.path.clone(), Path::to_path_buf))
    }

    /// Stops listening. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.source = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}
