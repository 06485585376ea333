//! Buffered byte streams shared by TCP and UNIX sockets.

use bytes::{Bytes, BytesMut};
use mio::Interest;
use std::future::poll_fn;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::task::{Context, Poll, ready};

use crate::error::{Error, Result};
use crate::io::IoSource;

/// Bytes requested from the OS per read.
pub const READ_CHUNK: usize = 16 * 1024;

mod sealed {
    pub trait Sealed {}
    impl Sealed for mio::net::TcpStream {}
    impl Sealed for mio::net::UnixStream {}
}

/// Connected stream sockets a [`Stream`] can wrap.
pub trait StreamIo: AsRawFd + sealed::Sealed {
    #[doc(hidden)]
    fn read_raw(&self, buf: &mut [u8]) -> io::Result<usize>;
    #[doc(hidden)]
    fn write_raw(&self, buf: &[u8]) -> io::Result<usize>;
    #[doc(hidden)]
    fn shutdown_raw(&self, how: Shutdown) -> io::Result<()>;
    /// Pending socket error (`SO_ERROR`).
    #[doc(hidden)]
    fn take_error_raw(&self) -> io::Result<Option<io::Error>>;
    /// `NotConnected` while a non-blocking connect is in progress.
    #[doc(hidden)]
    fn check_connected(&self) -> io::Result<()>;
}

impl StreamIo for mio::net::TcpStream {
    fn read_raw(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }

    fn write_raw(&self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn shutdown_raw(&self, how: Shutdown) -> io::Result<()> {
        self.shutdown(how)
    }

    fn take_error_raw(&self) -> io::Result<Option<io::Error>> {
        self.take_error()
    }

    fn check_connected(&self) -> io::Result<()> {
        self.peer_addr().map(|_| ())
    }
}

impl StreamIo for mio::net::UnixStream {
    fn read_raw(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }

    fn write_raw(&self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn shutdown_raw(&self, how: Shutdown) -> io::Result<()> {
        self.shutdown(how)
    }

    fn take_error_raw(&self) -> io::Result<Option<io::Error>> {
        self.take_error()
    }

    fn check_connected(&self) -> io::Result<()> {
        self.peer_addr().map(|_| ())
    }
}

/// A connected socket with a read buffer.
///
/// Every read returns raw bytes. Outside an actor the operations block the calling thread; inside
/// one they suspend only the calling task.
pub struct Stream<S: StreamIo> {
    /// `None` once closed.
    source: Option<IoSource<S>>,
    read_buf: BytesMut,
    eof: bool,
}

impl<S: StreamIo> std::fmt::Debug for Stream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("fd", &self.source.as_ref().map(|s| s.get_ref().as_raw_fd()))
            .field("buffered", &self.read_buf.len())
            .field("eof", &self.eof)
            .finish()
    }
}

impl<S: StreamIo> Stream<S> {
    pub(crate) fn new(io: S) -> Self {
        Self { source: Some(IoSource::new(io)), read_buf: BytesMut::new(), eof: false }
    }

    /// Drives a non-blocking connect on `io` to completion.
    pub(crate) async fn connected(io: S) -> Result<Self> {
        let mut source = IoSource::new(io);
        poll_fn(|cx| {
            source.poll_io(cx, Interest::WRITABLE, |io| {
                if let Some(err) = io.take_error_raw()? {
                    return Err(err);
                }
                match io.check_connected() {
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Err(io::ErrorKind::WouldBlock.into()),
                    other => other,
                }
            })
        })
        .await?;

        Ok(Self { source: Some(source), read_buf: BytesMut::new(), eof: false })
    }

    pub(crate) fn io(&self) -> Result<&S> {
        self.source.as_ref().map(IoSource::get_ref).ok_or(Error::Closed)
    }

    fn ensure_open(&self) -> Result<()> {
        self.io().map(|_| ())
    }

    /// Reads once from the socket into the buffer. `Ok(0)` means end of stream.
    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<Result<usize>> {
        if self.eof {
            return Poll::Ready(Ok(0));
        }
        let Some(source) = self.source.as_mut() else {
            return Poll::Ready(Err(Error::Closed));
        };

        let mut chunk = [0u8; READ_CHUNK];
        let n = ready!(source.poll_io(cx, Interest::READABLE, |io| io.read_raw(&mut chunk)))?;
        if n == 0 {
            self.eof = true;
        } else {
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
        Poll::Ready(Ok(n))
    }

    async fn fill(&mut self) -> Result<usize> {
        poll_fn(|cx| self.poll_fill(cx)).await
    }

    /// Reads `size` bytes, or everything up to end of stream when `size` is `None`.
    ///
    /// With a size, fewer bytes are returned only if the stream ends first, and `None` is returned
    /// if it ended before any byte was read. Without a size the result is never `None`; it is empty
    /// when the stream was already at its end.
    pub async fn read(&mut self, size: Option<usize>) -> Result<Option<Bytes>> {
        self.ensure_open()?;

        match size {
            Some(0) => Ok(Some(Bytes::new())),
            Some(len) => {
                while self.read_buf.len() < len {
                    if self.fill().await? == 0 {
                        break;
                    }
                }
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                let take = len.min(self.read_buf.len());
                Ok(Some(self.read_buf.split_to(take).freeze()))
            }
            None => {
                while self.fill().await? != 0 {}
                Ok(Some(self.read_buf.split().freeze()))
            }
        }
    }

    /// Returns between 1 and `max` bytes, waiting only if nothing is buffered.
    ///
    /// # Errors
    ///
    /// [`Error::Eof`] when the peer closed and nothing is buffered.
    pub async fn read_partial(&mut self, max: usize) -> Result<Bytes> {
        self.ensure_open()?;
        if max == 0 {
            return Ok(Bytes::new());
        }

        if self.read_buf.is_empty() && self.fill().await? == 0 {
            return Err(Error::Eof);
        }
        let take = max.min(self.read_buf.len());
        Ok(self.read_buf.split_to(take).freeze())
    }

    /// Waits until a byte is available (`false`) or the peer has closed (`true`).
    pub async fn eof(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if !self.read_buf.is_empty() {
            return Ok(false);
        }
        Ok(self.fill().await? == 0)
    }

    /// Reads through the next `delim`, inclusive.
    ///
    /// At end of stream the remaining bytes are returned without a delimiter, then `None`.
    pub async fn read_until(&mut self, delim: u8) -> Result<Option<Bytes>> {
        self.ensure_open()?;

        let mut scanned = 0;
        loop {
            if let Some(pos) = self.read_buf[scanned..].iter().position(|b| *b == delim) {
                return Ok(Some(self.read_buf.split_to(scanned + pos + 1).freeze()));
            }
            scanned = self.read_buf.len();

            if self.fill().await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.read_buf.split().freeze()));
            }
        }
    }

    /// Reads through the next `\n`.
    pub async fn read_line(&mut self) -> Result<Option<Bytes>> {
        self.read_until(b'\n').await
    }

    /// Writes some of `data`, returning how many bytes the OS accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let source = self.source.as_mut().ok_or(Error::Closed)?;
        poll_fn(|cx| source.poll_io(cx, Interest::WRITABLE, |io| io.write_raw(data))).await
    }

    /// Writes all of `data`.
    pub async fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.write(data).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Shuts down the write half; the peer reads end of stream.
    pub fn close_write(&mut self) -> Result<()> {
        self.io()?.shutdown_raw(Shutdown::Write)?;
        Ok(())
    }

    /// Closes the socket and discards buffered input. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.source = None;
        self.read_buf.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Number of bytes read from the OS but not yet returned.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }
}
