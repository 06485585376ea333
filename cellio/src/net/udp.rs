use bytes::Bytes;
use mio::Interest;
use std::future::poll_fn;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::io::IoSource;

/// A UDP socket.
pub struct UdpSocket {
    source: Option<IoSource<mio::net::UdpSocket>>,
}

impl UdpSocket {
    /// Binds to the first address `addr` resolves to that is available.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match mio::net::UdpSocket::bind(addr) {
                Ok(socket) => return Ok(Self { source: Some(IoSource::new(socket)) }),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "could not resolve to any address"))
            .into())
    }

    /// Wraps a bound standard library socket, switching it to non-blocking mode.
    pub fn from_std(socket: std::net::UdpSocket) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self { source: Some(IoSource::new(mio::net::UdpSocket::from_std(socket))) })
    }

    fn source(&mut self) -> Result<&mut IoSource<mio::net::UdpSocket>> {
        self.source.as_mut().ok_or(Error::Closed)
    }

    fn socket(&self) -> Result<&mio::net::UdpSocket> {
        self.source.as_ref().map(IoSource::get_ref).ok_or(Error::Closed)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    /// Sets the default destination for [`send`](Self::send) and the only source for
    /// [`recv`](Self::recv).
    pub fn connect(&self, addr: SocketAddr) -> Result<()> {
        Ok(self.socket()?.connect(addr)?)
    }

    pub async fn send_to(&mut self, data: &[u8], target: SocketAddr) -> Result<usize> {
        let source = self.source()?;
        poll_fn(|cx| source.poll_io(cx, Interest::WRITABLE, |s| s.send_to(data, target))).await
    }

    /// Receives one datagram, truncated to `max` bytes.
    pub async fn recv_from(&mut self, max: usize) -> Result<(Bytes, SocketAddr)> {
        let source = self.source()?;
        let mut buf = vec![0u8; max];
        let (n, from) = poll_fn(|cx| source.poll_io(cx, Interest::READABLE, |s| s.recv_from(&mut buf))).await?;
        buf.truncate(n);
        Ok((Bytes::from(buf), from))
    }

    /// Sends to the connected peer.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let source = self.source()?;
        poll_fn(|cx| source.poll_io(cx, Interest::WRITABLE, |s| s.send(data))).await
    }

    /// Receives one datagram from the connected peer, truncated to `max` bytes.
    pub async fn recv(&mut self, max: usize) -> Result<Bytes> {
        let source = self.source()?;
        let mut buf = vec![0u8; max];
        let n = poll_fn(|cx| source.poll_io(cx, Interest::READABLE, |s| s.recv(&mut buf))).await?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    /// Closes the socket. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.source = None;
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}
