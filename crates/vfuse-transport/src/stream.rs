use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::Result;

/// A connected byte stream between the two vfuse peers.
///
/// Wraps either a TCP connection or a Unix domain socket. Cloning via
/// [`Stream::try_clone`] yields a second handle on the same connection so one
/// side can be dedicated to reading while the other is shared by writers.
pub struct Stream {
    inner: StreamInner,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl From<TcpStream> for Stream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for Stream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }
}

impl Stream {
    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            StreamInner::Tcp(stream) => Ok(Self::from(stream.try_clone()?)),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Ok(Self::from(stream.try_clone()?)),
        }
    }

    /// Shut down both directions of the connection.
    ///
    /// Any thread blocked reading a clone of this stream observes EOF.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            StreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            // Already closed by the peer.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Human-readable description of the remote end.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            StreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            StreamInner::Unix(stream) => match stream.peer_addr() {
                Ok(addr) => match addr.as_pathname() {
                    Some(path) => format!("unix:{}", path.display()),
                    None => "unix:unnamed".to_string(),
                },
                Err(_) => "unix:unknown".to_string(),
            },
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("type", &self.transport_name())
            .finish()
    }
}
