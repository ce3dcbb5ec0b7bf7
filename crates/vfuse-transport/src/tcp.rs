use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::Stream;

/// TCP listener for the initiator side.
pub struct TcpSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpSocket {
    /// Bind and listen on `addr` (`host:port`).
    pub fn bind(addr: &str) -> Result<Self> {
        let bind_err = |source| TransportError::Bind {
            endpoint: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<Stream> {
        let (stream, remote) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%remote, "accepted connection");
        Ok(Stream::from(stream))
    }

    /// Connect to a listening TCP peer (blocking).
    pub fn connect(addr: &str) -> Result<Stream> {
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            endpoint: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true)?;
        debug!(addr, "connected over tcp");
        Ok(Stream::from(stream))
    }

    /// The bound local address (useful after binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn bind_ephemeral_accept_connect() {
        let listener = TcpSocket::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let dialer = std::thread::spawn(move || {
            let mut stream = TcpSocket::connect(&addr).unwrap();
            stream.write_all(b"ping").unwrap();
        });

        let mut accepted = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(accepted.transport_name(), "tcp");
        dialer.join().unwrap();
    }

    #[test]
    fn connect_refused_reports_endpoint() {
        let listener = TcpSocket::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        drop(listener);

        let err = TcpSocket::connect(&addr).unwrap_err();
        match err {
            TransportError::Connect { endpoint, .. } => assert_eq!(endpoint, addr),
            other => panic!("unexpected error: {other}"),
        }
    }
}
