use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::Stream;
use crate::tcp::TcpSocket;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for any supported [`Endpoint`].
pub enum Listener {
    Tcp(TcpSocket),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl Listener {
    /// Bind to `endpoint`.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp { .. } => {
                let addr = endpoint
                    .listen_addr()
                    .ok_or_else(|| TransportError::Unsupported(endpoint.to_string()))?;
                Ok(Listener::Tcp(TcpSocket::bind(&addr)?))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Listener::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported(endpoint.to_string())),
        }
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<Stream> {
        match self {
            Listener::Tcp(socket) => socket.accept(),
            #[cfg(unix)]
            Listener::Unix(socket) => socket.accept(),
        }
    }

    /// The endpoint actually bound (resolves TCP port 0).
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            Listener::Tcp(socket) => {
                let addr = socket.local_addr();
                Endpoint::Tcp {
                    host: Some(addr.ip().to_string()),
                    port: addr.port(),
                }
            }
            #[cfg(unix)]
            Listener::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
        }
    }
}

/// Dial `endpoint` (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<Stream> {
    match endpoint {
        Endpoint::Tcp { .. } => {
            let addr = endpoint
                .dial_addr()
                .ok_or_else(|| TransportError::Unsupported(endpoint.to_string()))?;
            TcpSocket::connect(&addr)
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(TransportError::Unsupported(endpoint.to_string())),
    }
}
