use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Prefix selecting a Unix domain socket endpoint.
pub const UNIX_PREFIX: &str = "unix:";

/// Where a peer listens or dials.
///
/// Accepted forms:
/// - `unix:/run/vfuse.sock`: Unix domain socket path
/// - `host:port`: TCP
/// - `7070`: bare TCP port (all interfaces when listening, loopback when dialing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { host: Option<String>, port: u16 },
}

impl Endpoint {
    /// Address string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> Option<String> {
        match self {
            Endpoint::Tcp { host, port } => {
                Some(join_host_port(host.as_deref().unwrap_or("0.0.0.0"), *port))
            }
            Endpoint::Unix(_) => None,
        }
    }

    /// Address string suitable for `TcpStream::connect`.
    pub fn dial_addr(&self) -> Option<String> {
        match self {
            Endpoint::Tcp { host, port } => {
                Some(join_host_port(host.as_deref().unwrap_or("127.0.0.1"), *port))
            }
            Endpoint::Unix(_) => None,
        }
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty endpoint"));
        }

        if let Some(path) = trimmed.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        if let Ok(port) = trimmed.parse::<u16>() {
            return Ok(Endpoint::Tcp { host: None, port });
        }

        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port, port, or unix:path"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port must be a number between 0 and 65535"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Endpoint::Tcp {
            host: (!host.is_empty()).then(|| host.to_string()),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
            Endpoint::Tcp {
                host: Some(host),
                port,
            } => f.write_str(&join_host_port(host, *port)),
            Endpoint::Tcp { host: None, port } => write!(f, ":{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_port() {
        let ep: Endpoint = "7070".parse().unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: None,
                port: 7070
            }
        );
        assert_eq!(ep.listen_addr().as_deref(), Some("0.0.0.0:7070"));
        assert_eq!(ep.dial_addr().as_deref(), Some("127.0.0.1:7070"));
    }

    #[test]
    fn parses_host_and_port() {
        let ep: Endpoint = "localhost:4321".parse().unwrap();
        assert_eq!(ep.dial_addr().as_deref(), Some("localhost:4321"));
        assert_eq!(ep.to_string(), "localhost:4321");
    }

    #[test]
    fn parses_leading_colon_as_any_host() {
        let ep: Endpoint = ":9000".parse().unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: None,
                port: 9000
            }
        );
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep: Endpoint = "[::1]:8080".parse().unwrap();
        assert_eq!(ep.dial_addr().as_deref(), Some("[::1]:8080"));
        assert_eq!(ep.to_string(), "[::1]:8080");
    }

    #[test]
    fn parses_unix_path() {
        let ep: Endpoint = "unix:/tmp/vfuse.sock".parse().unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/tmp/vfuse.sock")));
        assert_eq!(ep.to_string(), "unix:/tmp/vfuse.sock");
        assert!(ep.listen_addr().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            "".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            "unix:".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            "host:notaport".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            "no-port-here".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }
}
