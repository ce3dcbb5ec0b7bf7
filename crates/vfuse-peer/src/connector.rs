use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use vfuse_proto::MessageRegistry;
use vfuse_transport::{Endpoint, Stream};

use crate::connection::{split, PacketReader, PacketWriter};
use crate::error::Result;
use crate::server::ServerConfig;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Dial the initiator and split the connection for [`crate::serve`].
pub fn connect(
    endpoint: &Endpoint,
    registry: Arc<MessageRegistry>,
    config: &ServerConfig,
) -> Result<(PacketReader, PacketWriter)> {
    let stream = vfuse_transport::connect(endpoint)?;
    established(endpoint, stream, registry, config)
}

/// Like [`connect`], but keep retrying while the initiator is not yet
/// listening, for up to `timeout`.
pub fn connect_with_timeout(
    endpoint: &Endpoint,
    registry: Arc<MessageRegistry>,
    config: &ServerConfig,
    timeout: Duration,
) -> Result<(PacketReader, PacketWriter)> {
    let deadline = Instant::now() + timeout;
    loop {
        match vfuse_transport::connect(endpoint) {
            Ok(stream) => return established(endpoint, stream, registry, config),
            Err(err) if err.is_not_listening() && Instant::now() + RETRY_INTERVAL < deadline => {
                debug!(%endpoint, error = %err, "initiator not listening yet, retrying");
                std::thread::sleep(RETRY_INTERVAL);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn established(
    endpoint: &Endpoint,
    stream: Stream,
    registry: Arc<MessageRegistry>,
    config: &ServerConfig,
) -> Result<(PacketReader, PacketWriter)> {
    info!(%endpoint, transport = stream.transport_name(), "connected to initiator");
    split(stream, registry, &config.frame)
}

#[cfg(all(test, unix))]
mod tests {
    use vfuse_transport::TransportError;

    use super::*;
    use crate::error::PeerError;

    #[test]
    fn gives_up_after_timeout() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let endpoint = Endpoint::Unix(dir.path().join("absent.sock"));
        let registry = Arc::new(MessageRegistry::standard().expect("standard registry should build"));

        let started = Instant::now();
        let err = connect_with_timeout(
            &endpoint,
            registry,
            &ServerConfig::default(),
            Duration::from_millis(300),
        )
        .err()
        .expect("nobody is listening");
        assert!(matches!(err, PeerError::Transport(TransportError::Connect { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn retries_until_listener_appears() {
        let dir = tempfile::tempdir().expect("temp dir should be creatable");
        let endpoint = Endpoint::Unix(dir.path().join("late.sock"));
        let registry = Arc::new(MessageRegistry::standard().expect("standard registry should build"));

        let late_endpoint = endpoint.clone();
        let listener_thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(250));
            let listener = vfuse_transport::Listener::bind(&late_endpoint).expect("listener should bind");
            listener.accept().expect("listener should accept")
        });

        connect_with_timeout(&endpoint, registry, &ServerConfig::default(), Duration::from_secs(10))
            .expect("responder should connect once the listener is up");
        listener_thread.join().expect("listener thread should finish");
    }
}
