use tracing::{debug, info};
use vfuse_frame::FrameConfig;
use vfuse_proto::{Message, Request, Response};

use crate::connection::{PacketReader, PacketWriter};
use crate::error::{PeerError, Result};

/// Responder-side configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub frame: FrameConfig,
}

/// Answers requests. Implementors map every [`Request`] variant to exactly
/// one handler with an exhaustive `match`; domain failures belong in the
/// returned response, never in a panic.
pub trait Dispatcher {
    fn dispatch(&self, request: Request) -> Response;
}

impl<F> Dispatcher for F
where
    F: Fn(Request) -> Response,
{
    fn dispatch(&self, request: Request) -> Response {
        self(request)
    }
}

/// Serve requests until the initiator hangs up.
///
/// Single-threaded: each request is read, dispatched and answered before
/// the next frame is read. Returns the number of requests served when the
/// stream ends cleanly between frames; any transport or protocol failure,
/// including a response arriving at the responder, ends the loop with `Err`.
pub fn serve<D>(reader: &mut PacketReader, writer: &PacketWriter, dispatcher: &D) -> Result<u64>
where
    D: Dispatcher + ?Sized,
{
    let mut served = 0u64;
    while let Some(packet) = reader.next_packet()? {
        let request = match packet.message {
            Message::Request(request) => request,
            Message::Response(response) => {
                return Err(PeerError::UnexpectedMessage {
                    id: packet.id,
                    kind: response.kind(),
                })
            }
        };

        let kind = request.kind();
        let response = dispatcher.dispatch(request);
        debug!(
            id = packet.id,
            %kind,
            err = response.error().map(|err| err.code()),
            "dispatched"
        );
        writer.write_response(packet.id, response)?;
        served += 1;
    }
    info!(served, "initiator closed the connection");
    Ok(served)
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    use vfuse_proto::{
        CloseRequest, CloseResponse, FsError, MessageRegistry, MkdirResponse, Packet,
        ReadlinkRequest, ReadlinkResponse,
    };
    use vfuse_transport::Stream;

    use super::*;
    use crate::client::{Client, ClientConfig};
    use crate::connection::split;

    fn echo_dispatcher(request: Request) -> Response {
        match request {
            Request::Readlink(body) => ReadlinkResponse {
                target: format!("->{}", body.name),
                err: None,
            }
            .into(),
            Request::Close(_) => CloseResponse {
                err: Some(FsError::BadHandle),
            }
            .into(),
            _ => MkdirResponse {
                err: Some(FsError::Other("unsupported".into())),
            }
            .into(),
        }
    }

    #[test]
    fn serves_client_until_clean_eof() {
        let registry = Arc::new(MessageRegistry::standard().expect("standard registry should build"));
        let (left, right) = UnixStream::pair().expect("socket pair should open");

        let server_registry = Arc::clone(&registry);
        let server = std::thread::spawn(move || {
            let (mut reader, writer) = split(Stream::from(right), server_registry, &FrameConfig::default())
                .expect("responder end should split");
            serve(&mut reader, &writer, &echo_dispatcher)
        });

        let client = Client::new(Stream::from(left), registry, ClientConfig::default())
            .expect("client should start");
        let link = client
            .invoke(ReadlinkRequest { name: "a/b".into() })
            .expect("readlink should complete");
        assert_eq!(link.target, "->a/b");

        let close = client
            .invoke(CloseRequest { handle: 42 })
            .expect("close should complete");
        assert_eq!(close.err, Some(FsError::BadHandle));

        client.shutdown().expect("client should shut down");
        let served = server
            .join()
            .expect("server thread should finish")
            .expect("serve should end cleanly");
        assert_eq!(served, 2);
    }

    #[test]
    fn response_at_responder_is_fatal() {
        let registry = Arc::new(MessageRegistry::standard().expect("standard registry should build"));
        let (left, right) = UnixStream::pair().expect("socket pair should open");
        let config = FrameConfig::default();
        let (_, initiator) = split(Stream::from(left), Arc::clone(&registry), &config)
            .expect("initiator end should split");
        let (mut reader, writer) = split(Stream::from(right), registry, &config)
            .expect("responder end should split");

        initiator
            .write_packet(&Packet::response(9, CloseResponse { err: None }))
            .expect("initiator should write");

        let err = serve(&mut reader, &writer, &echo_dispatcher).expect_err("serve must fail");
        assert!(matches!(err, PeerError::UnexpectedMessage { id: 9, .. }));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let registry = Arc::new(MessageRegistry::standard().expect("standard registry should build"));
        let (left, right) = UnixStream::pair().expect("socket pair should open");
        let (mut reader, writer) = split(Stream::from(right), registry, &FrameConfig::default())
            .expect("responder end should split");

        let mut raw = vfuse_frame::FrameWriter::new(left);
        raw.send(1, 4000, b"").expect("raw frame should write");

        let err = serve(&mut reader, &writer, &echo_dispatcher).expect_err("serve must fail");
        assert!(matches!(
            err,
            PeerError::Proto(vfuse_proto::ProtoError::UnknownType(4000))
        ));
    }
}
