use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, warn};
use vfuse_frame::FrameConfig;
use vfuse_proto::{Message, MessageKind, MessageRegistry, Packet, Request, Response, Rpc};
use vfuse_transport::{Stream, TransportError};

use crate::connection::{split, PacketReader, PacketWriter};
use crate::error::{PeerError, Result};

/// Initiator-side configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Deadline applied by [`Client::call`]; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    pub frame: FrameConfig,
}

type Delivery = std::result::Result<Response, String>;

/// Timed-out ids remembered so their late responses can be dropped quietly.
/// Past this many the oldest is forgotten and a response for it is fatal.
const MAX_CANCELLED: usize = 1024;

struct PendingCall {
    expected: MessageKind,
    slot: SyncSender<Delivery>,
}

#[derive(Default)]
struct CallTable {
    pending: HashMap<u64, PendingCall>,
    cancelled: BTreeSet<u64>,
    lost: Option<String>,
}

struct Shared {
    table: Mutex<CallTable>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CallTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one response to its caller.
    fn deliver(&self, id: u64, response: Response) -> Result<()> {
        let mut table = self.lock();
        if let Some(call) = table.pending.remove(&id) {
            if response.kind() != call.expected {
                let expected = call.expected;
                // Leave the caller registered so `fail` wakes it with the reason.
                table.pending.insert(id, call);
                return Err(PeerError::UnexpectedResponse {
                    id,
                    expected,
                    got: response.kind(),
                });
            }
            // The slot holds one value and this is the only send for `id`.
            let _ = call.slot.try_send(Ok(response));
            return Ok(());
        }
        if table.cancelled.remove(&id) {
            warn!(id, kind = %response.kind(), "dropping late response for timed-out call");
            return Ok(());
        }
        Err(PeerError::UnknownCallId(id))
    }

    /// Mark the connection dead and fail every waiting caller.
    fn fail(&self, reason: String) {
        let mut table = self.lock();
        if table.lost.is_none() {
            error!(%reason, pending = table.pending.len(), "connection lost");
            table.lost = Some(reason.clone());
        }
        let reason = table.lost.clone().unwrap_or(reason);
        for (_, call) in table.pending.drain() {
            let _ = call.slot.try_send(Err(reason.clone()));
        }
        table.cancelled.clear();
    }

    fn lost_reason(&self) -> Option<String> {
        self.lock().lost.clone()
    }
}

impl CallTable {
    fn cancel(&mut self, id: u64) {
        self.cancelled.insert(id);
        while self.cancelled.len() > MAX_CANCELLED {
            if let Some(oldest) = self.cancelled.pop_first() {
                debug!(id = oldest, "forgetting timed-out call");
            }
        }
    }
}

/// The initiator's end of a connection.
///
/// Any number of threads may call concurrently; one background thread reads
/// responses and hands each to the caller waiting on its id. Responses may
/// complete in any order.
pub struct Client {
    shared: Arc<Shared>,
    writer: PacketWriter,
    next_id: AtomicU64,
    config: ClientConfig,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Take over a connected stream and start its reader thread.
    pub fn new(stream: Stream, registry: Arc<MessageRegistry>, config: ClientConfig) -> Result<Self> {
        let (reader, writer) = split(stream, registry, &config.frame)?;
        Self::from_parts(reader, writer, config)
    }

    /// Build a client from an already split connection.
    pub fn from_parts(reader: PacketReader, writer: PacketWriter, config: ClientConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            table: Mutex::new(CallTable::default()),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_writer = writer.clone();
        let handle = std::thread::Builder::new()
            .name("vfuse-client-reader".to_string())
            .spawn(move || read_loop(reader, thread_writer, thread_shared))
            .map_err(TransportError::Io)?;

        Ok(Self {
            shared,
            writer,
            next_id: AtomicU64::new(1),
            config,
            reader_thread: Mutex::new(Some(handle)),
        })
    }

    /// Issue a request and wait for its response, honouring the configured deadline.
    pub fn call(&self, request: impl Into<Request>) -> Result<Response> {
        self.call_inner(request.into(), self.config.call_timeout)
    }

    /// Issue a request and wait at most `timeout` for its response.
    ///
    /// On expiry the call is abandoned and [`PeerError::Timeout`] returned;
    /// the connection stays open and a late response is discarded.
    pub fn call_with_deadline(&self, request: impl Into<Request>, timeout: Duration) -> Result<Response> {
        self.call_inner(request.into(), Some(timeout))
    }

    /// Typed call: the response comes back as the request's own response schema.
    pub fn invoke<R: Rpc>(&self, request: R) -> Result<R::Response> {
        let (id, response) = self.call_tracked(request.into(), self.config.call_timeout)?;
        R::from_response(response).map_err(|other| PeerError::UnexpectedResponse {
            id,
            expected: R::KIND,
            got: other.kind(),
        })
    }

    fn call_inner(&self, request: Request, timeout: Option<Duration>) -> Result<Response> {
        self.call_tracked(request, timeout).map(|(_, response)| response)
    }

    fn call_tracked(&self, request: Request, timeout: Option<Duration>) -> Result<(u64, Response)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let expected = request.response_kind();
        let kind = request.kind();

        // Encoding problems are the caller's, not the connection's.
        let frame = self.writer.encode(&Packet {
            id,
            message: Message::Request(request),
        })?;

        let (slot, delivery) = sync_channel(1);
        {
            let mut table = self.shared.lock();
            if let Some(reason) = &table.lost {
                return Err(PeerError::ConnectionLost(reason.clone()));
            }
            table.cancelled.remove(&id);
            table.pending.insert(id, PendingCall { expected, slot });
        }

        debug!(id, %kind, "sending call");
        if let Err(err) = self.writer.write_frame(&frame) {
            let reason = format!("write failed: {err}");
            self.shared.fail(reason.clone());
            let _ = self.writer.shutdown();
            return Err(PeerError::ConnectionLost(reason));
        }

        self.wait(id, delivery, timeout).map(|response| (id, response))
    }

    fn wait(&self, id: u64, delivery: Receiver<Delivery>, timeout: Option<Duration>) -> Result<Response> {
        let delivered = match timeout {
            None => delivery.recv().ok(),
            Some(limit) => match delivery.recv_timeout(limit) {
                Ok(delivered) => Some(delivered),
                Err(RecvTimeoutError::Timeout) => return self.abandon(id, &delivery, limit),
                Err(RecvTimeoutError::Disconnected) => None,
            },
        };

        match delivered {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(PeerError::ConnectionLost(reason)),
            None => Err(self.lost()),
        }
    }

    /// Give up on call `id` after its deadline.
    fn abandon(&self, id: u64, delivery: &Receiver<Delivery>, limit: Duration) -> Result<Response> {
        {
            let mut table = self.shared.lock();
            if table.pending.remove(&id).is_some() {
                table.cancel(id);
                debug!(id, ?limit, "call timed out");
                return Err(PeerError::Timeout(limit));
            }
        }
        // The reader settled this call as the deadline fired.
        match delivery.try_recv() {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(PeerError::ConnectionLost(reason)),
            Err(_) => Err(self.lost()),
        }
    }

    fn lost(&self) -> PeerError {
        PeerError::ConnectionLost(
            self.shared
                .lost_reason()
                .unwrap_or_else(|| "response channel closed".to_string()),
        )
    }

    /// Whether the connection is still usable.
    pub fn is_alive(&self) -> bool {
        self.shared.lost_reason().is_none()
    }

    /// Why the connection died, if it has.
    pub fn lost_reason(&self) -> Option<String> {
        self.shared.lost_reason()
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.lock().pending.len()
    }

    #[cfg(test)]
    fn cancelled_calls(&self) -> usize {
        self.shared.lock().cancelled.len()
    }

    /// Close the connection, fail outstanding calls and stop the reader thread.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.fail("client shut down".to_string());
        let result = self.writer.shutdown();
        let handle = self
            .reader_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("client reader thread panicked");
            }
        }
        result
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn read_loop(mut reader: PacketReader, writer: PacketWriter, shared: Arc<Shared>) {
    let reason = loop {
        let packet = match reader.next_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => break "peer closed the connection".to_string(),
            Err(err) => break err.to_string(),
        };
        let id = packet.id;
        let outcome = match packet.message {
            Message::Response(response) => shared.deliver(id, response),
            Message::Request(request) => Err(PeerError::UnexpectedMessage {
                id,
                kind: request.kind(),
            }),
        };
        if let Err(err) = outcome {
            break err.to_string();
        }
    };
    shared.fail(reason);
    // The responder must see the connection end, not a silent initiator.
    if let Err(err) = writer.shutdown() {
        debug!(error = %err, "client stream already closed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Barrier;

    use vfuse_proto::{
        AttrRequest, AttrResponse, CloseRequest, CloseResponse, FsError, MkdirResponse,
        ReadRequest, ReadResponse,
    };

    use super::*;

    /// A client wired to a scripted responder end.
    fn harness(config: ClientConfig) -> (Client, PacketReader, PacketWriter) {
        let registry = Arc::new(MessageRegistry::standard().expect("standard registry should build"));
        let (left, right) = UnixStream::pair().expect("socket pair should open");
        let client = Client::new(Stream::from(left), Arc::clone(&registry), config)
            .expect("client should start");
        let (reader, writer) = split(Stream::from(right), registry, &FrameConfig::default())
            .expect("responder end should split");
        (client, reader, writer)
    }

    fn read_request(reader: &mut PacketReader) -> (u64, Request) {
        let packet = reader.read_packet().expect("responder should read a request");
        match packet.message {
            Message::Request(request) => (packet.id, request),
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn reverse_order_responses_reach_their_callers() {
        let (client, mut reader, writer) = harness(ClientConfig::default());
        let client = Arc::new(client);
        let start = Arc::new(Barrier::new(4));

        let callers: Vec<_> = (1..=4u64)
            .map(|handle| {
                let client = Arc::clone(&client);
                let start = Arc::clone(&start);
                std::thread::spawn(move || {
                    start.wait();
                    let response = client
                        .invoke(ReadRequest {
                            handle,
                            offset: 0,
                            size: 8,
                        })
                        .expect("call should complete");
                    assert_eq!(response.data, vec![handle as u8; handle as usize]);
                })
            })
            .collect();

        let mut received: Vec<(u64, u64)> = (0..4)
            .map(|_| match read_request(&mut reader) {
                (id, Request::Read(body)) => (id, body.handle),
                (_, other) => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(client.pending_calls(), 4);

        received.reverse();
        for (id, handle) in received {
            writer
                .write_response(
                    id,
                    ReadResponse {
                        data: vec![handle as u8; handle as usize],
                        err: None,
                    },
                )
                .expect("responder should write");
        }

        for caller in callers {
            caller.join().expect("caller thread should finish");
        }
        assert_eq!(client.pending_calls(), 0);
        assert!(client.is_alive());
    }

    #[test]
    fn domain_errors_are_ordinary_responses() {
        let (client, mut reader, writer) = harness(ClientConfig::default());

        let responder = std::thread::spawn(move || {
            let (id, _) = read_request(&mut reader);
            writer
                .write_response(
                    id,
                    AttrResponse {
                        attr: None,
                        err: Some(FsError::NotExist),
                    },
                )
                .expect("responder should write");
            (reader, writer)
        });

        let response = client
            .invoke(AttrRequest {
                name: "missing".into(),
                handle: 0,
            })
            .expect("call should complete");
        assert_eq!(response.err, Some(FsError::NotExist));
        assert!(response.attr.is_none());
        assert!(client.is_alive());
        let _ = responder.join();
    }

    #[test]
    fn unknown_call_id_is_fatal() {
        let (client, mut reader, writer) = harness(ClientConfig::default());
        let client = Arc::new(client);

        let caller = {
            let client = Arc::clone(&client);
            std::thread::spawn(move || client.call(CloseRequest { handle: 1 }))
        };

        let (id, _) = read_request(&mut reader);
        writer
            .write_response(id + 100, CloseResponse { err: None })
            .expect("responder should write");

        let err = caller
            .join()
            .expect("caller thread should finish")
            .expect_err("pending call must fail");
        assert!(matches!(err, PeerError::ConnectionLost(ref reason) if reason.contains("unknown call id")));
        assert!(!client.is_alive());

        let refused = client.call(CloseRequest { handle: 2 }).expect_err("dead client refuses calls");
        assert!(matches!(refused, PeerError::ConnectionLost(_)));
    }

    #[test]
    fn fatal_response_closes_the_stream_for_the_responder() {
        let (client, mut reader, writer) = harness(ClientConfig::default());
        let client = Arc::new(client);

        let caller = {
            let client = Arc::clone(&client);
            std::thread::spawn(move || client.call(CloseRequest { handle: 1 }))
        };

        let (id, _) = read_request(&mut reader);
        writer
            .write_response(id + 100, CloseResponse { err: None })
            .expect("responder should write");
        let _ = caller.join().expect("caller thread should finish");

        let next = reader
            .next_packet()
            .expect("responder should see a clean end of stream");
        assert!(next.is_none());
        assert!(!client.is_alive());
    }

    #[test]
    fn mismatched_response_kind_is_fatal() {
        let (client, mut reader, writer) = harness(ClientConfig::default());

        let responder = std::thread::spawn(move || {
            let (id, _) = read_request(&mut reader);
            writer
                .write_response(id, MkdirResponse { err: None })
                .expect("responder should write");
            (reader, writer)
        });

        let err = client
            .call(CloseRequest { handle: 1 })
            .expect_err("mismatched response must fail the call");
        assert!(matches!(err, PeerError::ConnectionLost(_)));
        assert!(!client.is_alive());
        let _ = responder.join();
    }

    #[test]
    fn request_at_initiator_is_fatal() {
        let (client, _reader, writer) = harness(ClientConfig::default());

        writer
            .write_packet(&Packet::request(1, CloseRequest { handle: 1 }))
            .expect("responder should write");

        let err = client
            .call_with_deadline(CloseRequest { handle: 2 }, Duration::from_secs(5))
            .expect_err("call must fail once the connection dies");
        assert!(matches!(err, PeerError::ConnectionLost(_)));
    }

    #[test]
    fn timeout_keeps_connection_and_drops_late_response() {
        let (client, mut reader, writer) = harness(ClientConfig::default());

        let err = client
            .call_with_deadline(CloseRequest { handle: 1 }, Duration::from_millis(50))
            .expect_err("unanswered call must time out");
        assert!(matches!(err, PeerError::Timeout(_)));
        assert!(client.is_alive());
        assert_eq!(client.pending_calls(), 0);

        // Answer the abandoned call late, then serve the next one normally.
        let (late_id, _) = read_request(&mut reader);
        writer
            .write_response(late_id, CloseResponse { err: None })
            .expect("responder should write");

        let responder = std::thread::spawn(move || {
            let (id, _) = read_request(&mut reader);
            writer
                .write_response(
                    id,
                    CloseResponse {
                        err: Some(FsError::BadHandle),
                    },
                )
                .expect("responder should write");
            (reader, writer)
        });

        let response = client
            .invoke(CloseRequest { handle: 2 })
            .expect("connection should still work");
        assert_eq!(response.err, Some(FsError::BadHandle));
        assert!(client.is_alive());
        let _ = responder.join();
    }

    #[test]
    fn timed_out_ids_are_bounded() {
        let (client, mut reader, writer) = harness(ClientConfig::default());

        let calls = MAX_CANCELLED + 8;
        let responder = std::thread::spawn(move || {
            let ids: Vec<u64> = (0..calls).map(|_| read_request(&mut reader).0).collect();
            (ids, reader, writer)
        });

        for handle in 0..calls as u64 {
            let err = client
                .call_with_deadline(CloseRequest { handle }, Duration::ZERO)
                .expect_err("unanswered call must time out");
            assert!(matches!(err, PeerError::Timeout(_)));
        }
        assert_eq!(client.cancelled_calls(), MAX_CANCELLED);

        let (ids, _reader, writer) = responder.join().expect("responder thread should finish");
        let newest = *ids.last().expect("calls were sent");
        writer
            .write_response(newest, CloseResponse { err: None })
            .expect("responder should write");

        // A late answer for a remembered id is dropped and the link survives.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while client.cancelled_calls() == MAX_CANCELLED && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(client.cancelled_calls(), MAX_CANCELLED - 1);
        assert!(client.is_alive());
    }

    #[test]
    fn connection_loss_fails_every_pending_caller() {
        let (client, mut reader, writer) = harness(ClientConfig::default());
        let client = Arc::new(client);

        let callers: Vec<_> = (0..3u64)
            .map(|handle| {
                let client = Arc::clone(&client);
                std::thread::spawn(move || client.call(CloseRequest { handle }))
            })
            .collect();

        for _ in 0..3 {
            read_request(&mut reader);
        }
        writer.shutdown().expect("responder should shut down");
        drop(reader);
        drop(writer);

        for caller in callers {
            let err = caller
                .join()
                .expect("caller thread should finish")
                .expect_err("pending call must fail");
            assert!(matches!(err, PeerError::ConnectionLost(_)));
        }
        assert!(!client.is_alive());
        assert!(client.lost_reason().is_some());
    }

    #[test]
    fn configured_call_timeout_applies() {
        let config = ClientConfig {
            call_timeout: Some(Duration::from_millis(20)),
            ..ClientConfig::default()
        };
        let (client, _reader, _writer) = harness(config);

        let err = client
            .call(CloseRequest { handle: 1 })
            .expect_err("unanswered call must time out");
        assert!(matches!(err, PeerError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[test]
    fn shutdown_fails_later_calls() {
        let (client, _reader, _writer) = harness(ClientConfig::default());
        client.shutdown().expect("shutdown should succeed");

        let err = client.call(CloseRequest { handle: 1 }).expect_err("calls after shutdown fail");
        assert!(matches!(err, PeerError::ConnectionLost(ref reason) if reason == "client shut down"));
    }
}
