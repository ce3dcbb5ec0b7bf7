use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use vfuse_frame::{Frame, FrameConfig, FrameReader, FrameWriter};
use vfuse_proto::{decode_packet, encode_packet, MessageRegistry, Packet, Response};
use vfuse_transport::Stream;

use crate::error::Result;

/// Split a connected stream into its packet reader and shared writer.
pub fn split(
    stream: Stream,
    registry: Arc<MessageRegistry>,
    config: &FrameConfig,
) -> Result<(PacketReader, PacketWriter)> {
    let control = stream.try_clone()?;
    let reader_stream = stream.try_clone()?;
    let reader = FrameReader::for_stream(reader_stream, config.clone())?;
    let writer = FrameWriter::for_stream(stream, config.clone())?;
    Ok((
        PacketReader {
            frames: reader,
            registry: Arc::clone(&registry),
        },
        PacketWriter {
            frames: Arc::new(Mutex::new(writer)),
            control: Arc::new(control),
            registry,
            max_body: config.max_frame_size,
        },
    ))
}

/// The single read side of a connection.
///
/// Not `Clone`: exactly one thread drains a connection.
pub struct PacketReader {
    frames: FrameReader<Stream>,
    registry: Arc<MessageRegistry>,
}

impl PacketReader {
    /// Read and decode the next packet (blocking).
    pub fn read_packet(&mut self) -> Result<Packet> {
        let frame = self.frames.read_frame()?;
        self.decode(&frame)
    }

    /// Like [`PacketReader::read_packet`], but `Ok(None)` on EOF between frames.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        match self.frames.next_frame()? {
            Some(frame) => self.decode(&frame).map(Some),
            None => Ok(None),
        }
    }

    fn decode(&self, frame: &Frame) -> Result<Packet> {
        let packet = decode_packet(frame, &self.registry)?;
        debug!(
            id = packet.id,
            kind = %packet.message.kind(),
            len = frame.body.len(),
            "read packet"
        );
        Ok(packet)
    }
}

/// The write side of a connection, shared by every caller.
///
/// Bodies are serialized before the lock is taken; the lock covers only
/// the write of one whole frame.
#[derive(Clone)]
pub struct PacketWriter {
    frames: Arc<Mutex<FrameWriter<Stream>>>,
    control: Arc<Stream>,
    registry: Arc<MessageRegistry>,
    max_body: usize,
}

impl PacketWriter {
    /// Serialize a packet without touching the wire.
    pub fn encode(&self, packet: &Packet) -> Result<Frame> {
        Ok(encode_packet(packet, &self.registry, self.max_body)?)
    }

    /// Write one already-encoded frame under the write lock.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames.write_frame(frame)?;
        debug!(id = frame.id, tag = frame.tag, len = frame.body.len(), "wrote frame");
        Ok(())
    }

    /// Encode and write one packet.
    pub fn write_packet(&self, packet: &Packet) -> Result<()> {
        let frame = self.encode(packet)?;
        self.write_frame(&frame)
    }

    /// Write the response to call `id`; the tag follows from the body.
    pub fn write_response(&self, id: u64, response: impl Into<Response>) -> Result<()> {
        self.write_packet(&Packet::response(id, response))
    }

    /// The registry this connection encodes with.
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Shut the connection down in both directions.
    ///
    /// Unblocks the reader with EOF. Does not wait for the write lock.
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.control.shutdown()?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use vfuse_proto::{
        CloseRequest, CloseResponse, Message, MessageKind, ProtoError, ReadResponse, WriteRequest,
    };

    use super::*;
    use crate::error::PeerError;

    fn pair() -> ((PacketReader, PacketWriter), (PacketReader, PacketWriter)) {
        let registry = Arc::new(MessageRegistry::standard().unwrap());
        let (left, right) = UnixStream::pair().unwrap();
        let config = FrameConfig::default();
        (
            split(Stream::from(left), Arc::clone(&registry), &config).unwrap(),
            split(Stream::from(right), registry, &config).unwrap(),
        )
    }

    #[test]
    fn packets_cross_the_connection() {
        let ((_, writer), (mut reader, _)) = pair();

        writer
            .write_packet(&Packet::request(5, CloseRequest { handle: 2 }))
            .unwrap();
        writer
            .write_response(
                6,
                ReadResponse {
                    data: b"abc".to_vec(),
                    err: None,
                },
            )
            .unwrap();

        let first = reader.read_packet().unwrap();
        assert_eq!(first.id, 5);
        assert_eq!(first.message.kind(), MessageKind::CloseRequest);

        let second = reader.read_packet().unwrap();
        assert_eq!(second.id, 6);
        match second.message {
            Message::Response(response) => assert_eq!(response.kind(), MessageKind::ReadResponse),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn concurrent_writers_never_interleave() {
        let ((_, writer), (mut reader, _)) = pair();

        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let writer = writer.clone();
                std::thread::spawn(move || {
                    for i in 0..32u64 {
                        let request = WriteRequest {
                            handle: t,
                            offset: i,
                            data: vec![t as u8; 4096 + i as usize],
                        };
                        writer.write_packet(&Packet::request(t * 1000 + i, request)).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..8 * 32 {
            let packet = reader.read_packet().unwrap();
            match packet.message {
                Message::Request(vfuse_proto::Request::Write(body)) => {
                    assert_eq!(packet.id, body.handle * 1000 + body.offset);
                    assert_eq!(body.data.len(), 4096 + body.offset as usize);
                    assert!(body.data.iter().all(|b| *b == body.handle as u8));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        for thread in threads {
            thread.join().unwrap();
        }
    }

    #[test]
    fn encode_failure_writes_nothing() {
        let registry = Arc::new(MessageRegistry::standard().unwrap());
        let (left, right) = UnixStream::pair().unwrap();
        let config = FrameConfig {
            max_frame_size: 64,
            ..FrameConfig::default()
        };
        let (_, writer) = split(Stream::from(left), Arc::clone(&registry), &config).unwrap();
        let (mut reader, _) = split(Stream::from(right), registry, &config).unwrap();

        let big = WriteRequest {
            handle: 1,
            offset: 0,
            data: vec![0u8; 128],
        };
        let err = writer.write_packet(&Packet::request(1, big)).unwrap_err();
        assert!(matches!(err, PeerError::Proto(ProtoError::BodyTooLarge { .. })));

        writer.write_response(2, CloseResponse { err: None }).unwrap();
        assert_eq!(reader.read_packet().unwrap().id, 2);
    }

    #[test]
    fn shutdown_gives_reader_clean_eof() {
        let ((mut reader, writer), _) = pair();
        writer.shutdown().unwrap();
        assert!(reader.next_packet().unwrap().is_none());
    }
}
