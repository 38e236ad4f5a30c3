// Frame-level I/O over one TCP connection.
//
// The session runs a dedicated read loop concurrently with writers, so the
// stream is split: FrameReader owns the read half plus the accumulation
// buffer, FrameWriter owns the buffered write half. Writers are serialized
// by the session's write lock.

use crate::codec::{CodecError, Frame, PduHeader, PduRegistry, MAX_PDU_SIZE};
use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Reads complete PDUs from the inbound half of the connection.
///
/// Bytes accumulate in a `BytesMut` until at least one whole PDU is
/// buffered; whatever follows it stays in the buffer for the next call.
pub struct FrameReader {
    stream: OwnedReadHalf,
    buffer: BytesMut,
    registry: PduRegistry,
}

impl FrameReader {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            // 4KB covers every control PDU and most submit/deliver bodies;
            // the buffer grows on demand for TLV-heavy traffic.
            buffer: BytesMut::with_capacity(4 * 1024),
            registry: PduRegistry::new(),
        }
    }

    /// Read a single frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection on a clean
    /// frame boundary. A close mid-frame, a framing violation or a decode
    /// failure is an error: the connection is no longer trustworthy.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(CodecError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset mid-frame",
                )));
            }
        }
    }

    /// Try to extract one frame from the buffer; `Ok(None)` means more bytes
    /// are needed.
    fn parse_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        if self.buffer.len() < PduHeader::SIZE {
            return Ok(None);
        }

        let command_length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]);

        if command_length < PduHeader::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: PduHeader::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        let total = command_length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let frame = {
            let mut header_cursor = Cursor::new(&self.buffer[..PduHeader::SIZE]);
            let header = PduHeader::decode(&mut header_cursor)?;
            // decoders get a cursor over exactly the body
            let mut body_cursor = Cursor::new(&self.buffer[PduHeader::SIZE..total]);
            self.registry.decode_pdu(header, &mut body_cursor)?
        };

        self.buffer.advance(total);
        Ok(Some(frame))
    }
}

/// Writes whole PDUs to the outbound half of the connection.
pub struct FrameWriter {
    stream: BufWriter<OwnedWriteHalf>,
}

impl FrameWriter {
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self {
            stream: BufWriter::new(stream),
        }
    }

    /// Serialize and write one frame, flushing so it hits the wire
    /// atomically from the peer's perspective.
    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let bytes = frame
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await
    }
}
