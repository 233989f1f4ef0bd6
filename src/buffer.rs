//! # Universal input/output buffers and frame format (§3, §6)
//!
//! Per-session byte buffers the engine facade reads frames from and writes
//! output into; never persisted (§4.10). An input frame is `port_id (1
//! byte) | timestamp (8 bytes LE) | data_size (4 bytes LE) | data
//! (data_size bytes)`. A malformed frame is reported as a `FormatError`
//! rather than panicking; the caller decides whether to skip and continue.

use crate::error::MelvinError;

const HEADER_LEN: usize = 1 + 8 + 4;

/// A single parsed input frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFrame {
    pub port_id: u8,
    pub timestamp: u64,
    pub data: Vec<u8>,
}

/// Parses one frame from the front of `buf`, returning the frame and the
/// number of bytes consumed. `position` is the byte offset `buf` starts at
/// within the larger stream, used only to annotate a `FormatError`.
pub fn parse_frame(buf: &[u8], position: u64) -> Result<(InputFrame, usize), MelvinError> {
    if buf.len() < HEADER_LEN {
        return Err(MelvinError::format(position, "input frame shorter than header"));
    }
    let port_id = buf[0];
    let timestamp = u64::from_le_bytes(
        buf[1..9]
            .try_into()
            .map_err(|_| MelvinError::format(position + 1, "malformed timestamp field"))?,
    );
    let data_size = u32::from_le_bytes(
        buf[9..13]
            .try_into()
            .map_err(|_| MelvinError::format(position + 9, "malformed data_size field"))?,
    ) as usize;
    if buf.len() < HEADER_LEN + data_size {
        return Err(MelvinError::format(
            position + HEADER_LEN as u64,
            "input frame data_size overruns buffer",
        ));
    }
    let data = buf[HEADER_LEN..HEADER_LEN + data_size].to_vec();
    Ok((
        InputFrame {
            port_id,
            timestamp,
            data,
        },
        HEADER_LEN + data_size,
    ))
}

/// Appends a frame header around `data` for a caller building an outbound
/// stream in the same wire format.
#[must_use]
pub fn encode_frame(port_id: u8, timestamp: u64, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + data.len());
    out.push(port_id);
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Per-session input buffer: an append-only byte queue drained one frame at
/// a time. Initial capacity 1, growth doubling (§5).
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    bytes: Vec<u8>,
    consumed: u64,
}

impl InputBuffer {
    #[must_use]
    pub fn new() -> Self {
        InputBuffer {
            bytes: Vec::with_capacity(1),
            consumed: 0,
        }
    }

    /// Appends raw bytes to the buffer (caller assembles frames externally
    /// or calls `write_frame` to append one pre-framed).
    pub fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Appends one encoded frame.
    pub fn write_frame(&mut self, port_id: u8, timestamp: u64, data: &[u8]) {
        self.write(&encode_frame(port_id, timestamp, data));
    }

    /// Pops and parses the oldest complete frame, if any. Returns `Ok(None)`
    /// when the buffer holds no complete frame yet (a partial header or
    /// partial data tail at the end is left in place for the next write).
    pub fn pop_frame(&mut self) -> Result<Option<InputFrame>, MelvinError> {
        if self.bytes.len() < HEADER_LEN {
            return Ok(None);
        }
        match parse_frame(&self.bytes, self.consumed) {
            Ok((frame, consumed)) => {
                self.bytes.drain(..consumed);
                self.consumed += consumed as u64;
                Ok(Some(frame))
            }
            Err(e) => {
                if self.bytes.len() >= HEADER_LEN + u32::MAX as usize {
                    Err(e)
                } else {
                    // Could be a partial frame still filling up; only a
                    // structurally impossible data_size is a real error.
                    let data_size = u32::from_le_bytes([
                        self.bytes[9],
                        self.bytes[10],
                        self.bytes[11],
                        self.bytes[12],
                    ]) as usize;
                    if self.bytes.len() < HEADER_LEN + data_size {
                        Ok(None)
                    } else {
                        Err(e)
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.len() < HEADER_LEN
    }
}

/// Per-session output buffer: bytes accumulated by C9's collection step and
/// drained by the caller.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
}

impl OutputBuffer {
    #[must_use]
    pub fn new() -> Self {
        OutputBuffer {
            bytes: Vec::with_capacity(1),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Drains up to `into_buf.len()` bytes into the caller's buffer,
    /// returning how many were written.
    pub fn read(&mut self, into_buf: &mut [u8]) -> usize {
        let n = into_buf.len().min(self.bytes.len());
        into_buf[..n].copy_from_slice(&self.bytes[..n]);
        self.bytes.drain(..n);
        n
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_round_trips_through_encode_frame() {
        let encoded = encode_frame(3, 42, b"hello");
        let (frame, consumed) = parse_frame(&encoded, 0).expect("parse");
        assert_eq!(frame.port_id, 3);
        assert_eq!(frame.timestamp, 42);
        assert_eq!(frame.data, b"hello");
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn parse_frame_rejects_short_header() {
        assert!(parse_frame(&[1, 2, 3], 0).is_err());
    }

    #[test]
    fn parse_frame_rejects_data_size_overrun() {
        let mut bad = encode_frame(1, 0, b"ab");
        let len = bad.len();
        bad[9] = 0xFF; // inflate data_size beyond the actual buffer
        bad[10] = 0xFF;
        bad.truncate(len);
        assert!(parse_frame(&bad, 0).is_err());
    }

    #[test]
    fn input_buffer_pop_frame_returns_none_on_partial_frame() {
        let mut buf = InputBuffer::new();
        let encoded = encode_frame(1, 0, b"hello");
        buf.write(&encoded[..encoded.len() - 2]);
        assert_eq!(buf.pop_frame().expect("pop"), None);
    }

    #[test]
    fn input_buffer_pop_frame_drains_a_complete_frame() {
        let mut buf = InputBuffer::new();
        buf.write_frame(2, 7, b"abc");
        let frame = buf.pop_frame().expect("pop").expect("frame");
        assert_eq!(frame.port_id, 2);
        assert_eq!(frame.data, b"abc");
        assert!(buf.is_empty());
    }

    #[test]
    fn output_buffer_read_drains_up_to_capacity() {
        let mut out = OutputBuffer::new();
        out.push(b"hello world");
        let mut small = [0u8; 5];
        let n = out.read(&mut small);
        assert_eq!(n, 5);
        assert_eq!(&small, b"hello");
        assert_eq!(out.len(), 6);
    }
}
