//! Line-based codec for the bridge byte stream.
//!
//! The receiver emits a sequence of datagrams separated by carriage
//! returns. Bursts commonly arrive as one TCP segment carrying several
//! datagrams, and a datagram may just as well be split across segments,
//! so the codec accumulates bytes and hands out complete lines only.

use bytes::{Buf, BytesMut};

use crate::error::ProtocolError;

/// Maximum line length before the decoder gives up on the fragment.
///
/// Real device lines are under 32 bytes; anything past this is noise
/// from a misconfigured bridge (wrong baud rate, binary data).
pub const MAX_LINE_LENGTH: usize = 160;

/// A codec for reading and writing protocol lines.
///
/// Feed raw bytes with [`push`](LineCodec::push), then drain complete
/// lines with [`decode_line`](LineCodec::decode_line) until it returns
/// `None`. Any trailing incomplete fragment is held back for the next
/// push. The same sequence of bytes produces the same sequence of lines
/// regardless of how it is chunked.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Set after an oversized fragment was dropped; bytes are discarded
    /// until the next delimiter resynchronises the stream.
    discarding: bool,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH * 2),
            discarding: false,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next complete line from the buffer.
    ///
    /// Returns `Some(Ok(line))` for a complete non-empty line (without
    /// its terminator), `Some(Err(FrameTooLong))` when the accumulator
    /// overflowed without seeing a terminator, or `None` when more data
    /// is needed. Bytes that are not valid UTF-8 are replaced rather
    /// than rejected; interpretation is the parser's job.
    pub fn decode_line(&mut self) -> Option<Result<String, ProtocolError>> {
        loop {
            if self.discarding {
                // Drop everything up to and including the next delimiter.
                match self.buffer.iter().position(|&b| b == b'\r' || b == b'\n') {
                    Some(end) => {
                        self.buffer.advance(end + 1);
                        self.discarding = false;
                    }
                    None => {
                        self.buffer.clear();
                        return None;
                    }
                }
                continue;
            }

            let delim = self.buffer.iter().position(|&b| b == b'\r' || b == b'\n');
            match delim {
                Some(end) => {
                    let line_data = self.buffer.split_to(end);
                    self.buffer.advance(1);
                    if line_data.is_empty() {
                        // Empty line between delimiters (e.g. \r\n pairs).
                        continue;
                    }
                    return Some(Ok(String::from_utf8_lossy(&line_data).to_string()));
                }
                None => {
                    if self.buffer.len() > MAX_LINE_LENGTH {
                        let actual = self.buffer.len();
                        self.buffer.clear();
                        self.discarding = true;
                        return Some(Err(ProtocolError::FrameTooLong {
                            max: MAX_LINE_LENGTH,
                            actual,
                        }));
                    }
                    return None;
                }
            }
        }
    }

    /// Encode a command line for transmission, appending the terminator.
    pub fn encode_line(line: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\r');
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer and any discard state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drain all currently decodable lines, panicking on decode errors.
    fn drain(codec: &mut LineCodec) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(result) = codec.decode_line() {
            lines.push(result.expect("unexpected decode error"));
        }
        lines
    }

    #[test]
    fn test_decode_simple() {
        let mut codec = LineCodec::new();
        codec.push(b"#6,01,1\r#6,11,00\r");
        assert_eq!(drain(&mut codec), vec!["#6,01,1", "#6,11,00"]);
    }

    #[test]
    fn test_decode_partial() {
        let mut codec = LineCodec::new();
        codec.push(b"#6,0");
        assert!(codec.decode_line().is_none());

        codec.push(b"1,1\r");
        assert_eq!(drain(&mut codec), vec!["#6,01,1"]);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_chunk_invariance() {
        let stream = b"#6,01,1\r#6,02,-45\r#7,01,04\r#10,01,v2.0\r";

        let mut whole = LineCodec::new();
        whole.push(stream);
        let expected = drain(&mut whole);

        // Byte-at-a-time produces the identical line sequence.
        let mut bytewise = LineCodec::new();
        let mut got = Vec::new();
        for &b in stream.iter() {
            bytewise.push(&[b]);
            got.extend(drain(&mut bytewise));
        }
        assert_eq!(got, expected);

        // As does an uneven split.
        let mut split = LineCodec::new();
        let mut got = Vec::new();
        for chunk in stream.chunks(5) {
            split.push(chunk);
            got.extend(drain(&mut split));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut codec = LineCodec::new();
        codec.push(b"#6,01,1\r\n\r\n#6,01,0\r");
        assert_eq!(drain(&mut codec), vec!["#6,01,1", "#6,01,0"]);
    }

    #[test]
    fn test_oversized_fragment_resync() {
        let mut codec = LineCodec::new();
        codec.push(&vec![b'x'; MAX_LINE_LENGTH + 8]);

        match codec.decode_line() {
            Some(Err(ProtocolError::FrameTooLong { max, actual })) => {
                assert_eq!(max, MAX_LINE_LENGTH);
                assert_eq!(actual, MAX_LINE_LENGTH + 8);
            }
            other => panic!("expected FrameTooLong, got {:?}", other),
        }

        // Still discarding until a delimiter arrives.
        codec.push(b"yyy");
        assert!(codec.decode_line().is_none());

        // Delimiter resynchronises; the next line decodes cleanly.
        codec.push(b"\r#6,01,1\r");
        assert_eq!(drain(&mut codec), vec!["#6,01,1"]);
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(LineCodec::encode_line("#1,01,1"), b"#1,01,1\r");
    }
}
