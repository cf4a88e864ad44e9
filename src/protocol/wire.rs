//! Length-prefixed record transport.
//!
//! On the channel every record is `[4-byte BE length][record bytes]`. The
//! writer emits prefix and body as a single downstream write so that a lossy
//! sink can only ever drop whole records, never tear one apart.

use std::io::{self, Read, Write};

use bytes::{BufMut, BytesMut};

use super::frame::Frame;
use crate::error::{ParseError, StreamError};

/// Refuse to allocate for records larger than this. Encoded camera chunks
/// are a few hundred KiB at most; anything bigger is a corrupt prefix.
const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Writes one frame as a length-prefixed record and flushes the sink.
pub fn write_record<W: Write>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    let body = frame.encode();

    let mut record = BytesMut::with_capacity(4 + body.len());
    record.put_i32(body.len() as i32);
    record.put_slice(&body);

    // One write per record: the lossy sink's drop decision is all-or-nothing.
    writer.write_all(&record)?;
    writer.flush()
}

/// Reads one length-prefixed record and decodes it.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. EOF exactly at a record
/// boundary. EOF in the middle of a record is an error.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<Frame>, StreamError> {
    let mut prefix = [0u8; 4];
    if !read_fully(reader, &mut prefix)? {
        return Ok(None);
    }

    let len = i32::from_be_bytes(prefix);
    if len < 0 || len as usize > MAX_RECORD_LEN {
        return Err(ParseError::BadLength(len.into()).into());
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .map_err(|e| io::Error::new(e.kind(), "truncated record"))?;

    Ok(Some(Frame::decode(&body)?))
}

/// Like `read_exact`, but distinguishes EOF-before-any-byte (clean end,
/// returns `Ok(false)`) from EOF mid-prefix (truncation, an error).
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 if filled == 0 => return Ok(false),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a record prefix",
                ));
            }
            n => filled += n,
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::protocol::frame::{DataChunk, StreamHeader};

    #[test]
    fn records_round_trip_in_order() {
        let header = Frame::Header(StreamHeader {
            width: 1280,
            height: 720,
            frame_rate: 30,
            ..Default::default()
        });
        let data = Frame::Data(DataChunk {
            payload: Bytes::from_static(b"chunk"),
            presentation_time_us: 33_000,
            flags: 0,
        });

        let mut channel = Vec::new();
        write_record(&mut channel, &header).unwrap();
        write_record(&mut channel, &data).unwrap();

        let mut reader = Cursor::new(channel);
        assert_eq!(read_record(&mut reader).unwrap(), Some(header));
        assert_eq!(read_record(&mut reader).unwrap(), Some(data));
        assert_eq!(read_record(&mut reader).unwrap(), None);
    }

    #[test]
    fn eof_at_boundary_is_clean() {
        let mut reader = Cursor::new(Vec::new());
        assert_eq!(read_record(&mut reader).unwrap(), None);
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut reader = Cursor::new((-5i32).to_be_bytes().to_vec());
        match read_record(&mut reader) {
            Err(StreamError::Parse(ParseError::BadLength(-5))) => {}
            other => panic!("expected BadLength, got {other:?}"),
        }
    }

    #[test]
    fn truncated_record_is_an_error() {
        let frame = Frame::Data(DataChunk {
            payload: Bytes::from_static(b"chunk"),
            presentation_time_us: 0,
            flags: 0,
        });
        let mut channel = Vec::new();
        write_record(&mut channel, &frame).unwrap();
        channel.truncate(channel.len() - 3);

        let mut reader = Cursor::new(channel);
        assert!(matches!(
            read_record(&mut reader),
            Err(StreamError::Io(_))
        ));
    }
}
