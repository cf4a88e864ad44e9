//! Self-describing frame encoding.
//!
//! A frame is serialized as a sequence of `(length, tag, value)` fields so
//! that devices running different protocol revisions can skip fields they do
//! not understand instead of failing the whole record.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ParseError;

/// Flags bit 0: this chunk is the last one of the stream.
pub const FLAG_END_OF_STREAM: u32 = 1;

/// Field tags. Values are part of the wire format and must never be reused.
mod tag {
    pub const TYPE: u8 = 1;
    pub const WIDTH: u8 = 2;
    pub const HEIGHT: u8 = 3;
    pub const ORIENTATION: u8 = 4;
    pub const BIT_RATE: u8 = 5;
    pub const FRAME_RATE: u8 = 6;
    pub const IFRAME_INTERVAL: u8 = 7;
    pub const DATA: u8 = 8;
    pub const PRESENTATION_TIME_US: u8 = 9;
    pub const FLAGS: u8 = 10;
    pub const FLIPPED: u8 = 11;
}

const TYPE_HEADER: u32 = 0;
const TYPE_DATA: u32 = 1;

/// One-time stream parameter announcement, sent before any data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation of the source, in degrees.
    pub orientation: u32,
    /// True if the feed is mirrored horizontally (front-facing cameras).
    pub flipped: bool,
    pub bit_rate: u32,
    pub frame_rate: u32,
    /// Seconds between keyframes.
    pub iframe_interval: u32,
}

/// One timestamped chunk of encoded media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataChunk {
    pub payload: Bytes,
    pub presentation_time_us: i64,
    pub flags: u32,
}

impl DataChunk {
    /// An empty payload is a valid chunk; only the flag bit marks the end.
    pub fn is_end_of_stream(&self) -> bool {
        self.flags & FLAG_END_OF_STREAM != 0
    }
}

/// One logical unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Header(StreamHeader),
    Data(DataChunk),
}

impl Frame {
    /// Serializes the frame into concatenated fields.
    ///
    /// No outer length prefix is written; that belongs to the channel writer
    /// (see [`super::wire`]). Encoding is a pure function of the frame, so
    /// equal frames produce byte-identical records.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Frame::Header(h) => {
                put_field(&mut buf, tag::TYPE, &TYPE_HEADER.to_be_bytes());
                put_field(&mut buf, tag::WIDTH, &h.width.to_be_bytes());
                put_field(&mut buf, tag::HEIGHT, &h.height.to_be_bytes());
                put_field(&mut buf, tag::ORIENTATION, &h.orientation.to_be_bytes());
                put_field(&mut buf, tag::FLIPPED, &[h.flipped as u8]);
                put_field(&mut buf, tag::BIT_RATE, &h.bit_rate.to_be_bytes());
                put_field(&mut buf, tag::FRAME_RATE, &h.frame_rate.to_be_bytes());
                put_field(&mut buf, tag::IFRAME_INTERVAL, &h.iframe_interval.to_be_bytes());
            }
            Frame::Data(d) => {
                put_field(&mut buf, tag::TYPE, &TYPE_DATA.to_be_bytes());
                put_field(&mut buf, tag::DATA, &d.payload);
                put_field(
                    &mut buf,
                    tag::PRESENTATION_TIME_US,
                    &d.presentation_time_us.to_be_bytes(),
                );
                put_field(&mut buf, tag::FLAGS, &d.flags.to_be_bytes());
            }
        }
        buf.freeze()
    }

    /// Parses a frame from a complete record body.
    ///
    /// Unknown tags, undersized values and truncated tails are skipped so
    /// that newer peers can extend the format. The only fatal conditions are
    /// a missing or unrecognized `type` field. Fields that never appear keep
    /// their zero/false/empty defaults.
    pub fn decode(mut buf: &[u8]) -> Result<Frame, ParseError> {
        let mut frame_type = None;
        let mut header = StreamHeader::default();
        let mut chunk = DataChunk::default();

        while buf.remaining() >= 4 {
            let len = buf.get_i32();
            if len < 1 {
                continue;
            }
            let len = len as usize;
            if len > buf.remaining() {
                // The record claims more bytes than it has. Nothing after
                // this point can be framed reliably, so stop here.
                break;
            }

            let field = buf.get_u8();
            let value = &buf[..len - 1];

            match field {
                tag::TYPE => frame_type = read_u32(value).or(frame_type),
                tag::WIDTH => read_u32_into(value, &mut header.width),
                tag::HEIGHT => read_u32_into(value, &mut header.height),
                tag::ORIENTATION => read_u32_into(value, &mut header.orientation),
                tag::FLIPPED => {
                    if let [b] = value {
                        header.flipped = *b == 1;
                    }
                }
                tag::BIT_RATE => read_u32_into(value, &mut header.bit_rate),
                tag::FRAME_RATE => read_u32_into(value, &mut header.frame_rate),
                tag::IFRAME_INTERVAL => read_u32_into(value, &mut header.iframe_interval),
                tag::DATA => chunk.payload = Bytes::copy_from_slice(value),
                tag::PRESENTATION_TIME_US => {
                    if let Ok(raw) = <[u8; 8]>::try_from(value) {
                        chunk.presentation_time_us = i64::from_be_bytes(raw);
                    }
                }
                tag::FLAGS => read_u32_into(value, &mut chunk.flags),
                _ => {} // forward compatibility: skip
            }

            buf.advance(len - 1);
        }

        match frame_type {
            None => Err(ParseError::MissingType),
            Some(TYPE_HEADER) => Ok(Frame::Header(header)),
            Some(TYPE_DATA) => Ok(Frame::Data(chunk)),
            Some(other) => Err(ParseError::UnknownType(other)),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Frame::Header(_) => "header",
            Frame::Data(_) => "data",
        }
    }
}

fn put_field(buf: &mut BytesMut, field: u8, value: &[u8]) {
    buf.put_i32(value.len() as i32 + 1);
    buf.put_u8(field);
    buf.put_slice(value);
}

fn read_u32(value: &[u8]) -> Option<u32> {
    <[u8; 4]>::try_from(value).ok().map(u32::from_be_bytes)
}

fn read_u32_into(value: &[u8], out: &mut u32) {
    if let Some(v) = read_u32(value) {
        *out = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> StreamHeader {
        StreamHeader {
            width: 640,
            height: 480,
            orientation: 90,
            flipped: true,
            bit_rate: 2_000_000,
            frame_rate: 30,
            iframe_interval: 10,
        }
    }

    #[test]
    fn header_round_trip() {
        let frame = Frame::Header(sample_header());
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn data_round_trip() {
        let frame = Frame::Data(DataChunk {
            payload: Bytes::from_static(b"encoded bytes"),
            presentation_time_us: 123_456_789,
            flags: FLAG_END_OF_STREAM,
        });
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn encode_is_deterministic() {
        let a = Frame::Header(sample_header());
        let b = Frame::Header(sample_header());
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let frame = Frame::Data(DataChunk {
            payload: Bytes::from_static(b"payload"),
            presentation_time_us: 42,
            flags: 0,
        });

        // Splice an unrecognized field between the known ones.
        let mut bytes = BytesMut::from(&frame.encode()[..]);
        put_field(&mut bytes, 200, b"future extension");

        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn missing_type_is_fatal() {
        let mut buf = BytesMut::new();
        put_field(&mut buf, tag::WIDTH, &640u32.to_be_bytes());
        put_field(&mut buf, tag::HEIGHT, &480u32.to_be_bytes());
        assert_eq!(Frame::decode(&buf), Err(ParseError::MissingType));
    }

    #[test]
    fn unknown_type_value_is_fatal() {
        let mut buf = BytesMut::new();
        put_field(&mut buf, tag::TYPE, &7u32.to_be_bytes());
        assert_eq!(Frame::decode(&buf), Err(ParseError::UnknownType(7)));
    }

    #[test]
    fn oversized_field_length_abandons_tail_only() {
        let frame = Frame::Data(DataChunk {
            payload: Bytes::from_static(b"ok"),
            presentation_time_us: 1,
            flags: 0,
        });

        let mut bytes = BytesMut::from(&frame.encode()[..]);
        // A field that claims far more bytes than remain.
        bytes.put_i32(1_000_000);
        bytes.put_u8(tag::FLAGS);

        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn wrong_width_scalar_is_skipped() {
        let mut buf = BytesMut::new();
        put_field(&mut buf, tag::TYPE, &TYPE_HEADER.to_be_bytes());
        put_field(&mut buf, tag::WIDTH, &[1, 2]); // not a u32
        let Frame::Header(h) = Frame::decode(&buf).unwrap() else {
            panic!("expected header");
        };
        assert_eq!(h.width, 0);
    }

    #[test]
    fn empty_payload_is_not_end_of_stream() {
        let frame = Frame::Data(DataChunk {
            payload: Bytes::new(),
            presentation_time_us: 0,
            flags: 0,
        });
        let Frame::Data(chunk) = Frame::decode(&frame.encode()).unwrap() else {
            panic!("expected data");
        };
        assert!(chunk.payload.is_empty());
        assert!(!chunk.is_end_of_stream());
    }
}
