//! Hardware codec seams.
//!
//! The streaming core drives encoders and decoders exclusively through these
//! traits. They mirror the surface of a standard stateful codec: buffers go
//! in, buffers come out, and polls can answer "try again" or "the output
//! format changed". Concrete back-ends live outside the core; the crate only
//! ships [`passthrough`] for tests and loopback demos.

pub mod passthrough;

use std::time::Duration;

use bytes::Bytes;

use crate::error::CodecError;
use crate::protocol::StreamHeader;

/// Geometry of the capture source, reported by the encoder once the first
/// output format is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation of the source, in degrees.
    pub orientation: u32,
    /// True if the feed is mirrored horizontally.
    pub flipped: bool,
}

/// Knobs the producer passes down when opening an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub bit_rate: u32,
    pub frame_rate: u32,
    pub iframe_interval: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bit_rate: 6_000_000,
            frame_rate: 15,
            iframe_interval: 10,
        }
    }
}

/// Metadata accompanying one encoded output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub presentation_time_us: i64,
    pub flags: u32,
}

/// Outcome of polling an encoder for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// One encoded chunk is ready.
    Ready { payload: Bytes, info: BufferInfo },
    /// Nothing ready within the poll timeout.
    TryAgain,
    /// The encoder renegotiated its output format mid-stream.
    FormatChanged(StreamFormat),
}

/// A stateful hardware (or hardware-like) encoder.
pub trait MediaEncoder: Send {
    /// Blocks until the first output format is known, then reports the
    /// capture geometry. Called once, before any output is dequeued.
    fn stream_format(&mut self) -> Result<StreamFormat, CodecError>;

    /// Polls for the next encoded chunk, waiting at most `timeout`.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderEvent, CodecError>;

    /// Tells the encoder no further input will arrive.
    fn signal_end_of_stream(&mut self) -> Result<(), CodecError>;

    /// Releases codec resources. The encoder is unusable afterwards.
    fn release(&mut self);
}

/// Outcome of polling a decoder for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderEvent {
    /// The output buffer at this index is ready to be released/rendered.
    Output(usize),
    /// Nothing ready within the poll timeout.
    TryAgain,
    /// The decoder renegotiated its output format.
    FormatChanged,
}

/// A stateful hardware (or hardware-like) decoder.
///
/// Decoders have bounded internal buffering: callers must drain the output
/// side before submitting new input, or `dequeue_input` runs dry.
pub trait MediaDecoder: Send {
    /// Configures the decoder from stream parameters. May be called again
    /// mid-stream when the producer announces a format change.
    fn configure(&mut self, header: &StreamHeader) -> Result<(), CodecError>;

    /// Claims a free input buffer, returning its index.
    fn dequeue_input(&mut self) -> Result<usize, CodecError>;

    /// Hands one encoded chunk to the claimed input buffer.
    fn submit_input(
        &mut self,
        index: usize,
        data: &[u8],
        presentation_time_us: i64,
        flags: u32,
    ) -> Result<(), CodecError>;

    /// Polls for decoded output, waiting at most `timeout`.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<DecoderEvent, CodecError>;

    /// Returns an output buffer to the codec, optionally rendering it.
    fn release_output(&mut self, index: usize, render: bool) -> Result<(), CodecError>;

    /// Releases codec resources. The decoder is unusable afterwards.
    fn release(&mut self);
}
