//! Loopback codec.
//!
//! Moves bytes through the [`MediaEncoder`]/[`MediaDecoder`] seams without
//! transforming them. Used by the integration tests and the demo binary,
//! and handy for piping pre-encoded elementary streams.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bytes::Bytes;

use super::{
    BufferInfo, DecoderEvent, EncoderEvent, MediaDecoder, MediaEncoder, StreamFormat,
};
use crate::error::CodecError;
use crate::protocol::{FLAG_END_OF_STREAM, StreamHeader};

enum Item {
    Chunk { payload: Bytes, info: BufferInfo },
    Format(StreamFormat),
}

struct Queue {
    items: Mutex<VecDeque<Item>>,
    ready: Condvar,
}

/// Feeds "captured" chunks into a [`PassthroughEncoder`]. Cloneable; the
/// queue is shared.
#[derive(Clone)]
pub struct ChunkFeeder {
    queue: Arc<Queue>,
}

impl ChunkFeeder {
    /// Queues one chunk for the encoder to emit.
    pub fn feed(&self, payload: impl Into<Bytes>, presentation_time_us: i64) {
        self.push(Item::Chunk {
            payload: payload.into(),
            info: BufferInfo {
                presentation_time_us,
                flags: 0,
            },
        });
    }

    /// Queues an empty end-of-stream chunk.
    pub fn finish(&self, presentation_time_us: i64) {
        self.push(Item::Chunk {
            payload: Bytes::new(),
            info: BufferInfo {
                presentation_time_us,
                flags: FLAG_END_OF_STREAM,
            },
        });
    }

    /// Simulates a mid-stream output format renegotiation.
    pub fn change_format(&self, format: StreamFormat) {
        self.push(Item::Format(format));
    }

    fn push(&self, item: Item) {
        self.queue.items.lock().unwrap().push_back(item);
        self.queue.ready.notify_all();
    }
}

/// An encoder that emits exactly what its feeder was given.
pub struct PassthroughEncoder {
    format: StreamFormat,
    queue: Arc<Queue>,
    released: bool,
}

impl PassthroughEncoder {
    pub fn new(format: StreamFormat) -> (Self, ChunkFeeder) {
        let queue = Arc::new(Queue {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        });
        (
            Self {
                format,
                queue: Arc::clone(&queue),
                released: false,
            },
            ChunkFeeder { queue },
        )
    }
}

impl MediaEncoder for PassthroughEncoder {
    fn stream_format(&mut self) -> Result<StreamFormat, CodecError> {
        Ok(self.format)
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderEvent, CodecError> {
        if self.released {
            return Err(CodecError::new("encoder already released"));
        }

        let mut items = self.queue.items.lock().unwrap();
        if items.is_empty() {
            let (guard, _) = self
                .queue
                .ready
                .wait_timeout(items, timeout)
                .map_err(|_| CodecError::new("encoder queue poisoned"))?;
            items = guard;
        }

        match items.pop_front() {
            Some(Item::Chunk { payload, info }) => Ok(EncoderEvent::Ready { payload, info }),
            Some(Item::Format(format)) => {
                self.format = format;
                Ok(EncoderEvent::FormatChanged(format))
            }
            None => Ok(EncoderEvent::TryAgain),
        }
    }

    fn signal_end_of_stream(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.queue.items.lock().unwrap().clear();
    }
}

/// Observation handle for frames a [`PassthroughDecoder`] rendered.
#[derive(Clone, Default)]
pub struct RenderedFrames {
    frames: Arc<Mutex<Vec<Bytes>>>,
}

impl RenderedFrames {
    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().unwrap().clone()
    }
}

const INPUT_SLOTS: usize = 4;

/// A decoder whose "decoded" output is the submitted payload, unchanged.
pub struct PassthroughDecoder {
    configured: Option<StreamHeader>,
    slots: [Option<Bytes>; INPUT_SLOTS],
    decoded: VecDeque<usize>,
    rendered: RenderedFrames,
    released: bool,
}

impl PassthroughDecoder {
    pub fn new() -> (Self, RenderedFrames) {
        let rendered = RenderedFrames::default();
        (
            Self {
                configured: None,
                slots: Default::default(),
                decoded: VecDeque::new(),
                rendered: rendered.clone(),
                released: false,
            },
            rendered,
        )
    }

    /// The parameters the decoder was last configured with, if any.
    pub fn configured(&self) -> Option<&StreamHeader> {
        self.configured.as_ref()
    }
}

impl MediaDecoder for PassthroughDecoder {
    fn configure(&mut self, header: &StreamHeader) -> Result<(), CodecError> {
        self.configured = Some(header.clone());
        Ok(())
    }

    fn dequeue_input(&mut self) -> Result<usize, CodecError> {
        if self.configured.is_none() {
            return Err(CodecError::new("decoder not configured"));
        }
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| CodecError::new("no free input buffers: output side not drained"))
    }

    fn submit_input(
        &mut self,
        index: usize,
        data: &[u8],
        _presentation_time_us: i64,
        _flags: u32,
    ) -> Result<(), CodecError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| CodecError::new("bad input buffer index"))?;
        if slot.is_some() {
            return Err(CodecError::new("input buffer submitted twice"));
        }
        *slot = Some(Bytes::copy_from_slice(data));
        // Passthrough "decoding" completes instantly.
        self.decoded.push_back(index);
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<DecoderEvent, CodecError> {
        if self.released {
            return Err(CodecError::new("decoder already released"));
        }
        match self.decoded.pop_front() {
            Some(index) => Ok(DecoderEvent::Output(index)),
            None => Ok(DecoderEvent::TryAgain),
        }
    }

    fn release_output(&mut self, index: usize, render: bool) -> Result<(), CodecError> {
        let payload = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| CodecError::new("releasing an empty output buffer"))?;
        if render {
            self.rendered.frames.lock().unwrap().push(payload);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.slots = Default::default();
        self.decoded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> StreamFormat {
        StreamFormat {
            width: 320,
            height: 240,
            orientation: 0,
            flipped: false,
        }
    }

    #[test]
    fn encoder_emits_fed_chunks() {
        let (mut encoder, feeder) = PassthroughEncoder::new(format());
        feeder.feed(&b"one"[..], 1000);

        match encoder.dequeue_output(Duration::from_millis(10)).unwrap() {
            EncoderEvent::Ready { payload, info } => {
                assert_eq!(&payload[..], b"one");
                assert_eq!(info.presentation_time_us, 1000);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn empty_encoder_times_out_with_try_again() {
        let (mut encoder, _feeder) = PassthroughEncoder::new(format());
        assert_eq!(
            encoder.dequeue_output(Duration::from_millis(1)).unwrap(),
            EncoderEvent::TryAgain
        );
    }

    #[test]
    fn decoder_round_trips_through_slots() {
        let (mut decoder, rendered) = PassthroughDecoder::new();
        decoder.configure(&StreamHeader::default()).unwrap();

        let index = decoder.dequeue_input().unwrap();
        decoder.submit_input(index, b"frame", 0, 0).unwrap();

        match decoder.dequeue_output(Duration::ZERO).unwrap() {
            DecoderEvent::Output(i) => decoder.release_output(i, true).unwrap(),
            other => panic!("expected Output, got {other:?}"),
        }

        assert_eq!(rendered.count(), 1);
        assert_eq!(&rendered.frames()[0][..], b"frame");
    }

    #[test]
    fn undrained_decoder_runs_out_of_input_buffers() {
        let (mut decoder, _rendered) = PassthroughDecoder::new();
        decoder.configure(&StreamHeader::default()).unwrap();

        for _ in 0..INPUT_SLOTS {
            let index = decoder.dequeue_input().unwrap();
            decoder.submit_input(index, b"x", 0, 0).unwrap();
        }
        assert!(decoder.dequeue_input().is_err());
    }
}
