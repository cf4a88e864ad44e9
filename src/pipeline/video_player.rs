//! Video consumer pipeline.
//!
//! Reads framed records from a byte source, feeds a hardware decoder and
//! releases its output toward the render surface. The decoder has bounded
//! internal buffering, so the output side is drained before every input
//! submission.

use std::io::{self, Read};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::worker::{AliveFlag, Worker};
use super::{MetadataCallback, StreamEndedCallback, VideoMetadata};
use crate::codec::{DecoderEvent, MediaDecoder};
use crate::error::{ParseError, StreamError};
use crate::protocol::{Frame, StreamHeader, read_record};

/// Decoder output poll. Purposefully small: an empty decoder answers
/// TryAgain almost immediately instead of stalling the read loop.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// How long `stop()` waits for the worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Plays a framed video stream until EOS, channel end, or `stop()`.
pub struct VideoPlayer<R> {
    decoder: Option<Box<dyn MediaDecoder>>,
    input: Option<R>,
    on_metadata: Option<MetadataCallback>,
    on_stream_ended: Option<StreamEndedCallback>,
    alive: AliveFlag,
    worker: Option<Worker>,
}

impl<R: Read + Send + 'static> VideoPlayer<R> {
    pub fn new(decoder: Box<dyn MediaDecoder>, input: R) -> Self {
        Self {
            decoder: Some(decoder),
            input: Some(input),
            on_metadata: None,
            on_stream_ended: None,
            alive: AliveFlag::new(),
            worker: None,
        }
    }

    /// Fired once per received header (so once at start, and again if the
    /// producer re-announces parameters mid-stream).
    pub fn set_on_metadata_available(
        &mut self,
        callback: impl FnMut(VideoMetadata) + Send + 'static,
    ) {
        self.on_metadata = Some(Box::new(callback));
    }

    /// Fired exactly once per session, on natural EOS and on abnormal
    /// termination alike.
    pub fn set_on_stream_ended(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_stream_ended = Some(Box::new(callback));
    }

    /// True while the worker is playing. Lock-free.
    pub fn is_active(&self) -> bool {
        self.alive.is_set()
    }

    /// Starts the playback worker. Warns and no-ops on reuse.
    pub fn start(&mut self) {
        if self.is_active() {
            warn!("video player is already running");
            return;
        }
        let (Some(decoder), Some(input)) = (self.decoder.take(), self.input.take()) else {
            warn!("video player cannot be started more than once");
            return;
        };

        self.alive.set();
        let alive = self.alive.clone();
        let on_metadata = self.on_metadata.take();
        let on_stream_ended = self.on_stream_ended.take();
        self.worker = Some(Worker::spawn("video-player", move || {
            run(decoder, input, alive, on_metadata, on_stream_ended);
        }));
    }

    /// Clears the alive flag and waits (bounded) for the worker. The channel
    /// and the rendering surface close when the worker releases the decoder.
    pub fn stop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

impl<R> Drop for VideoPlayer<R> {
    fn drop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

fn run<R: Read>(
    mut decoder: Box<dyn MediaDecoder>,
    mut input: R,
    alive: AliveFlag,
    mut on_metadata: Option<MetadataCallback>,
    on_stream_ended: Option<StreamEndedCallback>,
) {
    if let Err(e) = play(decoder.as_mut(), &mut input, &alive, &mut on_metadata) {
        error!("video player stopped: {e}");
    }
    decoder.release();
    alive.clear();
    // Exactly once, on every exit path.
    if let Some(ended) = on_stream_ended {
        ended();
    }
}

fn play<R: Read>(
    decoder: &mut dyn MediaDecoder,
    input: &mut R,
    alive: &AliveFlag,
    on_metadata: &mut Option<MetadataCallback>,
) -> Result<(), StreamError> {
    let header = read_header(input)?;
    configure(decoder, &header, on_metadata)?;
    info!(
        "playing video at {}x{} (orientation {})",
        header.width, header.height, header.orientation
    );

    while alive.is_set() {
        // Make room before submitting: the decoder only frees input buffers
        // as its output side is retired.
        drain_output(decoder, alive)?;

        let Some(frame) = read_record(input)? else {
            debug!("video channel reached end of stream");
            break;
        };

        match frame {
            Frame::Header(header) => {
                // The producer renegotiated its format mid-stream.
                warn!(
                    "mid-stream header: reconfiguring decoder to {}x{}",
                    header.width, header.height
                );
                configure(decoder, &header, on_metadata)?;
            }
            Frame::Data(chunk) => {
                let index = decoder.dequeue_input()?;
                decoder.submit_input(
                    index,
                    &chunk.payload,
                    chunk.presentation_time_us,
                    chunk.flags,
                )?;

                if chunk.is_end_of_stream() {
                    // Retire whatever the decoder still holds, then close.
                    drain_output(decoder, alive)?;
                    debug!("video stream signalled end of stream");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn read_header<R: Read>(input: &mut R) -> Result<StreamHeader, StreamError> {
    let Some(frame) = read_record(input)? else {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended before a header arrived",
        )
        .into());
    };
    match frame {
        Frame::Header(header) => Ok(header),
        other => Err(ParseError::UnexpectedFrameType {
            expected: "header",
            found: other.kind_name(),
        }
        .into()),
    }
}

fn configure(
    decoder: &mut dyn MediaDecoder,
    header: &StreamHeader,
    on_metadata: &mut Option<MetadataCallback>,
) -> Result<(), StreamError> {
    decoder.configure(header)?;
    if let Some(callback) = on_metadata {
        callback(VideoMetadata {
            width: header.width,
            height: header.height,
            orientation: header.orientation,
            flipped: header.flipped,
        });
    }
    Ok(())
}

/// Releases decoder output until it reports TryAgain (fully drained).
fn drain_output(decoder: &mut dyn MediaDecoder, alive: &AliveFlag) -> Result<(), StreamError> {
    while alive.is_set() {
        match decoder.dequeue_output(DRAIN_TIMEOUT)? {
            DecoderEvent::Output(index) => decoder.release_output(index, true)?,
            DecoderEvent::TryAgain => return Ok(()),
            DecoderEvent::FormatChanged => {
                debug!("video decoder output format changed");
            }
        }
    }
    Ok(())
}
