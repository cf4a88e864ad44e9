//! Video producer pipeline.
//!
//! Drains a hardware encoder on a dedicated thread, frames every chunk and
//! writes it to the output sink. The first record is always the stream
//! header; a fresh header is emitted if the encoder renegotiates its output
//! format mid-stream, so the consumer can reconfigure instead of silently
//! desynchronizing.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};

use super::worker::{AliveFlag, Worker};
use crate::codec::{EncoderEvent, EncoderSettings, MediaEncoder, StreamFormat};
use crate::error::StreamError;
use crate::protocol::{DataChunk, FLAG_END_OF_STREAM, Frame, StreamHeader, write_record};

/// Encoder output poll. Small so the alive flag is observed promptly.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// How long `stop()` waits for the worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Streams encoded video from an encoder into a byte sink until stopped.
pub struct VideoRecorder<W> {
    encoder: Option<Box<dyn MediaEncoder>>,
    output: Option<W>,
    settings: EncoderSettings,
    alive: AliveFlag,
    worker: Option<Worker>,
    /// Latest announced stream parameters, readable by the session.
    header: Arc<Mutex<Option<StreamHeader>>>,
}

impl<W: Write + Send + 'static> VideoRecorder<W> {
    pub fn new(encoder: Box<dyn MediaEncoder>, output: W) -> Self {
        Self {
            encoder: Some(encoder),
            output: Some(output),
            settings: EncoderSettings::default(),
            alive: AliveFlag::new(),
            worker: None,
            header: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_bit_rate(&mut self, bit_rate: u32) {
        self.settings.bit_rate = bit_rate;
    }

    pub fn set_frame_rate(&mut self, frame_rate: u32) {
        self.settings.frame_rate = frame_rate;
    }

    pub fn set_iframe_interval(&mut self, iframe_interval: u32) {
        self.settings.iframe_interval = iframe_interval;
    }

    /// True while the worker is streaming. Lock-free.
    pub fn is_active(&self) -> bool {
        self.alive.is_set()
    }

    /// The most recently announced stream parameters. `None` until the
    /// worker has derived the header from the encoder.
    pub fn header(&self) -> Option<StreamHeader> {
        self.header.lock().unwrap().clone()
    }

    /// Starts the recording worker. Warns and no-ops if already streaming.
    /// Not reentrant-safe against `stop()`; serialize externally.
    pub fn start(&mut self) {
        if self.is_active() {
            warn!("video recorder is already running");
            return;
        }
        let (Some(encoder), Some(output)) = (self.encoder.take(), self.output.take()) else {
            warn!("video recorder cannot be restarted");
            return;
        };

        self.alive.set();
        let alive = self.alive.clone();
        let settings = self.settings;
        let header = Arc::clone(&self.header);
        self.worker = Some(Worker::spawn("video-recorder", move || {
            run(encoder, output, settings, alive, header);
        }));
    }

    /// Clears the alive flag and waits (bounded) for the worker. The sink
    /// closes when the worker drops it.
    pub fn stop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

impl<W> Drop for VideoRecorder<W> {
    fn drop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

fn run<W: Write>(
    mut encoder: Box<dyn MediaEncoder>,
    mut output: W,
    settings: EncoderSettings,
    alive: AliveFlag,
    header_slot: Arc<Mutex<Option<StreamHeader>>>,
) {
    if let Err(e) = stream(encoder.as_mut(), &mut output, settings, &alive, &header_slot) {
        // Worker errors never cross the pipeline boundary; they end the
        // stream and are reported here.
        error!("video recorder stopped: {e}");
    }
    encoder.release();
    alive.clear();
    // Dropping `output` closes the sink and gives the consumer its EOF.
}

fn stream<W: Write>(
    encoder: &mut dyn MediaEncoder,
    output: &mut W,
    settings: EncoderSettings,
    alive: &AliveFlag,
    header_slot: &Mutex<Option<StreamHeader>>,
) -> Result<(), StreamError> {
    // Blocks until the capture surface has produced its first format.
    let format = encoder.stream_format()?;
    let header = derive_header(format, settings);
    info!(
        "recording video at {}x{} ({} bps, {} fps)",
        header.width, header.height, header.bit_rate, header.frame_rate
    );

    *header_slot.lock().unwrap() = Some(header.clone());
    write_record(output, &Frame::Header(header))?;

    let mut last_pts_us = 0;
    let mut eos_sent = false;

    while alive.is_set() && !eos_sent {
        match encoder.dequeue_output(DEQUEUE_TIMEOUT)? {
            EncoderEvent::Ready { payload, info } => {
                let chunk = DataChunk {
                    payload,
                    presentation_time_us: info.presentation_time_us,
                    flags: info.flags,
                };
                last_pts_us = chunk.presentation_time_us;
                eos_sent = chunk.is_end_of_stream();
                write_record(output, &Frame::Data(chunk))?;
            }
            EncoderEvent::TryAgain => {
                // The poll timeout already bounded the wait; loop around and
                // re-check the alive flag.
                debug!("video encoder output not ready yet");
            }
            EncoderEvent::FormatChanged(format) => {
                // Re-announce parameters so the consumer can reconfigure its
                // decoder rather than decode against stale geometry.
                let header = derive_header(format, settings);
                warn!(
                    "video encoder output format changed to {}x{}",
                    header.width, header.height
                );
                *header_slot.lock().unwrap() = Some(header.clone());
                write_record(output, &Frame::Header(header))?;
            }
        }
    }

    if !eos_sent {
        // Orderly stop: tell the encoder and close the stream explicitly so
        // the consumer can tell clean EOS from a torn channel.
        encoder.signal_end_of_stream()?;
        write_record(
            output,
            &Frame::Data(DataChunk {
                payload: Bytes::new(),
                presentation_time_us: last_pts_us,
                flags: FLAG_END_OF_STREAM,
            }),
        )?;
    }

    Ok(())
}

fn derive_header(format: StreamFormat, settings: EncoderSettings) -> StreamHeader {
    StreamHeader {
        width: format.width,
        height: format.height,
        orientation: format.orientation,
        flipped: format.flipped,
        bit_rate: settings.bit_rate,
        frame_rate: settings.frame_rate,
        iframe_interval: settings.iframe_interval,
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::codec::passthrough::PassthroughEncoder;
    use crate::protocol::read_record;
    use crate::transport::pipe;

    fn test_format() -> StreamFormat {
        StreamFormat {
            width: 640,
            height: 480,
            orientation: 90,
            flipped: false,
        }
    }

    #[test]
    fn header_precedes_data_and_eos_closes() {
        let (encoder, feeder) = PassthroughEncoder::new(test_format());
        let (writer, mut reader) = pipe(64 * 1024);

        let mut recorder = VideoRecorder::new(Box::new(encoder), writer);
        recorder.set_bit_rate(2_000_000);
        recorder.set_frame_rate(30);
        recorder.start();

        feeder.feed(&b"frame-0"[..], 0);
        feeder.feed(&b"frame-1"[..], 33_000);
        feeder.finish(66_000);

        let Some(Frame::Header(header)) = read_record(&mut reader).unwrap() else {
            panic!("first record must be a header");
        };
        assert_eq!((header.width, header.height), (640, 480));
        assert_eq!(header.bit_rate, 2_000_000);

        let mut chunks = Vec::new();
        while let Some(frame) = read_record(&mut reader).unwrap() {
            match frame {
                Frame::Data(chunk) => {
                    let eos = chunk.is_end_of_stream();
                    chunks.push(chunk);
                    if eos {
                        break;
                    }
                }
                Frame::Header(_) => panic!("unexpected mid-stream header"),
            }
        }

        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0].payload[..], b"frame-0");
        assert_eq!(chunks[1].presentation_time_us, 33_000);
        assert!(chunks[2].is_end_of_stream());

        recorder.stop();
        assert!(!recorder.is_active());
    }

    #[test]
    fn format_change_reannounces_header() {
        let (encoder, feeder) = PassthroughEncoder::new(test_format());
        let (writer, mut reader) = pipe(64 * 1024);

        let mut recorder = VideoRecorder::new(Box::new(encoder), writer);
        recorder.start();

        feeder.feed(&b"before"[..], 0);
        feeder.change_format(StreamFormat {
            width: 1280,
            height: 720,
            ..test_format()
        });
        feeder.feed(&b"after"[..], 1);

        assert!(matches!(
            read_record(&mut reader).unwrap(),
            Some(Frame::Header(h)) if h.width == 640
        ));
        assert!(matches!(
            read_record(&mut reader).unwrap(),
            Some(Frame::Data(_))
        ));
        let Some(Frame::Header(updated)) = read_record(&mut reader).unwrap() else {
            panic!("expected a fresh header after the format change");
        };
        assert_eq!((updated.width, updated.height), (1280, 720));
        assert_eq!(recorder.header().unwrap().width, 1280);

        recorder.stop();
    }

    #[test]
    fn stop_returns_promptly_while_encoder_is_idle() {
        let (encoder, _feeder) = PassthroughEncoder::new(test_format());
        let (writer, reader) = pipe(64 * 1024);

        let mut recorder = VideoRecorder::new(Box::new(encoder), writer);
        recorder.start();
        thread::sleep(Duration::from_millis(30));

        let start = Instant::now();
        recorder.stop();
        // Bounded by the poll timeout plus scheduling noise, far under the
        // join timeout.
        assert!(start.elapsed() < Duration::from_millis(400));
        drop(reader);
    }

    #[test]
    fn double_start_warns_and_keeps_streaming() {
        let (encoder, feeder) = PassthroughEncoder::new(test_format());
        let (writer, mut reader) = pipe(64 * 1024);

        let mut recorder = VideoRecorder::new(Box::new(encoder), writer);
        recorder.start();
        recorder.start(); // no-op

        feeder.feed(&b"still-alive"[..], 0);
        assert!(matches!(
            read_record(&mut reader).unwrap(),
            Some(Frame::Header(_))
        ));
        assert!(matches!(
            read_record(&mut reader).unwrap(),
            Some(Frame::Data(c)) if &c.payload[..] == b"still-alive"
        ));

        recorder.stop();
    }
}
