//! Loopback demo: capture session in, players out, no real hardware.
//!
//! Synthetic video chunks and a silent PCM source run through the full
//! producer/channel/consumer path with the passthrough codec, then the
//! rendered totals are reported.

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Arg, Command};
use log::info;

use camcast::audio::{AudioInput, BufferProfile};
use camcast::capture::CaptureModule;
use camcast::codec::passthrough::{ChunkFeeder, PassthroughDecoder, PassthroughEncoder};
use camcast::codec::{EncoderSettings, MediaEncoder, StreamFormat};
use camcast::error::CodecError;
use camcast::pipeline::VideoPlayer;
use camcast::{StreamParams, StreamSession};

/// PCM source that yields a fixed number of silent chunks, then EOF.
struct SilentMic {
    chunks_left: u32,
}

impl AudioInput for SilentMic {
    fn min_buffer_size(&self, sample_rate: u32) -> i32 {
        if sample_rate == 16_000 { 640 } else { -1 }
    }

    fn is_valid_size(&self, size: i32) -> bool {
        size > 0
    }

    fn open(&mut self, _profile: BufferProfile) -> Result<(), CodecError> {
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if self.chunks_left == 0 {
            return Ok(0);
        }
        self.chunks_left -= 1;
        buffer.fill(0);
        Ok(buffer.len())
    }

    fn close(&mut self) {}
}

/// Capture module backed by the passthrough encoder. The feeder handle is
/// published through the shared slot once the session asks for an encoder.
struct LoopbackModule {
    feeder_slot: Arc<Mutex<Option<ChunkFeeder>>>,
    audio_chunks: u32,
}

impl CaptureModule for LoopbackModule {
    fn open(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn close(&mut self) {}

    fn video_encoder(
        &mut self,
        _settings: &EncoderSettings,
    ) -> Result<Box<dyn MediaEncoder>, CodecError> {
        let (encoder, feeder) = PassthroughEncoder::new(StreamFormat {
            width: 640,
            height: 480,
            orientation: 0,
            flipped: false,
        });
        *self.feeder_slot.lock().unwrap() = Some(feeder);
        Ok(Box::new(encoder))
    }

    fn audio_source(&mut self) -> Result<Box<dyn AudioInput>, CodecError> {
        Ok(Box::new(SilentMic {
            chunks_left: self.audio_chunks,
        }))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("camcast-demo")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a loopback capture/playback session and reports totals.")
        .arg(
            Arg::new("frames")
                .short('n')
                .long("frames")
                .value_name("COUNT")
                .help("Number of synthetic video frames to stream.")
                .default_value("30"),
        )
        .arg(
            Arg::new("bit-rate")
                .short('b')
                .long("bit-rate")
                .value_name("BPS")
                .help("Video bit rate to negotiate (0 uses the default).")
                .default_value("0"),
        )
        .get_matches();

    let frames: u32 = matches
        .get_one::<String>("frames")
        .map(String::as_str)
        .unwrap_or("30")
        .parse()
        .context("--frames must be a number")?;
    let bit_rate: u32 = matches
        .get_one::<String>("bit-rate")
        .map(String::as_str)
        .unwrap_or("0")
        .parse()
        .context("--bit-rate must be a number")?;

    let feeder_slot = Arc::new(Mutex::new(None));
    let module = LoopbackModule {
        feeder_slot: Arc::clone(&feeder_slot),
        audio_chunks: frames,
    };

    let mut params = StreamParams::new(false, true)?;
    params.bit_rate = bit_rate;

    let mut session = StreamSession::capture(Box::new(module), params)?;
    let video = session
        .take_video_stream()
        .ok_or_else(|| anyhow!("session produced no video stream"))?;

    let (decoder, rendered) = PassthroughDecoder::new();
    let mut player = VideoPlayer::new(Box::new(decoder), video);
    player.set_on_metadata_available(|m| {
        info!(
            "stream metadata: {}x{}, orientation {}, flipped {}",
            m.width, m.height, m.orientation, m.flipped
        );
    });
    let (ended_tx, ended_rx) = mpsc::channel();
    player.set_on_stream_ended(move || {
        let _ = ended_tx.send(());
    });
    player.start();

    let feeder = feeder_slot
        .lock()
        .unwrap()
        .clone()
        .ok_or_else(|| anyhow!("capture module never produced an encoder"))?;
    for i in 0..frames {
        feeder.feed(vec![0u8; 1024], i64::from(i) * 33_333);
    }
    feeder.finish(i64::from(frames) * 33_333);

    ended_rx
        .recv_timeout(Duration::from_secs(10))
        .context("playback did not finish in time")?;

    info!(
        "negotiated {}x{} at {} bps; rendered {} frames",
        session.width().unwrap_or(0),
        session.height().unwrap_or(0),
        session.bit_rate().unwrap_or(0),
        rendered.count()
    );

    player.stop();
    session.close();
    Ok(())
}
