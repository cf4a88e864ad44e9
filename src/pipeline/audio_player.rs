//! Audio consumer pipeline.
//!
//! Reads raw PCM off a byte source and hands it to the playback device in
//! device-sized chunks. There is no framing to parse and no codec to drive;
//! channel EOF is the end-of-stream signal.

use std::io::Read;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::StreamEndedCallback;
use super::worker::{AliveFlag, Worker};
use crate::audio::{AudioOutput, BufferProfile, CANDIDATE_SAMPLE_RATES, choose_buffer};
use crate::error::StreamError;

/// How long `stop()` waits for the worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(300);

/// Plays raw PCM from a byte source until EOF or `stop()`.
pub struct AudioPlayer<R> {
    sink: Option<Box<dyn AudioOutput>>,
    input: Option<R>,
    on_stream_ended: Option<StreamEndedCallback>,
    alive: AliveFlag,
    worker: Option<Worker>,
}

impl<R: Read + Send + 'static> AudioPlayer<R> {
    pub fn new(sink: Box<dyn AudioOutput>, input: R) -> Self {
        Self {
            sink: Some(sink),
            input: Some(input),
            on_stream_ended: None,
            alive: AliveFlag::new(),
            worker: None,
        }
    }

    /// Fired exactly once per session, on natural EOF and on abnormal
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
            warn!("audio player is already running");
            return;
        }
        let (Some(sink), Some(input)) = (self.sink.take(), self.input.take()) else {
            warn!("audio player cannot be started more than once");
            return;
        };

        self.alive.set();
        let alive = self.alive.clone();
        let on_stream_ended = self.on_stream_ended.take();
        self.worker = Some(Worker::spawn("audio-player", move || {
            run(sink, input, alive, on_stream_ended);
        }));
    }

    /// Clears the alive flag and waits (bounded) for the worker.
    pub fn stop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

impl<R> Drop for AudioPlayer<R> {
    fn drop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

fn run<R: Read>(
    mut sink: Box<dyn AudioOutput>,
    mut input: R,
    alive: AliveFlag,
    on_stream_ended: Option<StreamEndedCallback>,
) {
    if let Err(e) = play(sink.as_mut(), &mut input, &alive) {
        error!("audio player stopped: {e}");
    }
    sink.close();
    alive.clear();
    // Exactly once, on every exit path.
    if let Some(ended) = on_stream_ended {
        ended();
    }
}

fn play<R: Read>(
    sink: &mut dyn AudioOutput,
    input: &mut R,
    alive: &AliveFlag,
) -> Result<(), StreamError> {
    let profile = playback_profile(sink);
    info!(
        "playing audio at {} Hz ({} byte chunks)",
        profile.sample_rate, profile.byte_size
    );
    sink.open(profile)?;

    let mut buffer = vec![0u8; profile.byte_size as usize];
    while alive.is_set() {
        let len = input.read(&mut buffer)?;
        if len == 0 {
            debug!("audio channel reached end of stream");
            break;
        }
        sink.write(&buffer[..len])?;
    }

    Ok(())
}

fn playback_profile(sink: &dyn AudioOutput) -> BufferProfile {
    choose_buffer(
        &CANDIDATE_SAMPLE_RATES,
        |rate| sink.min_buffer_size(rate),
        |size| sink.is_valid_size(size),
    )
}
