//! Audio producer pipeline.
//!
//! Audio travels as raw PCM: the consumer needs no per-chunk metadata, so
//! chunks go onto the channel unframed, one write per capture buffer. Each
//! chunk is flushed immediately to keep latency flat and to give a lossy
//! sink its drop points at chunk boundaries.

use std::io::Write;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::worker::{AliveFlag, Worker};
use crate::audio::{AudioInput, BufferProfile, CANDIDATE_SAMPLE_RATES, choose_buffer};
use crate::error::StreamError;

/// How long `stop()` waits for the worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(300);

/// Streams raw PCM from a capture source into a byte sink until stopped.
pub struct AudioRecorder<W> {
    source: Option<Box<dyn AudioInput>>,
    output: Option<W>,
    alive: AliveFlag,
    worker: Option<Worker>,
}

impl<W: Write + Send + 'static> AudioRecorder<W> {
    pub fn new(source: Box<dyn AudioInput>, output: W) -> Self {
        Self {
            source: Some(source),
            output: Some(output),
            alive: AliveFlag::new(),
            worker: None,
        }
    }

    /// True while the worker is streaming. Lock-free.
    pub fn is_active(&self) -> bool {
        self.alive.is_set()
    }

    /// Starts the recording worker. Warns and no-ops if already streaming.
    pub fn start(&mut self) {
        if self.is_active() {
            warn!("audio recorder is already running");
            return;
        }
        let (Some(source), Some(output)) = (self.source.take(), self.output.take()) else {
            warn!("audio recorder cannot be restarted");
            return;
        };

        self.alive.set();
        let alive = self.alive.clone();
        self.worker = Some(Worker::spawn("audio-recorder", move || {
            run(source, output, alive);
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

impl<W> Drop for AudioRecorder<W> {
    fn drop(&mut self) {
        self.alive.clear();
        if let Some(worker) = self.worker.take() {
            worker.join_timeout(JOIN_TIMEOUT);
        }
    }
}

fn run<W: Write>(mut source: Box<dyn AudioInput>, mut output: W, alive: AliveFlag) {
    if let Err(e) = record(source.as_mut(), &mut output, &alive) {
        error!("audio recorder stopped: {e}");
    }
    source.close();
    alive.clear();
    // Dropping `output` closes the sink and gives the consumer its EOF.
}

fn record<W: Write>(
    source: &mut dyn AudioInput,
    output: &mut W,
    alive: &AliveFlag,
) -> Result<(), StreamError> {
    let profile = capture_profile(source);
    info!(
        "recording audio at {} Hz ({} byte chunks)",
        profile.sample_rate, profile.byte_size
    );
    source.open(profile)?;

    let mut buffer = vec![0u8; profile.byte_size as usize];
    while alive.is_set() {
        let len = source.read(&mut buffer)?;
        if len == 0 {
            debug!("audio source reached end of stream");
            break;
        }
        if len > buffer.len() {
            // A back-end returning garbage lengths must not tear the sink.
            warn!("audio source returned {len} bytes for a {} byte buffer", buffer.len());
            continue;
        }
        // One write per chunk, flushed: chunk boundaries are the atomic
        // units a lossy sink is allowed to drop.
        output.write_all(&buffer[..len])?;
        output.flush()?;
    }

    Ok(())
}

fn capture_profile(source: &dyn AudioInput) -> BufferProfile {
    choose_buffer(
        &CANDIDATE_SAMPLE_RATES,
        |rate| source.min_buffer_size(rate),
        |size| source.is_valid_size(size),
    )
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::error::CodecError;
    use crate::transport::pipe;

    /// Emits `chunks` then reports end of stream.
    struct ScriptedSource {
        rate: u32,
        chunks: Vec<Vec<u8>>,
        opened: Option<BufferProfile>,
    }

    impl ScriptedSource {
        fn new(rate: u32, chunks: Vec<Vec<u8>>) -> Self {
            Self {
                rate,
                chunks,
                opened: None,
            }
        }
    }

    impl AudioInput for ScriptedSource {
        fn min_buffer_size(&self, sample_rate: u32) -> i32 {
            if sample_rate == self.rate { 512 } else { -1 }
        }

        fn is_valid_size(&self, size: i32) -> bool {
            size > 0
        }

        fn open(&mut self, profile: BufferProfile) -> Result<(), CodecError> {
            self.opened = Some(profile);
            Ok(())
        }

        fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            let Some(profile) = self.opened else {
                return Err(io::Error::other("source not opened"));
            };
            // The worker must read with a buffer of the negotiated size.
            assert_eq!(buffer.len(), profile.byte_size as usize);
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            let len = chunk.len().min(buffer.len());
            buffer[..len].copy_from_slice(&chunk[..len]);
            Ok(len)
        }

        fn close(&mut self) {
            self.opened = None;
        }
    }

    #[test]
    fn streams_pcm_chunks_until_source_ends() {
        let source = ScriptedSource::new(16_000, vec![vec![1u8; 512], vec![2u8; 256]]);
        let (writer, mut reader) = pipe(64 * 1024);

        let mut recorder = AudioRecorder::new(Box::new(source), writer);
        recorder.start();

        let mut pcm = Vec::new();
        io::Read::read_to_end(&mut reader, &mut pcm).unwrap();
        assert_eq!(pcm.len(), 512 + 256);
        assert_eq!(&pcm[..512], &[1u8; 512][..]);
        assert_eq!(&pcm[512..], &[2u8; 256][..]);

        recorder.stop();
        assert!(!recorder.is_active());
    }

    #[test]
    fn stop_returns_promptly() {
        // A source that never runs dry.
        struct Endless;
        impl AudioInput for Endless {
            fn min_buffer_size(&self, _sample_rate: u32) -> i32 {
                -1 // force the fallback profile
            }
            fn is_valid_size(&self, size: i32) -> bool {
                size > 0
            }
            fn open(&mut self, _profile: BufferProfile) -> Result<(), CodecError> {
                Ok(())
            }
            fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
                thread::sleep(Duration::from_millis(1));
                Ok(buffer.len())
            }
            fn close(&mut self) {}
        }

        let (writer, reader) = pipe(1024 * 1024);
        let mut recorder = AudioRecorder::new(Box::new(Endless), writer);
        recorder.start();
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        recorder.stop();
        assert!(start.elapsed() < Duration::from_millis(250));
        drop(reader);
    }
}
