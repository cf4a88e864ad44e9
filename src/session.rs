//! Stream session.
//!
//! A session bundles up to one audio and up to one video pipeline behind a
//! single lifecycle. Capture sessions own the recorders and hand out the
//! read ends of their channels; wrap sessions merely carry byte sources
//! received from elsewhere (a socket, a file) toward the players.

use std::io::Read;

use log::info;

use crate::capture::CaptureModule;
use crate::codec::EncoderSettings;
use crate::error::StreamError;
use crate::pipeline::{AudioRecorder, VideoRecorder};
use crate::protocol::StreamHeader;
use crate::transport::{DEFAULT_PIPE_CAPACITY, LossySink, PipeWriter, pipe};

/// A byte source carrying one elementary stream.
pub type ByteStream = Box<dyn Read + Send>;

type RecorderSink = LossySink<PipeWriter>;

/// What a session should carry and how video should be encoded.
///
/// The three numeric knobs treat zero as "use the recorder default".
#[derive(Clone, Copy, Debug)]
pub struct StreamParams {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub bit_rate: u32,
    pub frame_rate: u32,
    pub iframe_interval: u32,
}

impl StreamParams {
    /// Validates the kind selection; a session with neither audio nor video
    /// is meaningless.
    pub fn new(audio_enabled: bool, video_enabled: bool) -> Result<Self, StreamError> {
        if !audio_enabled && !video_enabled {
            return Err(StreamError::InvalidConfig(
                "a stream needs audio, video, or both",
            ));
        }
        Ok(Self {
            audio_enabled,
            video_enabled,
            bit_rate: 0,
            frame_rate: 0,
            iframe_interval: 0,
        })
    }

    fn encoder_settings(&self) -> EncoderSettings {
        let defaults = EncoderSettings::default();
        EncoderSettings {
            bit_rate: if self.bit_rate != 0 { self.bit_rate } else { defaults.bit_rate },
            frame_rate: if self.frame_rate != 0 { self.frame_rate } else { defaults.frame_rate },
            iframe_interval: if self.iframe_interval != 0 {
                self.iframe_interval
            } else {
                defaults.iframe_interval
            },
        }
    }
}

/// One live A/V stream: its pipelines, their channels, and (for capture
/// sessions) the hardware module underneath.
pub struct StreamSession {
    module: Option<Box<dyn CaptureModule>>,
    video_recorder: Option<VideoRecorder<RecorderSink>>,
    audio_recorder: Option<AudioRecorder<RecorderSink>>,
    video_stream: Option<ByteStream>,
    audio_stream: Option<ByteStream>,
    has_video: bool,
    has_audio: bool,
    closed: bool,
}

impl StreamSession {
    /// Opens the capture module and starts a recorder per enabled kind.
    /// Each recorder writes a lossy sink over its own in-process pipe; the
    /// matching read ends are claimed via [`take_video_stream`] and
    /// [`take_audio_stream`].
    ///
    /// [`take_video_stream`]: StreamSession::take_video_stream
    /// [`take_audio_stream`]: StreamSession::take_audio_stream
    pub fn capture(
        mut module: Box<dyn CaptureModule>,
        params: StreamParams,
    ) -> Result<Self, StreamError> {
        module.open()?;

        let mut session = Self {
            module: Some(module),
            video_recorder: None,
            audio_recorder: None,
            video_stream: None,
            audio_stream: None,
            has_video: params.video_enabled,
            has_audio: params.audio_enabled,
            closed: false,
        };
        if let Err(e) = session.start_recorders(&params) {
            session.close();
            return Err(e);
        }
        info!(
            "capture session started (audio: {}, video: {})",
            session.has_audio, session.has_video
        );
        Ok(session)
    }

    /// Wraps externally supplied elementary streams, for the receiving side
    /// of a transport. At least one source is required.
    pub fn from_streams(
        audio: Option<ByteStream>,
        video: Option<ByteStream>,
    ) -> Result<Self, StreamError> {
        if audio.is_none() && video.is_none() {
            return Err(StreamError::InvalidConfig(
                "a stream needs audio, video, or both",
            ));
        }
        Ok(Self {
            module: None,
            video_recorder: None,
            audio_recorder: None,
            has_video: video.is_some(),
            has_audio: audio.is_some(),
            video_stream: video,
            audio_stream: audio,
            closed: false,
        })
    }

    fn start_recorders(&mut self, params: &StreamParams) -> Result<(), StreamError> {
        let module = self
            .module
            .as_mut()
            .ok_or(StreamError::InvalidConfig("session has no capture module"))?;

        if params.video_enabled {
            let settings = params.encoder_settings();
            let encoder = module.video_encoder(&settings)?;
            let (writer, reader) = pipe(DEFAULT_PIPE_CAPACITY);
            let mut recorder = VideoRecorder::new(encoder, LossySink::new(writer));
            recorder.set_bit_rate(settings.bit_rate);
            recorder.set_frame_rate(settings.frame_rate);
            recorder.set_iframe_interval(settings.iframe_interval);
            recorder.start();
            self.video_recorder = Some(recorder);
            self.video_stream = Some(Box::new(reader));
        }

        if params.audio_enabled {
            let source = module.audio_source()?;
            let (writer, reader) = pipe(DEFAULT_PIPE_CAPACITY);
            let mut recorder = AudioRecorder::new(source, LossySink::new(writer));
            recorder.start();
            self.audio_recorder = Some(recorder);
            self.audio_stream = Some(Box::new(reader));
        }

        Ok(())
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    /// Claims the video byte source. `None` if the session has no video or
    /// it was already taken.
    pub fn take_video_stream(&mut self) -> Option<ByteStream> {
        self.video_stream.take()
    }

    /// Claims the audio byte source. `None` if the session has no audio or
    /// it was already taken.
    pub fn take_audio_stream(&mut self) -> Option<ByteStream> {
        self.audio_stream.take()
    }

    /// Negotiated frame width. `Some` once the video recorder has announced
    /// its header.
    pub fn width(&self) -> Option<u32> {
        self.header().map(|h| h.width)
    }

    /// Negotiated frame height, once announced.
    pub fn height(&self) -> Option<u32> {
        self.header().map(|h| h.height)
    }

    /// Negotiated video bit rate, once announced.
    pub fn bit_rate(&self) -> Option<u32> {
        self.header().map(|h| h.bit_rate)
    }

    /// Negotiated video frame rate, once announced.
    pub fn frame_rate(&self) -> Option<u32> {
        self.header().map(|h| h.frame_rate)
    }

    fn header(&self) -> Option<StreamHeader> {
        self.video_recorder.as_ref().and_then(|r| r.header())
    }

    /// True while at least one owned recorder is streaming. Always false
    /// for wrap sessions.
    pub fn is_active(&self) -> bool {
        self.video_recorder.as_ref().is_some_and(|r| r.is_active())
            || self.audio_recorder.as_ref().is_some_and(|r| r.is_active())
    }

    /// Stops owned recorders, drops unclaimed streams and releases the
    /// capture module. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Unclaimed read ends go first: a recorder blocked on a full pipe
        // can only observe the stop once its reader hangs up.
        self.video_stream = None;
        self.audio_stream = None;
        if let Some(mut recorder) = self.video_recorder.take() {
            recorder.stop();
        }
        if let Some(mut recorder) = self.audio_recorder.take() {
            recorder.stop();
        }
        if let Some(mut module) = self.module.take() {
            module.close();
        }
        info!("stream session closed");
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}
