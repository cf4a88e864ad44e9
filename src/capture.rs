//! Capture back-end seam.
//!
//! Camera stacks differ wildly (legacy, camera2-style, platform-managed),
//! so the streaming core talks to them through one capability interface and
//! never to a concrete back-end. A back-end hands out the encoder wired to
//! its capture surface and the raw PCM source wired to its microphone.

use crate::audio::AudioInput;
use crate::codec::{EncoderSettings, MediaEncoder};
use crate::error::CodecError;

/// One camera/microphone back-end.
pub trait CaptureModule: Send {
    /// Acquires the underlying hardware. Must be called before any encoder
    /// or source is requested.
    fn open(&mut self) -> Result<(), CodecError>;

    /// Releases the hardware. Safe to call repeatedly.
    fn close(&mut self);

    /// Returns a video encoder attached to this module's capture surface,
    /// configured with the given settings.
    fn video_encoder(
        &mut self,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn MediaEncoder>, CodecError>;

    /// Returns the module's microphone as a raw PCM source.
    fn audio_source(&mut self) -> Result<Box<dyn AudioInput>, CodecError>;
}
