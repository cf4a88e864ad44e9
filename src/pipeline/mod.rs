//! Producer and consumer pipelines.
//!
//! Each pipeline owns one worker thread and one end of a byte channel.
//! Producers (recorders) pull from a capture device and write the channel;
//! consumers (players) read the channel and drive a playback device. All of
//! them stop cooperatively through an alive flag and a bounded join.

mod audio_player;
mod audio_recorder;
mod video_player;
mod video_recorder;
mod worker;

pub use audio_player::AudioPlayer;
pub use audio_recorder::AudioRecorder;
pub use video_player::VideoPlayer;
pub use video_recorder::VideoRecorder;
pub use worker::AliveFlag;

/// Stream parameters announced to a video consumer, as carried by a header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation in degrees the renderer should apply.
    pub orientation: u32,
    /// Whether the image is mirrored (front-facing capture).
    pub flipped: bool,
}

/// Fired on every received header; may fire again mid-stream.
pub type MetadataCallback = Box<dyn FnMut(VideoMetadata) + Send>;

/// Fired exactly once when a player's stream ends, cleanly or not.
pub type StreamEndedCallback = Box<dyn FnOnce() + Send>;
