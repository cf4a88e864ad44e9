//! In-process A/V streaming over byte channels.
//!
//! Capture hardware feeds producer pipelines that frame encoded video (and
//! pass raw PCM audio) onto plain `Read`/`Write` byte channels; consumer
//! pipelines parse the channels back and drive decoders and playback
//! devices. Everything between producer and consumer is just bytes, so any
//! transport that moves bytes can carry a stream.

pub mod audio;
pub mod capture;
pub mod codec;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{CodecError, ParseError, SinkError, StreamError};
pub use session::{StreamParams, StreamSession};
