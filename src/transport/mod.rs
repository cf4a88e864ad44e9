//! Byte channels between producing and consuming pipelines.

pub mod lossy;
pub mod pipe;

pub use lossy::{Backlog, LossySink};
pub use pipe::{DEFAULT_PIPE_CAPACITY, PipeReader, PipeWriter, pipe};
