//! Flow-controlled lossy sink.
//!
//! Live streams must bound latency, not queue unboundedly: when the reader
//! falls behind, it is better to skip frames than to play them seconds late.
//! `LossySink` silently discards writes while the downstream backlog exceeds
//! a threshold.
//!
//! Drops must not tear records apart, so a drop decision is only permitted
//! immediately after a `flush()`. Producers flush once per record and emit
//! each record as a single write (see `protocol::wire::write_record`), which
//! makes every drop a whole-record drop.

use std::io::{self, Write};

use log::trace;

use crate::error::SinkError;

/// Reports how many downstream bytes are buffered but unread.
pub trait Backlog {
    fn backlog(&self) -> Result<usize, SinkError>;
}

impl Backlog for super::pipe::PipeWriter {
    fn backlog(&self) -> Result<usize, SinkError> {
        self.buffered()
    }
}

/// A byte sink that trades fidelity for bounded latency.
pub struct LossySink<W> {
    inner: W,
    /// Backlog above this many bytes triggers a drop. Zero means any backlog
    /// at all.
    threshold: usize,
    /// Armed by `flush()`, consumed by the next drop decision.
    droppable: bool,
}

impl<W: Write + Backlog> LossySink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_threshold(inner, 0)
    }

    pub fn with_threshold(inner: W, threshold: usize) -> Self {
        Self {
            inner,
            threshold,
            droppable: false,
        }
    }

    /// True iff a flush armed the flag and the downstream backlog exceeds
    /// the threshold. Evaluating disarms the flag until the next flush, so
    /// at most one write per flushed record can be dropped.
    pub fn should_drop(&mut self) -> Result<bool, SinkError> {
        if !self.droppable {
            return Ok(false);
        }
        self.droppable = false;
        Ok(self.inner.backlog()? > self.threshold)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write + Backlog> Write for LossySink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_drop()? {
            trace!("backlogged sink: dropping {} bytes", buf.len());
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.droppable = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::super::pipe::pipe;
    use super::*;

    #[test]
    fn drops_whole_writes_under_backlog() {
        let (writer, mut reader) = pipe(4096);
        let mut sink = LossySink::new(writer);

        sink.write_all(&[1u8; 100]).unwrap();
        sink.flush().unwrap();

        // Nothing read downstream yet, so the backlog exceeds the (zero)
        // threshold and the whole next write vanishes.
        sink.write_all(&[2u8; 50]).unwrap();
        sink.flush().unwrap();

        let mut drained = vec![0u8; 100];
        reader.read_exact(&mut drained).unwrap();
        assert_eq!(drained, vec![1u8; 100]);
        assert_eq!(reader.available(), 0);

        // Backlog cleared and a flush has re-armed the flag: forwarded again.
        sink.write_all(&[3u8; 50]).unwrap();
        assert_eq!(reader.available(), 50);
    }

    #[test]
    fn never_drops_before_first_flush() {
        let (writer, reader) = pipe(4096);
        let mut sink = LossySink::new(writer);

        sink.write_all(&[1u8; 10]).unwrap();
        sink.write_all(&[2u8; 10]).unwrap();
        assert_eq!(reader.available(), 20);
    }

    #[test]
    fn one_decision_per_flush() {
        let (writer, reader) = pipe(4096);
        let mut sink = LossySink::new(writer);

        sink.write_all(&[1u8; 10]).unwrap();
        sink.flush().unwrap();

        // First write after the flush is dropped, but the decision is spent:
        // a follow-up write without an intervening flush goes through.
        sink.write_all(&[2u8; 10]).unwrap();
        sink.write_all(&[3u8; 10]).unwrap();
        assert_eq!(reader.available(), 20);
    }

    #[test]
    fn threshold_tolerates_small_backlog() {
        let (writer, reader) = pipe(4096);
        let mut sink = LossySink::with_threshold(writer, 200);

        sink.write_all(&[1u8; 100]).unwrap();
        sink.flush().unwrap();
        sink.write_all(&[2u8; 100]).unwrap();
        assert_eq!(reader.available(), 200);
    }

    #[test]
    fn disconnected_reader_fails_the_drop_check() {
        let (writer, reader) = pipe(4096);
        let mut sink = LossySink::new(writer);
        sink.flush().unwrap();
        drop(reader);
        assert_eq!(sink.should_drop(), Err(SinkError::Disconnected));
    }
}
