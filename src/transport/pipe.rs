//! In-process byte pipe.
//!
//! A bounded, blocking, single-producer single-consumer channel connecting a
//! recorder to whatever ships the bytes off-device. The writer blocks while
//! the buffer is full; the reader blocks until bytes arrive or the writer
//! hangs up.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::SinkError;

/// Enough for a few encoded video chunks between reader wakeups.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

struct State {
    buf: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

/// Creates a connected writer/reader pair with the given buffer capacity.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            writer_closed: false,
            reader_closed: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        PipeWriter {
            shared: Arc::clone(&shared),
        },
        PipeReader { shared },
    )
}

/// Read end. Dropping it disconnects the writer.
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Bytes written but not yet read.
    pub fn available(&self) -> usize {
        self.shared.state.lock().unwrap().buf.len()
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock().unwrap();
        loop {
            if !state.buf.is_empty() {
                let n = buf.len().min(state.buf.len());
                for slot in buf[..n].iter_mut() {
                    *slot = state.buf.pop_front().unwrap();
                }
                self.shared.writable.notify_all();
                return Ok(n);
            }
            if state.writer_closed {
                return Ok(0); // clean EOF
            }
            state = self.shared.readable.wait(state).unwrap();
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.reader_closed = true;
        // Wake writers blocked on a full buffer so they can observe the hangup.
        self.shared.writable.notify_all();
    }
}

/// Write end. Dropping it gives the reader a clean EOF.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Bytes sitting in the pipe that the reader has not consumed yet.
    /// Fails once the reader is gone.
    pub fn buffered(&self) -> Result<usize, SinkError> {
        let state = self.shared.state.lock().unwrap();
        if state.reader_closed {
            return Err(SinkError::Disconnected);
        }
        Ok(state.buf.len())
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.reader_closed {
                return Err(SinkError::Disconnected.into());
            }
            if state.buf.len() < state.capacity {
                let n = data.len().min(state.capacity - state.buf.len());
                state.buf.extend(&data[..n]);
                self.shared.readable.notify_all();
                return Ok(n);
            }
            state = self.shared.writable.wait(state).unwrap();
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.writer_closed = true;
        self.shared.readable.notify_all();
    }
}
