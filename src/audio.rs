//! Audio buffer sizing and device seams.
//!
//! Capture and playback hardware is reached through the [`AudioInput`] and
//! [`AudioOutput`] traits; the streaming core never touches a device API
//! directly. Buffer geometry is negotiated once per pipeline with
//! [`choose_buffer`] and immutable afterwards.

use log::debug;

use crate::error::CodecError;

/// Sample rates probed in ascending order. The shorter the buffer the lower
/// the end-to-end latency, so the walk prefers the smallest viable rate.
pub const CANDIDATE_SAMPLE_RATES: [u32; 6] = [8000, 11025, 16000, 22050, 44100, 48000];

/// Buffer size used when no candidate rate validates.
const FALLBACK_BYTE_SIZE: u32 = 1024;

/// Negotiated audio buffer geometry. Computed at pipeline construction and
/// owned by the pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferProfile {
    pub sample_rate: u32,
    pub byte_size: u32,
}

/// Picks the smallest viable sample rate from `candidates`.
///
/// `min_size` asks the device for the minimum buffer size at a rate; devices
/// report errors through sentinel values that only `is_valid_size` can
/// recognize, which is why both callbacks come from the caller. If nothing
/// validates, falls back to 1024 bytes at the last candidate's rate.
/// Ties are impossible: the first validating candidate wins.
pub fn choose_buffer(
    candidates: &[u32],
    min_size: impl Fn(u32) -> i32,
    is_valid_size: impl Fn(i32) -> bool,
) -> BufferProfile {
    assert!(!candidates.is_empty(), "no candidate sample rates");

    let mut sample_rate = 0;
    let mut size = -1;

    for &rate in candidates {
        sample_rate = rate;
        size = min_size(rate);
        if is_valid_size(size) {
            break;
        }
    }

    let byte_size = if is_valid_size(size) {
        size as u32
    } else {
        FALLBACK_BYTE_SIZE
    };

    debug!("negotiated audio buffer: {byte_size} bytes at {sample_rate} Hz");
    BufferProfile {
        sample_rate,
        byte_size,
    }
}

/// A source of raw PCM, typically a microphone.
pub trait AudioInput: Send {
    /// Minimum capture buffer size at `sample_rate`, or a device-specific
    /// error sentinel.
    fn min_buffer_size(&self, sample_rate: u32) -> i32;

    /// Distinguishes a real size from an error sentinel.
    fn is_valid_size(&self, size: i32) -> bool;

    /// Starts capturing with the negotiated geometry.
    fn open(&mut self, profile: BufferProfile) -> Result<(), CodecError>;

    /// Blocking read of captured PCM into `buf`; returns the byte count.
    /// Zero means the source has nothing further to produce.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn close(&mut self);
}

/// A raw PCM playback device, typically a speaker.
pub trait AudioOutput: Send {
    /// Minimum playback buffer size at `sample_rate`, or an error sentinel.
    fn min_buffer_size(&self, sample_rate: u32) -> i32;

    fn is_valid_size(&self, size: i32) -> bool;

    /// Starts playback with the negotiated geometry.
    fn open(&mut self, profile: BufferProfile) -> Result<(), CodecError>;

    /// Blocking write of PCM to the device.
    fn write(&mut self, buf: &[u8]) -> Result<(), CodecError>;

    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_valid_rate_wins() {
        let profile = choose_buffer(
            &[8000, 16000, 44100],
            |rate| if rate == 16000 { 640 } else { -1 },
            |size| size > 0,
        );
        assert_eq!(
            profile,
            BufferProfile {
                sample_rate: 16000,
                byte_size: 640
            }
        );
    }

    #[test]
    fn smallest_rate_preferred_when_all_validate() {
        let profile = choose_buffer(&CANDIDATE_SAMPLE_RATES, |rate| rate as i32 / 10, |s| s > 0);
        assert_eq!(profile.sample_rate, 8000);
        assert_eq!(profile.byte_size, 800);
    }

    #[test]
    fn falls_back_to_1024_at_last_rate() {
        let profile = choose_buffer(&[8000, 11025, 48000], |_| -2, |s| s > 0);
        assert_eq!(
            profile,
            BufferProfile {
                sample_rate: 48000,
                byte_size: 1024
            }
        );
    }
}
