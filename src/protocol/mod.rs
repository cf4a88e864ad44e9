//! Wire protocol: self-describing frames multiplexed over an ordered byte
//! channel as length-prefixed records.

pub mod frame;
pub mod wire;

pub use frame::{DataChunk, FLAG_END_OF_STREAM, Frame, StreamHeader};
pub use wire::{read_record, write_record};
