//! Telemetry module - samples, sliding window and waveform summary

mod buffer;
mod sample;
mod stats;

pub use buffer::{SampleBuffer, DEFAULT_CAPACITY};
pub use sample::{DecodeError, Sample};
pub use stats::WaveformStats;
