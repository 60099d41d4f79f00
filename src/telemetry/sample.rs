// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! CSI sample type and its wire decoding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single timestamped scalar reading derived from CSI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Device timestamp, or receive time when the device sends none
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Error, Debug)]
#[error("malformed sample frame: {0}")]
pub struct DecodeError(String);

impl Sample {
    pub fn new(value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
        }
    }

    pub fn at(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Decode one JSON object, e.g. `{"value": 12.5}` or
    /// `{"timestamp": "2026-01-01T00:00:00Z", "value": -3.0}`
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text.trim()).map_err(|e| DecodeError(e.to_string()))
    }

    /// Decode a streaming frame carrying newline-delimited samples.
    ///
    /// Blank lines are skipped; the first malformed line fails the frame.
    pub fn decode_frame(text: &str) -> Result<Vec<Self>, DecodeError> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::decode)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_without_timestamp() {
        let before = Utc::now();
        let sample = Sample::decode(r#"{"value": 12.5}"#).unwrap();
        assert_eq!(sample.value, 12.5);
        assert!(sample.timestamp >= before);
    }

    #[test]
    fn test_decode_with_timestamp() {
        let sample = Sample::decode(r#"{"timestamp":"2026-03-01T10:00:00Z","value":-3.0}"#).unwrap();
        assert_eq!(sample.value, -3.0);
        assert_eq!(sample.timestamp.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_decode_frame_lines() {
        let frame = "{\"value\": 1.0}\n\n{\"value\": 2.0}\n";
        let samples = Sample::decode_frame(frame).unwrap();
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Sample::decode("not json").is_err());
        assert!(Sample::decode(r#"{"amplitude": 3}"#).is_err());
        assert!(Sample::decode_frame("{\"value\": 1.0}\nbroken").is_err());
    }
}
