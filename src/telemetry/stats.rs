// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Waveform summary computed by consumers at render cadence

use serde::{Deserialize, Serialize};

use super::Sample;

/// Current / mean / peak summary of a buffer snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformStats {
    pub count: usize,
    pub current: f64,
    pub mean: f64,
    pub max_abs: f64,
}

impl WaveformStats {
    /// Non-finite values count as data in the buffer but are skipped here.
    pub fn from_samples(samples: &[Sample]) -> Self {
        let finite: Vec<f64> = samples
            .iter()
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .collect();

        if finite.is_empty() {
            return Self::default();
        }

        let count = finite.len();
        let mean = finite.iter().sum::<f64>() / count as f64;
        let max_abs = finite.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));

        Self {
            count,
            current: finite[count - 1],
            mean,
            max_abs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[f64]) -> Vec<Sample> {
        values.iter().map(|&v| Sample::new(v)).collect()
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(WaveformStats::from_samples(&[]), WaveformStats::default());
    }

    #[test]
    fn test_summary() {
        let stats = WaveformStats::from_samples(&samples(&[10.0, -40.0, 20.0, 6.0]));
        assert_eq!(stats.count, 4);
        assert_eq!(stats.current, 6.0);
        assert!((stats.mean - (-1.0)).abs() < 1e-12);
        assert_eq!(stats.max_abs, 40.0);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let stats = WaveformStats::from_samples(&samples(&[3.0, f64::NAN, f64::NEG_INFINITY]));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.current, 3.0);
        assert_eq!(stats.max_abs, 3.0);
    }
}
