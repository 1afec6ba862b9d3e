//! Level normalization.
//!
//! A raw float position from the detector goes through [`Calibration`],
//! then [`LevelPipeline`] (exponential smoothing, optional quantization,
//! hysteresis). Only samples that change the published value by at least
//! the threshold come out the other end.

pub mod calibration;
pub mod pipeline;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

pub use calibration::Calibration;
pub use pipeline::LevelPipeline;

/// One published level reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSample {
    /// Detector output, clamped to [0, 1].
    pub raw: f64,
    pub calibrated: f64,
    pub smoothed: f64,
    /// The gated value: `smoothed`, quantized when configured.
    pub level: f64,
    /// `level` in percent.
    pub percentage: f64,
    pub timestamp: SystemTime,
}

impl LevelSample {
    /// Seconds since the Unix epoch.
    pub fn unix_timestamp(&self) -> f64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64())
    }

    /// Document published on the state topic.
    pub fn state_document(&self) -> StateDocument {
        StateDocument {
            level: self.level,
            percentage: (self.percentage * 100.0).round() / 100.0,
            raw: self.raw,
            calibrated: self.calibrated,
            smoothed: self.smoothed,
            timestamp: self.unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateDocument {
    pub level: f64,
    pub percentage: f64,
    pub raw: f64,
    pub calibrated: f64,
    pub smoothed: f64,
    pub timestamp: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("detection failed: {0}")]
pub struct DetectionError(pub String);

/// Locates the float in a decoded frame.
pub trait LevelDetector: Send {
    /// Raw float position in [0, 1].
    fn detect(&mut self, frame: &[u8]) -> std::result::Result<f64, DetectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn state_document_json() {
        let sample = LevelSample {
            raw: 0.3,
            calibrated: 0.1,
            smoothed: 0.1,
            level: 0.1,
            percentage: 10.000000001,
            timestamp: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        };
        let json = serde_json::to_value(sample.state_document()).unwrap();
        assert_eq!(json["percentage"], 10.0);
        assert_eq!(json["timestamp"], 1_700_000_000.0);
        assert_eq!(json["raw"], 0.3);
    }
}
