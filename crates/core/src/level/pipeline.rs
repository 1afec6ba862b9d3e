use std::time::SystemTime;

use super::LevelSample;
use super::calibration::clamp_unit;
use crate::config::LevelConfig;

/// Calibrate, smooth, quantize, then gate by hysteresis.
///
/// Holds the smoothing state; feed it from a single stage.
#[derive(Debug, Clone)]
pub struct LevelPipeline {
    config: LevelConfig,
    smoothed: Option<f64>,
    last_published: Option<f64>,
}

impl LevelPipeline {
    pub fn new(config: LevelConfig) -> Self {
        Self {
            config,
            smoothed: None,
            last_published: None,
        }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// The baseline the next sample is compared against.
    pub fn last_published(&self) -> Option<f64> {
        self.last_published
    }

    /// Run one raw detector value through the chain.
    ///
    /// Returns the sample only when it passes the hysteresis gate; it then
    /// becomes the new baseline. The smoothing filter advances either way.
    pub fn process(&mut self, raw: f64) -> Option<LevelSample> {
        let raw = clamp_unit(raw);
        let calibrated = self.config.calibration.apply(raw);

        let alpha = self.config.smoothing_alpha;
        let previous = self.smoothed.unwrap_or(calibrated);
        let smoothed = clamp_unit(alpha * calibrated + (1.0 - alpha) * previous);
        self.smoothed = Some(smoothed);

        let value = match self.config.quantize_step_percent {
            Some(step) => quantize(smoothed, step),
            None => smoothed,
        };

        if let Some(last) = self.last_published {
            let delta = (value - last).abs();
            if delta < self.config.hysteresis_threshold {
                tracing::debug!(
                    value,
                    last_published = last,
                    delta,
                    threshold = self.config.hysteresis_threshold,
                    "level change below hysteresis threshold"
                );
                return None;
            }
        }
        self.last_published = Some(value);

        Some(LevelSample {
            raw,
            calibrated,
            smoothed,
            level: value,
            percentage: value * 100.0,
            timestamp: SystemTime::now(),
        })
    }

    /// Forget smoothing history and the published baseline.
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.last_published = None;
    }
}

/// Snap `value` (0..=1) to the nearest multiple of `step_percent`.
fn quantize(value: f64, step_percent: f64) -> f64 {
    if step_percent <= 0.0 {
        return value;
    }
    let pct = (value * 100.0 / step_percent).round() * step_percent;
    clamp_unit(pct / 100.0)
}
