use serde::Deserialize;

use crate::error::{Error, Result};

/// Maps a raw detector position onto a 0..=1 fill level.
///
/// Configured in TOML with a `mode` tag:
///
/// ```toml
/// [level.calibration]
/// mode = "range"
/// raw_empty = 0.22
/// raw_full = 0.93
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Calibration {
    /// `slope * raw + intercept`
    Linear { slope: f64, intercept: f64 },
    /// `(raw - raw_empty) / (raw_full - raw_empty)`
    Range { raw_empty: f64, raw_full: f64 },
}

impl Default for Calibration {
    fn default() -> Self {
        Self::Linear {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

impl Calibration {
    /// Calibrate `raw`, clamping input and output to [0, 1].
    ///
    /// ```
    /// use levelcam::level::Calibration;
    ///
    /// let range = Calibration::Range { raw_empty: 0.2, raw_full: 0.8 };
    /// assert!((range.apply(0.5) - 0.5).abs() < 1e-9);
    /// assert_eq!(range.apply(0.1), 0.0);
    /// ```
    pub fn apply(&self, raw: f64) -> f64 {
        let raw = clamp_unit(raw);
        let value = match *self {
            Self::Linear { slope, intercept } => slope * raw + intercept,
            Self::Range { raw_empty, raw_full } => (raw - raw_empty) / (raw_full - raw_empty),
        };
        clamp_unit(value)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Linear { slope, intercept } => {
                if !slope.is_finite() || !intercept.is_finite() {
                    return Err(Error::Config("linear calibration must be finite".into()));
                }
            }
            Self::Range { raw_empty, raw_full } => {
                if !raw_empty.is_finite() || !raw_full.is_finite() {
                    return Err(Error::Config("range calibration must be finite".into()));
                }
                if raw_full == raw_empty {
                    return Err(Error::Config(
                        "range calibration needs raw_full != raw_empty".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Clamp to [0, 1]; NaN becomes 0.
pub(crate) fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
