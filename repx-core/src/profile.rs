use serde::{Deserialize, Serialize};

/// A named motion template used to synthesize one repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepProfile {
    pub label: String,
    /// Duration of the full rep (rise + fall) in seconds.
    pub total_s: f64,
    /// Peak relative pitch in degrees.
    pub rom: f64,
    /// Peak incidental body sway in degrees. Values above ~12 represent a
    /// swinging rep.
    pub sway: f64,
    /// Alternate a fixed ±6° jitter on successive samples.
    #[serde(default)]
    pub jerky: bool,
}

impl RepProfile {
    pub fn new(label: impl Into<String>, total_s: f64, rom: f64, sway: f64, jerky: bool) -> Self {
        Self {
            label: label.into(),
            total_s,
            rom,
            sway,
            jerky,
        }
    }

    /// A large, clean, full range-of-motion rep.
    pub fn big_full() -> Self {
        Self::new("big_full", 1.8, 150.0, 2.0, false)
    }

    /// Number of samples in each of the rise and fall phases. Always at
    /// least one.
    pub fn steps_per_phase(&self, sample_rate_hz: u32) -> usize {
        let steps = (self.total_s / 2.0) * sample_rate_hz as f64;
        (steps.floor() as usize).max(1)
    }
}
