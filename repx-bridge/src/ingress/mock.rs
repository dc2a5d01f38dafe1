//! Synthetic motion generator.
//!
//! Produces the same reading shape the bridge emits for real packets, shaped
//! like repetitions of an arm curl: each rep ramps the relative pitch up over
//! a rise phase, back down over a fall phase, then rests for a random
//! interval. Used to exercise subscribers without hardware.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use repx_core::{Reading, RepProfile};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{INGRESS_CHANNEL_CAPACITY, Ingress, IngressEvent};

/// Jitter applied to alternate samples of a jerky rep, in degrees.
pub const JERK_DEGREES: f64 = 6.0;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Fastest rate whose tick period is still at least one nanosecond.
pub const MAX_SAMPLE_RATE_HZ: u32 = NANOS_PER_SECOND as u32;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("at least one rep profile is required")]
    NoProfiles,

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("sample rate {0} Hz is above the {max} Hz timer resolution", max = MAX_SAMPLE_RATE_HZ)]
    SampleRateTooHigh(u32),

    #[error("invalid rest window {min}..={max} seconds")]
    InvalidRestWindow { min: f64, max: f64 },

    #[error("profile '{0}' has a non-finite or negative parameter")]
    InvalidProfile(String),
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    pub sample_rate_hz: u32,
    pub rest_min_s: f64,
    pub rest_max_s: f64,
    pub profiles: Vec<RepProfile>,
}

impl MotionSettings {
    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.profiles.is_empty() {
            return Err(GeneratorError::NoProfiles);
        }

        if self.sample_rate_hz == 0 {
            return Err(GeneratorError::ZeroSampleRate);
        }

        if self.sample_rate_hz > MAX_SAMPLE_RATE_HZ {
            return Err(GeneratorError::SampleRateTooHigh(self.sample_rate_hz));
        }

        let (min, max) = (self.rest_min_s, self.rest_max_s);
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(GeneratorError::InvalidRestWindow { min, max });
        }

        for profile in &self.profiles {
            let total_ok = profile.total_s.is_finite() && profile.total_s >= 0.0;
            if !total_ok || !profile.rom.is_finite() || !profile.sway.is_finite() {
                return Err(GeneratorError::InvalidProfile(profile.label.clone()));
            }
        }

        Ok(())
    }

    /// Time between two samples.
    pub fn period(&self) -> Duration {
        let rate = u64::from(self.sample_rate_hz.clamp(1, MAX_SAMPLE_RATE_HZ));
        Duration::from_nanos(NANOS_PER_SECOND / rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Rise,
    Fall,
    Rest,
}

/// Endless sequence of synthetic readings.
///
/// The iterator itself is unpaced; [`MockIngress`] ticks it at the sample
/// rate.
pub struct MotionSamples<R> {
    profiles: Arc<[RepProfile]>,
    sample_rate_hz: u32,
    rest_min_s: f64,
    rest_max_s: f64,
    rng: R,
    seq: u16,
    profile_idx: usize,
    phase: Phase,
    step: usize,
    steps: usize,
}

impl<R: Rng> MotionSamples<R> {
    pub fn new(settings: MotionSettings, rng: R) -> Result<Self, GeneratorError> {
        settings.validate()?;

        let steps = settings.profiles[0].steps_per_phase(settings.sample_rate_hz);

        Ok(Self {
            profiles: settings.profiles.into(),
            sample_rate_hz: settings.sample_rate_hz,
            rest_min_s: settings.rest_min_s,
            rest_max_s: settings.rest_max_s,
            rng,
            seq: 0,
            profile_idx: 0,
            phase: Phase::Rise,
            step: 0,
            steps,
        })
    }

    /// Phase the next sample will belong to, before any pending transition.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Profile currently being played.
    pub fn profile(&self) -> &RepProfile {
        &self.profiles[self.profile_idx]
    }

    fn motion_sample(&self, seq: u16, i: usize) -> Reading {
        let profile = self.profile();
        let frac = i as f64 / self.steps as f64;
        let base = match self.phase {
            Phase::Rise => frac,
            _ => 1.0 - frac,
        };

        let mut dp = profile.rom * base;
        if profile.jerky {
            dp += if i % 2 == 0 {
                JERK_DEGREES
            } else {
                -JERK_DEGREES
            };
        }

        Reading {
            p0: profile.sway * base,
            dp,
            ..Reading::rest(seq)
        }
    }

    fn rest_steps(&mut self) -> usize {
        let rest = self.rng.random_range(self.rest_min_s..=self.rest_max_s);
        (rest * self.sample_rate_hz as f64).floor() as usize
    }

    fn advance(&mut self) {
        match self.phase {
            // fall reuses the rise step count
            Phase::Rise => self.phase = Phase::Fall,
            Phase::Fall => {
                self.phase = Phase::Rest;
                self.steps = self.rest_steps();
            }
            Phase::Rest => {
                self.profile_idx = (self.profile_idx + 1) % self.profiles.len();
                self.phase = Phase::Rise;
                self.steps = self.profile().steps_per_phase(self.sample_rate_hz);
            }
        }
        self.step = 0;
    }
}

impl<R: Rng> Iterator for MotionSamples<R> {
    type Item = Reading;

    fn next(&mut self) -> Option<Reading> {
        // rise and fall always have at least one step, so this terminates
        while self.step >= self.steps {
            self.advance();
        }

        let i = self.step;
        self.step += 1;
        self.seq = self.seq.wrapping_add(1);

        let reading = match self.phase {
            Phase::Rest => Reading::rest(self.seq),
            Phase::Rise | Phase::Fall => self.motion_sample(self.seq, i),
        };

        Some(reading)
    }
}

/// Ingress that plays [`MotionSamples`] at a fixed sample rate.
pub struct MockIngress {
    settings: Arc<MotionSettings>,
    seed: Option<u64>,
}

impl MockIngress {
    pub fn new(settings: MotionSettings, seed: Option<u64>) -> Result<Self, GeneratorError> {
        settings.validate()?;

        Ok(Self {
            settings: Arc::new(settings),
            seed,
        })
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

#[async_trait]
impl Ingress for MockIngress {
    type Error = GeneratorError;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<IngressEvent>, Self::Error> {
        let (tx, rx) = mpsc::channel(INGRESS_CHANNEL_CAPACITY);

        let period = self.settings.period();
        let mut samples = MotionSamples::new(self.settings.as_ref().clone(), self.rng())?;

        info!(
            profile_count = self.settings.profiles.len(),
            sample_rate_hz = self.settings.sample_rate_hz,
            rest_min_s = self.settings.rest_min_s,
            rest_max_s = self.settings.rest_max_s,
            "Starting motion generator"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Motion generator shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(reading) = samples.next() else {
                            break;
                        };

                        if tx.send(IngressEvent::Sample(reading)).await.is_err() {
                            info!("Channel closed, motion generator shutting down");
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
