use std::{fmt, time::Duration};

use rama::telemetry::tracing;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    arrival::tick_probability,
    intensity::{ConstantIntensity, CosineIntensity, DEFAULT_FREQUENCY, Intensity},
};

/// Shape of the traffic over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Waveform {
    /// Oscillating load, see [`CosineIntensity`].
    #[default]
    Cosine,
    /// Constant load at the base rate, see [`ConstantIntensity`].
    Flat,
}

/// Immutable simulation parameters, passed by value into the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationConfig {
    pub base_rate_per_minute: f64,
    pub waveform: Waveform,
    /// Angular frequency of the cosine wave (radians per minute).
    /// Ignored for a flat waveform.
    pub frequency: f64,
    pub ticks_per_second: u32,
    pub duration_minutes: f64,
    /// Seed for the random source; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_rate_per_minute: 20.,
            waveform: Waveform::Cosine,
            frequency: DEFAULT_FREQUENCY,
            ticks_per_second: 1000,
            duration_minutes: 10.,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Check the configuration.
    ///
    /// Hard errors make the simulation meaningless and are returned as `Err`.
    /// Warnings describe a configuration that runs, but with degraded fidelity.
    /// Each warning is also logged.
    pub fn validate(&self) -> Result<Vec<ConfigurationWarning>, ConfigError> {
        let warnings = self.check()?;
        for warning in &warnings {
            tracing::warn!("simulation config warning: {warning}");
        }
        Ok(warnings)
    }

    /// Same as [`SimulationConfig::validate`], without logging the warnings.
    pub(crate) fn check(&self) -> Result<Vec<ConfigurationWarning>, ConfigError> {
        ensure_positive("base_rate_per_minute", self.base_rate_per_minute)?;
        ensure_positive("duration_minutes", self.duration_minutes)?;
        let duration = Duration::try_from_secs_f64(self.duration_minutes * 60.).map_err(|err| {
            ConfigError::InvalidConfiguration {
                field: "duration_minutes",
                reason: format!("cannot be expressed as a duration: {err}"),
            }
        })?;
        ensure_schedulable("duration_minutes", duration)?;
        if self.waveform == Waveform::Cosine {
            ensure_positive("frequency", self.frequency)?;
        }
        tick_interval(self.ticks_per_second)?;

        let mut warnings = Vec::new();

        let peak_rate_per_minute = self.intensity().peak_rate();
        let max_probability = tick_probability(peak_rate_per_minute, self.ticks_per_second);
        if max_probability > 1. {
            warnings.push(ConfigurationWarning::ProbabilityOverflow {
                peak_rate_per_minute,
                ticks_per_second: self.ticks_per_second,
                max_probability,
            });
        }

        Ok(warnings)
    }

    /// The intensity function described by this config.
    pub fn intensity(&self) -> Box<dyn Intensity> {
        match self.waveform {
            Waveform::Cosine => Box::new(CosineIntensity::new(
                self.base_rate_per_minute,
                self.frequency,
            )),
            Waveform::Flat => Box::new(ConstantIntensity::new(self.base_rate_per_minute)),
        }
    }

    /// Wall-clock duration of the simulation.
    ///
    /// Only meaningful for a validated config, saturates otherwise.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_minutes.max(0.) * 60.).unwrap_or(Duration::MAX)
    }
}

/// Finest supported tick rate: one tick per nanosecond.
pub const MAX_TICKS_PER_SECOND: u32 = 1_000_000_000;

/// Time between two ticks at the given tick rate.
pub(crate) fn tick_interval(ticks_per_second: u32) -> Result<Duration, ConfigError> {
    if ticks_per_second == 0 {
        return Err(ConfigError::InvalidConfiguration {
            field: "ticks_per_second",
            reason: "must be at least one tick per second".to_owned(),
        });
    }
    if ticks_per_second > MAX_TICKS_PER_SECOND {
        return Err(ConfigError::InvalidConfiguration {
            field: "ticks_per_second",
            reason: format!(
                "{ticks_per_second} exceeds the maximum of {MAX_TICKS_PER_SECOND} ticks per second"
            ),
        });
    }
    Ok(Duration::from_secs(1) / ticks_per_second)
}

/// A simulation window has to be non-empty and its end has to be a representable instant.
pub(crate) fn ensure_schedulable(field: &'static str, duration: Duration) -> Result<(), ConfigError> {
    if duration.is_zero() {
        return Err(ConfigError::InvalidConfiguration {
            field,
            reason: "must be longer than zero".to_owned(),
        });
    }
    if Instant::now().checked_add(duration).is_none() {
        return Err(ConfigError::InvalidConfiguration {
            field,
            reason: format!("{duration:?} ends beyond the supported clock range"),
        });
    }
    Ok(())
}

fn ensure_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0. {
        Ok(())
    } else {
        Err(ConfigError::InvalidConfiguration {
            field,
            reason: format!("must be a finite number greater than zero (got {value})"),
        })
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ConfigError {
    InvalidConfiguration {
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidConfiguration { field, reason } => {
                write!(f, "InvalidConfiguration: {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationWarning {
    /// The per-tick emission probability exceeds one at peak intensity.
    ///
    /// A single tick can emit at most one request, so the realised rate
    /// saturates at `ticks_per_second` and undershoots the configured intensity.
    ProbabilityOverflow {
        peak_rate_per_minute: f64,
        ticks_per_second: u32,
        max_probability: f64,
    },
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationWarning::ProbabilityOverflow {
                peak_rate_per_minute,
                ticks_per_second,
                max_probability,
            } => write!(
                f,
                "ProbabilityOverflow: peak rate of {peak_rate_per_minute} rpm at {ticks_per_second} ticks/s \
                 gives a per-tick probability of {max_probability:.3} (> 1); raise the tick rate"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn default_config_is_valid_without_warnings() {
        let warnings = SimulationConfig::default().validate().unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn zero_ticks_per_second_is_rejected() {
        let cfg = SimulationConfig {
            ticks_per_second: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidConfiguration {
                field: "ticks_per_second",
                ..
            }
        ));
    }

    #[test]
    fn tick_rate_finer_than_a_nanosecond_is_rejected() {
        let cfg = SimulationConfig {
            ticks_per_second: MAX_TICKS_PER_SECOND + 1,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidConfiguration {
                field: "ticks_per_second",
                ..
            }
        ));

        let cfg = SimulationConfig {
            ticks_per_second: MAX_TICKS_PER_SECOND,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(tick_interval(MAX_TICKS_PER_SECOND).unwrap(), Duration::from_nanos(1));
    }

    #[test]
    fn unrepresentable_duration_is_rejected() {
        // 1e18 minutes overflows a `Duration`, 2e17 minutes overflows the clock
        for duration_minutes in [1e18, 2e17] {
            let cfg = SimulationConfig {
                duration_minutes,
                ..Default::default()
            };
            let err = cfg.validate().unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::InvalidConfiguration {
                        field: "duration_minutes",
                        ..
                    }
                ),
                "{duration_minutes}: {err}"
            );
        }

        let cfg = SimulationConfig {
            duration_minutes: 1e18,
            ..Default::default()
        };
        assert_eq!(cfg.duration(), Duration::MAX);
    }

    #[test]
    fn non_positive_or_non_finite_values_are_rejected() {
        let cases = [
            SimulationConfig {
                base_rate_per_minute: 0.,
                ..Default::default()
            },
            SimulationConfig {
                base_rate_per_minute: f64::NAN,
                ..Default::default()
            },
            SimulationConfig {
                duration_minutes: -1.,
                ..Default::default()
            },
            SimulationConfig {
                frequency: 0.,
                ..Default::default()
            },
        ];
        for cfg in cases {
            assert!(cfg.validate().is_err(), "expected error for {cfg:?}");
        }
    }

    #[test]
    fn frequency_is_not_checked_for_flat_waveform() {
        let cfg = SimulationConfig {
            waveform: Waveform::Flat,
            frequency: 0.,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap().is_empty());
    }

    #[traced_test]
    #[test]
    fn probability_overflow_is_a_warning() {
        // peak = 3 × 100 = 300 rpm, at 2 ticks/s that is p = 300 / 120 = 2.5
        let cfg = SimulationConfig {
            base_rate_per_minute: 100.,
            ticks_per_second: 2,
            ..Default::default()
        };

        let warnings = cfg.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        let ConfigurationWarning::ProbabilityOverflow {
            max_probability,
            ticks_per_second,
            ..
        } = warnings[0];
        assert_eq!(ticks_per_second, 2);
        assert!((max_probability - 2.5).abs() < 1e-12);

        assert!(logs_contain("ProbabilityOverflow"));
    }

    #[test]
    fn probability_of_exactly_one_is_not_an_overflow() {
        // flat 60 rpm at 1 tick/s: p = 60 / 60 = 1
        let cfg = SimulationConfig {
            base_rate_per_minute: 60.,
            waveform: Waveform::Flat,
            ticks_per_second: 1,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap().is_empty());
    }

    #[test]
    fn intensity_follows_waveform() {
        let cosine = SimulationConfig::default().intensity();
        assert_eq!(cosine.peak_rate(), 60.);

        let flat = SimulationConfig {
            waveform: Waveform::Flat,
            ..Default::default()
        }
        .intensity();
        assert_eq!(flat.peak_rate(), 20.);
    }

    #[test]
    fn duration_is_expressed_in_wall_clock_time() {
        let cfg = SimulationConfig {
            duration_minutes: 1.5,
            ..Default::default()
        };
        assert_eq!(cfg.duration(), Duration::from_secs(90));
    }
}
