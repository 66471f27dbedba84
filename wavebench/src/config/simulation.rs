use std::fmt;

use wavebench_lib::{
    config::{SimulationConfig, Waveform},
    intensity::DEFAULT_FREQUENCY,
};

/// Traffic model configuration.
/// This models how requests are produced over time.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct SimulationArgs {
    /// Base traffic in requests per minute.
    /// A cosine wave oscillates between 1× and 3× this rate.
    #[arg(long, value_name = "RPM")]
    pub base_rate: Option<f64>,

    /// Shape of the traffic over time.
    #[arg(long)]
    pub waveform: Option<WaveformKind>,

    /// Angular frequency of the cosine wave, in radians per minute (default 4/π).
    #[arg(long, value_name = "RAD_PER_MINUTE")]
    pub frequency: Option<f64>,

    /// Scheduling resolution: one emission decision per tick.
    #[arg(long, value_name = "N")]
    pub ticks_per_second: Option<u32>,

    /// Length of the simulation.
    #[arg(long, value_name = "MINUTES")]
    pub duration: Option<f64>,
}

impl SimulationArgs {
    /// Fill in the defaults for all undefined properties.
    pub fn into_simulation_config(self, seed: Option<u64>) -> SimulationConfig {
        let defaults = SimulationConfig::default();
        SimulationConfig {
            base_rate_per_minute: self.base_rate.unwrap_or(defaults.base_rate_per_minute),
            waveform: self.waveform.map(Into::into).unwrap_or(defaults.waveform),
            frequency: self.frequency.unwrap_or(DEFAULT_FREQUENCY),
            ticks_per_second: self.ticks_per_second.unwrap_or(defaults.ticks_per_second),
            duration_minutes: self.duration.unwrap_or(defaults.duration_minutes),
            seed,
        }
    }
}

/// Configuration applied to the monitored target before the simulation starts.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct TargetArgs {
    /// Regression level the target is switched to (0 = no regression).
    #[arg(long, value_name = "LEVEL")]
    pub regression_level: Option<u32>,

    /// Magnitude of the regression; left untouched on the target when undefined.
    #[arg(long, value_name = "MAGNITUDE")]
    pub regression_magnitude: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WaveformKind {
    /// Oscillating load (low → high → low).
    Cosine,
    /// Constant load at the base rate.
    Flat,
}

impl fmt::Display for WaveformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveformKind::Cosine => write!(f, "cosine"),
            WaveformKind::Flat => write!(f, "flat"),
        }
    }
}

impl From<WaveformKind> for Waveform {
    fn from(value: WaveformKind) -> Self {
        match value {
            WaveformKind::Cosine => Waveform::Cosine,
            WaveformKind::Flat => Waveform::Flat,
        }
    }
}
