use super::{SimulationArgs, TargetArgs, WaveformKind};

/// High level simulation scenarios.
/// Each scenario is a preset of traffic and target behavior.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum Scenario {
    /// Flat traffic against a target without regression.
    /// Used as the reference the regression detector is compared against.
    Baseline,

    /// Oscillating light traffic against a clearly regressed target.
    #[default]
    Wave,

    /// Oscillating heavy traffic against a mildly regressed target.
    HeavyWave,
}

impl Scenario {
    /// Construct the concrete traffic configuration
    /// associated with this scenario.
    pub fn simulation_args(self) -> SimulationArgs {
        match self {
            Scenario::Baseline => SimulationArgs {
                base_rate: Some(20.),
                waveform: Some(WaveformKind::Flat),
                frequency: None,
                ticks_per_second: Some(1000),
                duration: Some(10.),
            },

            Scenario::Wave => SimulationArgs {
                base_rate: Some(20.),
                waveform: Some(WaveformKind::Cosine),
                frequency: None,
                ticks_per_second: Some(1000),
                duration: Some(10.),
            },

            Scenario::HeavyWave => SimulationArgs {
                base_rate: Some(100.),
                waveform: Some(WaveformKind::Cosine),
                frequency: None,
                ticks_per_second: Some(1000),
                duration: Some(10.),
            },
        }
    }

    /// Construct the concrete target configuration
    /// associated with this scenario.
    pub fn target_args(self) -> TargetArgs {
        match self {
            Scenario::Baseline => TargetArgs {
                regression_level: Some(0),
                regression_magnitude: None,
            },

            Scenario::Wave => TargetArgs {
                regression_level: Some(3),
                regression_magnitude: None,
            },

            Scenario::HeavyWave => TargetArgs {
                regression_level: Some(2),
                regression_magnitude: Some(1),
            },
        }
    }
}
