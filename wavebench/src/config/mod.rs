use rama::telemetry::tracing;

mod scenario;
mod simulation;

pub use self::{
    scenario::Scenario,
    simulation::{SimulationArgs, TargetArgs, WaveformKind},
};

/// Merge optional properties: overwrite first, then scenario, else undefined.
macro_rules! merge_config {
    ($ty:ident, $scenario:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
        $ty {
            $(
                $property: if let Some(value) = $overwrite.$property {
                    tracing::info!("property '{}': use overwrite: {value}", stringify!($property));
                    Some(value)
                } else if let Some(value) = $scenario.$property {
                    tracing::info!("property '{}': use scenario: {value}", stringify!($property));
                    Some(value)
                } else {
                    tracing::info!("property '{}': undefined", stringify!($property));
                    None
                },
            )+
        }
    };
}

pub fn merge_simulation_args(
    scenario: Option<Scenario>,
    config: Option<SimulationArgs>,
) -> SimulationArgs {
    let scenario_cfg = scenario
        .map(|s| {
            tracing::info!("use scenario to define base simulation config: {s:?}");
            s.simulation_args()
        })
        .unwrap_or_else(|| {
            tracing::info!("no scenario defined, use default as base simulation config");
            Default::default()
        });

    let overwrite_cfg = config.unwrap_or_default();

    merge_config!(
        SimulationArgs, scenario_cfg, overwrite_cfg,
        {
            base_rate,
            waveform,
            frequency,
            ticks_per_second,
            duration,
        }
    )
}

pub fn merge_target_args(scenario: Option<Scenario>, config: Option<TargetArgs>) -> TargetArgs {
    let scenario_cfg = scenario
        .map(|s| {
            tracing::info!("use scenario to define base target config: {s:?}");
            s.target_args()
        })
        .unwrap_or_else(|| {
            tracing::info!("no scenario defined, use default as base target config");
            Default::default()
        });

    let overwrite_cfg = config.unwrap_or_default();

    merge_config!(
        TargetArgs, scenario_cfg, overwrite_cfg,
        {
            regression_level,
            regression_magnitude,
        }
    )
}

#[cfg(test)]
mod tests {
    use wavebench_lib::{config::Waveform, intensity::DEFAULT_FREQUENCY};

    use super::*;

    #[test]
    fn overwrite_wins_over_scenario() {
        let merged = merge_simulation_args(
            Some(Scenario::HeavyWave),
            Some(SimulationArgs {
                base_rate: Some(42.),
                ..Default::default()
            }),
        );

        assert_eq!(merged.base_rate, Some(42.));
        assert_eq!(merged.waveform, Some(WaveformKind::Cosine));
        assert_eq!(merged.ticks_per_second, Some(1000));
        assert_eq!(merged.frequency, None);
    }

    #[test]
    fn no_scenario_and_no_overwrite_falls_back_to_defaults() {
        let cfg = merge_simulation_args(None, None).into_simulation_config(None);
        assert_eq!(cfg.base_rate_per_minute, 20.);
        assert_eq!(cfg.waveform, Waveform::Cosine);
        assert_eq!(cfg.frequency, DEFAULT_FREQUENCY);
        assert_eq!(cfg.ticks_per_second, 1000);
        assert_eq!(cfg.duration_minutes, 10.);
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn seed_is_carried_into_simulation_config() {
        let cfg = merge_simulation_args(Some(Scenario::Baseline), None).into_simulation_config(Some(3));
        assert_eq!(cfg.waveform, Waveform::Flat);
        assert_eq!(cfg.seed, Some(3));
    }

    #[test]
    fn target_scenario_presets() {
        let merged = merge_target_args(Some(Scenario::HeavyWave), None);
        assert_eq!(merged.regression_level, Some(2));
        assert_eq!(merged.regression_magnitude, Some(1));

        let merged = merge_target_args(
            Some(Scenario::Wave),
            Some(TargetArgs {
                regression_level: None,
                regression_magnitude: Some(5),
            }),
        );
        assert_eq!(merged.regression_level, Some(3));
        assert_eq!(merged.regression_magnitude, Some(5));

        let merged = merge_target_args(None, None);
        assert_eq!(merged.regression_level, None);
    }
}
