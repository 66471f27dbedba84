use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing,
};

use clap::Args;
use serde::Serialize;
use wavebench_lib::{arrival::tick_probability, intensity::Intensity};

use crate::config::{Scenario, SimulationArgs, merge_simulation_args};

#[derive(Debug, Clone, Args)]
/// inspect the traffic intensity over time, without sending any request
pub struct CurveCommand {
    #[clap(flatten)]
    simulation: Option<SimulationArgs>,

    #[arg(long)]
    /// Scenario to inspect,
    /// manually defined parameters overwrite scenario parameters.
    scenario: Option<Scenario>,

    /// interval between two samples
    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    step: f64,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// Upper bound on the amount of samples a single inspection may produce.
const MAX_SAMPLES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct CurveSample {
    second: f64,
    rate_per_minute: f64,
    tick_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct CurveSummary {
    min_rate_per_minute: f64,
    max_rate_per_minute: f64,
    expected_arrivals: f64,
    peak_tick_probability: f64,
}

pub fn exec(args: CurveCommand) -> Result<(), BoxError> {
    let cfg = merge_simulation_args(args.scenario, args.simulation).into_simulation_config(None);
    cfg.validate().context("validate simulation config")?;

    if !(args.step.is_finite() && args.step > 0.) {
        return Err(BoxError::from(format!(
            "step has to be a positive number of seconds: {}",
            args.step
        )));
    }

    let intensity = cfg.intensity();
    let samples = sample_curve(
        &intensity,
        cfg.ticks_per_second,
        cfg.duration_minutes * 60.,
        args.step,
    )?;
    let summary = summarize(&intensity, cfg.ticks_per_second, cfg.duration_minutes, &samples);

    tracing::debug!("sampled {} point(s) of the intensity curve", samples.len());

    if args.json {
        for sample in &samples {
            let line = serde_json::json!({ "type": "sample", "sample": sample });
            println!("{line}");
        }
        let line = serde_json::json!({ "type": "summary", "summary": summary });
        println!("{line}");
    } else {
        for sample in &samples {
            println!(
                "t={:.1}s rpm={:.3} p={:.6}",
                sample.second, sample.rate_per_minute, sample.tick_probability,
            );
        }
        println!(
            "min_rpm={:.3} max_rpm={:.3} expected_arrivals={:.1} peak_p={:.6}",
            summary.min_rate_per_minute,
            summary.max_rate_per_minute,
            summary.expected_arrivals,
            summary.peak_tick_probability,
        );
    }

    Ok(())
}

/// Amount of samples taken every `step_secs` within `[0, duration_secs]`.
fn sample_count(duration_secs: f64, step_secs: f64) -> Result<usize, BoxError> {
    let count = (duration_secs / step_secs).floor() + 1.;
    if !count.is_finite() || count > MAX_SAMPLES as f64 {
        return Err(BoxError::from(format!(
            "a step of {step_secs}s over {duration_secs}s gives more than {MAX_SAMPLES} samples"
        )));
    }
    Ok(count as usize)
}

/// Sample the intensity every `step_secs`, from 0 up to and including `duration_secs`.
fn sample_curve<I: Intensity + ?Sized>(
    intensity: &I,
    ticks_per_second: u32,
    duration_secs: f64,
    step_secs: f64,
) -> Result<Vec<CurveSample>, BoxError> {
    let count = sample_count(duration_secs, step_secs)?;
    Ok((0..count)
        .map(|i| {
            let second = i as f64 * step_secs;
            let rate_per_minute = intensity.rate_at(second / 60.);
            CurveSample {
                second,
                rate_per_minute,
                tick_probability: tick_probability(rate_per_minute, ticks_per_second),
            }
        })
        .collect())
}

fn summarize<I: Intensity + ?Sized>(
    intensity: &I,
    ticks_per_second: u32,
    duration_minutes: f64,
    samples: &[CurveSample],
) -> CurveSummary {
    let (min_rate_per_minute, max_rate_per_minute) = samples.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), sample| (min.min(sample.rate_per_minute), max.max(sample.rate_per_minute)),
    );
    CurveSummary {
        min_rate_per_minute,
        max_rate_per_minute,
        expected_arrivals: intensity.expected_arrivals(duration_minutes),
        peak_tick_probability: tick_probability(intensity.peak_rate(), ticks_per_second),
    }
}

#[cfg(test)]
mod tests {
    use wavebench_lib::intensity::{ConstantIntensity, CosineIntensity};

    use super::*;

    #[test]
    fn samples_cover_duration_inclusive() {
        let intensity = CosineIntensity::with_base_rate(20.);
        let samples = sample_curve(&intensity, 1000, 600., 1.).unwrap();
        assert_eq!(samples.len(), 601);
        assert_eq!(samples[0].second, 0.);
        assert!((samples[0].rate_per_minute - 20.).abs() < 1e-9);
        assert_eq!(samples[600].second, 600.);

        let samples = sample_curve(&intensity, 1000, 10., 3.).unwrap();
        let seconds: Vec<_> = samples.iter().map(|s| s.second).collect();
        assert_eq!(seconds, [0., 3., 6., 9.]);
    }

    #[test]
    fn sample_probability_matches_rate() {
        let intensity = ConstantIntensity::new(60.);
        let samples = sample_curve(&intensity, 100, 2., 1.).unwrap();
        for sample in samples {
            assert!((sample.tick_probability - 0.01).abs() < 1e-12);
        }
    }

    #[test]
    fn tiny_step_is_rejected() {
        let intensity = ConstantIntensity::new(60.);
        for step in [1e-300, 1e-9, 1e-4] {
            assert!(sample_curve(&intensity, 1000, 600., step).is_err(), "step {step}");
        }
        assert_eq!(sample_count(600., 0.5).unwrap(), 1201);
        assert_eq!(sample_count(0.5, 1.).unwrap(), 1);
    }

    #[test]
    fn summary_of_cosine_curve() {
        let intensity = CosineIntensity::with_base_rate(20.);
        let samples = sample_curve(&intensity, 1000, 600., 1.).unwrap();
        let summary = summarize(&intensity, 1000, 10., &samples);

        assert!((summary.min_rate_per_minute - 20.).abs() < 1e-6);
        assert!(summary.max_rate_per_minute > 59.9);
        assert!(summary.max_rate_per_minute <= 60. + 1e-9);
        assert!((summary.expected_arrivals - intensity.expected_arrivals(10.)).abs() < 1e-12);
        assert!((summary.peak_tick_probability - 0.001).abs() < 1e-12);
    }
}
