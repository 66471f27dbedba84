//! Discrete request arrivals derived from a continuous [`Intensity`].
//!
//! The generator approximates a non-homogeneous Poisson process with one
//! Bernoulli trial per clock tick: over a tick of `1 / ticks_per_second`
//! seconds, an arrival happens with probability `rate_per_second × tick`.
//! The approximation holds as long as that probability stays well below one,
//! see [`crate::config::ConfigurationWarning::ProbabilityOverflow`].

use std::time::Duration;

use rama::telemetry::tracing;
use rand::{RngExt as _, SeedableRng as _, rngs::StdRng};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    clock::SimulationClock,
    config::{self, ConfigError, SimulationConfig},
    intensity::Intensity,
};


/// A single "emit a request now" decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrivalEvent {
    /// 1-based, gapless.
    pub sequence_number: u64,
    /// Simulated time at which the event was emitted.
    pub elapsed_minutes: f64,
    /// `elapsed_minutes` relative to the total simulation length, in `[0, 100)`.
    pub progress_percent: f64,
}

/// Source of uniformly distributed samples in `[0, 1)`.
pub trait UniformSource: Send + 'static {
    fn next_uniform(&mut self) -> f64;
}

impl UniformSource for StdRng {
    #[inline(always)]
    fn next_uniform(&mut self) -> f64 {
        self.random::<f64>()
    }
}

/// Receives arrivals as they are emitted.
///
/// Called from within the tick loop, so implementations must not block.
/// Any follow-up work (e.g. the actual request) belongs in its own task.
pub trait ArrivalSink {
    fn on_arrival(&mut self, event: ArrivalEvent);
}

impl ArrivalSink for mpsc::UnboundedSender<ArrivalEvent> {
    fn on_arrival(&mut self, event: ArrivalEvent) {
        if let Err(err) = self.send(event) {
            tracing::debug!(
                sequence_number = err.0.sequence_number,
                "arrival receiver dropped: discard event"
            );
        }
    }
}

impl ArrivalSink for Vec<ArrivalEvent> {
    #[inline(always)]
    fn on_arrival(&mut self, event: ArrivalEvent) {
        self.push(event);
    }
}

/// Per-tick emission probability for the given rate (requests per minute).
///
/// Not clamped: values above one mean the tick rate is too low for the rate.
#[inline]
pub fn tick_probability(rate_per_minute: f64, ticks_per_second: u32) -> f64 {
    rate_per_minute / (ticks_per_second as f64 * 60.)
}

/// Bernoulli trial outcome for a drawn `sample` against `probability`.
#[inline]
pub fn should_emit(probability: f64, sample: f64) -> bool {
    sample < probability
}

/// Observable lifecycle of an [`ArrivalGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created, clock not yet started.
    Idle,
    /// Ticking.
    Running,
    /// Clock expired. Terminal.
    Done,
}

enum GenState {
    Idle,
    Running {
        clock: SimulationClock,
        /// Whether a tick already ran and the loop owes one tick of suspension.
        suspend_before_tick: bool,
    },
    Done,
}

/// Converts an [`Intensity`] into a lazy, finite stream of [`ArrivalEvent`]s.
///
/// The clock starts on the first call to [`ArrivalGenerator::next_event`] and
/// the stream ends once it expires. There is no way to reset a generator.
pub struct ArrivalGenerator<I, U = StdRng> {
    intensity: I,
    ticks_per_second: u32,
    tick_interval: Duration,
    duration: Duration,
    uniform: U,
    state: GenState,
    sequence_number: u64,
}

impl<I: Intensity> ArrivalGenerator<I, StdRng> {
    /// Create a generator drawing from an OS-seeded random source.
    pub fn try_new(intensity: I, ticks_per_second: u32, duration: Duration) -> Result<Self, ConfigError> {
        Self::try_new_with_uniform_source(
            intensity,
            ticks_per_second,
            duration,
            StdRng::from_rng(&mut rand::rng()),
        )
    }

    /// Create a generator whose random draws are reproducible.
    pub fn try_new_seeded(
        intensity: I,
        ticks_per_second: u32,
        duration: Duration,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::try_new_with_uniform_source(
            intensity,
            ticks_per_second,
            duration,
            StdRng::seed_from_u64(seed),
        )
    }
}

impl ArrivalGenerator<Box<dyn Intensity>, StdRng> {
    /// Create the generator described by `cfg`.
    ///
    /// Invalid configs are rejected, configuration warnings
    /// do not prevent creation and are left to [`SimulationConfig::validate`].
    pub fn from_config(cfg: &SimulationConfig) -> Result<Self, ConfigError> {
        cfg.check()?;
        match cfg.seed {
            Some(seed) => {
                Self::try_new_seeded(cfg.intensity(), cfg.ticks_per_second, cfg.duration(), seed)
            }
            None => Self::try_new(cfg.intensity(), cfg.ticks_per_second, cfg.duration()),
        }
    }
}

impl<I: Intensity, U: UniformSource> ArrivalGenerator<I, U> {
    pub fn try_new_with_uniform_source(
        intensity: I,
        ticks_per_second: u32,
        duration: Duration,
        uniform: U,
    ) -> Result<Self, ConfigError> {
        let tick_interval = config::tick_interval(ticks_per_second)?;
        config::ensure_schedulable("duration", duration)?;

        Ok(Self {
            intensity,
            ticks_per_second,
            tick_interval,
            duration,
            uniform,
            state: GenState::Idle,
            sequence_number: 0,
        })
    }

    pub fn state(&self) -> GeneratorState {
        match self.state {
            GenState::Idle => GeneratorState::Idle,
            GenState::Running { .. } => GeneratorState::Running,
            GenState::Done => GeneratorState::Done,
        }
    }

    /// Amount of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.sequence_number
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Tick until the next arrival.
    ///
    /// Returns `None` once the simulation clock expired,
    /// and for every call after that.
    pub async fn next_event(&mut self) -> Option<ArrivalEvent> {
        loop {
            let (clock, suspend_before_tick) = match &mut self.state {
                GenState::Done => return None,
                GenState::Idle => {
                    tracing::debug!(
                        ticks_per_second = self.ticks_per_second,
                        duration = ?self.duration,
                        "arrival generator: start simulation clock"
                    );
                    self.state = GenState::Running {
                        clock: SimulationClock::start(self.duration, self.tick_interval),
                        suspend_before_tick: false,
                    };
                    continue;
                }
                GenState::Running {
                    clock,
                    suspend_before_tick,
                } => (clock, suspend_before_tick),
            };

            if *suspend_before_tick {
                clock.wait_tick().await;
            }
            *suspend_before_tick = true;

            if clock.is_expired() {
                tracing::debug!(
                    emitted = self.sequence_number,
                    elapsed = ?clock.elapsed(),
                    "arrival generator: simulation clock expired"
                );
                self.state = GenState::Done;
                return None;
            }

            let elapsed_minutes = clock.elapsed_minutes();
            let probability = tick_probability(
                self.intensity.rate_at(elapsed_minutes),
                self.ticks_per_second,
            );

            if should_emit(probability, self.uniform.next_uniform()) {
                self.sequence_number += 1;
                return Some(ArrivalEvent {
                    sequence_number: self.sequence_number,
                    elapsed_minutes,
                    progress_percent: elapsed_minutes / clock.total_minutes() * 100.,
                });
            }
        }
    }

    /// Drive the generator until the clock expires, handing every event to `sink`.
    ///
    /// Returns the amount of emitted events.
    pub async fn run<S: ArrivalSink + ?Sized>(mut self, sink: &mut S) -> u64 {
        while let Some(event) = self.next_event().await {
            sink.on_arrival(event);
        }
        self.sequence_number
    }
}

impl<I, U> std::fmt::Debug for ArrivalGenerator<I, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrivalGenerator")
            .field("ticks_per_second", &self.ticks_per_second)
            .field("tick_interval", &self.tick_interval)
            .field("duration", &self.duration)
            .field("sequence_number", &self.sequence_number)
            .finish()
    }
}
