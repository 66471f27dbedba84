//! Post-run analysis of the recordings collected from a target.
//!
//! Utilisation samples are averaged per time window. Each request is then
//! attributed to the window nearest in time, which yields the mean latency
//! per utilisation percentage. Under a single-server queueing model the
//! residence time is `R = S / (1 - U)`, so the service time `S` follows as
//! `R × (1 - U)`.

use std::time::{Duration, SystemTime};

use serde::Serialize;

mod recordings;

pub use self::recordings::{CpuSample, Recordings, RecordingsError, RequestRecord};

/// A value observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub time: SystemTime,
    pub value: f64,
}

/// One bucket per whole utilisation percentage, `0..=100`.
pub const CPU_BUCKETS: usize = 101;

/// Average the time-ordered `measurements` per `window`.
///
/// Windows are anchored at the first measurement. Each resulting measurement
/// sits in the middle of its window. Windows without measurements are skipped.
pub fn average_for_windows(measurements: &[Measurement], window: Duration) -> Vec<Measurement> {
    let Some(first) = measurements.first() else {
        return Vec::new();
    };
    if window.is_zero() {
        return measurements.to_vec();
    }

    let mut averages = Vec::new();
    let mut window_start = first.time;
    let mut sum = 0.;
    let mut count = 0usize;

    for measurement in measurements {
        while measurement.time >= window_start + window {
            if count > 0 {
                averages.push(Measurement {
                    time: window_start + window / 2,
                    value: sum / count as f64,
                });
                sum = 0.;
                count = 0;
            }
            window_start += window;
        }
        sum += measurement.value;
        count += 1;
    }

    if count > 0 {
        averages.push(Measurement {
            time: window_start + window / 2,
            value: sum / count as f64,
        });
    }
    averages
}

/// The measurement of the time-ordered `sorted` slice nearest to `time`.
///
/// On a tie the earlier measurement wins.
pub fn closest_measurement(sorted: &[Measurement], time: SystemTime) -> Option<&Measurement> {
    let index = sorted.partition_point(|m| m.time < time);
    let before = index.checked_sub(1).and_then(|i| sorted.get(i));
    let after = sorted.get(index);
    match (before, after) {
        (Some(before), Some(after)) => {
            if distance(after.time, time) < distance(before.time, time) {
                Some(after)
            } else {
                Some(before)
            }
        }
        (before, after) => before.or(after),
    }
}

fn distance(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b).unwrap_or_else(|err| err.duration())
}

/// Index of the bucket for a utilisation percentage.
pub fn cpu_bucket(cpu_percent: f64) -> usize {
    cpu_percent.round().clamp(0., 100.) as usize
}

/// Time a request spends being served, excluding the time it spent queued.
pub fn service_time(latency: f64, cpu_percent: f64) -> f64 {
    latency * (1. - cpu_percent / 100.)
}

/// Median, averaging the two middle values for an even amount of values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.
    } else {
        sorted[mid]
    })
}

/// Least-squares line through a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// `None` for less than two points or when all points share the same x.
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (covariance, variance) = points.iter().fold((0., 0.), |(cov, var), (x, y)| {
            let dx = x - mean_x;
            (cov + dx * (y - mean_y), var + dx * dx)
        });
        if variance == 0. {
            return None;
        }

        let slope = covariance / variance;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Request latencies grouped by the utilisation at the time of the request.
#[derive(Debug, Clone)]
pub struct LatencyBuckets {
    buckets: Vec<Vec<f64>>,
    unbucketed: usize,
}

impl Default for LatencyBuckets {
    fn default() -> Self {
        Self {
            buckets: vec![Vec::new(); CPU_BUCKETS],
            unbucketed: 0,
        }
    }
}

impl LatencyBuckets {
    /// Attribute every residence time to the nearest (averaged) utilisation measurement.
    ///
    /// Without any utilisation measurement all requests stay unbucketed.
    pub fn populate(residence_times: &[Measurement], cpu_usage: &[Measurement]) -> Self {
        let mut buckets = Self::default();
        for request in residence_times {
            match closest_measurement(cpu_usage, request.time) {
                Some(cpu) => buckets.buckets[cpu_bucket(cpu.value)].push(request.value),
                None => buckets.unbucketed += 1,
            }
        }
        buckets
    }

    pub fn latencies(&self, cpu_percent: usize) -> &[f64] {
        self.buckets.get(cpu_percent).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn average_latency(&self, cpu_percent: usize) -> Option<f64> {
        let latencies = self.latencies(cpu_percent);
        (!latencies.is_empty()).then(|| latencies.iter().sum::<f64>() / latencies.len() as f64)
    }

    /// Requests which could not be attributed to any utilisation.
    pub fn unbucketed(&self) -> usize {
        self.unbucketed
    }

    /// Mean latency of every non-empty bucket, by increasing utilisation.
    pub fn averages(&self) -> impl Iterator<Item = BucketLatency> + '_ {
        (0..CPU_BUCKETS).filter_map(|cpu_percent| {
            self.average_latency(cpu_percent)
                .map(|average_latency_ms| BucketLatency {
                    cpu_percent,
                    requests: self.latencies(cpu_percent).len(),
                    average_latency_ms,
                })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketLatency {
    pub cpu_percent: usize,
    pub requests: usize,
    pub average_latency_ms: f64,
}

impl BucketLatency {
    pub fn service_time_ms(&self) -> f64 {
        service_time(self.average_latency_ms, self.cpu_percent as f64)
    }
}

/// Buckets worth reporting: the extremes of the utilisation range
/// and outlier latencies are left out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketFilter {
    /// Exclusive lower utilisation bound.
    pub min_cpu_percent: f64,
    /// Exclusive upper utilisation bound.
    pub max_cpu_percent: f64,
    /// Exclusive upper latency bound.
    pub max_latency_ms: f64,
}

impl Default for BucketFilter {
    fn default() -> Self {
        Self {
            min_cpu_percent: 5.,
            max_cpu_percent: 95.,
            max_latency_ms: 1000.,
        }
    }
}

impl BucketFilter {
    pub fn accepts(&self, bucket: &BucketLatency) -> bool {
        let cpu = bucket.cpu_percent as f64;
        bucket.average_latency_ms > 0.
            && bucket.average_latency_ms < self.max_latency_ms
            && cpu > self.min_cpu_percent
            && cpu < self.max_cpu_percent
    }
}

/// Outcome of [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub requests: usize,
    pub cpu_samples: usize,
    pub cpu_windows: usize,
    pub unbucketed: usize,
    /// Buckets accepted by the [`BucketFilter`], by increasing utilisation.
    pub buckets: Vec<BucketLatency>,
    pub median_service_time_ms: Option<f64>,
    /// Latency as a linear function of utilisation.
    pub latency_trend: Option<LinearFit>,
}

/// Latency per utilisation bucket and the median service time of the reported buckets.
pub fn analyze(
    recordings: &Recordings,
    window: Duration,
    filter: &BucketFilter,
) -> Result<AnalysisReport, RecordingsError> {
    let residence_times = recordings.residence_times()?;
    let cpu_usage = recordings.cpu_usage()?;
    let cpu_windows = average_for_windows(&cpu_usage, window);

    let latency_buckets = LatencyBuckets::populate(&residence_times, &cpu_windows);
    let buckets: Vec<_> = latency_buckets
        .averages()
        .filter(|bucket| filter.accepts(bucket))
        .collect();

    let service_times: Vec<_> = buckets.iter().map(BucketLatency::service_time_ms).collect();
    let points: Vec<_> = buckets
        .iter()
        .map(|b| (b.cpu_percent as f64, b.average_latency_ms))
        .collect();

    Ok(AnalysisReport {
        requests: residence_times.len(),
        cpu_samples: cpu_usage.len(),
        cpu_windows: cpu_windows.len(),
        unbucketed: latency_buckets.unbucketed(),
        median_service_time_ms: median(&service_times),
        latency_trend: LinearFit::from_points(&points),
        buckets,
    })
}

#[cfg(test)]
mod tests;
