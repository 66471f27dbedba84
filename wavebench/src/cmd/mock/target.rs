use std::{
    convert::Infallible,
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use rama::{
    Service,
    http::{
        Body, Method, Request, Response, StatusCode,
        headers::ContentType,
        service::web::response::{Headers, IntoResponse},
    },
    telemetry::tracing,
};
use wavebench_lib::analysis::{CpuSample, Recordings, RequestRecord};

/// Utilisation is capped below saturation, so latencies stay finite.
const MAX_UTILISATION: f64 = 0.95;

/// In-memory stand-in for the regression-monitored service.
///
/// The index route is slowed down proportional to
/// `regression_level * regression_magnitude`, and queues up like a single
/// server: at utilisation `U` a request takes `1 / (1 - U)` times longer.
/// All other routes drive the state of that regression and the recordings.
#[derive(Debug)]
pub struct MockTarget {
    base_latency: f64,
    jitter: f64,
    capacity: u32,
    in_flight: AtomicU32,
    regression_level: AtomicU32,
    regression_magnitude: AtomicU32,
    records: Mutex<Recordings>,
}

struct InFlight<'a>(&'a AtomicU32);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl MockTarget {
    /// `capacity` is the amount of concurrent requests at which the target is fully utilised.
    pub fn new(base_latency: f64, jitter: f64, capacity: u32) -> Self {
        Self {
            base_latency,
            jitter,
            capacity: capacity.max(1),
            in_flight: AtomicU32::new(0),
            regression_level: AtomicU32::new(0),
            regression_magnitude: AtomicU32::new(1),
            records: Mutex::new(Recordings::default()),
        }
    }

    pub fn regression_level(&self) -> u32 {
        self.regression_level.load(Ordering::Acquire)
    }

    pub fn regression_magnitude(&self) -> u32 {
        self.regression_magnitude.load(Ordering::Acquire)
    }

    pub fn records(&self) -> Recordings {
        self.records.lock().clone()
    }

    /// Fraction of the capacity in use, in `[0, MAX_UTILISATION]`.
    pub fn utilisation(&self) -> f64 {
        let in_flight = self.in_flight.load(Ordering::Acquire) as f64;
        (in_flight / self.capacity as f64).min(MAX_UTILISATION)
    }

    /// Record the current utilisation as a cpu sample.
    pub fn sample_cpu(&self) {
        let sample = CpuSample {
            time: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
            cpu_percent: self.utilisation() * 100.,
        };
        self.records.lock().cpu_samples.push(sample);
    }

    fn compute_delay(
        &self,
        regression_level: u32,
        regression_magnitude: u32,
        utilisation: f64,
    ) -> Duration {
        let slowdown = 1. + (regression_level as f64 * regression_magnitude as f64);
        let queueing = 1. / (1. - utilisation.clamp(0., MAX_UTILISATION));
        let base = self.base_latency.max(0.0) * slowdown * queueing;
        let jitter = self.jitter.max(0.0);

        if jitter == 0.0 {
            return Duration::try_from_secs_f64(base).unwrap_or(Duration::MAX);
        }

        let span = jitter * 2.0;
        let u: f64 = rand::random();
        let delta = (u * span) - jitter;

        Duration::try_from_secs_f64((base + delta).max(0.0)).unwrap_or(Duration::MAX)
    }

    async fn serve_index(&self) -> Response {
        let time_requested = humantime::format_rfc3339_millis(SystemTime::now()).to_string();
        let regression_level = self.regression_level();
        let regression_magnitude = self.regression_magnitude();

        let utilisation = self.utilisation();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let _in_flight = InFlight(&self.in_flight);

        let delay = self.compute_delay(regression_level, regression_magnitude, utilisation);
        if delay.as_nanos() > 0 {
            tokio::time::sleep(delay).await;
        }

        self.records.lock().requests.push(RequestRecord {
            time_requested,
            duration_ms: delay.as_secs_f64() * 1000.,
            regression_level,
            regression_magnitude,
        });

        "ok".into_response()
    }

    fn serve_records(&self) -> Response {
        let records = self.records();
        match serde_json::to_vec(&records) {
            Ok(payload) => (
                StatusCode::OK,
                Headers::single(ContentType::json()),
                Body::from(payload),
            )
                .into_response(),
            Err(err) => {
                tracing::error!(
                    "failed to json-encode {} record(s): {err}",
                    records.requests.len()
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    fn set_value(property: &AtomicU32, name: &str, raw: &str) -> Response {
        match raw.parse::<u32>() {
            Ok(value) => {
                property.store(value, Ordering::Release);
                tracing::info!("{name} set to {value}");
                format!("{name} set to {value}").into_response()
            }
            Err(err) => {
                tracing::debug!("invalid {name} '{raw}': {err}");
                (StatusCode::BAD_REQUEST, format!("invalid {name}: {raw}")).into_response()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Index,
    SetRegressionLevel(&'a str),
    SetRegressionMagnitude(&'a str),
    ClearDb,
    GetDb,
    NotFound,
}

fn route(path: &str) -> Route<'_> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Route::Index;
    }
    match path.split_once('/') {
        Some(("set_regression_level", value)) => Route::SetRegressionLevel(value),
        Some(("set_regression_magnitude", value)) => Route::SetRegressionMagnitude(value),
        Some(_) => Route::NotFound,
        None => match path {
            "clear_db" => Route::ClearDb,
            "get_db" => Route::GetDb,
            _ => Route::NotFound,
        },
    }
}

impl Service<Request> for MockTarget {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        if req.method() != Method::GET {
            return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
        }

        Ok(match route(req.uri().path()) {
            Route::Index => self.serve_index().await,
            Route::SetRegressionLevel(raw) => {
                Self::set_value(&self.regression_level, "regression level", raw)
            }
            Route::SetRegressionMagnitude(raw) => {
                Self::set_value(&self.regression_magnitude, "regression magnitude", raw)
            }
            Route::ClearDb => {
                let cleared = std::mem::take(&mut *self.records.lock());
                tracing::info!(
                    "cleared {} record(s) and {} cpu sample(s)",
                    cleared.requests.len(),
                    cleared.cpu_samples.len()
                );
                "ok".into_response()
            }
            Route::GetDb => self.serve_records(),
            Route::NotFound => StatusCode::NOT_FOUND.into_response(),
        })
    }
}
