use std::time::{Duration, SystemTime};

use wavebench_lib::arrival::ArrivalEvent;

mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

pub trait Reporter: Send + Sync + 'static {
    fn on_arrival(&mut self, ev: &ArrivalEvent);
    fn on_result(&mut self, ev: &RequestResultEvent);
    fn on_tick(&mut self, now: Duration);
    fn finish(&mut self);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters {
    total: u64,
    ok: u64,
    http_fail: u64,
    other_fail: u64,
}

impl Counters {
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.total += 1;
        if outcome.ok {
            self.ok += 1;
            return;
        }
        match outcome.failure {
            Some(FailureKind::HttpStatus) => self.http_fail += 1,
            _ => self.other_fail += 1,
        }
    }

    fn failed(&self) -> u64 {
        self.total - self.ok
    }

    fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total": self.total,
            "ok": self.ok,
            "http_fail": self.http_fail,
            "other_fail": self.other_fail,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    HttpStatus,
    Other,
}

impl FailureKind {
    fn as_str(self) -> &'static str {
        match self {
            FailureKind::HttpStatus => "http_status",
            FailureKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub ok: bool,
    pub status: Option<u16>,
    pub failure: Option<FailureKind>,
}

impl RequestOutcome {
    /// Classify a received http response status.
    /// Redirects count as ok, the target is not followed.
    pub fn from_status(status: u16) -> Self {
        if (200..400).contains(&status) {
            Self {
                ok: true,
                status: Some(status),
                failure: None,
            }
        } else {
            Self {
                ok: false,
                status: Some(status),
                failure: Some(FailureKind::HttpStatus),
            }
        }
    }

    /// Request never produced a response (connect error, timeout, ...).
    pub fn other_failure() -> Self {
        Self {
            ok: false,
            status: None,
            failure: Some(FailureKind::Other),
        }
    }
}

#[derive(Debug)]
pub struct RequestResultEvent {
    pub ts: SystemTime,
    pub elapsed: Duration,
    pub sequence_number: u64,
    pub latency: Duration,
    pub outcome: RequestOutcome,
}

/// Interval gate shared by the reporters.
#[derive(Debug)]
struct TickGate {
    interval: Duration,
    last_tick: Duration,
}

impl TickGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: Duration::ZERO,
        }
    }

    fn pass(&mut self, now: Duration) -> bool {
        if now.saturating_sub(self.last_tick) < self.interval {
            return false;
        }
        self.last_tick = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_classification() {
        assert!(RequestOutcome::from_status(200).ok);
        assert!(RequestOutcome::from_status(302).ok);

        let outcome = RequestOutcome::from_status(503);
        assert!(!outcome.ok);
        assert_eq!(outcome.status, Some(503));
        assert_eq!(outcome.failure, Some(FailureKind::HttpStatus));

        let outcome = RequestOutcome::other_failure();
        assert!(!outcome.ok);
        assert_eq!(outcome.status, None);
        assert_eq!(outcome.failure, Some(FailureKind::Other));
    }

    #[test]
    fn counters_split_failures() {
        let mut counters = Counters::default();
        counters.record(&RequestOutcome::from_status(200));
        counters.record(&RequestOutcome::from_status(204));
        counters.record(&RequestOutcome::from_status(404));
        counters.record(&RequestOutcome::other_failure());

        assert_eq!(
            counters,
            Counters {
                total: 4,
                ok: 2,
                http_fail: 1,
                other_fail: 1,
            }
        );
        assert_eq!(counters.failed(), 2);
        assert_eq!(counters.as_json()["http_fail"], 1);
    }

    #[test]
    fn tick_gate_respects_interval() {
        let mut gate = TickGate::new(Duration::from_secs(10));
        assert!(!gate.pass(Duration::from_secs(3)));
        assert!(gate.pass(Duration::from_secs(10)));
        assert!(!gate.pass(Duration::from_secs(19)));
        assert!(gate.pass(Duration::from_secs(21)));
    }
}
