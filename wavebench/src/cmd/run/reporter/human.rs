use std::time::Duration;

use wavebench_lib::arrival::ArrivalEvent;

use super::{Counters, Reporter, RequestResultEvent, TickGate};

pub struct HumanReporter {
    gate: TickGate,
    interval_counts: Counters,
    total_counts: Counters,
    arrivals: u64,
    last_progress: f64,
}

impl HumanReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            gate: TickGate::new(interval),
            interval_counts: Counters::default(),
            total_counts: Counters::default(),
            arrivals: 0,
            last_progress: 0.,
        }
    }
}

impl Reporter for HumanReporter {
    fn on_arrival(&mut self, ev: &ArrivalEvent) {
        self.arrivals += 1;
        self.last_progress = ev.progress_percent;
        println!(
            "request #{} | {:.2}% (minute {:.2})",
            ev.sequence_number, ev.progress_percent, ev.elapsed_minutes,
        );
    }

    fn on_result(&mut self, ev: &RequestResultEvent) {
        self.interval_counts.record(&ev.outcome);
        self.total_counts.record(&ev.outcome);
    }

    fn on_tick(&mut self, now: Duration) {
        if !self.gate.pass(now) {
            return;
        }

        let rpm = self.interval_counts.total as f64 * 60. / self.gate.interval.as_secs_f64();

        println!(
            "t={:.1}s progress={:.1}% arrivals={} rpm={:.1} ok={} http_fail={} other_fail={} total_ok={} total_fail={}",
            now.as_secs_f64(),
            self.last_progress,
            self.arrivals,
            rpm,
            self.interval_counts.ok,
            self.interval_counts.http_fail,
            self.interval_counts.other_fail,
            self.total_counts.ok,
            self.total_counts.failed(),
        );

        self.interval_counts = Counters::default();
    }

    fn finish(&mut self) {
        println!(
            "done arrivals={} ok={} http_fail={} other_fail={} total={}",
            self.arrivals,
            self.total_counts.ok,
            self.total_counts.http_fail,
            self.total_counts.other_fail,
            self.total_counts.total,
        );
    }
}
