use std::time::Duration;

use wavebench_lib::arrival::ArrivalEvent;

use super::{Counters, Reporter, RequestResultEvent, TickGate};

pub struct JsonlReporter {
    gate: TickGate,
    interval_counts: Counters,
    total_counts: Counters,
    arrivals: u64,
    last_progress: f64,
    emit_events: bool,
}

impl JsonlReporter {
    pub fn new(interval: Duration, emit_events: bool) -> Self {
        Self {
            gate: TickGate::new(interval),
            interval_counts: Counters::default(),
            total_counts: Counters::default(),
            arrivals: 0,
            last_progress: 0.,
            emit_events,
        }
    }
}

impl Reporter for JsonlReporter {
    fn on_arrival(&mut self, ev: &ArrivalEvent) {
        self.arrivals += 1;
        self.last_progress = ev.progress_percent;

        if self.emit_events {
            let line = serde_json::json!({
                "type": "arrival",
                "arrival": ev,
            });
            println!("{line}");
        }
    }

    fn on_result(&mut self, ev: &RequestResultEvent) {
        self.interval_counts.record(&ev.outcome);
        self.total_counts.record(&ev.outcome);

        if self.emit_events {
            let line = serde_json::json!({
                "type": "event",
                "ts": humantime::format_rfc3339_millis(ev.ts).to_string(),
                "t_ms": ev.elapsed.as_millis(),
                "sequence_number": ev.sequence_number,
                "latency_ms": ev.latency.as_millis(),
                "ok": ev.outcome.ok,
                "status": ev.outcome.status,
                "failure": ev.outcome.failure.map(|kind| kind.as_str()),
            });
            println!("{line}");
        }
    }

    fn on_tick(&mut self, now: Duration) {
        if !self.gate.pass(now) {
            return;
        }

        let interval_secs = self.gate.interval.as_secs_f64();
        let rpm = if interval_secs == 0. {
            0.
        } else {
            self.interval_counts.total as f64 * 60. / interval_secs
        };

        let line = serde_json::json!({
            "type": "summary",
            "t_ms": now.as_millis(),
            "progress_percent": self.last_progress,
            "arrivals": self.arrivals,
            "interval_ms": self.gate.interval.as_millis(),
            "rpm": rpm,
            "interval": self.interval_counts.as_json(),
            "total": self.total_counts.as_json(),
        });
        println!("{line}");

        self.interval_counts = Counters::default();
    }

    fn finish(&mut self) {
        let line = serde_json::json!({
            "type": "final",
            "arrivals": self.arrivals,
            "total": self.total_counts.as_json(),
        });
        println!("{line}");
    }
}
