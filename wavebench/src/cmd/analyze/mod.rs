use std::{path::PathBuf, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing,
};

use clap::Args;
use wavebench_lib::analysis::{self, AnalysisReport, BucketFilter, Recordings};

#[derive(Debug, Clone, Args)]
/// analyse the recordings downloaded after a run: latency and service time per cpu usage
pub struct AnalyzeCommand {
    /// recordings file, as downloaded by the run command
    #[arg(value_name = "FILE", required = true)]
    path: PathBuf,

    /// length of the windows over which cpu samples are averaged
    #[arg(long, value_name = "SECONDS", default_value_t = 10.)]
    window: f64,

    /// only report cpu usage above this percentage
    #[arg(long, value_name = "PERCENT", default_value_t = 5.)]
    min_cpu: f64,

    /// only report cpu usage below this percentage
    #[arg(long, value_name = "PERCENT", default_value_t = 95.)]
    max_cpu: f64,

    /// only report buckets with an average latency below this value
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 1000.)]
    max_latency: f64,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,
}

pub async fn exec(args: AnalyzeCommand) -> Result<(), BoxError> {
    let window = parse_window(args.window)?;
    let filter = BucketFilter {
        min_cpu_percent: args.min_cpu,
        max_cpu_percent: args.max_cpu,
        max_latency_ms: args.max_latency,
    };

    let payload = tokio::fs::read(&args.path)
        .await
        .context("read recordings file")
        .with_context_debug_field("path", || args.path.clone())?;
    let recordings: Recordings = serde_json::from_slice(&payload)
        .context("json-decode recordings")
        .with_context_debug_field("path", || args.path.clone())?;

    let report = analysis::analyze(&recordings, window, &filter).context("analyze recordings")?;
    if report.cpu_samples == 0 {
        tracing::warn!("recordings contain no cpu samples: requests cannot be bucketed");
    }
    tracing::debug!(?report, "analysis finished");

    print_report(&report, args.json);
    Ok(())
}

fn parse_window(secs: f64) -> Result<Duration, BoxError> {
    if !(secs.is_finite() && secs > 0.) {
        return Err(BoxError::from(format!(
            "window has to be a positive number of seconds: {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs).context("window as duration")
}

fn print_report(report: &AnalysisReport, json: bool) {
    if json {
        for bucket in &report.buckets {
            let line = serde_json::json!({
                "type": "bucket",
                "bucket": bucket,
                "service_time_ms": bucket.service_time_ms(),
            });
            println!("{line}");
        }
        let line = serde_json::json!({
            "type": "summary",
            "requests": report.requests,
            "cpu_samples": report.cpu_samples,
            "cpu_windows": report.cpu_windows,
            "unbucketed": report.unbucketed,
            "median_service_time_ms": report.median_service_time_ms,
            "latency_trend": report.latency_trend,
        });
        println!("{line}");
        return;
    }

    for bucket in &report.buckets {
        println!(
            "cpu={:>3}% requests={} latency={:.2}ms service={:.2}ms",
            bucket.cpu_percent,
            bucket.requests,
            bucket.average_latency_ms,
            bucket.service_time_ms(),
        );
    }
    println!(
        "requests={} cpu_samples={} windows={} unbucketed={}",
        report.requests, report.cpu_samples, report.cpu_windows, report.unbucketed,
    );
    match report.median_service_time_ms {
        Some(median) => println!("median_service_time={median:.2}ms"),
        None => println!("median_service_time=n/a"),
    }
    if let Some(trend) = report.latency_trend {
        println!(
            "latency_trend={:.3}ms per cpu% + {:.2}ms",
            trend.slope, trend.intercept
        );
    }
}
