use super::*;

fn at(secs: f64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000) + Duration::from_secs_f64(secs)
}

fn series(points: &[(f64, f64)]) -> Vec<Measurement> {
    points
        .iter()
        .map(|&(secs, value)| Measurement {
            time: at(secs),
            value,
        })
        .collect()
}

fn timestamp(secs: f64) -> String {
    humantime::format_rfc3339_millis(at(secs)).to_string()
}

#[test]
fn windows_average_their_samples() {
    // one sample per second, 10s windows
    let samples = series(&(0..25).map(|s| (s as f64, s as f64)).collect::<Vec<_>>());
    let windows = average_for_windows(&samples, Duration::from_secs(10));

    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0].time, at(5.));
    assert_eq!(windows[0].value, 4.5);
    assert_eq!(windows[1].time, at(15.));
    assert_eq!(windows[1].value, 14.5);
    // trailing partial window
    assert_eq!(windows[2].time, at(25.));
    assert_eq!(windows[2].value, 22.);
}

#[test]
fn empty_windows_are_skipped() {
    let samples = series(&[(0., 10.), (1., 20.), (35., 50.)]);
    let windows = average_for_windows(&samples, Duration::from_secs(10));

    assert_eq!(
        windows,
        series(&[(5., 15.), (35., 50.)]),
        "the gap between 10s and 30s yields no window"
    );
}

#[test]
fn windowing_edge_cases() {
    assert!(average_for_windows(&[], Duration::from_secs(10)).is_empty());

    let samples = series(&[(0., 1.), (0.5, 3.)]);
    assert_eq!(average_for_windows(&samples, Duration::ZERO), samples);
    assert_eq!(
        average_for_windows(&samples, Duration::from_secs(10)),
        series(&[(5., 2.)])
    );
}

#[test]
fn closest_measurement_prefers_earlier_on_tie() {
    let cpu = series(&[(5., 10.), (15., 20.), (25., 30.)]);

    assert_eq!(closest_measurement(&cpu, at(0.)).unwrap().value, 10.);
    assert_eq!(closest_measurement(&cpu, at(11.)).unwrap().value, 20.);
    assert_eq!(closest_measurement(&cpu, at(9.)).unwrap().value, 10.);
    assert_eq!(closest_measurement(&cpu, at(10.)).unwrap().value, 10.);
    assert_eq!(closest_measurement(&cpu, at(15.)).unwrap().value, 20.);
    assert_eq!(closest_measurement(&cpu, at(99.)).unwrap().value, 30.);
    assert!(closest_measurement(&[], at(1.)).is_none());
}

#[test]
fn cpu_bucket_rounds_and_clamps() {
    assert_eq!(cpu_bucket(0.), 0);
    assert_eq!(cpu_bucket(42.4), 42);
    assert_eq!(cpu_bucket(42.5), 43);
    assert_eq!(cpu_bucket(100.), 100);
    assert_eq!(cpu_bucket(130.), 100);
    assert_eq!(cpu_bucket(-3.), 0);
}

#[test]
fn requests_land_in_bucket_of_nearest_window() {
    let cpu_windows = series(&[(5., 20.2), (15., 59.6)]);
    let residence = series(&[(1., 100.), (8., 300.), (12., 400.), (30., 600.)]);

    let buckets = LatencyBuckets::populate(&residence, &cpu_windows);
    assert_eq!(buckets.latencies(20), [100., 300.]);
    assert_eq!(buckets.latencies(60), [400., 600.]);
    assert_eq!(buckets.average_latency(20), Some(200.));
    assert_eq!(buckets.average_latency(60), Some(500.));
    assert_eq!(buckets.average_latency(50), None);
    assert_eq!(buckets.unbucketed(), 0);

    let averages: Vec<_> = buckets.averages().collect();
    assert_eq!(
        averages,
        [
            BucketLatency {
                cpu_percent: 20,
                requests: 2,
                average_latency_ms: 200.,
            },
            BucketLatency {
                cpu_percent: 60,
                requests: 2,
                average_latency_ms: 500.,
            },
        ]
    );
}

#[test]
fn requests_without_cpu_data_stay_unbucketed() {
    let residence = series(&[(1., 100.), (2., 200.)]);
    let buckets = LatencyBuckets::populate(&residence, &[]);
    assert_eq!(buckets.unbucketed(), 2);
    assert_eq!(buckets.averages().count(), 0);
}

#[test]
fn service_time_removes_queueing() {
    assert_eq!(service_time(200., 0.), 200.);
    assert_eq!(service_time(200., 50.), 100.);
    assert_eq!(service_time(200., 100.), 0.);
}

#[test]
fn median_of_odd_and_even_amounts() {
    assert_eq!(median(&[]), None);
    assert_eq!(median(&[3., 1., 2.]), Some(2.));
    assert_eq!(median(&[4., 1., 3., 2.]), Some(2.5));
}

#[test]
fn linear_fit_through_points() {
    let fit = LinearFit::from_points(&[(10., 25.), (20., 45.), (30., 65.)]).unwrap();
    assert!((fit.slope - 2.).abs() < 1e-12);
    assert!((fit.intercept - 5.).abs() < 1e-12);
    assert!((fit.at(50.) - 105.).abs() < 1e-9);

    assert!(LinearFit::from_points(&[(1., 1.)]).is_none());
    assert!(LinearFit::from_points(&[(1., 1.), (1., 2.)]).is_none());
}

#[test]
fn filter_drops_extremes_and_outliers() {
    let filter = BucketFilter::default();
    let bucket = |cpu_percent, average_latency_ms| BucketLatency {
        cpu_percent,
        requests: 1,
        average_latency_ms,
    };

    assert!(filter.accepts(&bucket(50, 120.)));
    assert!(!filter.accepts(&bucket(5, 120.)));
    assert!(!filter.accepts(&bucket(95, 120.)));
    assert!(!filter.accepts(&bucket(50, 1000.)));
    assert!(!filter.accepts(&bucket(50, 0.)));
}

#[test]
fn analyze_recordings_end_to_end() {
    // utilisation of 20% during the first window, 60% during the second;
    // residence times follow S / (1 - U) for a service time of 80ms
    let cpu_samples = (0..20)
        .map(|s| CpuSample {
            time: timestamp(s as f64),
            cpu_percent: if s < 10 { 20. } else { 60. },
        })
        .collect();
    let requests = [(2., 100.), (4., 100.), (12., 200.), (18., 200.), (19., 200.)]
        .into_iter()
        .map(|(secs, duration_ms)| RequestRecord {
            time_requested: timestamp(secs),
            duration_ms,
            regression_level: 0,
            regression_magnitude: 1,
        })
        .collect();
    let recordings = Recordings {
        requests,
        cpu_samples,
    };

    let report = analyze(&recordings, Duration::from_secs(10), &BucketFilter::default()).unwrap();
    assert_eq!(report.requests, 5);
    assert_eq!(report.cpu_samples, 20);
    assert_eq!(report.cpu_windows, 2);
    assert_eq!(report.unbucketed, 0);

    let cpus: Vec<_> = report.buckets.iter().map(|b| b.cpu_percent).collect();
    assert_eq!(cpus, [20, 60]);
    assert_eq!(report.buckets[1].requests, 3);

    let median = report.median_service_time_ms.unwrap();
    assert!((median - 80.).abs() < 1e-9, "{median}");

    let trend = report.latency_trend.unwrap();
    assert!((trend.slope - 2.5).abs() < 1e-9);
}

#[test]
fn analyze_rejects_bad_timestamps() {
    let recordings = Recordings {
        requests: Vec::new(),
        cpu_samples: vec![CpuSample {
            time: "not a time".to_owned(),
            cpu_percent: 1.,
        }],
    };
    assert!(analyze(&recordings, Duration::from_secs(10), &BucketFilter::default()).is_err());
}
