use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};

use super::Measurement;

/// Everything a target recorded during a run, as served on its `get_db` route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recordings {
    pub requests: Vec<RequestRecord>,
    #[serde(default)]
    pub cpu_samples: Vec<CpuSample>,
}

/// A single request served by the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// RFC 3339 timestamp.
    pub time_requested: String,
    /// Residence time of the request.
    pub duration_ms: f64,
    pub regression_level: u32,
    pub regression_magnitude: u32,
}

/// Processor utilisation of the target at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    /// RFC 3339 timestamp.
    pub time: String,
    pub cpu_percent: f64,
}

impl Recordings {
    /// Residence time (ms) per request, ordered by request time.
    pub fn residence_times(&self) -> Result<Vec<Measurement>, RecordingsError> {
        sorted_measurements(
            "time_requested",
            self.requests
                .iter()
                .map(|r| (r.time_requested.as_str(), r.duration_ms)),
        )
    }

    /// Utilisation (percent) per sample, ordered by sample time.
    pub fn cpu_usage(&self) -> Result<Vec<Measurement>, RecordingsError> {
        sorted_measurements(
            "time",
            self.cpu_samples
                .iter()
                .map(|s| (s.time.as_str(), s.cpu_percent)),
        )
    }
}

fn sorted_measurements<'a>(
    field: &'static str,
    raw: impl Iterator<Item = (&'a str, f64)>,
) -> Result<Vec<Measurement>, RecordingsError> {
    let mut measurements = raw
        .enumerate()
        .map(|(index, (time, value))| {
            Ok(Measurement {
                time: parse_time(field, index, time)?,
                value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    measurements.sort_by_key(|m| m.time);
    Ok(measurements)
}

fn parse_time(field: &'static str, index: usize, raw: &str) -> Result<SystemTime, RecordingsError> {
    humantime::parse_rfc3339(raw).map_err(|err| RecordingsError::InvalidTimestamp {
        field,
        index,
        value: raw.to_owned(),
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub enum RecordingsError {
    InvalidTimestamp {
        field: &'static str,
        index: usize,
        value: String,
        reason: String,
    },
}

impl fmt::Display for RecordingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingsError::InvalidTimestamp {
                field,
                index,
                value,
                reason,
            } => write!(f, "InvalidTimestamp: {field} #{index} ({value:?}): {reason}"),
        }
    }
}

impl std::error::Error for RecordingsError {}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn recordings_without_cpu_samples_parse() {
        let recordings: Recordings = serde_json::from_str(
            r#"{"requests":[{"time_requested":"2024-03-01T10:00:00.250Z","duration_ms":12.5,"regression_level":2,"regression_magnitude":1}]}"#,
        )
        .unwrap();
        assert_eq!(recordings.requests.len(), 1);
        assert!(recordings.cpu_samples.is_empty());

        let residence = recordings.residence_times().unwrap();
        assert_eq!(residence[0].value, 12.5);
        assert_eq!(
            residence[0].time,
            humantime::parse_rfc3339("2024-03-01T10:00:00Z").unwrap() + Duration::from_millis(250)
        );
    }

    #[test]
    fn measurements_are_ordered_by_time() {
        let recordings = Recordings {
            requests: Vec::new(),
            cpu_samples: vec![
                CpuSample {
                    time: "2024-03-01T10:00:02Z".to_owned(),
                    cpu_percent: 30.,
                },
                CpuSample {
                    time: "2024-03-01T10:00:01Z".to_owned(),
                    cpu_percent: 10.,
                },
            ],
        };
        let usage = recordings.cpu_usage().unwrap();
        let values: Vec<_> = usage.iter().map(|m| m.value).collect();
        assert_eq!(values, [10., 30.]);
    }

    #[test]
    fn invalid_timestamp_is_reported_with_its_position() {
        let recordings = Recordings {
            requests: vec![RequestRecord {
                time_requested: "yesterday".to_owned(),
                duration_ms: 1.,
                regression_level: 0,
                regression_magnitude: 1,
            }],
            cpu_samples: Vec::new(),
        };
        let err = recordings.residence_times().unwrap_err();
        assert!(matches!(
            err,
            RecordingsError::InvalidTimestamp {
                field: "time_requested",
                index: 0,
                ..
            }
        ));
    }
}
