use std::time::SystemTime;

use rama::error::BoxError;
use wavebench_lib::config::SimulationConfig;

/// The server label ends up in a file name,
/// so it has to be a non-empty, single path component.
pub fn validate_server_label(label: &str) -> Result<(), BoxError> {
    if label.is_empty() {
        return Err(BoxError::from("server label cannot be empty"));
    }
    if label.contains(['/', '\\']) || label.chars().any(char::is_control) {
        return Err(BoxError::from(format!(
            "server label {label:?} may not contain path separators or control characters"
        )));
    }
    Ok(())
}

/// Identity of a finished simulation run,
/// used to name the artifact downloaded from the target.
#[derive(Debug, Clone)]
pub struct RunIdentity<'a> {
    pub date: String,
    pub server: &'a str,
    pub duration_minutes: f64,
    pub base_rate_per_minute: f64,
    pub regression_level: u32,
    pub regression_magnitude: Option<u32>,
}

impl<'a> RunIdentity<'a> {
    pub fn new(
        now: SystemTime,
        server: &'a str,
        config: &SimulationConfig,
        regression_level: u32,
        regression_magnitude: Option<u32>,
    ) -> Self {
        Self {
            date: utc_date(now),
            server,
            duration_minutes: config.duration_minutes,
            base_rate_per_minute: config.base_rate_per_minute,
            regression_level,
            regression_magnitude,
        }
    }

    /// `db_{date}_{server}_length_{min}_traffic_{rpm}_regression_{level}[_{magnitude}].db`
    pub fn artifact_file_name(&self) -> String {
        let mut name = format!(
            "db_{}_{}_length_{}_traffic_{}_regression_{}",
            self.date,
            self.server,
            self.duration_minutes,
            self.base_rate_per_minute,
            self.regression_level,
        );
        if let Some(magnitude) = self.regression_magnitude {
            name.push('_');
            name.push_str(&magnitude.to_string());
        }
        name.push_str(".db");
        name
    }
}

/// `YYYY-MM-DD` of the given time, in UTC.
fn utc_date(time: SystemTime) -> String {
    let mut ts = humantime::format_rfc3339_seconds(time).to_string();
    ts.truncate(10);
    ts
}
