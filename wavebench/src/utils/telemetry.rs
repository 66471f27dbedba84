use std::{io::IsTerminal as _, path::Path};

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing::{
        self,
        metadata::LevelFilter,
        subscriber::{EnvFilter, fmt::writer::BoxMakeWriter},
    },
};

/// Where and how wavebench writes its tracing output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryConfig<'a> {
    /// DEBUG instead of INFO as the default level.
    pub verbose: bool,
    /// Multi-line output, meant for humans.
    pub pretty: bool,
    /// Append to this file instead of writing to stderr.
    pub output: Option<&'a Path>,
}

impl TelemetryConfig<'_> {
    fn default_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }

    /// Colors only make sense on an interactive stderr.
    fn use_ansi(&self, stderr_is_terminal: bool) -> bool {
        self.output.is_none() && stderr_is_terminal
    }

    fn make_writer(&self) -> Result<BoxMakeWriter, BoxError> {
        let Some(path) = self.output else {
            return Ok(BoxMakeWriter::new(std::io::stderr));
        };

        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .context("open log file")
            .with_context_debug_field("path", || path.to_owned())?;
        Ok(BoxMakeWriter::new(file))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the default level.
pub fn init_tracing(cfg: TelemetryConfig<'_>) -> Result<(), BoxError> {
    let subscriber = tracing::subscriber::fmt()
        .with_ansi(cfg.use_ansi(std::io::stderr().is_terminal()))
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cfg.default_level().into())
                .from_env_lossy(),
        )
        .with_writer(cfg.make_writer()?);

    if cfg.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(?cfg, version = env!("CARGO_PKG_VERSION"), "tracing is set up");
    Ok(())
}
