use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{Request, Response, Uri},
    rt::Executor,
    telemetry::tracing,
};

use clap::Args;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    task::JoinSet,
    time::Instant,
};
use wavebench_lib::{
    arrival::{ArrivalEvent, ArrivalGenerator},
    config::SimulationConfig,
    intensity::Intensity,
};

use crate::config::{
    Scenario, SimulationArgs, TargetArgs, merge_simulation_args, merge_target_args,
};

pub mod artifact;
pub mod client;
pub mod reporter;

use self::{artifact::RunIdentity, client::TargetClient, reporter::*};

#[derive(Debug, Clone, Args)]
/// drive time-varying traffic against a target and collect its recordings
pub struct RunCommand {
    /// base url of the monitored target
    #[arg(value_name = "URL", required = true)]
    url: Uri,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,

    #[clap(flatten)]
    simulation: Option<SimulationArgs>,

    #[clap(flatten)]
    target: Option<TargetArgs>,

    #[arg(long)]
    /// Scenario to run,
    /// manually defined parameters overwrite scenario parameters.
    scenario: Option<Scenario>,

    /// seed the arrival process for a reproducible traffic pattern
    #[arg(long)]
    seed: Option<u64>,

    /// refuse to run when the configuration produces warnings
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// timeout for a single request made to the target
    #[arg(long, value_name = "SECONDS", default_value_t = 30.)]
    request_timeout: f64,

    /// label of the target server, used in the artifact file name
    #[arg(long, default_value = "A")]
    server: String,

    /// do not configure (and clear) the target prior to the run
    #[arg(long, default_value_t = false)]
    skip_setup: bool,

    /// do not download the recordings of the target after the run
    #[arg(long, default_value_t = false)]
    skip_download: bool,
}

pub async fn exec(data: PathBuf, guard: ShutdownGuard, args: RunCommand) -> Result<(), BoxError> {
    self::artifact::validate_server_label(&args.server).context("validate server label")?;

    let merged_target = merge_target_args(args.scenario, args.target);
    let simulation_cfg =
        merge_simulation_args(args.scenario, args.simulation).into_simulation_config(args.seed);

    let warnings = simulation_cfg
        .validate()
        .context("validate simulation config")?;
    if args.strict && !warnings.is_empty() {
        return Err(BoxError::from(format!(
            "strict mode: refuse to run with {} configuration warning(s)",
            warnings.len(),
        )));
    }

    let regression_level = merged_target.regression_level.unwrap_or_default();
    let regression_magnitude = merged_target.regression_magnitude;

    tracing::info!(
        base_rate_per_minute = %simulation_cfg.base_rate_per_minute,
        waveform = ?simulation_cfg.waveform,
        ticks_per_second = %simulation_cfg.ticks_per_second,
        duration_minutes = %simulation_cfg.duration_minutes,
        expected_arrivals = %expected_arrivals(&simulation_cfg),
        %regression_level,
        ?regression_magnitude,
        "simulation config parameters ready",
    );

    if !(args.request_timeout.is_finite() && args.request_timeout > 0.) {
        return Err(BoxError::from(format!(
            "request timeout has to be a positive number of seconds: {}",
            args.request_timeout,
        )));
    }

    let request_timeout =
        Duration::try_from_secs_f64(args.request_timeout).context("request timeout as duration")?;
    let web_client =
        self::client::new_web_client(Executor::graceful(guard.clone()), request_timeout)
            .context("create HTTP(S) client")?;
    let client = TargetClient::new(web_client, &args.url);

    if args.skip_setup {
        tracing::info!("skip target setup");
    } else {
        setup_target(&client, regression_level, regression_magnitude).await?;
    }

    let generator =
        ArrivalGenerator::from_config(&simulation_cfg).context("create arrival generator")?;
    tracing::debug!(?generator, "arrival generator ready");

    let Some(emitted) = drive_traffic(&guard, &client, generator, args.json).await? else {
        tracing::error!("exit simulation early: guard shutdown");
        return Ok(());
    };
    tracing::info!("simulation finished: {emitted} request(s) emitted");

    if args.skip_download {
        tracing::info!("skip download of target recordings");
        return Ok(());
    }

    download_recordings(
        &client,
        &data,
        RunIdentity::new(
            SystemTime::now(),
            &args.server,
            &simulation_cfg,
            regression_level,
            regression_magnitude,
        ),
    )
    .await
}

async fn setup_target<C>(
    client: &TargetClient<C>,
    regression_level: u32,
    regression_magnitude: Option<u32>,
) -> Result<(), BoxError>
where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    client
        .get_success(&format!("set_regression_level/{regression_level}"))
        .await
        .context("set regression level of target")?;
    tracing::info!("target regression level set to {regression_level}");

    if let Some(magnitude) = regression_magnitude {
        client
            .get_success(&format!("set_regression_magnitude/{magnitude}"))
            .await
            .context("set regression magnitude of target")?;
        tracing::info!("target regression magnitude set to {magnitude}");
    }

    client
        .get_success("clear_db")
        .await
        .context("clear recordings of target")?;
    tracing::info!("target recordings cleared");

    Ok(())
}

/// Fire one request per arrival until the generator is done,
/// and wait for all of them to resolve.
///
/// Returns `None` in case the guard initiated a shutdown prior to completion.
async fn drive_traffic<C>(
    guard: &ShutdownGuard,
    client: &TargetClient<C>,
    generator: ArrivalGenerator<Box<dyn Intensity>>,
    json: bool,
) -> Result<Option<u64>, BoxError>
where
    C: Service<Request, Output = Response, Error = BoxError> + Clone,
{
    const REPORT_INTERVAL: Duration = Duration::from_secs(10);

    let reporter: Box<dyn Reporter> = if json {
        const EMIT_EVENTS: bool = true;
        Box::new(JsonlReporter::new(REPORT_INTERVAL, EMIT_EVENTS))
    } else {
        Box::new(HumanReporter::new(REPORT_INTERVAL))
    };

    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let report_handle = tokio::spawn(report_worker(guard.clone(), reporter, report_rx));

    let (arrival_tx, mut arrival_rx) = mpsc::unbounded_channel();
    let generator_handle = tokio::spawn(async move {
        let mut arrival_tx = arrival_tx;
        generator.run(&mut arrival_tx).await
    });

    let mut cancelled = std::pin::pin!(guard.clone_weak().into_cancelled());
    let mut in_flight = JoinSet::new();

    loop {
        let arrival = tokio::select! {
            _ = cancelled.as_mut() => {
                generator_handle.abort();
                in_flight.abort_all();
                return Ok(None);
            }
            maybe_arrival = arrival_rx.recv() => {
                let Some(arrival) = maybe_arrival else {
                    tracing::debug!("arrival generator done");
                    break;
                };

                arrival
            }
        };

        if let Err(err) = report_tx.send(Report::Arrival(arrival)) {
            tracing::debug!("failed to send arrival report msg: {err}");
        }

        let client = client.clone();
        let report_tx = report_tx.clone();
        let guard = guard.clone();

        in_flight.spawn(async move {
            let req_start = Instant::now();
            let result = tokio::select! {
                _ = guard.cancelled() => {
                    tracing::debug!("cancel in-flight request: guard shutdown");
                    return;
                }
                result = client.get("") => result,
            };
            if let Err(err) = report_tx.send(Report::Result(ClientResult {
                result,
                req_start,
                sequence_number: arrival.sequence_number,
            })) {
                tracing::debug!("failed to send client result msg: {err}");
            }
        });

        while in_flight.try_join_next().is_some() {}
    }

    let emitted = generator_handle
        .await
        .context("join arrival generator task")?;

    tracing::info!("drain {} in-flight request(s)", in_flight.len());
    loop {
        tokio::select! {
            _ = cancelled.as_mut() => {
                in_flight.abort_all();
                return Ok(None);
            }
            maybe_done = in_flight.join_next() => {
                if maybe_done.is_none() {
                    break;
                }
            }
        }
    }

    drop(report_tx);
    report_handle.await.context("join report worker task")?;

    Ok(Some(emitted))
}

async fn download_recordings<C>(
    client: &TargetClient<C>,
    data: &std::path::Path,
    identity: RunIdentity<'_>,
) -> Result<(), BoxError>
where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    tokio::fs::create_dir_all(data)
        .await
        .context("create data directory")
        .with_context_debug_field("path", || data.to_owned())?;

    let dest = data.join(identity.artifact_file_name());
    let size = client
        .download("get_db", &dest)
        .await
        .context("download recordings of target")?;

    tracing::info!(path = ?dest, "downloaded {size} bytes of target recordings");
    Ok(())
}

enum Report {
    Arrival(ArrivalEvent),
    Result(ClientResult),
}

struct ClientResult {
    result: Result<Response, BoxError>,
    req_start: Instant,
    sequence_number: u64,
}

async fn report_worker(
    guard: ShutdownGuard,
    mut reporter: Box<dyn Reporter>,
    mut report_rx: UnboundedReceiver<Report>,
) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        let report = tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit report worker: guard shutdown");
                return;
            }

            _ = ticker.tick() => {
                reporter.on_tick(start.elapsed());
                continue;
            }

            maybe_report = report_rx.recv() => {
                let Some(report) = maybe_report else {
                    tracing::debug!("exit report worker: report senders closed");
                    reporter.finish();
                    return;
                };

                report
            }
        };

        match report {
            Report::Arrival(arrival) => reporter.on_arrival(&arrival),
            Report::Result(ClientResult {
                result,
                req_start,
                sequence_number,
            }) => {
                let outcome = match result {
                    Ok(resp) => RequestOutcome::from_status(resp.status().as_u16()),
                    Err(err) => {
                        tracing::debug!("request #{sequence_number}: non-http error: {err}");
                        RequestOutcome::other_failure()
                    }
                };

                reporter.on_result(&RequestResultEvent {
                    ts: SystemTime::now(),
                    elapsed: start.elapsed(),
                    sequence_number,
                    latency: req_start.elapsed(),
                    outcome,
                });
            }
        }
    }
}

fn expected_arrivals(cfg: &SimulationConfig) -> f64 {
    cfg.intensity().expected_arrivals(cfg.duration_minutes)
}
