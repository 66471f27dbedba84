use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rama::{
    Layer as _,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        HeaderValue,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
    },
    layer::TimeoutLayer,
    net::{address::SocketAddress, socket::Interface},
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use clap::Args;

use crate::utils;

mod target;

use self::target::MockTarget;

#[derive(Debug, Clone, Args)]
/// run a mock of the regression-monitored target
pub struct MockCommand {
    /// network interface to bind to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "127.0.0.1:0"
    )]
    pub bind: Interface,

    /// latency of the index route without regression
    #[arg(long, value_name = "SECONDS", default_value_t = 0.05)]
    pub base_latency: f64,

    /// random +/- deviation applied to the latency of the index route
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    pub jitter: f64,

    /// amount of concurrent requests at which the mock is fully utilised
    #[arg(long, default_value_t = 10)]
    pub capacity: u32,

    /// interval between two recorded cpu samples
    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    pub cpu_sample_interval: f64,
}

pub async fn exec(data: PathBuf, guard: ShutdownGuard, args: MockCommand) -> Result<(), BoxError> {
    for (name, value) in [("base latency", args.base_latency), ("jitter", args.jitter)] {
        if !(value.is_finite() && value >= 0.) {
            return Err(BoxError::from(format!(
                "{name} has to be a non-negative number of seconds: {value}"
            )));
        }
    }

    if args.capacity == 0 {
        return Err(BoxError::from("capacity has to be at least one request"));
    }
    if !(args.cpu_sample_interval.is_finite() && args.cpu_sample_interval > 0.) {
        return Err(BoxError::from(format!(
            "cpu sample interval has to be a positive number of seconds: {}",
            args.cpu_sample_interval
        )));
    }

    tokio::fs::create_dir_all(&data)
        .await
        .context("create data directory")
        .with_context_debug_field("path", || data.clone())?;

    let target = Arc::new(MockTarget::new(
        args.base_latency,
        args.jitter,
        args.capacity,
    ));
    let sample_interval = Duration::try_from_secs_f64(args.cpu_sample_interval)
        .context("cpu sample interval as duration")?;
    let sampled = target.clone();
    guard.spawn_task_fn(move |guard| cpu_sampler(guard, sampled, sample_interval));

    let exec = Executor::graceful(guard);
    let tcp_listener = TcpListener::bind(args.bind.clone(), exec.clone())
        .await
        .context("bind mock target http server")?;

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(utils::env::server_identifier())),
    )
        .into_layer(target);

    let http_server = HttpServer::auto(exec).service(Arc::new(http_svc));
    let tcp_svc = TimeoutLayer::new(Duration::from_secs(60)).into_layer(http_server);

    let server_addr = tcp_listener
        .local_addr()
        .context("get bound address for mock target http server")?;

    tracing::info!("mock target http server bound to: {server_addr}");
    write_server_socket_address_as_file(
        &data,
        &format!("{}.mock", utils::env::project_name()),
        server_addr.into(),
    )
    .await?;

    tcp_listener.serve(tcp_svc).await;

    Ok(())
}

async fn cpu_sampler(guard: ShutdownGuard, target: Arc<MockTarget>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit cpu sampler: guard shutdown");
                return;
            }
            _ = ticker.tick() => target.sample_cpu(),
        }
    }
}

async fn write_server_socket_address_as_file(
    dir: &Path,
    name: &str,
    addr: SocketAddress,
) -> Result<(), BoxError> {
    let path = dir.join(format!("{name}.addr.txt"));
    tokio::fs::write(&path, addr.to_string())
        .await
        .context("write server's socket address to file")
        .context_field("address", addr)
        .with_context_debug_field("path", || path.to_owned())
}
