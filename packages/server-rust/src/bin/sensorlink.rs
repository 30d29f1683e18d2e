//! `sensorlink` — run the resilient consumer or the sample producer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use sensorlink_core::{ClockSource, MeasurementSource, SystemClock};
use sensorlink_server::network::consumer_router;
use sensorlink_server::producer::{self, TickingProducer};
use sensorlink_server::worker::BackgroundWorker;
use sensorlink_server::{
    AppState, Consumers, FetchConfig, HealthConfig, HealthTracker, HttpProducerClient,
    NetworkConfig, NetworkModule, ProducerConfig, ProducerState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sensorlink", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, env = "SENSORLINK_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve `/data*` by fetching from a remote producer.
    Consume(ConsumeArgs),
    /// Serve sample measurements.
    Produce(ProduceArgs),
}

#[derive(Debug, Args)]
struct ListenArgs {
    /// Bind address.
    #[arg(long, env = "SENSORLINK_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Maximum request processing time in milliseconds.
    #[arg(long, env = "SENSORLINK_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,
}

#[derive(Debug, Args)]
struct ConsumeArgs {
    #[command(flatten)]
    listen: ListenArgs,

    #[arg(long, env = "SENSORLINK_PORT", default_value_t = 8081)]
    port: u16,

    /// Base URL of the producer service.
    #[arg(long, env = "SENSORLINK_PRODUCER_URL", default_value = "http://localhost:8080")]
    producer_url: String,

    /// Per-attempt time budget in milliseconds.
    #[arg(long, env = "SENSORLINK_FETCH_TIMEOUT_MS", default_value_t = 500)]
    fetch_timeout_ms: u64,

    /// Retries after the initial attempt on `/data`.
    #[arg(long, env = "SENSORLINK_FETCH_MAX_RETRIES", default_value_t = 10)]
    fetch_max_retries: u32,

    /// Pause between attempts in milliseconds.
    #[arg(long, env = "SENSORLINK_FETCH_BACKOFF_MS", default_value_t = 0)]
    fetch_backoff_ms: u64,

    /// Maximum age of the last fetch before liveness fails, in milliseconds.
    #[arg(long, env = "SENSORLINK_HEALTH_THRESHOLD_MS", default_value_t = 60_000)]
    health_threshold_ms: u64,
}

#[derive(Debug, Args)]
struct ProduceArgs {
    #[command(flatten)]
    listen: ListenArgs,

    #[arg(long, env = "SENSORLINK_PORT", default_value_t = 8080)]
    port: u16,

    /// Probability that `GET /data` fails.
    #[arg(long, env = "SENSORLINK_FAILURE_RATE", default_value_t = 0.5)]
    failure_rate: f64,

    /// Upper bound of the `GET /data/slow` delay in milliseconds.
    #[arg(long, env = "SENSORLINK_MAX_SLOW_DELAY_MS", default_value_t = 1_000)]
    max_slow_delay_ms: u64,

    /// Interval between streamed measurements in milliseconds.
    #[arg(long, env = "SENSORLINK_TICK_INTERVAL_MS", default_value_t = 2_000)]
    tick_interval_ms: u64,
}

impl ListenArgs {
    fn network_config(&self, port: u16) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..NetworkConfig::default()
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn consume(args: ConsumeArgs) -> anyhow::Result<()> {
    let fetch_config = FetchConfig {
        timeout: Duration::from_millis(args.fetch_timeout_ms),
        max_retries: args.fetch_max_retries,
        backoff: Duration::from_millis(args.fetch_backoff_ms),
    };
    let health_config = HealthConfig {
        staleness_threshold_ms: args.health_threshold_ms,
    };

    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
    let source: Arc<dyn MeasurementSource> =
        Arc::new(HttpProducerClient::new(args.producer_url.clone()));
    let health = Arc::new(HealthTracker::new());
    let consumers = Consumers::build(&source, &fetch_config, &health, &clock);

    let mut module = NetworkModule::new(args.listen.network_config(args.port));
    let port = module.start().await?;
    info!(
        port,
        producer = %args.producer_url,
        timeout_ms = args.fetch_timeout_ms,
        max_retries = args.fetch_max_retries,
        "consumer starting"
    );

    let state = AppState {
        consumers: Arc::new(consumers),
        health,
        health_config,
        clock,
        shutdown: module.shutdown_controller(),
        start_time: Instant::now(),
    };
    module.serve(consumer_router(state), shutdown_signal()).await
}

async fn produce(args: ProduceArgs) -> anyhow::Result<()> {
    let config = ProducerConfig {
        failure_rate: args.failure_rate.clamp(0.0, 1.0),
        max_slow_delay_ms: args.max_slow_delay_ms,
        tick_interval: Duration::from_millis(args.tick_interval_ms.max(1)),
        ..ProducerConfig::default()
    };
    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
    let mut module = NetworkModule::new(args.listen.network_config(args.port));
    let state = ProducerState::new(config, Arc::clone(&clock), module.shutdown_controller());

    let mut ticker = BackgroundWorker::start(
        TickingProducer::new(clock, state.feed.clone()),
        state.config.tick_interval,
    );
    let state = match ticker.task_sender() {
        Some(tasks) => state.with_emitter(tasks),
        None => state,
    };

    let port = module.start().await?;
    info!(port, failure_rate = state.config.failure_rate, "producer starting");

    let result = module
        .serve(producer::router(state), shutdown_signal())
        .await;
    ticker.stop().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Consume(args) => consume(args).await,
        Command::Produce(args) => produce(args).await,
    }
}
