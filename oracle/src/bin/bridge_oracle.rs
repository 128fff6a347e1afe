use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use bridge_oracle::{
    cfg::read_config,
    db::Db,
    metrics::OracleMetrics,
    notifier::LoggingNotifier,
    scheduler::Scheduler,
    state_processor::ChainStateProcessor,
    submitter::DryRunSubmitter,
    time::SystemClock,
    validators::ValidatorRegistry,
};
use clap::Parser;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, short, default_value = "config.toml")]
    config_file: PathBuf,
    #[clap(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .with_ansi(false);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    // Record panics as `tracing` events at the `ERROR` level.
    std::panic::set_hook(Box::new(log_panic));

    let config = read_config(&args.config_file)?;

    let meter_provider = match &config.otlp_collector_endpoint {
        Some(endpoint) => Some(meter_provider(endpoint)?),
        None => None,
    };

    let config = Arc::new(config);
    let db = Arc::new(Db::new(config.data_dir.as_ref())?);
    let metrics = OracleMetrics::new();
    let processor = ChainStateProcessor::new(
        config.clone(),
        db.clone(),
        db,
        ValidatorRegistry::standard(),
        Arc::new(SystemClock),
        metrics.clone(),
    );
    let bridge = Arc::new(DryRunSubmitter);
    let scheduler = Scheduler::new(
        config,
        processor,
        bridge.clone(),
        bridge.clone(),
        bridge,
        Arc::new(LoggingNotifier),
        metrics,
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c, shutting down"),
            Err(e) => error!("Failed to listen for ctrl-c, shutting down: {e}"),
        }
        let _ = cancel_tx.send(true);
    });

    scheduler.run(cancel_rx).await?;

    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            error!("Failed to flush metrics: {e}");
        }
    }
    Ok(())
}

/// Export metrics to an OTLP collector and make them the global meter provider.
fn meter_provider(endpoint: &str) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(10))
        .build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(provider)
}

fn log_panic(panic: &PanicHookInfo<'_>) {
    let payload = panic.payload();
    let message = payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<dyn Any>");
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");

    let backtrace = Backtrace::capture();
    let backtrace =
        (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());

    match panic.location() {
        Some(location) => error!(
            thread_name,
            message,
            panic.file = location.file(),
            panic.line = location.line(),
            panic.column = location.column(),
            backtrace,
        ),
        None => error!(thread_name, message, backtrace),
    }
}
