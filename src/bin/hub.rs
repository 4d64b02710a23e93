use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pingwarden::{
    actors::{DeliveryHandle, MonitorHandle},
    api::{ApiConfig, ApiState, spawn_api_server},
    config::read_config_file,
    delivery::DeliveryWorker,
    monitors::{MonitorScheduler, NetworkProber, Prober},
    oplog::OperationalLog,
    ports::PortService,
    storage::{open_backend, seed_inventory},
    telegram::TelegramMessenger,
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// Log level for the hub and the library
    #[arg(long, default_value = "trace")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("pingwarden", level),
        ("pingwarden_hub", level),
        ("hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let storage = open_backend(&config.resolved_storage())
        .await
        .context("failed to open storage")?;

    let prober: Arc<dyn Prober> = Arc::new(NetworkProber::new(
        config.monitor.ping_timeout(),
        config.monitor.tcp_timeout(),
    ));

    if let Some(inventory) = &config.inventory {
        let device_ids = seed_inventory(storage.as_ref(), inventory)
            .await
            .context("failed to seed inventory")?;

        let ports = PortService::new(storage.clone(), prober.clone(), &config.monitor);
        for device_id in &device_ids {
            ports.ensure_known_ports(*device_id).await?;
        }
        info!("seeded {} devices", device_ids.len());
    }

    let oplog = OperationalLog::new(storage.clone());

    let scheduler = MonitorScheduler::new(storage.clone(), prober.clone(), config.monitor.clone());
    let monitor = MonitorHandle::spawn(scheduler, config.monitor.interval());
    debug!("monitor actor running every {:?}", config.monitor.interval());

    let messenger = Arc::new(TelegramMessenger::new(
        &config.delivery.api_base_url,
        config.delivery.request_timeout(),
    )?);
    let worker = DeliveryWorker::new(storage.clone(), messenger, &config.delivery);
    let delivery = DeliveryHandle::spawn(worker, oplog.clone(), config.delivery.interval());
    debug!("delivery actor running every {:?}", config.delivery.interval());

    let api_state = ApiState::new(storage.clone(), prober, &config.monitor);
    let addr = spawn_api_server(ApiConfig::from(config.resolved_api()), api_state).await?;

    oplog
        .info("hub", &format!("Hub started, API listening on {addr}"))
        .await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    if let Err(e) = monitor.shutdown().await {
        error!("{e:#}");
    }
    if let Err(e) = delivery.shutdown().await {
        error!("{e:#}");
    }
    storage.close().await?;

    Ok(())
}
