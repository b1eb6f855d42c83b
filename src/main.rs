mod bootstrap;
mod config;
mod connection;
mod dispatch;
mod queue;
mod store;
mod transport;
mod trigger;

use anyhow::Result;
use bootstrap::StructureBootstrapper;
use config::DeviceConfig;
use connection::{Connectivity, NetworkMonitor};
use dispatch::PacketDispatcher;
use queue::QueueProcessor;
use std::sync::Arc;
use std::time::Duration;
use store::{MemoryStore, RemoteStore, RestStore, RestSubscriber, StoreSubscriber};
use tokio::time::MissedTickBehavior;
use transport::UdpWakeTransport;
use trigger::{TriggerWatcher, TriggerWatcherHandle};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Everything the control loop needs after a successful bring-up
struct Device {
    network: Arc<NetworkMonitor>,
    queue: QueueProcessor,
    watcher: TriggerWatcherHandle,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = DeviceConfig::compiled();

    info!("Edge device starting: {}", config.device_id);
    if config.store.is_offline() {
        info!("  Store: in-memory (no endpoint compiled in)");
    } else {
        info!("  Store: {}", config.store.base_url);
    }
    info!("  Trigger: {} -> {}", config.store.trigger_path(), config.wake.target_mac);
    info!(
        "  Queue: {} every {:?} (prune: {})",
        config.store.queue_path(),
        config.queue.poll_interval,
        config.queue.prune_completed
    );

    let device = match setup(&config).await {
        Ok(device) => device,
        Err(e) => {
            error!("Setup failed, halting: {:#}", e);
            // Setup failure is fatal
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    };

    let mut ticker = tokio::time::interval(config.queue.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watcher_reported = false;

    // Main control loop; the watcher runs on its own task in between
    loop {
        ticker.tick().await;

        if device.watcher.is_finished() && !watcher_reported {
            warn!("Trigger watcher stopped; only the queue remains active");
            watcher_reported = true;
        }

        if !device.network.is_connected() {
            warn!("[NET] No local address, deferring queue pass");
            continue;
        }

        device.queue.process_queue().await;
    }
}

/// Bring up the network, both store sessions, the structure and the watcher
async fn setup(config: &DeviceConfig) -> Result<Device> {
    let network = Arc::new(NetworkMonitor::new(config.network.clone()));
    network.wait_until_ready().await?;

    let (store, subscriber) = open_store(config).await?;
    info!("[STORE] Request session: {}", store.name());

    let trigger_path = config.store.trigger_path();
    let queue_path = config.store.queue_path();

    let bootstrapper = StructureBootstrapper::new(store.clone(), &trigger_path, &queue_path);
    if !bootstrapper.ensure_structure().await {
        error!("[BOOT] Store structure incomplete, continuing");
    }

    let dispatcher = Arc::new(PacketDispatcher::new(
        Arc::new(UdpWakeTransport::new()),
        network.clone(),
        config.wake.clone(),
    ));

    let events = subscriber.subscribe(&trigger_path).await?;
    let watcher = TriggerWatcher::new(
        dispatcher.clone(),
        store.clone(),
        &trigger_path,
        &config.wake.target_mac,
    )
    .start(events);
    info!("Trigger watcher started on {}", trigger_path);

    let queue = QueueProcessor::new(store, dispatcher, queue_path, config.queue.prune_completed);

    Ok(Device {
        network,
        queue,
        watcher,
    })
}

/// Open the request session and the separate subscription session
async fn open_store(
    config: &DeviceConfig,
) -> Result<(Arc<dyn RemoteStore>, Arc<dyn StoreSubscriber>)> {
    if config.store.is_offline() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn RemoteStore> = memory.clone();
        let subscriber: Arc<dyn StoreSubscriber> = memory;
        return Ok((store, subscriber));
    }

    let rest = RestStore::new(&config.store)?;
    rest.connect().await?;
    let store: Arc<dyn RemoteStore> = Arc::new(rest);
    let subscriber: Arc<dyn StoreSubscriber> = Arc::new(RestSubscriber::new(&config.store)?);

    Ok((store, subscriber))
}
