/**
 * SENSOR DASH - Entry point
 *
 * ROLE : load and validate config (fatal on error), build the shared store,
 * start the MQTT subscriber and the render loop, stop both on Ctrl-C.
 */

use anyhow::{Context, Result};
use sensor_dash::config::load_config;
use sensor_dash::display::stdout_sink;
use sensor_dash::mqtt::MqttLink;
use sensor_dash::{RenderLoop, StateStore, Subscriber, SubscriberSettings};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How long a display write stuck on stdout may hold the process after shutdown.
const SINK_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    // stdout belongs to the display sink
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sensor_dash=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(SINK_GRACE);
    result
}

async fn run() -> Result<()> {
    let cfg = load_config().await.context("invalid dashboard configuration")?;
    let settings = SubscriberSettings::from_config(&cfg).context("invalid subscriber settings")?;
    info!(
        host = %cfg.mqtt.host,
        port = cfg.mqtt.port,
        slots = cfg.channels.slots.len(),
        alerts = ?cfg.channels.alerts,
        "starting sensor dashboard"
    );

    let store = StateStore::new(&cfg.channels.slots, cfg.channels.alert_capacity);
    info!(channels = ?store.channels(), "tracking slots");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let subscriber = Subscriber::new(MqttLink::new(&cfg.mqtt), store.clone(), settings);
    let subscriber_task = tokio::spawn(subscriber.run(shutdown_rx.clone()));

    let render = RenderLoop::new(store, stdout_sink(&cfg.display), cfg.display.tick());
    let render_task = tokio::spawn(render.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    shutdown_tx.send_replace(true);

    subscriber_task.await.context("subscriber task panicked")?;
    let stats = render_task.await.context("render task panicked")?;
    info!(frames = stats.frames, failed = stats.failed_frames, "dashboard stopped");
    Ok(())
}
