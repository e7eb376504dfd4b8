mod config;
mod streams;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vidnode_core::CodecType;
use vidnode_devices::{DeviceEvent, MonitorConfig};
use vidnode_encoders::{EncoderSelector, ValidationStore, ValidatorRegistry};
use vidnode_process::PoolOptions;
use vidnode_process::ProcessPool;

use crate::config::NodeConfig;
use crate::streams::Streams;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env()?;
    init_tracing(config.json_logs);

    let registry = Arc::new(ValidatorRegistry::new(&config.encoders));
    let store = ValidationStore::load_or_validate(&registry, &config.encoders, config.revalidate)
        .await
        .context("failed to load encoder validation results")?;
    info!(
        path = %store.path().display(),
        h264 = store.working(CodecType::H264).len(),
        h265 = store.working(CodecType::H265).len(),
        "encoder validation ready"
    );

    let selector =
        Arc::new(EncoderSelector::from_registry(registry.clone(), store.results().cloned()).await);
    for codec in [CodecType::H264, CodecType::H265] {
        match selector.select(codec, "", None) {
            Ok(selection) => info!(
                %codec,
                encoder = %selection.encoder,
                validated = selection.settings.is_some(),
                "default encoder"
            ),
            Err(e) => warn!(%codec, error = %e, kind = e.kind().as_str(), "no default encoder"),
        }
    }

    let streams = config.output_url.clone().map(|url| {
        info!(output = %url, "streaming capture devices");
        Streams::new(selector.clone(), config.encoders.ffmpeg_path.clone(), url)
    });
    let pool = match &streams {
        Some(streams) => streams.pool().clone(),
        None => ProcessPool::new(PoolOptions::new(|id: &str| {
            Err::<String, _>(format!("no stream configured for {id}"))
        })),
    };

    let cancel = CancellationToken::new();
    let mut events = spawn_monitor(cancel.clone());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("device monitor stopped");
                    shutdown.as_mut().await;
                    break;
                };
                log_event(&event);
                if let Some(streams) = &streams {
                    streams.handle(&event).await;
                }
            }
        }
    }

    info!("shutting down");
    cancel.cancel();
    pool.stop_all().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn log_event(event: &DeviceEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!(event = %json, "device event"),
        Err(e) => error!(error = %e, device_id = %event.device_id, "failed to encode device event"),
    }
}

#[cfg(target_os = "linux")]
fn spawn_monitor(cancel: CancellationToken) -> mpsc::Receiver<DeviceEvent> {
    use vidnode_devices::{HotplugMonitor, V4l2Probe};

    HotplugMonitor::new(V4l2Probe::default(), MonitorConfig::default()).spawn(cancel)
}

#[cfg(not(target_os = "linux"))]
fn spawn_monitor(_cancel: CancellationToken) -> mpsc::Receiver<DeviceEvent> {
    warn!("device monitoring needs V4L2, running without it");
    let (_tx, rx) = mpsc::channel(MonitorConfig::default().channel_capacity);
    rx
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}
