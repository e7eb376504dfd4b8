//! Hotplug monitor.
//!
//! Turns kernel uevents into [`DeviceEvent`]s. The monitor emits Added for
//! every device present at start, follows video4linux add, remove and change
//! events, rescans on USB device arrival and departure, and polls HDMI inputs
//! for signal changes. Changes are debounced per device before delivery.

pub mod debounce;
#[cfg(target_os = "linux")]
pub mod netlink;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::device::{Device, DeviceProbe};
use crate::event::{DeviceAction, DeviceEvent};
use crate::signal::{SignalState, SignalStatus};
use crate::uevent::Uevent;
use crate::{DeviceError, MonitorConfig};

const DEV_ROOT: &str = "/dev";

pub struct HotplugMonitor<P> {
    probe: Arc<P>,
    config: MonitorConfig,
}

impl<P: DeviceProbe> HotplugMonitor<P> {
    pub fn new(probe: P, config: MonitorConfig) -> Self {
        Self {
            probe: Arc::new(probe),
            config,
        }
    }

    /// Subscribe to kernel uevents and start monitoring. The returned stream
    /// ends after `cancel` fires.
    #[cfg(target_os = "linux")]
    pub fn spawn(self, cancel: CancellationToken) -> mpsc::Receiver<DeviceEvent> {
        let uevents = netlink::subscribe(cancel.clone(), self.config.channel_capacity);
        self.spawn_with(uevents, cancel)
    }

    /// Start monitoring from an existing uevent source. A failed subscription
    /// yields a stream that ends immediately.
    pub fn spawn_with(
        self,
        uevents: Result<mpsc::Receiver<Uevent>, DeviceError>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<DeviceEvent> {
        let (out_tx, out_rx) = mpsc::channel(self.config.channel_capacity);
        let uevents = match uevents {
            Ok(uevents) => uevents,
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "hotplug monitoring disabled");
                return out_rx;
            }
        };

        let (raw_tx, raw_rx) = mpsc::channel(self.config.channel_capacity);
        tokio::spawn(debounce::debounce(raw_rx, out_tx, self.config.debounce));
        let tracker = Tracker {
            probe: self.probe,
            config: self.config,
            known: HashMap::new(),
            events: raw_tx,
        };
        tokio::spawn(tracker.run(uevents, cancel));
        out_rx
    }
}

struct Tracked {
    device: Device,
    signal: Option<SignalStatus>,
}

struct Tracker<P> {
    probe: Arc<P>,
    config: MonitorConfig,
    known: HashMap<String, Tracked>,
    events: mpsc::Sender<DeviceEvent>,
}

impl<P: DeviceProbe> Tracker<P> {
    async fn run(mut self, mut uevents: mpsc::Receiver<Uevent>, cancel: CancellationToken) {
        if !self.snapshot().await {
            return;
        }
        info!(devices = self.known.len(), "hotplug monitor started");

        let period = self.config.signal_poll_interval;
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let open = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                uevent = uevents.recv() => match uevent {
                    Some(uevent) => self.on_uevent(uevent, &cancel).await,
                    None => {
                        warn!("uevent source closed");
                        break;
                    }
                },
                _ = poll.tick() => self.poll_signals().await,
            };
            if !open {
                break;
            }
        }
        debug!("hotplug monitor stopped");
    }

    /// Send one event; false once nobody is listening.
    async fn emit(&self, action: DeviceAction, device: &Device, signal: Option<SignalStatus>) -> bool {
        info!(%action, device_id = %device.id, path = %device.path.display(), name = %device.name, "device event");
        self.events
            .send(DeviceEvent::new(action, device, signal))
            .await
            .is_ok()
    }

    async fn enumerate(&self) -> Result<Vec<Device>, DeviceError> {
        let probe = self.probe.clone();
        tokio::task::spawn_blocking(move || probe.enumerate()).await?
    }

    async fn probe_path(&self, path: &Path) -> Result<Device, DeviceError> {
        let probe = self.probe.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || probe.probe(&path)).await?
    }

    async fn signal(&self, path: &Path) -> SignalStatus {
        let probe = self.probe.clone();
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || probe.signal(&path)).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "signal probe task failed");
                SignalStatus::new(SignalState::NoDevice)
            }
        }
    }

    async fn signal_for(&self, device: &Device) -> Option<SignalStatus> {
        if device.is_hdmi() {
            Some(self.signal(&device.path).await)
        } else {
            None
        }
    }

    fn id_for_path(&self, path: &Path) -> Option<String> {
        self.known
            .iter()
            .find(|(_, t)| t.device.path == path)
            .map(|(id, _)| id.clone())
    }

    async fn snapshot(&mut self) -> bool {
        let devices = match self.enumerate().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "initial device enumeration failed");
                return true;
            }
        };
        for device in devices {
            if !self.track(DeviceAction::Added, device).await {
                return false;
            }
        }
        true
    }

    /// Record `device` and announce it.
    async fn track(&mut self, action: DeviceAction, device: Device) -> bool {
        let signal = self.signal_for(&device).await;
        let open = self.emit(action, &device, signal).await;
        self.known
            .insert(device.id.clone(), Tracked { device, signal });
        open
    }

    async fn forget(&mut self, id: &str) -> bool {
        match self.known.remove(id) {
            Some(tracked) => self.emit(DeviceAction::Removed, &tracked.device, None).await,
            None => true,
        }
    }

    async fn on_uevent(&mut self, uevent: Uevent, cancel: &CancellationToken) -> bool {
        if uevent.is_video() {
            self.on_video(uevent).await
        } else if uevent.is_usb_device() {
            match uevent.action.as_str() {
                "add" => {
                    // Give the kernel time to register the video nodes.
                    tokio::select! {
                        _ = cancel.cancelled() => return true,
                        _ = tokio::time::sleep(self.config.usb_settle) => {}
                    }
                    self.rescan().await
                }
                "remove" => self.rescan().await,
                _ => true,
            }
        } else {
            true
        }
    }

    async fn on_video(&mut self, uevent: Uevent) -> bool {
        if uevent.devname.is_empty() {
            return true;
        }
        let path = Path::new(DEV_ROOT).join(&uevent.devname);
        let known = self.id_for_path(&path);

        match (uevent.action.as_str(), known) {
            ("remove", Some(id)) => self.forget(&id).await,
            ("add", None) | ("change", None) => match self.probe_path(&path).await {
                Ok(device) if device.is_capture() => self.track(DeviceAction::Added, device).await,
                Ok(_) => true,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "ignoring video node");
                    true
                }
            },
            ("add", Some(id)) | ("change", Some(id)) => match self.probe_path(&path).await {
                Ok(device) if device.is_capture() => {
                    if device.id != id {
                        if !self.forget(&id).await {
                            return false;
                        }
                        return self.track(DeviceAction::Added, device).await;
                    }
                    self.track(DeviceAction::Changed, device).await
                }
                outcome => {
                    if let Err(e) = outcome {
                        debug!(path = %path.display(), error = %e, "device no longer captures");
                    }
                    self.forget(&id).await
                }
            },
            _ => true,
        }
    }

    /// Re-enumerate and announce the differences from what is known.
    async fn rescan(&mut self) -> bool {
        let devices = match self.enumerate().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "device rescan failed");
                return true;
            }
        };

        let mut gone: Vec<String> = self
            .known
            .keys()
            .filter(|id| !devices.iter().any(|d| &d.id == *id))
            .cloned()
            .collect();
        gone.sort();
        for id in gone {
            if !self.forget(&id).await {
                return false;
            }
        }

        for device in devices {
            let action = match self.known.get(&device.id) {
                None => DeviceAction::Added,
                Some(tracked) if tracked.device != device => DeviceAction::Changed,
                Some(_) => continue,
            };
            if !self.track(action, device).await {
                return false;
            }
        }
        true
    }

    /// Re-read the signal of every HDMI input and announce state changes.
    async fn poll_signals(&mut self) -> bool {
        let mut ids: Vec<String> = self
            .known
            .iter()
            .filter(|(_, t)| t.device.is_hdmi())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();

        for id in ids {
            let Some(path) = self.known.get(&id).map(|t| t.device.path.clone()) else {
                continue;
            };
            let status = self.signal(&path).await;
            let Some(tracked) = self.known.get_mut(&id) else {
                continue;
            };
            if tracked.signal.map(|s| s.state) == Some(status.state) {
                continue;
            }
            debug!(device_id = %id, state = %status.state, "signal changed");
            tracked.signal = Some(status);
            let device = tracked.device.clone();
            if !self.emit(DeviceAction::Changed, &device, Some(status)).await {
                return false;
            }
        }
        true
    }
}
