//! Video capture devices: enumeration, stable identity, HDMI signal state and
//! hotplug events.

pub mod device;
pub mod event;
pub mod formats;
pub mod hotplug;
pub mod signal;
pub mod uevent;
#[cfg(target_os = "linux")]
pub mod v4l2;

use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;
use vidnode_core::ErrorKind;

pub use device::{Device, DeviceKind, DeviceProbe};
pub use event::{DeviceAction, DeviceEvent};
pub use formats::{Framerate, PixelFormat, Resolution};
pub use hotplug::HotplugMonitor;
pub use signal::{SignalState, SignalStatus};
pub use uevent::Uevent;
#[cfg(target_os = "linux")]
pub use v4l2::V4l2Probe;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{request} failed on {path}: {source}")]
    Ioctl {
        path: PathBuf,
        request: &'static str,
        source: Errno,
    },
    #[error("{0} is not a video capture device")]
    NotCapture(PathBuf),
    #[error("device {0} not found")]
    NotFound(String),
    #[error("hotplug subscription failed: {0}")]
    Subscribe(Errno),
    #[error("device probe task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Subscribe(_) => ErrorKind::HotplugSubscriptionFailed,
            _ => ErrorKind::DeviceEnumerationFailed,
        }
    }
}

/// Filesystem locations the enumerator reads. Overridable for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRoots {
    pub sysfs_class: PathBuf,
    pub by_id: PathBuf,
    pub dev: PathBuf,
}

impl Default for DeviceRoots {
    fn default() -> Self {
        Self {
            sysfs_class: PathBuf::from("/sys/class/video4linux"),
            by_id: PathBuf::from("/dev/v4l/by-id"),
            dev: PathBuf::from("/dev"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Window in which Change events for one device collapse into one.
    pub debounce: Duration,
    /// Delay after a USB add before rescanning, so video nodes exist.
    pub usb_settle: Duration,
    pub signal_poll_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            usb_settle: Duration::from_secs(1),
            signal_poll_interval: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}
