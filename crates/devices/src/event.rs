use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::device::Device;
use crate::signal::SignalStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAction {
    Added,
    Removed,
    Changed,
}

impl DeviceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
        }
    }
}

impl std::fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hotplug notification. `signal` is only set for HDMI inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    pub action: DeviceAction,
    pub device_id: String,
    pub path: PathBuf,
    pub name: String,
    pub caps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalStatus>,
    pub timestamp: DateTime<Utc>,
}

impl DeviceEvent {
    pub fn new(action: DeviceAction, device: &Device, signal: Option<SignalStatus>) -> Self {
        Self {
            action,
            device_id: device.id.clone(),
            path: device.path.clone(),
            name: device.name.clone(),
            caps: device.caps,
            signal,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceKind;
    use crate::signal::SignalState;

    fn device() -> Device {
        Device {
            id: "usb-Elgato_Cam_Link-video-index0".into(),
            path: "/dev/video0".into(),
            name: "Cam Link 4K".into(),
            driver: "uvcvideo".into(),
            bus_info: "usb-0000:00:14.0-1".into(),
            caps: 0x0420_0001,
            kind: DeviceKind::Hdmi,
        }
    }

    #[test]
    fn serializes_wire_shape() {
        let event = DeviceEvent::new(
            DeviceAction::Added,
            &device(),
            Some(crate::SignalStatus::new(SignalState::NoLink)),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "added");
        assert_eq!(value["device_id"], "usb-Elgato_Cam_Link-video-index0");
        assert_eq!(value["path"], "/dev/video0");
        assert_eq!(value["caps"], 0x0420_0001);
        assert_eq!(value["signal"]["state"], "no_link");
        let ts = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn signal_is_omitted_when_absent() {
        let event = DeviceEvent::new(DeviceAction::Removed, &device(), None);
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("signal").is_none());
    }
}
