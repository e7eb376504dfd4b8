//! Capture device records and stable identity.
//!
//! A stable ID survives unplug and replug. It comes from the udev
//! `/dev/v4l/by-id` symlink when one points at the node, and otherwise is a
//! hash of the USB vendor, product and serial (or the bus info and card name
//! for non-USB devices) plus the node's interface index.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::signal::SignalStatus;
use crate::{DeviceError, DeviceRoots};

pub const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Hdmi,
    Webcam,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    pub driver: String,
    pub bus_info: String,
    pub caps: u32,
    pub kind: DeviceKind,
}

impl Device {
    pub fn is_capture(&self) -> bool {
        self.caps & CAP_VIDEO_CAPTURE != 0
    }

    pub fn is_hdmi(&self) -> bool {
        self.kind == DeviceKind::Hdmi
    }
}

/// Access to the capture hardware. The hotplug monitor only talks to devices
/// through this, so it can run against a fake.
pub trait DeviceProbe: Send + Sync + 'static {
    /// Every capture device currently present.
    fn enumerate(&self) -> Result<Vec<Device>, DeviceError>;

    /// Query one node. Fails with `NotCapture` when the node exists but
    /// cannot capture video.
    fn probe(&self, path: &Path) -> Result<Device, DeviceError>;

    fn signal(&self, path: &Path) -> SignalStatus;
}

/// Capabilities that apply to this node rather than the whole driver.
pub fn effective_caps(capabilities: u32, device_caps: u32) -> u32 {
    if capabilities & CAP_DEVICE_CAPS != 0 {
        device_caps
    } else {
        capabilities
    }
}

/// `videoN` entries under the sysfs class directory, in numeric order. A
/// missing class directory means no devices.
pub fn video_nodes(roots: &DeviceRoots) -> Result<Vec<String>, DeviceError> {
    let entries = match fs::read_dir(&roots.sysfs_class) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(DeviceError::Read {
                path: roots.sysfs_class.clone(),
                source,
            });
        }
    };

    let mut nodes: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.starts_with("video"))
        .collect();
    nodes.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    Ok(nodes)
}

/// Node name from a device path or a uevent `DEVNAME`.
pub fn node_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Interface index of a node within its device, 0 when unknown.
pub fn node_index(roots: &DeviceRoots, node: &str) -> u32 {
    read_attr(&roots.sysfs_class.join(node).join("index"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Name of the by-id symlink that resolves to `node` and carries its index.
pub fn by_id_link(roots: &DeviceRoots, node: &str, index: u32) -> Option<String> {
    let suffix = format!("-video-index{index}");
    let mut links: Vec<String> = fs::read_dir(&roots.by_id)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let target = fs::read_link(entry.path()).ok()?;
            (name.ends_with(&suffix) && node_name(&target) == Some(node)).then_some(name)
        })
        .collect();
    links.sort();
    links.into_iter().next()
}

/// USB vendor, product and serial of the device owning `node`, found by
/// walking up from its sysfs device directory.
pub fn usb_identity(roots: &DeviceRoots, node: &str) -> Option<(String, String, String)> {
    let device = fs::canonicalize(roots.sysfs_class.join(node).join("device")).ok()?;
    device.ancestors().find_map(|dir| {
        let vendor = read_attr(&dir.join("idVendor"))?;
        let product = read_attr(&dir.join("idProduct")).unwrap_or_default();
        let serial = read_attr(&dir.join("serial")).unwrap_or_default();
        Some((vendor, product, serial))
    })
}

/// Deterministic ID for devices with no by-id link.
pub fn synthetic_id(seed: &str, index: u32) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    format!("synthetic-{}-video-index{index}", &hex::encode(digest)[..16])
}

/// Stable ID for `node`, preferring the by-id symlink.
pub fn stable_id(roots: &DeviceRoots, node: &str, bus_info: &str, card: &str) -> String {
    let index = node_index(roots, node);
    if let Some(link) = by_id_link(roots, node, index) {
        return link;
    }
    let seed = match usb_identity(roots, node) {
        Some((vendor, product, serial)) => format!("{vendor}:{product}:{serial}"),
        None => format!("{bus_info}:{card}"),
    };
    synthetic_id(&seed, index)
}

fn read_attr(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_caps_take_precedence() {
        assert_eq!(effective_caps(0x8420_0001, 0x0420_0001), 0x0420_0001);
        assert_eq!(effective_caps(0x0000_0001, 0x0000_0000), 0x0000_0001);
    }

    #[test]
    fn synthetic_ids_are_deterministic() {
        let a = synthetic_id("046d:085c:ABC123", 0);
        assert_eq!(a, synthetic_id("046d:085c:ABC123", 0));
        assert_ne!(a, synthetic_id("046d:085c:ABC124", 0));
        assert!(a.starts_with("synthetic-"));
        assert!(a.ends_with("-video-index0"));
        assert_eq!(a.len(), "synthetic-".len() + 16 + "-video-index0".len());
    }

    #[test]
    fn node_names() {
        assert_eq!(node_name(Path::new("/dev/video2")), Some("video2"));
        assert_eq!(node_name(Path::new("../../video0")), Some("video0"));
    }
}
