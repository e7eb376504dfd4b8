//! Kernel uevent messages: `ACTION@DEVPATH\0KEY=VALUE\0...`.

use std::collections::HashMap;

pub const SUBSYSTEM_VIDEO: &str = "video4linux";
pub const SUBSYSTEM_USB: &str = "usb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uevent {
    pub action: String,
    /// Kernel object path from the header, e.g. `/devices/pci0000:00/...`.
    pub kobj: String,
    pub subsystem: String,
    pub devtype: String,
    /// Node name relative to /dev, e.g. `video0`.
    pub devname: String,
    pub devpath: String,
    pub env: HashMap<String, String>,
}

impl Uevent {
    /// Parse one datagram. Messages relayed by udev carry a binary
    /// `libudev` header that is skipped.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = if data.starts_with(b"libudev") {
            skip_udev_header(data)?
        } else {
            data
        };

        let mut parts = data.split(|&b| b == 0);
        let header = std::str::from_utf8(parts.next()?).ok()?;
        let (action, kobj) = header.split_once('@')?;
        if action.is_empty() {
            return None;
        }

        let mut event = Self {
            action: action.to_string(),
            kobj: kobj.to_string(),
            subsystem: String::new(),
            devtype: String::new(),
            devname: String::new(),
            devpath: String::new(),
            env: HashMap::new(),
        };
        for part in parts {
            let Ok(kv) = std::str::from_utf8(part) else {
                continue;
            };
            let Some((key, value)) = kv.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            match key {
                "SUBSYSTEM" => event.subsystem = value.to_string(),
                "DEVTYPE" => event.devtype = value.to_string(),
                "DEVNAME" => event.devname = value.to_string(),
                "DEVPATH" => event.devpath = value.to_string(),
                _ => {}
            }
            event.env.insert(key.to_string(), value.to_string());
        }
        Some(event)
    }

    pub fn is_video(&self) -> bool {
        self.subsystem == SUBSYSTEM_VIDEO
    }

    /// A whole USB device, not one of its interfaces.
    pub fn is_usb_device(&self) -> bool {
        self.subsystem == SUBSYSTEM_USB && self.devtype == "usb_device"
    }
}

fn skip_udev_header(data: &[u8]) -> Option<&[u8]> {
    data.iter().enumerate().find_map(|(i, &b)| {
        if b != 0 {
            return None;
        }
        let rest = &data[i + 1..];
        let segment = rest.split(|&c| c == 0).next()?;
        let at = segment.iter().position(|&c| c == b'@')?;
        (at > 0 && at < 20).then_some(rest)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(parts: &[&str]) -> Vec<u8> {
        parts.join("\0").into_bytes()
    }

    #[test]
    fn parses_kernel_message() {
        let data = message(&[
            "add@/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/video4linux/video0",
            "ACTION=add",
            "DEVPATH=/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/video4linux/video0",
            "SUBSYSTEM=video4linux",
            "MAJOR=81",
            "MINOR=0",
            "DEVNAME=video0",
            "SEQNUM=4242",
        ]);
        let event = Uevent::parse(&data).unwrap();
        assert_eq!(event.action, "add");
        assert_eq!(event.subsystem, "video4linux");
        assert_eq!(event.devname, "video0");
        assert!(event.devpath.ends_with("video4linux/video0"));
        assert_eq!(event.env["SEQNUM"], "4242");
        assert!(event.is_video());
    }

    #[test]
    fn parses_usb_device() {
        let data = message(&[
            "remove@/devices/pci0000:00/0000:00:14.0/usb1/1-2",
            "ACTION=remove",
            "SUBSYSTEM=usb",
            "DEVTYPE=usb_device",
            "DEVNAME=bus/usb/001/007",
        ]);
        let event = Uevent::parse(&data).unwrap();
        assert!(event.is_usb_device());
        assert!(!event.is_video());
    }

    #[test]
    fn skips_udev_header() {
        let mut data = b"libudev\0\xfe\xed\xca\xfe\0\0\0\0".to_vec();
        data.extend(message(&["change@/devices/virtual/video4linux/video9", "SUBSYSTEM=video4linux"]));
        let event = Uevent::parse(&data).unwrap();
        assert_eq!(event.action, "change");
        assert_eq!(event.kobj, "/devices/virtual/video4linux/video9");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Uevent::parse(b"").is_none());
        assert!(Uevent::parse(b"no header here\0KEY=VALUE").is_none());
        assert!(Uevent::parse(b"@/devices/x").is_none());
    }

    #[test]
    fn ignores_malformed_pairs() {
        let data = message(&["add@/devices/x", "NOEQUALS", "=value", "", "SUBSYSTEM=usb"]);
        let event = Uevent::parse(&data).unwrap();
        assert_eq!(event.subsystem, "usb");
        assert_eq!(event.env.len(), 1);
    }
}
