//! Linux V4L2 access through raw ioctls.

pub mod ffi;

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use tracing::debug;

use crate::device::{self, Device, DeviceKind, DeviceProbe};
use crate::formats::{FormatInfo, Framerate, PixelFormat, Resolution};
use crate::signal::{self, SignalState, SignalStatus, Timings};
use crate::{DeviceError, DeviceRoots};

fn open(path: &Path) -> Result<File, DeviceError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
        .map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn ioctl_error(path: &Path, request: &'static str) -> impl FnOnce(Errno) -> DeviceError {
    let path = path.to_path_buf();
    move |source| DeviceError::Ioctl {
        path,
        request,
        source,
    }
}

fn query_capability(file: &File, path: &Path) -> Result<ffi::Capability, DeviceError> {
    let mut cap = ffi::Capability::default();
    // SAFETY: `cap` is a live, writable v4l2_capability.
    unsafe { ffi::querycap(file.as_raw_fd(), &mut cap) }
        .map_err(ioctl_error(path, "VIDIOC_QUERYCAP"))?;
    Ok(cap)
}

fn dv_timings(file: &File) -> Result<Timings, Errno> {
    let mut raw = ffi::DvTimings::zeroed();
    // SAFETY: `raw` is a live, writable v4l2_dv_timings.
    unsafe { ffi::g_dv_timings(file.as_raw_fd(), &mut raw) }?;
    let bt = raw.bt;
    let horizontal = [bt.width, bt.hfrontporch, bt.hsync, bt.hbackporch];
    let vertical = [bt.height, bt.vfrontporch, bt.vsync, bt.vbackporch];
    Ok(Timings {
        width: bt.width,
        height: bt.height,
        interlaced: bt.interlaced != 0,
        pixelclock: bt.pixelclock,
        total_width: horizontal.iter().map(|&v| u64::from(v)).sum(),
        total_height: vertical.iter().map(|&v| u64::from(v)).sum(),
    })
}

/// [`DeviceProbe`] backed by the kernel.
#[derive(Debug, Clone, Default)]
pub struct V4l2Probe {
    roots: DeviceRoots,
}

impl V4l2Probe {
    pub fn new(roots: DeviceRoots) -> Self {
        Self { roots }
    }

    fn describe(&self, path: &Path) -> Result<Device, DeviceError> {
        let file = open(path)?;
        let cap = query_capability(&file, path)?;
        let caps = device::effective_caps(cap.capabilities, cap.device_caps);
        if caps & device::CAP_VIDEO_CAPTURE == 0 {
            return Err(DeviceError::NotCapture(path.to_path_buf()));
        }

        let driver = ffi::cstr(&cap.driver);
        let name = ffi::cstr(&cap.card);
        let bus_info = ffi::cstr(&cap.bus_info);
        let node = device::node_name(path).unwrap_or_default();
        let kind = if signal::is_hdmi_response(&dv_timings(&file)) {
            DeviceKind::Hdmi
        } else if driver == "uvcvideo" {
            DeviceKind::Webcam
        } else {
            DeviceKind::Unknown
        };

        Ok(Device {
            id: device::stable_id(&self.roots, node, &bus_info, &name),
            path: path.to_path_buf(),
            name,
            driver,
            bus_info,
            caps,
            kind,
        })
    }

    /// Device path for a stable ID.
    pub fn path_for_id(&self, id: &str) -> Result<PathBuf, DeviceError> {
        self.enumerate()?
            .into_iter()
            .find(|d| d.id == id)
            .map(|d| d.path)
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))
    }
}

impl DeviceProbe for V4l2Probe {
    fn enumerate(&self) -> Result<Vec<Device>, DeviceError> {
        let mut devices = Vec::new();
        for node in device::video_nodes(&self.roots)? {
            let path = self.roots.dev.join(&node);
            match self.describe(&path) {
                Ok(device) => devices.push(device),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping video node"),
            }
        }
        Ok(devices)
    }

    fn probe(&self, path: &Path) -> Result<Device, DeviceError> {
        self.describe(path)
    }

    fn signal(&self, path: &Path) -> SignalStatus {
        match open(path) {
            Ok(file) => signal::status_from_timings(dv_timings(&file)),
            Err(_) => SignalStatus::new(SignalState::NoDevice),
        }
    }
}

/// Pixel formats the node can capture.
pub fn formats(path: &Path) -> Result<Vec<FormatInfo>, DeviceError> {
    let file = open(path)?;
    let mut formats = Vec::new();
    for index in 0.. {
        let mut desc = ffi::FmtDesc {
            index,
            kind: ffi::BUF_TYPE_VIDEO_CAPTURE,
            ..Default::default()
        };
        // SAFETY: `desc` is a live, writable v4l2_fmtdesc.
        match unsafe { ffi::enum_fmt(file.as_raw_fd(), &mut desc) } {
            Ok(_) => formats.push(FormatInfo {
                pixel_format: PixelFormat(desc.pixelformat),
                description: ffi::cstr(&desc.description),
                emulated: desc.flags & ffi::FMT_FLAG_EMULATED != 0,
            }),
            Err(Errno::EINVAL) => break,
            Err(e) => return Err(ioctl_error(path, "VIDIOC_ENUM_FMT")(e)),
        }
    }
    Ok(formats)
}

/// Frame sizes for `format`. Stepwise and continuous ranges are reported as
/// the common resolutions they cover.
pub fn resolutions(path: &Path, format: PixelFormat) -> Result<Vec<Resolution>, DeviceError> {
    let file = open(path)?;
    let mut found = Vec::new();
    for index in 0.. {
        let mut size = ffi::FrmSizeEnum {
            index,
            pixel_format: format.0,
            ..Default::default()
        };
        // SAFETY: `size` is a live, writable v4l2_frmsizeenum.
        match unsafe { ffi::enum_framesizes(file.as_raw_fd(), &mut size) } {
            Ok(_) if size.kind == ffi::FRMSIZE_TYPE_DISCRETE => {
                found.push(Resolution::new(size.size[0], size.size[1]));
            }
            Ok(_) => {
                let [min_w, max_w, _, min_h, max_h, _] = size.size;
                found.extend(crate::formats::resolutions_in_range(
                    Resolution::new(min_w, min_h),
                    Resolution::new(max_w, max_h),
                ));
                break;
            }
            Err(Errno::EINVAL) => break,
            Err(Errno::ENOTTY) => return Ok(Vec::new()),
            Err(e) => return Err(ioctl_error(path, "VIDIOC_ENUM_FRAMESIZES")(e)),
        }
    }
    Ok(found)
}

/// Frame intervals for `format` at `size`.
pub fn framerates(
    path: &Path,
    format: PixelFormat,
    size: Resolution,
) -> Result<Vec<Framerate>, DeviceError> {
    let file = open(path)?;
    let mut found = Vec::new();
    for index in 0.. {
        let mut ival = ffi::FrmIvalEnum {
            index,
            pixel_format: format.0,
            width: size.width,
            height: size.height,
            ..Default::default()
        };
        // SAFETY: `ival` is a live, writable v4l2_frmivalenum.
        match unsafe { ffi::enum_frameintervals(file.as_raw_fd(), &mut ival) } {
            Ok(_) if ival.kind == ffi::FRMIVAL_TYPE_DISCRETE => found.push(Framerate {
                numerator: ival.interval[0],
                denominator: ival.interval[1],
            }),
            Ok(_) => {
                let [min_num, min_den, max_num, max_den, _, _] = ival.interval;
                found.extend(crate::formats::framerates_in_range(
                    Framerate {
                        numerator: min_num,
                        denominator: min_den,
                    },
                    Framerate {
                        numerator: max_num,
                        denominator: max_den,
                    },
                ));
                break;
            }
            Err(Errno::EINVAL) => break,
            Err(e) => return Err(ioctl_error(path, "VIDIOC_ENUM_FRAMEINTERVALS")(e)),
        }
    }
    Ok(found)
}
