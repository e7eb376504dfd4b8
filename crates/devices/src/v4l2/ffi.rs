//! `videodev2.h` structures and the ioctls used on them.

use nix::{ioctl_read, ioctl_readwrite};

pub const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const FMT_FLAG_EMULATED: u32 = 0x0002;

pub const FRMSIZE_TYPE_DISCRETE: u32 = 1;

pub const FRMIVAL_TYPE_DISCRETE: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FmtDesc {
    pub index: u32,
    pub kind: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixelformat: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

/// `union { discrete; stepwise; }` is kept as raw words: discrete is
/// `[width, height]`, stepwise is
/// `[min_width, max_width, step_width, min_height, max_height, step_height]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrmSizeEnum {
    pub index: u32,
    pub pixel_format: u32,
    pub kind: u32,
    pub size: [u32; 6],
    pub reserved: [u32; 2],
}

/// Discrete is `[num, den]`; stepwise is `[min num, min den, max num, max den,
/// step num, step den]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrmIvalEnum {
    pub index: u32,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub kind: u32,
    pub interval: [u32; 6],
    pub reserved: [u32; 2],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct BtTimings {
    pub width: u32,
    pub height: u32,
    pub interlaced: u32,
    pub polarities: u32,
    pub pixelclock: u64,
    pub hfrontporch: u32,
    pub hsync: u32,
    pub hbackporch: u32,
    pub vfrontporch: u32,
    pub vsync: u32,
    pub vbackporch: u32,
    pub il_vfrontporch: u32,
    pub il_vsync: u32,
    pub il_vbackporch: u32,
    pub standards: u32,
    pub flags: u32,
    pub picture_aspect: [u32; 2],
    pub cea861_vic: u8,
    pub hdmi_vic: u8,
    pub reserved: [u8; 46],
}

/// The kernel union is 128 bytes; the BT timings fill 124 of them.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DvTimings {
    pub kind: u32,
    pub bt: BtTimings,
    pub pad: [u8; 4],
}

impl DvTimings {
    pub fn zeroed() -> Self {
        // SAFETY: plain integers and byte arrays; all-zero is valid.
        unsafe { std::mem::zeroed() }
    }
}

const _: () = assert!(std::mem::size_of::<Capability>() == 104);
const _: () = assert!(std::mem::size_of::<FmtDesc>() == 64);
const _: () = assert!(std::mem::size_of::<FrmSizeEnum>() == 44);
const _: () = assert!(std::mem::size_of::<FrmIvalEnum>() == 52);
const _: () = assert!(std::mem::size_of::<BtTimings>() == 124);
const _: () = assert!(std::mem::size_of::<DvTimings>() == 132);

ioctl_read!(querycap, b'V', 0, Capability);
ioctl_readwrite!(enum_fmt, b'V', 2, FmtDesc);
ioctl_readwrite!(enum_framesizes, b'V', 74, FrmSizeEnum);
ioctl_readwrite!(enum_frameintervals, b'V', 75, FrmIvalEnum);
ioctl_readwrite!(g_dv_timings, b'V', 88, DvTimings);

/// NUL-terminated fixed buffer to string.
pub fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
