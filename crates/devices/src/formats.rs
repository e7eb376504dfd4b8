//! Pixel formats, frame sizes and frame rates.

use serde::{Serialize, Serializer};

/// A V4L2 FourCC pixel format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    pub const MJPEG: Self = Self::from_fourcc(*b"MJPG");
    pub const YUYV: Self = Self::from_fourcc(*b"YUYV");
    pub const H264: Self = Self::from_fourcc(*b"H264");
    pub const NV12: Self = Self::from_fourcc(*b"NV12");

    pub const fn from_fourcc(code: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(code))
    }

    pub fn fourcc(self) -> String {
        String::from_utf8_lossy(&self.0.to_le_bytes()).into_owned()
    }

    /// Matching ffmpeg input pixel format, when there is one.
    pub fn ffmpeg_name(self) -> Option<&'static str> {
        Some(match &self.0.to_le_bytes() {
            b"MJPG" => "mjpeg",
            b"YUYV" => "yuyv422",
            b"H264" => "h264",
            b"NV12" => "nv12",
            b"NV16" => "nv16",
            b"NV24" => "nv24",
            b"RGB3" => "rgb24",
            b"BGR3" => "bgr24",
            b"YU12" => "yuv420p",
            b"UYVY" => "uyvy422",
            _ => return None,
        })
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fourcc())
    }
}

impl Serialize for PixelFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.fourcc())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    pub pixel_format: PixelFormat,
    pub description: String,
    pub emulated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A frame interval in seconds, `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Framerate {
    pub numerator: u32,
    pub denominator: u32,
}

impl Framerate {
    pub const fn per_second(fps: u32) -> Self {
        Self {
            numerator: 1,
            denominator: fps,
        }
    }

    pub fn fps(self) -> f64 {
        if self.numerator == 0 {
            return 0.0;
        }
        f64::from(self.denominator) / f64::from(self.numerator)
    }

    fn seconds(self) -> f64 {
        if self.denominator == 0 {
            return f64::INFINITY;
        }
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}

pub const COMMON_RESOLUTIONS: &[Resolution] = &[
    Resolution::new(320, 240),
    Resolution::new(640, 480),
    Resolution::new(800, 600),
    Resolution::new(1024, 768),
    Resolution::new(1280, 720),
    Resolution::new(1280, 960),
    Resolution::new(1280, 1024),
    Resolution::new(1920, 1080),
    Resolution::new(1920, 1200),
    Resolution::new(2560, 1440),
    Resolution::new(3840, 2160),
    Resolution::new(4096, 2160),
];

pub const COMMON_FRAMERATES: &[u32] = &[60, 50, 30, 25, 20, 15, 10, 5];

/// Common resolutions inside a stepwise or continuous frame size range.
pub fn resolutions_in_range(min: Resolution, max: Resolution) -> Vec<Resolution> {
    COMMON_RESOLUTIONS
        .iter()
        .copied()
        .filter(|r| {
            (min.width..=max.width).contains(&r.width)
                && (min.height..=max.height).contains(&r.height)
        })
        .collect()
}

/// Common frame rates whose interval lies between `min` and `max`.
pub fn framerates_in_range(min: Framerate, max: Framerate) -> Vec<Framerate> {
    let (lo, hi) = (min.seconds(), max.seconds());
    COMMON_FRAMERATES
        .iter()
        .map(|&fps| Framerate::per_second(fps))
        .filter(|f| {
            let interval = f.seconds();
            interval >= lo - f64::EPSILON && interval <= hi + f64::EPSILON
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_codes() {
        assert_eq!(PixelFormat::MJPEG.0, 0x4750_4A4D);
        assert_eq!(PixelFormat::YUYV.0, 0x5659_5559);
        assert_eq!(PixelFormat::H264.fourcc(), "H264");
    }

    #[test]
    fn ffmpeg_names() {
        assert_eq!(PixelFormat::MJPEG.ffmpeg_name(), Some("mjpeg"));
        assert_eq!(PixelFormat::YUYV.ffmpeg_name(), Some("yuyv422"));
        assert_eq!(PixelFormat::from_fourcc(*b"RGB3").ffmpeg_name(), Some("rgb24"));
        assert_eq!(PixelFormat::from_fourcc(*b"YU12").ffmpeg_name(), Some("yuv420p"));
        assert_eq!(PixelFormat::from_fourcc(*b"HEVC").ffmpeg_name(), None);
    }

    #[test]
    fn stepwise_resolutions_are_clipped() {
        let found = resolutions_in_range(Resolution::new(640, 480), Resolution::new(1920, 1080));
        assert_eq!(found.first(), Some(&Resolution::new(640, 480)));
        assert_eq!(found.last(), Some(&Resolution::new(1920, 1080)));
        assert!(!found.contains(&Resolution::new(1920, 1200)));
        assert!(!found.contains(&Resolution::new(320, 240)));
    }

    #[test]
    fn continuous_intervals_are_clipped() {
        // 1/30 s .. 1/10 s
        let found = framerates_in_range(Framerate::per_second(30), Framerate::per_second(10));
        let fps: Vec<_> = found.iter().map(|f| f.fps() as u32).collect();
        assert_eq!(fps, [30, 25, 20, 15, 10]);
    }

    #[test]
    fn zero_interval_is_zero_fps() {
        let f = Framerate {
            numerator: 0,
            denominator: 30,
        };
        assert_eq!(f.fps(), 0.0);
    }
}
