//! Intel/AMD VA-API encoders.
//!
//! Frames are converted to nv12 on the CPU and uploaded to the render node.
//! CRF does not exist for VA-API.

use vidnode_core::types::mbps;
use vidnode_core::{QualityParams, RateControlMode};

use crate::EncoderError;
use crate::settings::{EncoderSettings, Options, set};

pub const NAMES: &[&str] = &[
    "h264_vaapi",
    "hevc_vaapi",
    "mpeg2_vaapi",
    "vp8_vaapi",
    "vp9_vaapi",
    "av1_vaapi",
];

pub const DEFAULT_DEVICE: &str = "/dev/dri/renderD128";

/// CPU conversion chain ending in an nv12 hardware upload.
pub fn upload_filter(input_format: &str) -> &'static str {
    match input_format {
        "" | "testsrc" | "nv12" | "nv16" | "nv24" => "format=nv12,hwupload",
        "mjpeg" => "format=yuvj420p,format=yuv420p,format=nv12,hwupload",
        "yuyv422" | "yuvj422" | "yuvj422p" => "format=yuv422p,format=yuv420p,format=nv12,hwupload",
        _ => "format=yuv420p,format=nv12,hwupload",
    }
}

pub(super) fn production_settings(device: &str, input_format: &str) -> EncoderSettings {
    EncoderSettings::default()
        .with_pre_input(&["-vaapi_device", device])
        .with_option("qp", "20")
        .with_option("bf", "0")
        .with_filter(upload_filter(input_format))
}

pub(super) fn quality_params(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Cbr => {
            set(&mut options, "rc_mode", "CBR");
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
            if let Some(max) = params.max_bitrate {
                set(&mut options, "maxrate", mbps(max));
            }
            if let Some(buffer) = params.buffer_size {
                set(&mut options, "bufsize", mbps(buffer));
            }
        }
        RateControlMode::Vbr => {
            set(&mut options, "rc_mode", "VBR");
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
            if let Some(max) = params.max_bitrate {
                set(&mut options, "maxrate", mbps(max));
            }
            if let Some(buffer) = params.buffer_size {
                set(&mut options, "bufsize", mbps(buffer));
            }
        }
        RateControlMode::Cqp => {
            set(&mut options, "rc_mode", "CQP");
            if let Some(quality) = params.quality {
                set(&mut options, "qp", quality);
            }
        }
        RateControlMode::Crf => return Err(EncoderError::unsupported(name, params.mode)),
    }

    if let Some(bf) = params.b_frames {
        set(&mut options, "bf", bf);
    }
    if let Some(g) = params.keyframe_interval {
        set(&mut options, "g", g);
    }
    Ok(options)
}
