//! Rockchip MPP encoders.
//!
//! Compressed sources decode on the MPP block straight into DRM frames. Packed
//! YUV goes through the RGA scaler, which needs a named hardware device. RGB
//! and semi-planar 4:2:2/4:4:4 frames are fed to the encoder as they are.
//! Ignores `bf`.

use vidnode_core::types::mbps;
use vidnode_core::{QualityParams, RateControlMode};

use crate::EncoderError;
use crate::settings::{EncoderSettings, Options, set};

pub const NAMES: &[&str] = &["h264_rkmpp", "hevc_rkmpp", "vp8_rkmpp"];

/// Only present in some ffmpeg builds.
pub const MJPEG_ENCODER: &str = "mjpeg_rkmpp";

const HW_DECODE: &[&str] = &["-hwaccel", "rkmpp", "-hwaccel_output_format", "drm_prime"];
const RGA_DEVICE: &[&str] = &["-init_hw_device", "rkmpp=hw", "-filter_hw_device", "hw"];
const RGA_UPLOAD: &str = "hwupload,scale_rkrga=format=nv12:afbc=0";

pub(super) fn production_settings(name: &str, input_format: &str) -> EncoderSettings {
    if name == MJPEG_ENCODER {
        return EncoderSettings::default().with_filter("format=nv12");
    }

    let settings = EncoderSettings::default()
        .with_option("rc_mode", "VBR")
        .with_option("g", "20")
        .with_option("bf", "0");

    match input_format {
        "" => settings,
        "mjpeg" | "h264" => settings.with_pre_input(HW_DECODE),
        "yuyv422" | "yuvj422" => settings.with_pre_input(RGA_DEVICE).with_filter(RGA_UPLOAD),
        "bgr24" | "rgb24" | "nv24" | "nv16" => settings,
        _ => settings.with_filter("format=nv12"),
    }
}

pub(super) fn quality_params(params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Cbr => {
            set(&mut options, "rc_mode", "CBR");
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
        }
        RateControlMode::Vbr => {
            set(&mut options, "rc_mode", "VBR");
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
            if let Some(min) = params.min_bitrate {
                set(&mut options, "minrate", mbps(min));
            }
            if let Some(max) = params.max_bitrate {
                set(&mut options, "maxrate", mbps(max));
            }
        }
        // MPP has no CRF; constant QP is the closest match.
        RateControlMode::Cqp | RateControlMode::Crf => {
            set(&mut options, "rc_mode", "CQP");
            if let Some(quality) = params.quality {
                set(&mut options, "qp_init", quality);
            }
        }
    }

    if let Some(g) = params.keyframe_interval {
        set(&mut options, "g", g);
    }
    Ok(options)
}
