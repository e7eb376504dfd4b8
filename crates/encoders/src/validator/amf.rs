//! AMD AMF encoders. No device flags and no filter chain.

use vidnode_core::types::mbps;
use vidnode_core::{QualityParams, RateControlMode};

use crate::EncoderError;
use crate::settings::{EncoderSettings, Options, set};

pub const NAMES: &[&str] = &["h264_amf", "hevc_amf", "av1_amf"];

pub(super) fn production_settings() -> EncoderSettings {
    EncoderSettings::default()
        .with_option("usage", "transcoding")
        .with_option("quality", "balanced")
        .with_option("rc", "cqp")
        .with_option("qp", "20")
}

pub(super) fn quality_params(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Cbr => {
            set(&mut options, "rc", "cbr");
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
            if let Some(buffer) = params.buffer_size {
                set(&mut options, "bufsize", mbps(buffer));
            }
        }
        RateControlMode::Vbr => {
            set(&mut options, "rc", "vbr_peak");
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
            set(&mut options, "rc", "cqp");
            if let Some(quality) = params.quality {
                set(&mut options, "qp_i", quality);
                set(&mut options, "qp_p", quality);
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
