//! Apple VideoToolbox encoders. Ignores `bf`; CRF and CQP both map onto the
//! `q:v` quality scale.

use vidnode_core::types::mbps;
use vidnode_core::{QualityParams, RateControlMode};

use crate::EncoderError;
use crate::settings::{EncoderSettings, Options, set};

pub const NAMES: &[&str] = &["h264_videotoolbox", "hevc_videotoolbox", "prores_videotoolbox"];

pub(super) fn production_settings() -> EncoderSettings {
    EncoderSettings::default()
        .with_option("allow_sw", "1")
        .with_option("realtime", "0")
        .with_option("q:v", "20")
}

pub(super) fn quality_params(params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Cbr => {
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
                set(&mut options, "maxrate", mbps(target));
            }
            if let Some(buffer) = params.buffer_size {
                set(&mut options, "bufsize", mbps(buffer));
            }
        }
        RateControlMode::Vbr => {
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
        RateControlMode::Cqp | RateControlMode::Crf => {
            if let Some(quality) = params.quality {
                set(&mut options, "q:v", quality);
            }
        }
    }

    if let Some(g) = params.keyframe_interval {
        set(&mut options, "g", g);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = production_settings();
        assert!(settings.pre_input_args.is_empty());
        assert!(settings.filter_chain.is_none());
        assert_eq!(settings.output_options.len(), 3);
        assert_eq!(settings.output_options["allow_sw"], "1");
        assert_eq!(settings.output_options["realtime"], "0");
        assert_eq!(settings.output_options["q:v"], "20");
    }

    #[test]
    fn cbr_pins_maxrate_to_target() {
        let params = QualityParams {
            target_bitrate: Some(8.0),
            b_frames: Some(2),
            ..QualityParams::new(RateControlMode::Cbr)
        };
        let options = quality_params(&params).unwrap();
        assert_eq!(options["b:v"], "8.0M");
        assert_eq!(options["maxrate"], "8.0M");
        assert!(!options.contains_key("bf"));
    }

    #[test]
    fn crf_becomes_quality_scale() {
        let params = QualityParams {
            quality: Some(30),
            ..QualityParams::new(RateControlMode::Crf)
        };
        assert_eq!(quality_params(&params).unwrap()["q:v"], "30");
    }
}
