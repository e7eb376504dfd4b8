//! Software encoders (x264, x265, libvpx and friends).
//!
//! The fallback backend. Names it does not know still get a plain 1 Mbps
//! bitrate so any `lib*` encoder can be probed.

use vidnode_core::types::mbps;
use vidnode_core::{QualityParams, RateControlMode};

use crate::EncoderError;
use crate::settings::{EncoderSettings, Options, set};

pub const NAMES: &[&str] = &["libx264", "libx265", "libvpx", "libvpx-vp9", "mpeg4", "libxvid"];

/// x264/x265 presets, fastest first.
pub const PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

const DEFAULT_PRESET: &str = "ultrafast";
const VP9_DEFAULT_CRF: u8 = 31;

pub(super) fn production_settings(name: &str, input_format: &str) -> EncoderSettings {
    let settings = match name {
        "libx264" => EncoderSettings::default()
            .with_option("crf", "18")
            .with_option("preset", DEFAULT_PRESET),
        "libx265" => EncoderSettings::default()
            .with_option("crf", "20")
            .with_option("preset", DEFAULT_PRESET),
        "libvpx" | "libvpx-vp9" => EncoderSettings::default()
            .with_option("b:v", "1M")
            .with_option("cpu-used", "8"),
        "mpeg4" | "libxvid" => EncoderSettings::default()
            .with_option("b:v", "1M")
            .with_option("q:v", "5"),
        _ => EncoderSettings::default().with_option("b:v", "1M"),
    };

    match input_format {
        "" | "yuv420p" => settings,
        _ => settings.with_filter("format=yuv420p"),
    }
}

pub(super) fn quality_params(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    match name {
        "libx264" | "libx265" => x26x(name, params),
        "libvpx" => vp8(name, params),
        "libvpx-vp9" => vp9(name, params),
        _ => other(name, params),
    }
}

fn x26x(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Crf => {
            let default = if name == "libx265" { 28 } else { 23 };
            set(&mut options, "crf", params.quality.unwrap_or(default));
        }
        RateControlMode::Cbr => {
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
                set(&mut options, "minrate", mbps(target));
                set(&mut options, "maxrate", mbps(target));
                set(&mut options, "bufsize", mbps(params.buffer_size.unwrap_or(target * 2.0)));
            } else if let Some(buffer) = params.buffer_size {
                set(&mut options, "bufsize", mbps(buffer));
            }
        }
        RateControlMode::Vbr => {
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
            if let Some(min) = params.min_bitrate {
                set(&mut options, "minrate", mbps(min));
            }
            if let Some(max) = params.max_bitrate {
                set(&mut options, "maxrate", mbps(max));
                set(&mut options, "bufsize", mbps(params.buffer_size.unwrap_or(max * 2.0)));
            } else if let Some(buffer) = params.buffer_size {
                set(&mut options, "bufsize", mbps(buffer));
            }
        }
        RateControlMode::Cqp => {
            if let Some(quality) = params.quality {
                set(&mut options, "qp", quality);
            }
        }
    }

    // Unknown presets are dropped rather than passed to the encoder.
    match params.preset.as_deref() {
        None => set(&mut options, "preset", DEFAULT_PRESET),
        Some(preset) if PRESETS.contains(&preset) => set(&mut options, "preset", preset),
        Some(_) => {}
    }
    if let Some(bf) = params.b_frames {
        set(&mut options, "bf", bf);
    }
    if let Some(g) = params.keyframe_interval {
        set(&mut options, "g", g);
    }
    Ok(options)
}

/// libvpx (VP8): bitrate modes only, no B-frames.
fn vp8(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Cbr => {
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
                set(&mut options, "minrate", mbps(target));
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
        RateControlMode::Crf | RateControlMode::Cqp => {
            return Err(EncoderError::unsupported(name, params.mode));
        }
    }
    if let Some(g) = params.keyframe_interval {
        set(&mut options, "g", g);
    }
    Ok(options)
}

/// libvpx-vp9: constant quality, or constrained quality when a bitrate is given.
fn vp9(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Crf => {
            set(&mut options, "crf", params.quality.unwrap_or(VP9_DEFAULT_CRF));
            set(&mut options, "b:v", "0");
        }
        RateControlMode::Vbr => {
            if let Some(quality) = params.quality {
                set(&mut options, "crf", quality);
            }
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
        RateControlMode::Cbr | RateControlMode::Cqp => {
            return Err(EncoderError::unsupported(name, params.mode));
        }
    }
    if let Some(g) = params.keyframe_interval {
        set(&mut options, "g", g);
    }
    Ok(options)
}

/// mpeg4, libxvid and names we know nothing about.
fn other(name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
    let mut options = Options::new();
    match params.mode {
        RateControlMode::Cbr => {
            if let Some(target) = params.target_bitrate {
                set(&mut options, "b:v", mbps(target));
            }
            if let Some(min) = params.min_bitrate {
                set(&mut options, "minrate", mbps(min));
            }
            if let Some(max) = params.max_bitrate {
                set(&mut options, "maxrate", mbps(max));
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
        RateControlMode::Cqp => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use vidnode_core::ErrorKind;

    fn opts(pairs: &[(&str, &str)]) -> Options {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn production_defaults_per_encoder() {
        for (name, expected) in [
            ("libx264", opts(&[("crf", "18"), ("preset", "ultrafast")])),
            ("libx265", opts(&[("crf", "20"), ("preset", "ultrafast")])),
            ("libvpx", opts(&[("b:v", "1M"), ("cpu-used", "8")])),
            ("libvpx-vp9", opts(&[("b:v", "1M"), ("cpu-used", "8")])),
            ("mpeg4", opts(&[("b:v", "1M"), ("q:v", "5")])),
            ("some_encoder", opts(&[("b:v", "1M")])),
        ] {
            let settings = production_settings(name, "");
            assert_eq!(settings.output_options, expected, "{name}");
            assert!(settings.pre_input_args.is_empty());
        }
    }

    #[test]
    fn converts_non_planar_inputs() {
        for input in ["mjpeg", "yuyv422", "nv12", "rgb24"] {
            let settings = production_settings("libx264", input);
            assert_eq!(settings.filter_chain.as_deref(), Some("format=yuv420p"), "{input}");
        }
        for input in ["", "yuv420p"] {
            assert!(production_settings("libx264", input).filter_chain.is_none());
        }
    }

    #[test]
    fn x264_crf_default_and_explicit() {
        let params = QualityParams::new(RateControlMode::Crf);
        assert_eq!(
            quality_params("libx264", &params).unwrap(),
            opts(&[("crf", "23"), ("preset", "ultrafast")])
        );
        assert_eq!(quality_params("libx265", &params).unwrap()["crf"], "28");

        let params = QualityParams {
            quality: Some(20),
            preset: Some("medium".into()),
            ..QualityParams::new(RateControlMode::Crf)
        };
        assert_eq!(
            quality_params("libx264", &params).unwrap(),
            opts(&[("crf", "20"), ("preset", "medium")])
        );
    }

    #[test]
    fn x264_cbr_pins_rates_and_doubles_buffer() {
        let params = QualityParams {
            target_bitrate: Some(5.0),
            b_frames: Some(0),
            keyframe_interval: Some(60),
            ..QualityParams::new(RateControlMode::Cbr)
        };
        assert_eq!(
            quality_params("libx264", &params).unwrap(),
            opts(&[
                ("b:v", "5.0M"),
                ("minrate", "5.0M"),
                ("maxrate", "5.0M"),
                ("bufsize", "10.0M"),
                ("preset", "ultrafast"),
                ("bf", "0"),
                ("g", "60"),
            ])
        );
    }

    #[test]
    fn x265_vbr_buffer_follows_max() {
        let params = QualityParams {
            target_bitrate: Some(5.0),
            max_bitrate: Some(10.0),
            ..QualityParams::new(RateControlMode::Vbr)
        };
        let options = quality_params("libx265", &params).unwrap();
        assert_eq!(options["b:v"], "5.0M");
        assert_eq!(options["maxrate"], "10.0M");
        assert_eq!(options["bufsize"], "20.0M");
    }

    #[test]
    fn invalid_preset_is_omitted() {
        let params = QualityParams {
            quality: Some(30),
            preset: Some("warp-speed".into()),
            ..QualityParams::new(RateControlMode::Cqp)
        };
        assert_eq!(
            quality_params("libx264", &params).unwrap(),
            opts(&[("qp", "30")])
        );
    }

    #[test]
    fn libvpx_supports_only_bitrate_modes() {
        let params = QualityParams {
            target_bitrate: Some(2.0),
            ..QualityParams::new(RateControlMode::Cbr)
        };
        assert_eq!(
            quality_params("libvpx", &params).unwrap(),
            opts(&[("b:v", "2.0M"), ("minrate", "2.0M"), ("maxrate", "2.0M")])
        );
        for mode in [RateControlMode::Crf, RateControlMode::Cqp] {
            let err = quality_params("libvpx", &QualityParams::new(mode)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedMode);
        }
    }

    #[test]
    fn vp9_supports_crf_and_vbr() {
        let params = QualityParams {
            quality: Some(35),
            ..QualityParams::new(RateControlMode::Crf)
        };
        assert_eq!(
            quality_params("libvpx-vp9", &params).unwrap(),
            opts(&[("crf", "35"), ("b:v", "0")])
        );

        let params = QualityParams {
            quality: Some(33),
            target_bitrate: Some(3.0),
            keyframe_interval: Some(120),
            ..QualityParams::new(RateControlMode::Vbr)
        };
        assert_eq!(
            quality_params("libvpx-vp9", &params).unwrap(),
            opts(&[("crf", "33"), ("b:v", "3.0M"), ("g", "120")])
        );

        for mode in [RateControlMode::Cbr, RateControlMode::Cqp] {
            let err = quality_params("libvpx-vp9", &QualityParams::new(mode)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedMode);
        }
    }

    #[test]
    fn unknown_encoder_passes_through() {
        let params = QualityParams {
            target_bitrate: Some(1.5),
            max_bitrate: Some(3.0),
            ..QualityParams::new(RateControlMode::Cbr)
        };
        assert_eq!(
            quality_params("some_encoder", &params).unwrap(),
            opts(&[("b:v", "1.5M"), ("maxrate", "3.0M")])
        );

        let params = QualityParams {
            quality: Some(4),
            keyframe_interval: Some(50),
            ..QualityParams::new(RateControlMode::Cqp)
        };
        assert_eq!(
            quality_params("mpeg4", &params).unwrap(),
            opts(&[("qp", "4"), ("g", "50")])
        );

        let err = quality_params("libxvid", &QualityParams::new(RateControlMode::Crf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMode);
    }
}
