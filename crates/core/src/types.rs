use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Output codec family requested from the encoder selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecType {
    H264,
    H265,
}

impl CodecType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
        }
    }

    /// Software encoder used when no validation data exists.
    pub fn software_fallback(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
        }
    }

    /// Bucket an encoder name by the codec it produces, if it is H.264 or H.265.
    pub fn of_encoder(name: &str) -> Option<Self> {
        if name.contains("h264") || name.contains("x264") {
            Some(Self::H264)
        } else if name.contains("hevc") || name.contains("h265") || name.contains("x265") {
            Some(Self::H265)
        } else {
            None
        }
    }
}

impl std::fmt::Display for CodecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            _ => Err(ParseError::CodecType(s.to_string())),
        }
    }
}

/// Rate-control strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateControlMode {
    Cbr,
    Vbr,
    Crf,
    Cqp,
}

impl RateControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cbr => "CBR",
            Self::Vbr => "VBR",
            Self::Crf => "CRF",
            Self::Cqp => "CQP",
        }
    }
}

impl std::fmt::Display for RateControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateControlMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CBR" => Ok(Self::Cbr),
            "VBR" => Ok(Self::Vbr),
            "CRF" => Ok(Self::Crf),
            "CQP" => Ok(Self::Cqp),
            _ => Err(ParseError::RateControlMode(s.to_string())),
        }
    }
}

/// Rate-control request. Bitrates and buffer size are in Mbps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityParams {
    pub mode: RateControlMode,
    #[serde(default)]
    pub target_bitrate: Option<f64>,
    #[serde(default)]
    pub max_bitrate: Option<f64>,
    #[serde(default)]
    pub min_bitrate: Option<f64>,
    #[serde(default)]
    pub buffer_size: Option<f64>,
    /// 0-51, lower is better.
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub b_frames: Option<u32>,
    #[serde(default)]
    pub keyframe_interval: Option<u32>,
}

impl QualityParams {
    pub fn new(mode: RateControlMode) -> Self {
        Self {
            mode,
            target_bitrate: None,
            max_bitrate: None,
            min_bitrate: None,
            buffer_size: None,
            quality: None,
            preset: None,
            b_frames: None,
            keyframe_interval: None,
        }
    }
}

/// Format a Mbps value the way ffmpeg options expect it (`5.0M`).
pub fn mbps(value: f64) -> String {
    format!("{value:.1}M")
}
