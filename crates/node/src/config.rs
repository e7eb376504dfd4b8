use std::path::PathBuf;

use anyhow::Context;
use vidnode_encoders::{Backend, EncoderConfig};

/// Daemon settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub encoders: EncoderConfig,
    /// Ignore any saved validation file and probe again.
    pub revalidate: bool,
    pub json_logs: bool,
    /// Stream destination with `{id}` standing for the device id. Devices
    /// are only streamed when this is set.
    pub output_url: Option<String>,
}

impl NodeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut encoders = EncoderConfig::default();

        if let Some(path) = lookup("VIDNODE_FFMPEG") {
            encoders.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("VIDNODE_VALIDATION_FILE") {
            encoders.validation_file = PathBuf::from(path);
        }
        if let Some(list) = lookup("VIDNODE_ENCODER_PRIORITY") {
            encoders.priority = parse_priority(&list)?;
        }
        if let Some(flag) = lookup("VIDNODE_RKMPP_MJPEG") {
            encoders.include_mjpeg_rkmpp = parse_flag(&flag);
        }

        Ok(Self {
            encoders,
            revalidate: lookup("VIDNODE_REVALIDATE").is_some_and(|v| parse_flag(&v)),
            json_logs: lookup("VIDNODE_LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            output_url: lookup("VIDNODE_OUTPUT_URL").filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse_priority(list: &str) -> anyhow::Result<Vec<Backend>> {
    list.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            tag.parse::<Backend>()
                .with_context(|| format!("invalid VIDNODE_ENCODER_PRIORITY entry {tag:?}"))
        })
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
