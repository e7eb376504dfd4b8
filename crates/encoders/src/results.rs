//! Validation results: the TOML document of working and failed encoders,
//! how it is produced, and where it lives on disk.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vidnode_core::CodecType;

use crate::probe::{self, TEST_DURATION_SECS, TEST_RESOLUTION};
use crate::registry::ValidatorRegistry;
use crate::{EncoderConfig, EncoderError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationInfo {
    /// RFC 3339.
    pub timestamp: String,
    pub ffmpeg_version: String,
    pub test_duration: u32,
    /// `WIDTHxHEIGHT`.
    pub test_resolution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecResults {
    pub working: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationResults {
    pub validation_info: ValidationInfo,
    pub h264: CodecResults,
    pub h265: CodecResults,
}

impl ValidationResults {
    /// Empty results stamped with the current time and probe parameters.
    pub fn new(ffmpeg_version: impl Into<String>) -> Self {
        Self {
            validation_info: ValidationInfo {
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                ffmpeg_version: ffmpeg_version.into(),
                test_duration: TEST_DURATION_SECS,
                test_resolution: TEST_RESOLUTION.to_string(),
            },
            ..Self::default()
        }
    }

    pub fn codec(&self, codec: CodecType) -> &CodecResults {
        match codec {
            CodecType::H264 => &self.h264,
            CodecType::H265 => &self.h265,
        }
    }

    fn codec_mut(&mut self, codec: CodecType) -> &mut CodecResults {
        match codec {
            CodecType::H264 => &mut self.h264,
            CodecType::H265 => &mut self.h265,
        }
    }

    /// File a probe outcome under the codec its name implies. Names that
    /// imply neither codec are not recorded; returns whether it was.
    pub fn record(&mut self, name: &str, ok: bool) -> bool {
        let Some(codec) = CodecType::of_encoder(name) else {
            return false;
        };
        let bucket = self.codec_mut(codec);
        let list = if ok { &mut bucket.working } else { &mut bucket.failed };
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
        true
    }

    /// Drop names no registered validator recognizes. Returns what was dropped.
    pub fn retain_recognized(&mut self, registry: &ValidatorRegistry) -> Vec<String> {
        let mut dropped = Vec::new();
        for bucket in [&mut self.h264, &mut self.h265] {
            for list in [&mut bucket.working, &mut bucket.failed] {
                list.retain(|name| {
                    let keep = registry.is_recognized(name);
                    if !keep {
                        dropped.push(name.clone());
                    }
                    keep
                });
            }
        }
        dropped
    }

    pub fn from_toml(text: &str) -> Result<Self, EncoderError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, EncoderError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Probe every compiled encoder of every available validator, one at a
/// time. A failing probe is recorded and the batch carries on.
pub async fn validate_all(registry: &ValidatorRegistry, timeout: Duration) -> ValidationResults {
    let ffmpeg = registry.ffmpeg_path();
    let mut results = ValidationResults::new(probe::ffmpeg_version(ffmpeg).await);

    let compiled = registry.compiled_encoders().await;
    info!(validators = compiled.len(), "validating encoders");

    for (validator, names) in compiled {
        for name in names {
            if CodecType::of_encoder(name).is_none() {
                continue;
            }
            match validator.validate(ffmpeg, name, timeout).await {
                Ok(()) => {
                    info!(encoder = name, backend = %validator.backend(), "encoder working");
                    results.record(name, true);
                }
                Err(e) => {
                    warn!(encoder = name, backend = %validator.backend(), error = %e, "encoder failed validation");
                    results.record(name, false);
                }
            }
        }
    }

    info!(
        h264 = ?results.h264.working,
        h265 = ?results.h265.working,
        "encoder validation complete"
    );
    results
}

/// Validation results bound to the file they persist to.
#[derive(Debug, Clone)]
pub struct ValidationStore {
    path: PathBuf,
    results: Option<ValidationResults>,
}

impl ValidationStore {
    /// A store with no data yet.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            results: None,
        }
    }

    /// Read `path`, dropping any encoder names `registry` does not know.
    pub async fn load(
        path: impl Into<PathBuf>,
        registry: &ValidatorRegistry,
    ) -> Result<Self, EncoderError> {
        let path = path.into();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EncoderError::NoValidationData(path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut results = ValidationResults::from_toml(&text)?;
        let dropped = results.retain_recognized(registry);
        if !dropped.is_empty() {
            warn!(path = %path.display(), ?dropped, "ignoring unrecognized encoders in validation results");
        }
        Ok(Self {
            path,
            results: Some(results),
        })
    }

    /// Load the configured file, or probe the host and write a fresh one when
    /// it is missing, unreadable, or `force` is set.
    pub async fn load_or_validate(
        registry: &ValidatorRegistry,
        config: &EncoderConfig,
        force: bool,
    ) -> Result<Self, EncoderError> {
        if !force {
            match Self::load(&config.validation_file, registry).await {
                Ok(store) => {
                    info!(path = %config.validation_file.display(), "loaded validation results");
                    return Ok(store);
                }
                Err(e @ EncoderError::Io(_)) => return Err(e),
                Err(e) => info!(reason = %e, "running encoder validation"),
            }
        }

        let mut store = Self::empty(&config.validation_file);
        store.replace(validate_all(registry, config.probe_timeout).await);
        store.save().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_data(&self) -> bool {
        self.results.is_some()
    }

    pub fn results(&self) -> Option<&ValidationResults> {
        self.results.as_ref()
    }

    /// Working encoders for `codec`; empty when there is no data.
    pub fn working(&self, codec: CodecType) -> &[String] {
        self.results
            .as_ref()
            .map(|r| r.codec(codec).working.as_slice())
            .unwrap_or_default()
    }

    pub fn replace(&mut self, results: ValidationResults) {
        self.results = Some(results);
    }

    pub async fn save(&self) -> Result<(), EncoderError> {
        let Some(results) = &self.results else {
            return Err(EncoderError::NoValidationData(self.path.clone()));
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, results.to_toml()?).await?;
        info!(path = %self.path.display(), "saved validation results");
        Ok(())
    }
}
