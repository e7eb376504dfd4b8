//! Per-backend encoder knowledge.
//!
//! The backend set is closed, so a validator is a [`Backend`] tag plus the
//! encoder names it owns; every operation dispatches on the tag.

pub mod amf;
pub mod generic;
pub mod rkmpp;
pub mod vaapi;
pub mod videotoolbox;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vidnode_core::QualityParams;
use vidnode_core::error::ParseError;

use crate::settings::{EncoderSettings, Options};
use crate::{EncoderError, probe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Vaapi,
    Rkmpp,
    Amf,
    VideoToolbox,
    Generic,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vaapi => "vaapi",
            Self::Rkmpp => "rkmpp",
            Self::Amf => "amf",
            Self::VideoToolbox => "videotoolbox",
            Self::Generic => "generic",
        }
    }

    pub fn is_hardware(self) -> bool {
        self != Self::Generic
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vaapi" => Ok(Self::Vaapi),
            "rkmpp" => Ok(Self::Rkmpp),
            "amf" => Ok(Self::Amf),
            "videotoolbox" => Ok(Self::VideoToolbox),
            "generic" | "software" => Ok(Self::Generic),
            other => Err(ParseError::Backend(other.to_string())),
        }
    }
}

/// Capability adapter for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderValidator {
    backend: Backend,
    names: Vec<&'static str>,
    device: Option<String>,
}

impl EncoderValidator {
    pub fn vaapi(device: impl Into<String>) -> Self {
        Self {
            backend: Backend::Vaapi,
            names: vaapi::NAMES.to_vec(),
            device: Some(device.into()),
        }
    }

    pub fn rkmpp(include_mjpeg: bool) -> Self {
        let mut names = rkmpp::NAMES.to_vec();
        if include_mjpeg {
            names.push(rkmpp::MJPEG_ENCODER);
        }
        Self {
            backend: Backend::Rkmpp,
            names,
            device: None,
        }
    }

    pub fn amf() -> Self {
        Self {
            backend: Backend::Amf,
            names: amf::NAMES.to_vec(),
            device: None,
        }
    }

    pub fn videotoolbox() -> Self {
        Self {
            backend: Backend::VideoToolbox,
            names: videotoolbox::NAMES.to_vec(),
            device: None,
        }
    }

    pub fn generic() -> Self {
        Self {
            backend: Backend::Generic,
            names: generic::NAMES.to_vec(),
            device: None,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Encoder names this backend owns, in preference order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn recognizes(&self, name: &str) -> bool {
        self.names.contains(&name)
    }

    /// Whether `name` belongs to this backend. Hardware backends match on
    /// their tag; the generic backend claims its own names and any
    /// `lib*` software encoder.
    pub fn can_validate(&self, name: &str) -> bool {
        match self.backend {
            Backend::Generic => self.recognizes(name) || name.starts_with("lib"),
            backend => name.contains(backend.as_str()),
        }
    }

    /// Settings for production use with frames in `input_format`.
    pub fn production_settings(
        &self,
        name: &str,
        input_format: &str,
    ) -> Result<EncoderSettings, EncoderError> {
        self.check_owned(name)?;
        Ok(match self.backend {
            Backend::Vaapi => vaapi::production_settings(self.device(), input_format),
            Backend::Rkmpp => rkmpp::production_settings(name, input_format),
            Backend::Amf => amf::production_settings(),
            Backend::VideoToolbox => videotoolbox::production_settings(),
            Backend::Generic => generic::production_settings(name, input_format),
        })
    }

    /// Translate a rate-control request into this backend's option names.
    pub fn quality_params(&self, name: &str, params: &QualityParams) -> Result<Options, EncoderError> {
        self.check_owned(name)?;
        match self.backend {
            Backend::Vaapi => vaapi::quality_params(name, params),
            Backend::Rkmpp => rkmpp::quality_params(params),
            Backend::Amf => amf::quality_params(name, params),
            Backend::VideoToolbox => videotoolbox::quality_params(params),
            Backend::Generic => generic::quality_params(name, params),
        }
    }

    /// Encode a short synthetic clip with `name` to prove it works here.
    pub async fn validate(
        &self,
        ffmpeg_path: &Path,
        name: &str,
        timeout: Duration,
    ) -> Result<(), EncoderError> {
        let settings = self.production_settings(name, "")?;
        probe::run(ffmpeg_path, name, &settings, timeout).await
    }

    fn check_owned(&self, name: &str) -> Result<(), EncoderError> {
        let owned = match self.backend {
            Backend::Generic => self.can_validate(name),
            _ => self.recognizes(name),
        };
        if owned {
            Ok(())
        } else {
            Err(EncoderError::WrongBackend {
                backend: self.backend,
                encoder: name.to_string(),
            })
        }
    }

    fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(vaapi::DEFAULT_DEVICE)
    }
}
