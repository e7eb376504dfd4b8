#![allow(clippy::collapsible_if)]
pub mod probe;
pub mod registry;
pub mod results;
pub mod selector;
pub mod settings;
pub mod validator;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vidnode_core::error::ParseError;
use vidnode_core::{CodecType, ErrorKind, RateControlMode};

pub use registry::{HostEncoders, ValidatorRegistry};
pub use results::{ValidationResults, ValidationStore};
pub use selector::{EncoderSelector, Selection};
pub use settings::{EncoderSettings, Options};
pub use validator::{Backend, EncoderValidator};

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("no validator for encoder {0}")]
    NoValidator(String),
    #[error("{backend} validator does not handle encoder {encoder}")]
    WrongBackend { backend: Backend, encoder: String },
    #[error("no working {0} encoder has a registered validator")]
    NoEncoderAvailable(CodecType),
    #[error("{encoder} does not support {mode} rate control")]
    UnsupportedMode {
        encoder: String,
        mode: RateControlMode,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no validation data at {0}")]
    NoValidationData(PathBuf),
    #[error("ffmpeg not found at {0}")]
    BinaryNotFound(PathBuf),
    #[error("probe of {encoder} timed out after {timeout:?}")]
    ProbeTimeout { encoder: String, timeout: Duration },
    #[error("probe of {encoder} wrote only {size} bytes")]
    OutputTooSmall { encoder: String, size: u64 },
    #[error("probe of {encoder} failed: {reason}")]
    ProbeFailed { encoder: String, reason: String },
    #[error("invalid validation results: {0}")]
    InvalidResults(#[from] toml::de::Error),
    #[error("failed to encode validation results: {0}")]
    EncodeResults(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoValidator(_) | Self::WrongBackend { .. } => ErrorKind::NoValidatorForEncoder,
            Self::NoEncoderAvailable(_) => ErrorKind::NoEncoderAvailable,
            Self::UnsupportedMode { .. } => ErrorKind::UnsupportedMode,
            Self::Parse(e) => e.kind(),
            Self::NoValidationData(_) | Self::InvalidResults(_) => ErrorKind::NoValidationData,
            Self::BinaryNotFound(_) => ErrorKind::SpawnFailed,
            Self::ProbeTimeout { .. } => ErrorKind::ProbeTimeout,
            Self::OutputTooSmall { .. } => ErrorKind::OutputTooSmall,
            Self::ProbeFailed { .. } => ErrorKind::ProbeFailed,
            Self::EncodeResults(_) | Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn unsupported(encoder: &str, mode: RateControlMode) -> Self {
        Self::UnsupportedMode {
            encoder: encoder.to_string(),
            mode,
        }
    }
}

/// Encoder discovery and validation configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub ffmpeg_path: PathBuf,
    pub validation_file: PathBuf,
    /// Validator priority, first wins. Generic is always appended last.
    pub priority: Vec<Backend>,
    pub include_mjpeg_rkmpp: bool,
    pub probe_timeout: Duration,
    pub vaapi_device: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            validation_file: PathBuf::from("validation.toml"),
            priority: vec![
                Backend::Vaapi,
                Backend::Rkmpp,
                Backend::Amf,
                Backend::VideoToolbox,
                Backend::Generic,
            ],
            include_mjpeg_rkmpp: true,
            probe_timeout: Duration::from_secs(10),
            vaapi_device: validator::vaapi::DEFAULT_DEVICE.to_string(),
        }
    }
}
