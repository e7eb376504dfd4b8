//! Ordered validator registry and the host's compiled-in encoder listing.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::validator::{Backend, EncoderValidator};
use crate::{EncoderConfig, EncoderError};

/// Output of `ffmpeg -encoders`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEncoders {
    listing: String,
}

impl HostEncoders {
    pub fn from_listing(listing: impl Into<String>) -> Self {
        Self {
            listing: listing.into(),
        }
    }

    pub async fn probe(ffmpeg_path: &Path) -> Result<Self, EncoderError> {
        let output = Command::new(ffmpeg_path)
            .args(["-hide_banner", "-nostats", "-encoders"])
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EncoderError::BinaryNotFound(ffmpeg_path.to_path_buf())
                }
                _ => EncoderError::Io(e),
            })?;
        if !output.status.success() {
            return Err(EncoderError::ProbeFailed {
                encoder: "-encoders".to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(Self::from_listing(String::from_utf8_lossy(&output.stdout)))
    }

    /// Plain substring match against the listing.
    pub fn contains(&self, name: &str) -> bool {
        self.listing.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.listing.trim().is_empty()
    }
}

pub struct ValidatorRegistry {
    validators: Vec<EncoderValidator>,
    ffmpeg_path: PathBuf,
    host: OnceCell<HostEncoders>,
}

impl ValidatorRegistry {
    /// Build the registry in configured priority order. Duplicates are
    /// dropped and the generic validator always ends up last.
    pub fn new(config: &EncoderConfig) -> Self {
        let mut order: Vec<Backend> = Vec::new();
        for backend in &config.priority {
            if *backend != Backend::Generic && !order.contains(backend) {
                order.push(*backend);
            }
        }
        order.push(Backend::Generic);

        let validators = order
            .into_iter()
            .map(|backend| match backend {
                Backend::Vaapi => EncoderValidator::vaapi(config.vaapi_device.clone()),
                Backend::Rkmpp => EncoderValidator::rkmpp(config.include_mjpeg_rkmpp),
                Backend::Amf => EncoderValidator::amf(),
                Backend::VideoToolbox => EncoderValidator::videotoolbox(),
                Backend::Generic => EncoderValidator::generic(),
            })
            .collect();

        Self::from_validators(validators, config.ffmpeg_path.clone())
    }

    pub fn from_validators(validators: Vec<EncoderValidator>, ffmpeg_path: PathBuf) -> Self {
        Self {
            validators,
            ffmpeg_path,
            host: OnceCell::new(),
        }
    }

    /// Seed the host listing instead of asking ffmpeg for it.
    pub fn with_host_encoders(mut self, host: HostEncoders) -> Self {
        self.host = OnceCell::from(host);
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Validators in priority order.
    pub fn validators(&self) -> &[EncoderValidator] {
        &self.validators
    }

    /// First validator, in priority order, that claims `name`.
    pub fn find_validator(&self, name: &str) -> Result<&EncoderValidator, EncoderError> {
        self.validators
            .iter()
            .find(|v| v.can_validate(name))
            .ok_or_else(|| EncoderError::NoValidator(name.to_string()))
    }

    /// Whether any validator lists `name` as one of its own.
    pub fn is_recognized(&self, name: &str) -> bool {
        self.validators.iter().any(|v| v.recognizes(name))
    }

    /// Host encoder listing, fetched from ffmpeg once and cached. A failed
    /// query is cached as an empty listing.
    pub async fn host_encoders(&self) -> &HostEncoders {
        self.host
            .get_or_init(|| async {
                match HostEncoders::probe(&self.ffmpeg_path).await {
                    Ok(host) => host,
                    Err(e) => {
                        warn!(error = %e, ffmpeg = %self.ffmpeg_path.display(), "could not list host encoders");
                        HostEncoders::default()
                    }
                }
            })
            .await
    }

    /// Validators with at least one encoder compiled into the host ffmpeg.
    pub async fn available_validators(&self) -> Vec<&EncoderValidator> {
        let host = self.host_encoders().await;
        let available: Vec<_> = self
            .validators
            .iter()
            .filter(|v| !compiled_in(v, host).is_empty())
            .collect();
        info!(
            count = available.len(),
            backends = ?available.iter().map(|v| v.backend()).collect::<Vec<_>>(),
            "available encoder backends"
        );
        available
    }

    /// Every compiled-in encoder name, grouped by validator in priority order.
    pub async fn compiled_encoders(&self) -> Vec<(&EncoderValidator, Vec<&'static str>)> {
        let host = self.host_encoders().await;
        self.validators
            .iter()
            .map(|v| (v, compiled_in(v, host)))
            .filter(|(_, names)| !names.is_empty())
            .collect()
    }
}

/// Names of `validator` present in the host listing, in the validator's order.
pub fn compiled_in(validator: &EncoderValidator, host: &HostEncoders) -> Vec<&'static str> {
    validator
        .names()
        .iter()
        .copied()
        .filter(|name| host.contains(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D h264_vaapi           H.264/AVC (VAAPI) (codec h264)
 V....D hevc_vaapi           H.265/HEVC (VAAPI) (codec hevc)
";

    #[test]
    fn generic_is_always_last_once() {
        let config = EncoderConfig {
            priority: vec![Backend::Generic, Backend::Amf, Backend::Amf, Backend::Vaapi],
            ..EncoderConfig::default()
        };
        let registry = ValidatorRegistry::new(&config);
        let order: Vec<_> = registry.validators().iter().map(|v| v.backend()).collect();
        assert_eq!(order, [Backend::Amf, Backend::Vaapi, Backend::Generic]);
    }

    #[test]
    fn default_priority_order() {
        let registry = ValidatorRegistry::new(&EncoderConfig::default());
        let order: Vec<_> = registry.validators().iter().map(|v| v.backend()).collect();
        assert_eq!(
            order,
            [
                Backend::Vaapi,
                Backend::Rkmpp,
                Backend::Amf,
                Backend::VideoToolbox,
                Backend::Generic
            ]
        );
    }

    #[test]
    fn find_validator_by_priority() {
        let registry = ValidatorRegistry::new(&EncoderConfig::default());
        assert_eq!(
            registry.find_validator("h264_rkmpp").unwrap().backend(),
            Backend::Rkmpp
        );
        assert_eq!(
            registry.find_validator("libx265").unwrap().backend(),
            Backend::Generic
        );
        let err = registry.find_validator("h264_nvenc").unwrap_err();
        assert_eq!(err.kind(), vidnode_core::ErrorKind::NoValidatorForEncoder);
    }

    #[tokio::test]
    async fn compiled_encoders_follow_host_listing() {
        let registry = ValidatorRegistry::new(&EncoderConfig::default())
            .with_host_encoders(HostEncoders::from_listing(LISTING));

        let compiled = registry.compiled_encoders().await;
        let summary: Vec<_> = compiled
            .iter()
            .map(|(v, names)| (v.backend(), names.clone()))
            .collect();
        assert_eq!(
            summary,
            [
                (Backend::Vaapi, vec!["h264_vaapi", "hevc_vaapi"]),
                (Backend::Generic, vec!["libx264"]),
            ]
        );
        assert_eq!(registry.available_validators().await.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_ffmpeg_means_empty_listing() {
        let config = EncoderConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".into(),
            ..EncoderConfig::default()
        };
        let registry = ValidatorRegistry::new(&config);
        assert!(registry.host_encoders().await.is_empty());
        assert!(registry.available_validators().await.is_empty());
    }
}
