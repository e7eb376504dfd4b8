//! Encoder selection from validation results.
//!
//! Selection never spawns anything. It reads the validation results and the
//! cached host listing, so identical inputs always pick the same encoder.

use std::sync::Arc;

use tracing::debug;
use vidnode_core::{CodecType, QualityParams};

use crate::EncoderError;
use crate::registry::{HostEncoders, ValidatorRegistry, compiled_in};
use crate::results::ValidationResults;
use crate::settings::EncoderSettings;
use crate::validator::EncoderValidator;

/// The chosen encoder. `settings` is `None` for the software fallback used
/// when no validation data exists, and for working encoders no validator
/// claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub encoder: String,
    pub settings: Option<EncoderSettings>,
}

impl Selection {
    fn fallback(codec: CodecType) -> Self {
        Self {
            encoder: codec.software_fallback().to_string(),
            settings: None,
        }
    }
}

pub struct EncoderSelector {
    registry: Arc<ValidatorRegistry>,
    host: HostEncoders,
    results: Option<ValidationResults>,
}

impl EncoderSelector {
    pub fn new(
        registry: Arc<ValidatorRegistry>,
        host: HostEncoders,
        results: Option<ValidationResults>,
    ) -> Self {
        Self {
            registry,
            host,
            results,
        }
    }

    /// Build a selector using the registry's host listing.
    pub async fn from_registry(
        registry: Arc<ValidatorRegistry>,
        results: Option<ValidationResults>,
    ) -> Self {
        let host = registry.host_encoders().await.clone();
        Self::new(registry, host, results)
    }

    pub fn select(
        &self,
        codec: CodecType,
        input_format: &str,
        quality: Option<&QualityParams>,
    ) -> Result<Selection, EncoderError> {
        let working = match &self.results {
            Some(results) => &results.codec(codec).working,
            None => return Ok(Selection::fallback(codec)),
        };
        if working.is_empty() {
            debug!(%codec, "no working encoders, using software fallback");
            return Ok(Selection::fallback(codec));
        }

        let (validator, encoder) = match self.by_priority(working) {
            Some(found) => found,
            None => {
                let encoder = working[0].as_str();
                match self.registry.find_validator(encoder) {
                    Ok(validator) => (validator, encoder),
                    Err(_) => {
                        debug!(%codec, encoder, "working encoder has no validator, using it without settings");
                        return Ok(Selection {
                            encoder: encoder.to_string(),
                            settings: None,
                        });
                    }
                }
            }
        };

        let mut settings = validator.production_settings(encoder, input_format)?;
        if let Some(params) = quality {
            settings.merge_options(validator.quality_params(encoder, params)?);
        }
        debug!(%codec, encoder, backend = %validator.backend(), input_format, "selected encoder");
        Ok(Selection {
            encoder: encoder.to_string(),
            settings: Some(settings),
        })
    }

    /// Like [`select`](Self::select) with the codec given by name.
    pub fn select_by_name(
        &self,
        codec: &str,
        input_format: &str,
        quality: Option<&QualityParams>,
    ) -> Result<Selection, EncoderError> {
        self.select(codec.parse()?, input_format, quality)
    }

    /// First compiled encoder, in registry then validator order, that is
    /// also in `working`.
    fn by_priority<'a>(
        &'a self,
        working: &[String],
    ) -> Option<(&'a EncoderValidator, &'a str)> {
        self.registry.validators().iter().find_map(|validator| {
            compiled_in(validator, &self.host)
                .into_iter()
                .find(|name| working.iter().any(|w| w == name))
                .map(|name| (validator, name))
        })
    }
}
