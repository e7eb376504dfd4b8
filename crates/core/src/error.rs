use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by every vidnode crate.
///
/// Concrete error enums live next to the code that raises them; each one maps
/// its variants onto a kind so callers can branch without matching on
/// crate-specific types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnclosedQuote,
    EmptyCommand,
    SpawnFailed,
    PipeSetupFailed,
    ProcessAlreadyRunning,
    ProcessNotFound,
    KillFailed,
    GracefulTimeout,
    ProbeTimeout,
    OutputTooSmall,
    NoValidatorForEncoder,
    NoEncoderAvailable,
    UnsupportedCodecType,
    UnsupportedMode,
    NoValidationData,
    DeviceEnumerationFailed,
    HotplugSubscriptionFailed,
    CommandUnavailable,
    ProcessExited,
    ProbeFailed,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnclosedQuote => "unclosed_quote",
            Self::EmptyCommand => "empty_command",
            Self::SpawnFailed => "spawn_failed",
            Self::PipeSetupFailed => "pipe_setup_failed",
            Self::ProcessAlreadyRunning => "process_already_running",
            Self::ProcessNotFound => "process_not_found",
            Self::KillFailed => "kill_failed",
            Self::GracefulTimeout => "graceful_timeout",
            Self::ProbeTimeout => "probe_timeout",
            Self::OutputTooSmall => "output_too_small",
            Self::NoValidatorForEncoder => "no_validator_for_encoder",
            Self::NoEncoderAvailable => "no_encoder_available",
            Self::UnsupportedCodecType => "unsupported_codec_type",
            Self::UnsupportedMode => "unsupported_mode",
            Self::NoValidationData => "no_validation_data",
            Self::DeviceEnumerationFailed => "device_enumeration_failed",
            Self::HotplugSubscriptionFailed => "hotplug_subscription_failed",
            Self::CommandUnavailable => "command_unavailable",
            Self::ProcessExited => "process_exited",
            Self::ProbeFailed => "probe_failed",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to parse a user-supplied value into one of the shared enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported codec type: {0}")]
    CodecType(String),

    #[error("unsupported rate control mode: {0}")]
    RateControlMode(String),

    #[error("unknown encoder backend: {0}")]
    Backend(String),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CodecType(_) => ErrorKind::UnsupportedCodecType,
            Self::RateControlMode(_) => ErrorKind::UnsupportedMode,
            Self::Backend(_) => ErrorKind::NoValidatorForEncoder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_as_their_code() {
        let json = serde_json::to_string(&ErrorKind::NoEncoderAvailable).unwrap();
        assert_eq!(json, "\"no_encoder_available\"");
        assert_eq!(ErrorKind::UnclosedQuote.to_string(), "unclosed_quote");
    }

    #[test]
    fn parse_errors_map_to_kinds() {
        assert_eq!(
            ParseError::CodecType("vp9".into()).kind(),
            ErrorKind::UnsupportedCodecType
        );
        assert_eq!(
            ParseError::RateControlMode("abr".into()).kind(),
            ErrorKind::UnsupportedMode
        );
    }
}
