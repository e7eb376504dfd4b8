//! HDMI input signal state, derived from the DV timings query.

use nix::errno::Errno;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    NoDevice,
    /// No cable.
    NoLink,
    NoSignal,
    Unstable,
    Locked,
    OutOfRange,
    NotSupported,
}

impl SignalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoDevice => "no_device",
            Self::NoLink => "no_link",
            Self::NoSignal => "no_signal",
            Self::Unstable => "unstable",
            Self::Locked => "locked",
            Self::OutOfRange => "out_of_range",
            Self::NotSupported => "not_supported",
        }
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalStatus {
    pub state: SignalState,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub interlaced: bool,
}

impl SignalStatus {
    pub fn new(state: SignalState) -> Self {
        Self {
            state,
            width: 0,
            height: 0,
            fps: 0.0,
            interlaced: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state == SignalState::Locked
    }
}

/// The parts of the BT.656/1120 timings the signal state depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    pub pixelclock: u64,
    /// Active width plus horizontal porches and sync.
    pub total_width: u64,
    /// Active height plus vertical porches and sync.
    pub total_height: u64,
}

impl Timings {
    pub fn fps(&self) -> f64 {
        let total_height = if self.interlaced {
            self.total_height / 2
        } else {
            self.total_height
        };
        if self.pixelclock == 0 || self.total_width == 0 || total_height == 0 {
            return 0.0;
        }
        self.pixelclock as f64 / (self.total_width * total_height) as f64
    }
}

/// Map a timings query result onto a signal state.
pub fn status_from_timings(result: Result<Timings, Errno>) -> SignalStatus {
    match result {
        Ok(t) if t.width > 0 && t.height > 0 && t.pixelclock > 0 => SignalStatus {
            state: SignalState::Locked,
            width: t.width,
            height: t.height,
            fps: t.fps(),
            interlaced: t.interlaced,
        },
        Ok(_) => SignalStatus::new(SignalState::NoSignal),
        Err(Errno::ENOLINK) => SignalStatus::new(SignalState::NoLink),
        Err(Errno::ENOLCK) => SignalStatus::new(SignalState::Unstable),
        Err(Errno::ERANGE) => SignalStatus::new(SignalState::OutOfRange),
        Err(Errno::ENOTTY) => SignalStatus::new(SignalState::NotSupported),
        Err(_) => SignalStatus::new(SignalState::NoSignal),
    }
}

/// Whether a timings query result marks the device as an HDMI input.
pub fn is_hdmi_response(result: &Result<Timings, Errno>) -> bool {
    matches!(result, Ok(_) | Err(Errno::ENOLINK) | Err(Errno::ENOLCK))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cea_1080p60() -> Timings {
        Timings {
            width: 1920,
            height: 1080,
            interlaced: false,
            pixelclock: 148_500_000,
            total_width: 2200,
            total_height: 1125,
        }
    }

    #[test]
    fn locked_signal_reports_geometry() {
        let status = status_from_timings(Ok(cea_1080p60()));
        assert_eq!(status.state, SignalState::Locked);
        assert_eq!((status.width, status.height), (1920, 1080));
        assert!((status.fps - 60.0).abs() < 0.01);
    }

    #[test]
    fn interlaced_counts_fields() {
        let timings = Timings {
            interlaced: true,
            pixelclock: 74_250_000,
            ..cea_1080p60()
        };
        assert!((timings.fps() - 60.0).abs() < 0.1);
    }

    #[test]
    fn zero_timings_mean_no_signal() {
        let status = status_from_timings(Ok(Timings::default()));
        assert_eq!(status.state, SignalState::NoSignal);
    }

    #[test]
    fn errno_mapping() {
        for (errno, state) in [
            (Errno::ENOLINK, SignalState::NoLink),
            (Errno::ENOLCK, SignalState::Unstable),
            (Errno::ERANGE, SignalState::OutOfRange),
            (Errno::ENOTTY, SignalState::NotSupported),
            (Errno::EIO, SignalState::NoSignal),
        ] {
            assert_eq!(status_from_timings(Err(errno)).state, state, "{errno}");
        }
    }

    #[test]
    fn hdmi_detection() {
        assert!(is_hdmi_response(&Ok(Timings::default())));
        assert!(is_hdmi_response(&Err(Errno::ENOLINK)));
        assert!(!is_hdmi_response(&Err(Errno::ENOTTY)));
    }

    #[test]
    fn states_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&SignalState::OutOfRange).unwrap(),
            "\"out_of_range\""
        );
    }
}
