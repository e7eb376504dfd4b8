//! Level extraction for child-process output.
//!
//! ffmpeg run with `-loglevel level+info` prefixes lines with `[level]`, or
//! with `[component @ 0x..] [level]` for component logs. The component part is
//! kept; only the level bracket is removed.

use std::sync::{Arc, LazyLock};

use regex::Regex;

static LEVEL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\[[^\]]* @ [^\]]*\] )?\[(quiet|panic|fatal|error|warning|info|verbose|debug|trace)\] ")
        .unwrap()
});

/// Severity a child output line is re-logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Map a level word as printed by the child onto a log severity.
    pub fn from_word(word: &str) -> Self {
        match word {
            "panic" | "fatal" | "error" => Self::Error,
            "warning" | "warn" => Self::Warn,
            "verbose" | "debug" | "trace" => Self::Debug,
            _ => Self::Info,
        }
    }
}

/// Pluggable line parser: returns the level and the message to log.
pub type LogParser = Arc<dyn Fn(&str) -> (LogLevel, String) + Send + Sync>;

/// Parse an ffmpeg output line.
pub fn parse_ffmpeg_line(line: &str) -> (LogLevel, String) {
    let Some(caps) = LEVEL_PREFIX.captures(line) else {
        return (LogLevel::Info, line.to_string());
    };
    let level = LogLevel::from_word(&caps[2]);
    let component = caps.get(1).map_or("", |m| m.as_str());
    let rest = &line[caps[0].len()..];
    (level, format!("{component}{rest}"))
}

/// Parser used when none is configured.
pub fn default_parser() -> LogParser {
    Arc::new(|line: &str| (LogLevel::Info, line.to_string()))
}

/// Parser for ffmpeg-style output.
pub fn ffmpeg_parser() -> LogParser {
    Arc::new(parse_ffmpeg_line)
}
