//! Live encoder probes.
//!
//! A probe encodes a two second synthetic clip to a scratch file and checks
//! the result is big enough to be real video. The scratch directory is
//! removed when the probe returns, whatever the outcome.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::EncoderError;
use crate::settings::EncoderSettings;

pub const TEST_DURATION_SECS: u32 = 2;
pub const TEST_RESOLUTION: &str = "640x480";
const TEST_RATE: u32 = 30;
/// Anything at or below this is a header with no frames behind it.
pub const MIN_OUTPUT_BYTES: u64 = 1000;

/// Full ffmpeg argument list for probing `name` into `output`.
pub fn probe_args(name: &str, settings: &EncoderSettings, output: &Path) -> Vec<String> {
    let mut args = settings.pre_input_args.clone();
    args.extend([
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("testsrc2=duration={TEST_DURATION_SECS}:size={TEST_RESOLUTION}:rate={TEST_RATE}"),
        "-t".to_string(),
        TEST_DURATION_SECS.to_string(),
        "-c:v".to_string(),
        name.to_string(),
    ]);
    if let Some(filter) = &settings.filter_chain {
        args.push("-vf".to_string());
        args.push(filter.clone());
    }
    args.extend(settings.output_args());
    args.push("-y".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Probe `name` with `settings`, killing ffmpeg if it outlives `timeout`.
pub async fn run(
    ffmpeg_path: &Path,
    name: &str,
    settings: &EncoderSettings,
    timeout: Duration,
) -> Result<(), EncoderError> {
    let scratch = tempfile::Builder::new()
        .prefix("encoder_validate")
        .tempdir()?;
    let output = scratch.path().join(format!("test_{name}.mp4"));
    let args = probe_args(name, settings, &output);
    debug!(encoder = name, ?args, "probing encoder");

    let child = Command::new(ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EncoderError::BinaryNotFound(ffmpeg_path.to_path_buf()),
            _ => EncoderError::Io(e),
        })?;

    // Dropping the future on timeout drops the child, which kills it.
    let finished = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| EncoderError::ProbeTimeout {
            encoder: name.to_string(),
            timeout,
        })??;

    if !finished.status.success() {
        let stderr = String::from_utf8_lossy(&finished.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(str::trim)
            .unwrap_or("no output")
            .to_string();
        return Err(EncoderError::ProbeFailed {
            encoder: name.to_string(),
            reason: format!("{} ({reason})", describe_status(finished.status)),
        });
    }

    let size = match tokio::fs::metadata(&output).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };
    if size <= MIN_OUTPUT_BYTES {
        return Err(EncoderError::OutputTooSmall {
            encoder: name.to_string(),
            size,
        });
    }
    Ok(())
}

fn describe_status(status: std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

/// Version string from `ffmpeg -version`, or "unknown".
pub async fn ffmpeg_version(ffmpeg_path: &Path) -> String {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => parse_version(&String::from_utf8_lossy(&out.stdout)),
        _ => "unknown".to_string(),
    }
}

fn parse_version(stdout: &str) -> String {
    stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(2))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_place_device_flags_before_input() {
        let settings = EncoderSettings::default()
            .with_pre_input(&["-vaapi_device", "/dev/dri/renderD128"])
            .with_option("qp", "20")
            .with_filter("format=nv12,hwupload");
        let args = probe_args("h264_vaapi", &settings, Path::new("/tmp/out.mp4"));

        assert_eq!(&args[..2], ["-vaapi_device", "/dev/dri/renderD128"]);
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "testsrc2=duration=2:size=640x480:rate=30");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(vf > input);
        assert_eq!(args[vf + 1], "format=nv12,hwupload");
        assert_eq!(&args[args.len() - 4..], ["-qp", "20", "-y", "/tmp/out.mp4"]);
    }

    #[test]
    fn args_without_filter() {
        let args = probe_args("libx264", &EncoderSettings::default(), Path::new("o.mp4"));
        assert!(!args.iter().any(|a| a == "-vf"));
        assert_eq!(args[0], "-hide_banner");
    }

    #[test]
    fn version_from_banner() {
        let banner = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\n";
        assert_eq!(parse_version(banner), "6.1.1-3ubuntu5");
        assert_eq!(parse_version(""), "unknown");
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let err = run(
            Path::new("/nonexistent/ffmpeg"),
            "libx264",
            &EncoderSettings::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EncoderError::BinaryNotFound(_)));
        assert_eq!(
            ffmpeg_version(Path::new("/nonexistent/ffmpeg")).await,
            "unknown"
        );
    }
}
