//! Device-to-stream wiring.
//!
//! Every capture device that shows up (HDMI inputs only while their signal
//! is locked) gets one transcoder process in the pool, keyed by device id and
//! pushing to the configured output URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};
use vidnode_core::CodecType;
use vidnode_devices::{DeviceAction, DeviceEvent, SignalStatus};
use vidnode_encoders::{EncoderSelector, Selection};
use vidnode_process::log_level::ffmpeg_parser;
use vidnode_process::tokenize::join;
use vidnode_process::{PoolOptions, ProcessPool};

/// Where a device's frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub path: PathBuf,
    /// Transcoder input pixel format, empty when unknown.
    pub input_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Start,
    Stop,
    Restart,
    Keep,
}

/// What to do with the stream for `event`'s device. `moved` is set when the
/// device's node or input format differs from what the stream was built on.
pub fn plan(event: &DeviceEvent, running: bool, moved: bool) -> Plan {
    if event.action == DeviceAction::Removed {
        return if running { Plan::Stop } else { Plan::Keep };
    }
    let ready = event.signal.as_ref().is_none_or(SignalStatus::is_locked);
    match (ready, running) {
        (true, false) => Plan::Start,
        (true, true) if moved => Plan::Restart,
        (false, true) => Plan::Stop,
        _ => Plan::Keep,
    }
}

/// Container format for an output URL.
fn muxer(url: &str) -> &'static str {
    match url.split_once("://").map(|(scheme, _)| scheme) {
        Some("rtsp" | "rtsps") => "rtsp",
        Some("rtmp" | "rtmps") => "flv",
        _ => "mpegts",
    }
}

/// Full transcoder command line for one device.
pub fn command(ffmpeg: &Path, source: &Source, selection: &Selection, url: &str) -> String {
    let mut args = vec![
        ffmpeg.to_string_lossy().into_owned(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
    ];
    if let Some(settings) = &selection.settings {
        args.extend(settings.pre_input_args.iter().cloned());
    }
    args.extend(["-f".to_string(), "v4l2".to_string()]);
    if !source.input_format.is_empty() {
        args.extend(["-input_format".to_string(), source.input_format.clone()]);
    }
    args.extend([
        "-i".to_string(),
        source.path.to_string_lossy().into_owned(),
        "-c:v".to_string(),
        selection.encoder.clone(),
    ]);
    if let Some(settings) = &selection.settings {
        if let Some(filter) = &settings.filter_chain {
            args.extend(["-vf".to_string(), filter.clone()]);
        }
        args.extend(settings.output_args());
    }
    args.extend([
        "-an".to_string(),
        "-f".to_string(),
        muxer(url).to_string(),
        url.to_string(),
    ]);
    join(&args)
}

type Sources = Arc<RwLock<HashMap<String, Source>>>;

pub struct Streams {
    pool: ProcessPool,
    sources: Sources,
}

impl Streams {
    /// `output_url` may contain `{id}`, replaced by the device id.
    pub fn new(selector: Arc<EncoderSelector>, ffmpeg: PathBuf, output_url: String) -> Self {
        let sources: Sources = Arc::default();
        let lookup = sources.clone();
        let provider = move |id: &str| -> Result<String, String> {
            let source = lookup
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(id)
                .cloned()
                .ok_or_else(|| format!("no capture device {id}"))?;
            let selection = selector
                .select(CodecType::H264, &source.input_format, None)
                .map_err(|e| e.to_string())?;
            let url = output_url.replace("{id}", id);
            Ok(command(&ffmpeg, &source, &selection, &url))
        };

        let options = PoolOptions::new(provider)
            .configure(|_, process| process.set_log_parser(ffmpeg_parser()))
            .on_state_change(|change| match &change.error {
                Some(error) => warn!(
                    stream = %change.id,
                    from = %change.old,
                    to = %change.new,
                    error = %error,
                    "stream state changed"
                ),
                None => info!(stream = %change.id, from = %change.old, to = %change.new, "stream state changed"),
            });

        Self {
            pool: ProcessPool::new(options),
            sources,
        }
    }

    pub fn pool(&self) -> &ProcessPool {
        &self.pool
    }

    pub async fn handle(&self, event: &DeviceEvent) {
        let id = event.device_id.as_str();
        let moved = event.action != DeviceAction::Removed && self.remember(event).await;

        let running = self.pool.get_status(id).await.state.is_active();
        match plan(event, running, moved) {
            Plan::Start => {
                if let Err(e) = self.pool.start(id).await {
                    warn!(stream = %id, error = %e, kind = e.kind().as_str(), "failed to start stream");
                }
            }
            Plan::Restart => {
                info!(stream = %id, path = %event.path.display(), "device source changed, restarting stream");
                if let Err(e) = self.pool.restart(id).await {
                    warn!(stream = %id, error = %e, kind = e.kind().as_str(), "failed to restart stream");
                }
            }
            Plan::Stop => self.pool.stop(id).await,
            Plan::Keep => debug!(stream = %id, action = %event.action, "stream unchanged"),
        }

        if event.action == DeviceAction::Removed {
            self.sources
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(id);
        }
    }

    /// Store the device's current source. True when it replaced a different
    /// one.
    async fn remember(&self, event: &DeviceEvent) -> bool {
        let path = event.path.clone();
        let format = match tokio::task::spawn_blocking(move || input_format(&path)).await {
            Ok(format) => format,
            Err(e) => {
                warn!(stream = %event.device_id, error = %e, "format query task failed");
                String::new()
            }
        };
        let source = Source {
            path: event.path.clone(),
            input_format: format,
        };
        let previous = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.device_id.clone(), source.clone());
        previous.is_some_and(|previous| previous != source)
    }
}

/// First native format the transcoder can read, if the device reports one.
#[cfg(target_os = "linux")]
fn input_format(path: &Path) -> String {
    match vidnode_devices::v4l2::formats(path) {
        Ok(formats) => formats
            .iter()
            .filter(|f| !f.emulated)
            .find_map(|f| f.pixel_format.ffmpeg_name())
            .unwrap_or_default()
            .to_string(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "format query failed");
            String::new()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn input_format(_path: &Path) -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vidnode_devices::SignalState;
    use vidnode_encoders::EncoderSettings;
    use vidnode_process::tokenize::tokenize;

    fn event(action: DeviceAction, signal: Option<SignalState>) -> DeviceEvent {
        DeviceEvent {
            action,
            device_id: "usb-cam-video-index0".to_string(),
            path: PathBuf::from("/dev/video0"),
            name: "Cam".to_string(),
            caps: 1,
            signal: signal.map(SignalStatus::new),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn webcams_start_on_arrival() {
        assert_eq!(plan(&event(DeviceAction::Added, None), false, false), Plan::Start);
        assert_eq!(plan(&event(DeviceAction::Added, None), true, false), Plan::Keep);
    }

    #[test]
    fn hdmi_follows_signal_lock() {
        let locked = Some(SignalState::Locked);
        let lost = Some(SignalState::NoSignal);
        assert_eq!(plan(&event(DeviceAction::Added, lost), false, false), Plan::Keep);
        assert_eq!(plan(&event(DeviceAction::Changed, locked), false, false), Plan::Start);
        assert_eq!(plan(&event(DeviceAction::Changed, lost), true, false), Plan::Stop);
        assert_eq!(plan(&event(DeviceAction::Changed, lost), true, true), Plan::Stop);
    }

    #[test]
    fn removal_stops_running_stream() {
        assert_eq!(plan(&event(DeviceAction::Removed, None), true, false), Plan::Stop);
        assert_eq!(plan(&event(DeviceAction::Removed, None), false, false), Plan::Keep);
    }

    #[test]
    fn moved_device_restarts_running_stream() {
        let changed = event(DeviceAction::Changed, None);
        assert_eq!(plan(&changed, true, true), Plan::Restart);
        assert_eq!(plan(&changed, true, false), Plan::Keep);
        assert_eq!(plan(&changed, false, true), Plan::Start);
    }

    #[test]
    fn muxer_from_scheme() {
        assert_eq!(muxer("rtsp://host:8554/cam"), "rtsp");
        assert_eq!(muxer("rtmp://host/live/cam"), "flv");
        assert_eq!(muxer("srt://host:9000"), "mpegts");
        assert_eq!(muxer("/tmp/out.ts"), "mpegts");
    }

    #[test]
    fn command_places_device_args_before_input() {
        let source = Source {
            path: PathBuf::from("/dev/video0"),
            input_format: "yuyv422".to_string(),
        };
        let mut settings = EncoderSettings {
            pre_input_args: vec!["-vaapi_device".to_string(), "/dev/dri/renderD128".to_string()],
            filter_chain: Some("format=nv12,hwupload".to_string()),
            ..Default::default()
        };
        settings.merge_options([("qp".to_string(), "20".to_string())].into());
        let selection = Selection {
            encoder: "h264_vaapi".to_string(),
            settings: Some(settings),
        };

        let line = command(Path::new("ffmpeg"), &source, &selection, "rtsp://127.0.0.1:8554/cam");
        assert_eq!(
            tokenize(&line).unwrap(),
            [
                "ffmpeg",
                "-hide_banner",
                "-nostats",
                "-vaapi_device",
                "/dev/dri/renderD128",
                "-f",
                "v4l2",
                "-input_format",
                "yuyv422",
                "-i",
                "/dev/video0",
                "-c:v",
                "h264_vaapi",
                "-vf",
                "format=nv12,hwupload",
                "-qp",
                "20",
                "-an",
                "-f",
                "rtsp",
                "rtsp://127.0.0.1:8554/cam",
            ]
        );
    }

    #[test]
    fn fallback_selection_has_no_extra_args() {
        let source = Source {
            path: PathBuf::from("/dev/video 2"),
            input_format: String::new(),
        };
        let selection = Selection {
            encoder: "libx264".to_string(),
            settings: None,
        };
        let line = command(Path::new("ffmpeg"), &source, &selection, "/tmp/out.ts");
        assert_eq!(
            tokenize(&line).unwrap(),
            [
                "ffmpeg",
                "-hide_banner",
                "-nostats",
                "-f",
                "v4l2",
                "-i",
                "/dev/video 2",
                "-c:v",
                "libx264",
                "-an",
                "-f",
                "mpegts",
                "/tmp/out.ts",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn moved_device_restarts_on_new_node() {
        use std::os::unix::fs::PermissionsExt;
        use vidnode_encoders::{EncoderValidator, HostEncoders, ValidatorRegistry};

        let dir = tempfile::tempdir().unwrap();
        let transcoder = dir.path().join("transcoder");
        std::fs::write(&transcoder, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&transcoder, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = ValidatorRegistry::from_validators(
            vec![EncoderValidator::generic()],
            PathBuf::from("ffmpeg"),
        );
        let selector = EncoderSelector::new(Arc::new(registry), HostEncoders::from_listing(""), None);
        let streams = Streams::new(
            Arc::new(selector),
            transcoder,
            "rtsp://127.0.0.1:8554/{id}".to_string(),
        );
        let id = "usb-cam-video-index0";

        streams.handle(&event(DeviceAction::Added, None)).await;
        assert!(streams.pool().get_status(id).await.state.is_active());
        let first = streams.pool().process(id).await.unwrap().command();
        assert!(first.contains("'/dev/video0'"));

        let mut moved = event(DeviceAction::Changed, None);
        moved.path = PathBuf::from("/dev/video2");
        streams.handle(&moved).await;

        let status = streams.pool().get_status(id).await;
        assert!(status.state.is_active());
        assert_eq!(status.restart_count, 1);
        let second = streams.pool().process(id).await.unwrap().command();
        assert!(second.contains("'/dev/video2'"));

        // Same node again leaves the stream alone.
        streams.handle(&moved).await;
        assert_eq!(streams.pool().get_status(id).await.restart_count, 1);

        streams.pool().stop_all().await;
    }
}
