#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use vidnode_core::CodecType;
use vidnode_encoders::{EncoderConfig, ValidationStore, ValidatorRegistry};

/// Stand-in ffmpeg: lists three encoders, fails the vaapi probe and writes a
/// truncated file for libx265.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version 9.9-fake Copyright (c) the FFmpeg developers"
    exit 0
fi
for arg in "$@"; do
    if [ "$arg" = "-encoders" ]; then
        echo " V....D libx264    libx264 H.264 (codec h264)"
        echo " V....D libx265    libx265 H.265 (codec hevc)"
        echo " V....D h264_vaapi H.264/AVC (VAAPI) (codec h264)"
        exit 0
    fi
done
prev=""
enc=""
out=""
for arg in "$@"; do
    if [ "$prev" = "-c:v" ]; then enc="$arg"; fi
    prev="$arg"
    out="$arg"
done
case "$enc" in
    h264_vaapi)
        echo "Failed to initialise VAAPI connection" >&2
        exit 1
        ;;
    libx265)
        printf 'x' > "$out"
        ;;
    *)
        head -c 4096 /dev/zero > "$out"
        ;;
esac
"#;

fn install_fake_ffmpeg(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("ffmpeg");
    std::fs::write(&path, FAKE_FFMPEG).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn validation_probes_buckets_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let config = EncoderConfig {
        ffmpeg_path: install_fake_ffmpeg(dir.path()),
        validation_file: dir.path().join("validation.toml"),
        probe_timeout: Duration::from_secs(10),
        ..EncoderConfig::default()
    };
    let registry = ValidatorRegistry::new(&config);

    let store = ValidationStore::load_or_validate(&registry, &config, false)
        .await
        .unwrap();
    let results = store.results().unwrap();

    assert_eq!(results.validation_info.ffmpeg_version, "9.9-fake");
    assert_eq!(results.h264.working, ["libx264"]);
    assert_eq!(results.h264.failed, ["h264_vaapi"]);
    assert!(results.h265.working.is_empty());
    assert_eq!(results.h265.failed, ["libx265"]);
    for name in results.h264.failed.iter().chain(&results.h265.failed) {
        assert!(registry.is_recognized(name));
    }

    // The second call reads the file instead of probing again.
    assert!(config.validation_file.exists());
    let reloaded = ValidationStore::load_or_validate(&registry, &config, false)
        .await
        .unwrap();
    assert_eq!(reloaded.results(), Some(results));
    assert_eq!(reloaded.working(CodecType::H264), ["libx264"]);
}
