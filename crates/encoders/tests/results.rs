use std::path::PathBuf;

use vidnode_core::{CodecType, ErrorKind};
use vidnode_encoders::{EncoderConfig, ValidationResults, ValidationStore, ValidatorRegistry};

fn registry() -> ValidatorRegistry {
    ValidatorRegistry::new(&EncoderConfig::default())
}

#[tokio::test]
async fn save_then_load_preserves_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("validation.toml");

    let mut results = ValidationResults::new("6.1.1");
    results.record("h264_vaapi", true);
    results.record("libx264", true);
    results.record("hevc_vaapi", false);

    let mut store = ValidationStore::empty(&path);
    store.replace(results.clone());
    store.save().await.unwrap();

    let loaded = ValidationStore::load(&path, &registry()).await.unwrap();
    assert!(loaded.has_data());
    assert_eq!(loaded.results(), Some(&results));
    assert_eq!(loaded.working(CodecType::H264), ["h264_vaapi", "libx264"]);
    assert!(loaded.working(CodecType::H265).is_empty());
}

#[tokio::test]
async fn document_layout_matches_expected_sections() {
    let mut results = ValidationResults::new("6.1.1");
    results.record("libx264", true);
    let text = results.to_toml().unwrap();

    let value: toml::Value = toml::from_str(&text).unwrap();
    assert_eq!(value["validation_info"]["test_duration"].as_integer(), Some(2));
    assert_eq!(
        value["validation_info"]["test_resolution"].as_str(),
        Some("640x480")
    );
    assert_eq!(value["h264"]["working"][0].as_str(), Some("libx264"));
    assert!(value["h265"]["failed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_fields_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("validation.toml");
    tokio::fs::write(
        &path,
        r#"
[validation_info]
timestamp = "2024-05-01T10:00:00Z"
ffmpeg_version = "6.0"
test_duration = 2
test_resolution = "640x480"
host = "encoder-box"

[h264]
working = ["h264_rkmpp"]
failed = []
notes = "extra"

[av1]
working = ["av1_vaapi"]
"#,
    )
    .await
    .unwrap();

    let store = ValidationStore::load(&path, &registry()).await.unwrap();
    assert_eq!(store.working(CodecType::H264), ["h264_rkmpp"]);
    assert_eq!(
        store.results().unwrap().validation_info.ffmpeg_version,
        "6.0"
    );
}

#[tokio::test]
async fn unrecognized_names_are_dropped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("validation.toml");
    tokio::fs::write(
        &path,
        r#"
[h264]
working = ["h264_nvenc", "h264_vaapi"]
failed = ["h264_qsv"]

[h265]
working = ["libx265"]
"#,
    )
    .await
    .unwrap();

    let registry = registry();
    let store = ValidationStore::load(&path, &registry).await.unwrap();
    let results = store.results().unwrap();
    for name in results
        .h264
        .working
        .iter()
        .chain(&results.h264.failed)
        .chain(&results.h265.working)
        .chain(&results.h265.failed)
    {
        assert!(registry.is_recognized(name), "{name} survived load");
    }
    assert_eq!(results.h264.working, ["h264_vaapi"]);
    assert!(results.h264.failed.is_empty());
    assert_eq!(results.h265.working, ["libx265"]);
}

#[tokio::test]
async fn missing_file_is_no_validation_data() {
    let dir = tempfile::tempdir().unwrap();
    let err = ValidationStore::load(dir.path().join("absent.toml"), &registry())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoValidationData);
}

#[tokio::test]
async fn malformed_file_is_no_validation_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("validation.toml");
    tokio::fs::write(&path, "[h264\nworking = ").await.unwrap();
    let err = ValidationStore::load(&path, &registry()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoValidationData);
}

#[tokio::test]
async fn saving_an_empty_store_fails() {
    let store = ValidationStore::empty(PathBuf::from("never-written.toml"));
    let err = store.save().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoValidationData);
}
