//! Integration tests for the JSON test data provider.

use devstat_exporter::devstat::fixture::{generate, load_fixture, FixtureProvider};
use devstat_exporter::devstat::open_provider;
use devstat_exporter::{DevstatCollector, DevstatError, Sample, OBSERVATIONS_PER_DEVICE};
use std::fs;
use std::io::Write;

#[test]
fn test_generated_file_round_trips_through_provider() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("testdata.json");
    let generated = generate(&["ada", "da"], 2);
    fs::write(&path, serde_json::to_string_pretty(&generated).unwrap()).unwrap();

    let loaded = load_fixture(&path).unwrap();
    assert_eq!(loaded.devices.len(), 4);

    let provider = FixtureProvider::from_file(&path).unwrap();
    assert_eq!(provider.device_count(), 4);

    let collector = DevstatCollector::new(provider, "node").unwrap();
    let mut samples: Vec<Sample> = Vec::new();
    let emitted = collector.update(&mut samples).unwrap();
    assert_eq!(emitted, 4 * OBSERVATIONS_PER_DEVICE);

    let ids: Vec<&str> = samples
        .chunks(OBSERVATIONS_PER_DEVICE)
        .filter_map(|chunk| chunk[0].label("device"))
        .collect();
    assert_eq!(ids, vec!["ada0", "ada1", "da0", "da1"]);
}

#[test]
fn test_open_provider_prefers_test_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("testdata.json");
    fs::write(&path, serde_json::to_string(&generate(&["nvd"], 1)).unwrap()).unwrap();

    let provider = open_provider(Some(path.as_path())).unwrap();
    let collector = DevstatCollector::new(provider, "node").unwrap();
    let mut samples: Vec<Sample> = Vec::new();
    assert_eq!(
        collector.update(&mut samples).unwrap(),
        OBSERVATIONS_PER_DEVICE
    );
    assert_eq!(samples[0].label("device"), Some("nvd0"));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_fixture(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, DevstatError::FixtureIo { .. }));
}

#[test]
fn test_malformed_json_is_format_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    let err = load_fixture(file.path()).unwrap_err();
    assert!(matches!(err, DevstatError::FixtureFormat { .. }));
}

#[test]
fn test_invalid_device_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"version": "1.0", "generated_at": "2024-01-01T00:00:00Z",
            "devices": [{{"name": "", "unit": 0}}]}}"#
    )
    .unwrap();
    let err = load_fixture(file.path()).unwrap_err();
    assert!(matches!(err, DevstatError::InvalidFixture(_)));
}

#[cfg(not(target_os = "freebsd"))]
#[test]
fn test_native_backend_unsupported_off_freebsd() {
    assert!(matches!(
        open_provider(None),
        Err(DevstatError::Unsupported(_))
    ));
}
