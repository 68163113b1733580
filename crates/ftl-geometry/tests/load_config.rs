use std::io::Write;

use ftl_geometry::{load_from, Geometry};

#[test]
fn loads_and_builds_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(include_bytes!("fixtures/sample_geometry.toml"))
        .expect("write fixture");

    let cfg = load_from(file.path()).expect("load geometry config");
    let geo = Geometry::build(cfg).expect("build geometry");

    assert_eq!(geo.total_lpns(), 100_000);
    assert_eq!(geo.blks_per_line, 8);
}

#[test]
fn missing_file_is_io_error() {
    let err = load_from(std::path::Path::new("/nonexistent/geometry.toml")).unwrap_err();
    assert!(matches!(err, ftl_geometry::ConfigError::Io { .. }));
}
