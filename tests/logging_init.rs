//! Logging bootstrap installs a global subscriber, so it gets its own test binary

use trunkstore::{logging, LogConfig};

#[test]
fn test_init_writes_rolling_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        level: "debug".to_string(),
        dir: Some(dir.path().join("logs")),
        ansi: false,
        json: false,
    };

    logging::init(&config).unwrap();
    tracing::info!("trunk allocator logging ready");

    let log_files: Vec<String> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("trunkstore.log"))
        .collect();
    assert_eq!(log_files.len(), 1, "{:?}", log_files);

    // A global subscriber is already installed
    assert!(logging::init(&config).is_err());
}
