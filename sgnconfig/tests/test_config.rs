use sgnconfig::Config;

fn load_in_tempdir() -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
    (dir, config)
}

#[test]
fn test_load_writes_config_file() {
    let (dir, _config) = load_in_tempdir();
    assert!(dir.path().join("config.yaml").exists());
}

#[test]
fn test_embedded_defaults() {
    let (_dir, config) = load_in_tempdir();

    assert_eq!(config.get_u64_or(&["player", "stall_tick_ms"], 0), 500);
    assert_eq!(config.get_u64_or(&["playlist", "standby_recheck_secs"], 0), 10);
    assert_eq!(config.get_string_or(&["sync", "mode"], ""), "poll");
    assert_eq!(
        config.get_string_list_or(&["cache", "volatile_query_params"], &[]),
        vec!["token".to_string()]
    );
    assert!(!config.get_bool_or(&["player", "audio_enabled"], true));
}

#[test]
fn test_missing_path_uses_default() {
    let (_dir, config) = load_in_tempdir();
    assert_eq!(config.get_u64_or(&["nowhere", "value"], 42), 42);
    assert_eq!(config.get_string_or(&["nowhere", "value"], "x"), "x");
}

#[test]
fn test_set_value_is_persisted() {
    let (dir, config) = load_in_tempdir();
    config.set_u64(&["player", "stall_playing_ticks"], 4).unwrap();

    let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(reloaded.get_u64_or(&["player", "stall_playing_ticks"], 0), 4);
}

#[test]
fn test_managed_dir_is_created_relative_to_config_dir() {
    let (dir, config) = load_in_tempdir();
    let cache_dir = config.get_managed_dir(&["cache", "directory"], "media_cache").unwrap();

    assert_eq!(std::path::Path::new(&cache_dir), dir.path().join("media_cache"));
    assert!(dir.path().join("media_cache").is_dir());
}

#[test]
fn test_terminal_id_is_stable() {
    let (_dir, config) = load_in_tempdir();
    let first = config.get_terminal_id().unwrap();
    let second = config.get_terminal_id().unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_external_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "Sync:\n  Mode: push\n  Poll_Interval_Secs: 5\n",
    )
    .unwrap();

    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(config.get_string_or(&["sync", "mode"], ""), "push");
    assert_eq!(config.get_u64_or(&["sync", "poll_interval_secs"], 0), 5);
    assert_eq!(config.get_u64_or(&["sync", "request_timeout_secs"], 0), 15);
}
