use super::{normalize_database_url, prepare_database_url, resolve_settings, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    assert_eq!(resolve_settings(None, env_from(&[])), Settings::default());
}

#[test]
fn environment_overrides_settings_file() {
    let file = r#"
bind_addr = "0.0.0.0:9000"
database_url = "sqlite://./file.db"
feed_capacity = 32
"#;
    let settings = resolve_settings(
        Some(file),
        env_from(&[("APP__DATABASE_URL", "sqlite://./env.db")]),
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.database_url, "sqlite://./env.db");
    assert_eq!(settings.feed_capacity, 32);
}

#[test]
fn invalid_or_zero_feed_capacity_is_not_accepted() {
    let settings = resolve_settings(None, env_from(&[("APP__FEED_CAPACITY", "lots")]));
    assert_eq!(settings.feed_capacity, Settings::default().feed_capacity);

    let settings = resolve_settings(None, env_from(&[("APP__FEED_CAPACITY", "0")]));
    assert_eq!(settings.feed_capacity, 1);
}

#[test]
fn unparsable_file_falls_back_to_defaults() {
    let settings = resolve_settings(Some("bind_addr = "), env_from(&[]));
    assert_eq!(settings, Settings::default());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_full_urls_untouched() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://./data/x.db"),
        "sqlite://./data/x.db"
    );
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("bordados_server_test_{suffix}"));
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("bordados_server_open_test_{suffix}"));
    let db_path = temp_root.join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(temp_root).expect("cleanup");
}
