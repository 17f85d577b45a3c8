use super::*;
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = Config {
        lms: LmsConfig::default(),
        cache: CacheConfig::default(),
        discovery: DiscoveryConfig::default(),
        embedding: EmbeddingConfig::default(),
        assistant: AssistantConfig::default(),
        base_dir: PathBuf::new(),
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.cache.index_ttl_seconds, 3600);
    assert_eq!(config.cache.file_max_entries, 100);
    assert_eq!(config.discovery.restricted_ratio_threshold, 0.5);
}

#[test]
fn load_missing_file_returns_defaults() {
    let dir = TempDir::new().expect("create temp dir");
    let config = Config::load(dir.path()).expect("load config");

    assert_eq!(config.lms.timeout_seconds, 30);
    assert_eq!(config.base_dir, dir.path());
}

#[test]
fn save_and_reload_round_trip() {
    let dir = TempDir::new().expect("create temp dir");
    let mut config = Config::load(dir.path()).expect("load config");
    config.lms.base_url = "https://lms.school.edu".to_string();
    config.discovery.max_pages = 5;
    config.save().expect("save config");

    let reloaded = Config::load(dir.path()).expect("reload config");
    assert_eq!(reloaded.lms.base_url, "https://lms.school.edu");
    assert_eq!(reloaded.discovery.max_pages, 5);
}

#[test]
fn rejects_invalid_base_url() {
    let dir = TempDir::new().expect("create temp dir");
    let mut config = Config::load(dir.path()).expect("load config");
    config.lms.base_url = "not a url".to_string();

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBaseUrl(_))
    ));
}

#[test]
fn rejects_overlap_at_least_chunk_size() {
    let dir = TempDir::new().expect("create temp dir");
    let mut config = Config::load(dir.path()).expect("load config");
    config.embedding.chunk_size = 100;
    config.embedding.chunk_overlap = 100;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(100, 100))
    ));
}

#[test]
fn rejects_revalidation_window_longer_than_ttl() {
    let dir = TempDir::new().expect("create temp dir");
    let mut config = Config::load(dir.path()).expect("load config");
    config.cache.file_ttl_seconds = 600;
    config.cache.file_revalidate_seconds = 600;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::RevalidateExceedsTtl(600, 600))
    ));
}

#[test]
fn rejects_out_of_range_restricted_ratio() {
    let dir = TempDir::new().expect("create temp dir");
    let mut config = Config::load(dir.path()).expect("load config");
    config.discovery.restricted_ratio_threshold = 1.5;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidRestrictedRatio(_))
    ));
}
