//! Tests for the type-safe configuration builder pattern

use std::time::Duration;

use tempfile::TempDir;
use tradestat_harvester::utils::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PARALLEL_CHUNKS, DEFAULT_PAGE_TIMEOUT,
    DEFAULT_POOL_SIZE, DEFAULT_THROTTLE_MAX_DELAY, DEFAULT_THROTTLE_MIN_DELAY,
};
use tradestat_harvester::{ErrorKind, HarvestConfig, RetryPolicy};

#[test]
fn test_builder_requires_data_dir() {
    // This should not compile if uncommented - data_dir is required
    // let config = HarvestConfig::builder().build();

    let temp_dir = TempDir::new().unwrap();
    let config = HarvestConfig::builder()
        .data_dir(temp_dir.path())
        .build()
        .unwrap();

    assert_eq!(config.data_dir(), temp_dir.path());
    assert_eq!(config.ledger_path(), temp_dir.path().join("hs_codes.db"));
}

#[test]
fn test_builder_optional_fields_have_defaults() {
    let config = HarvestConfig::builder().data_dir("./data").build().unwrap();

    assert_eq!(config.chunk_size(), DEFAULT_CHUNK_SIZE);
    assert_eq!(config.max_parallel(), DEFAULT_MAX_PARALLEL_CHUNKS);
    assert_eq!(config.pool_size(), DEFAULT_POOL_SIZE);
    assert_eq!(config.acquire_timeout(), DEFAULT_ACQUIRE_TIMEOUT);
    assert_eq!(config.throttle_min_delay(), DEFAULT_THROTTLE_MIN_DELAY);
    assert_eq!(config.throttle_max_delay(), DEFAULT_THROTTLE_MAX_DELAY);
    assert_eq!(config.page_timeout(), DEFAULT_PAGE_TIMEOUT);
    assert!(config.headless());
    assert!(!config.prewarm());
    assert!(
        config.max_parallel() * 2 <= config.pool_size(),
        "default parallelism fits the default pool"
    );
}

#[test]
fn test_builder_with_all_optional_fields() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = temp_dir.path().join("elsewhere").join("progress.db");

    // Setters work before and after the required field
    let config = HarvestConfig::builder()
        .chunk_size(25)
        .data_dir(temp_dir.path())
        .ledger_path(&ledger)
        .max_parallel(3)
        .pool_size(6)
        .acquire_timeout(Duration::from_secs(90))
        .throttle(Duration::from_secs(1), Duration::from_secs(2))
        .prewarm(true)
        .headless(false)
        .page_timeout(Duration::from_secs(45))
        .retry(RetryPolicy::network())
        .build()
        .unwrap();

    assert_eq!(config.ledger_path(), ledger);
    assert_eq!(config.chunk_size(), 25);
    assert_eq!(config.max_parallel(), 3);
    assert_eq!(config.pool_size(), 6);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(90));
    assert_eq!(config.throttle_min_delay(), Duration::from_secs(1));
    assert!(config.prewarm());
    assert!(!config.headless());
    assert_eq!(config.page_timeout(), Duration::from_secs(45));
    assert_eq!(config.retry().max_retries, 5);
}

#[test]
fn test_invalid_values_fail_before_any_work() {
    let cases = [
        HarvestConfig::builder().data_dir("d").chunk_size(0).build(),
        HarvestConfig::builder().data_dir("d").pool_size(0).build(),
        HarvestConfig::builder().data_dir("d").max_parallel(0).build(),
        HarvestConfig::builder()
            .data_dir("d")
            .acquire_timeout(Duration::ZERO)
            .build(),
        HarvestConfig::builder()
            .data_dir("d")
            .throttle(Duration::from_secs(5), Duration::from_secs(1))
            .build(),
        HarvestConfig::builder()
            .data_dir("d")
            .retry(RetryPolicy {
                exponential_base: 0.5,
                ..RetryPolicy::scraping()
            })
            .build(),
    ];

    for result in cases {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }
}

#[test]
fn test_config_serializes_for_logging() {
    let config = HarvestConfig::builder().data_dir("./data").build().unwrap();
    let json = serde_json::to_value(&config).unwrap();

    assert_eq!(json["chunk_size"], DEFAULT_CHUNK_SIZE);
    assert_eq!(json["retry"]["max_retries"], 3);

    let back: HarvestConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, config);
}
