use crate::config::{load_config, Config};

/// Check if a test is enabled via environment variable
fn is_test_enabled(env_var: &str) -> bool {
    std::env::var(env_var)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Check if SQLite file-backed tests are enabled via environment variable
pub fn is_sqlite_enabled() -> bool {
    is_test_enabled("ENABLE_SQLITE_TESTS")
}

/// Check if S3 tests are enabled via environment variable
pub fn is_s3_enabled() -> bool {
    is_test_enabled("ENABLE_S3_TESTS")
}

/// Load test configuration from config.toml
pub fn load_test_config() -> Result<Config, anyhow::Error> {
    load_config("config.toml").map_err(|e| anyhow::anyhow!("Failed to load config.toml: {}", e))
}
