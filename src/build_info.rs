/// Build-time metadata exposed at runtime.
pub const BUILD_VERSION: &str = env!("APP_BUILD_VERSION");
pub const BUILD_COMMIT: &str = env!("APP_BUILD_COMMIT");
pub const BUILD_TIMESTAMP: &str = env!("APP_BUILD_TIMESTAMP");

/// API version reported to clients (`GET /` and `processing_info`).
pub fn service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Human-readable summary for the startup log.
pub fn summary() -> String {
    format!(
        "{} (build {}, commit {}, built at {})",
        service_version(),
        BUILD_VERSION,
        BUILD_COMMIT,
        BUILD_TIMESTAMP
    )
}
