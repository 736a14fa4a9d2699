//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// marchscape::core::logging::init();
/// log::info!("Scene started");
/// ```
pub fn init() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    )
    .format_timestamp_millis()
    .init();
}

/// Initialize logging for tests. Safe to call from every test.
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("debug")
    )
    .is_test(true)
    .try_init();
}
