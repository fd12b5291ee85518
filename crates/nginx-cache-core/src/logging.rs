use tracing_subscriber::{fmt, EnvFilter};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "NGINX_CACHE_LOG";

pub fn init_logging() {
    init_logging_with_default("info");
}

pub fn init_logging_with_default(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
