pub mod api; // HTTP routes, middleware, server lifecycle
pub mod config;
pub mod core_state; // Settings + AI service state shared by every request
pub mod models;
pub mod db;
pub mod pipeline;
pub mod provisioning; // Facility / patient creation with their vector namespaces

#[cfg(test)]
mod test_support;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, Settings};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the filter is derived from `LOG_LEVEL`.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(&settings.log_level)));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
