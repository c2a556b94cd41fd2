pub mod blocks;
pub mod config;
pub mod error;
pub mod forms;
pub mod graph;
pub mod health;
pub mod lifecycle;
pub mod recording;
pub mod relay;
pub mod slack;
pub mod store;
pub mod webhook;

#[cfg(test)]
mod test_support;

use axum::Router;
use std::sync::Arc;

pub use config::{Config, StoreBackend};
pub use lifecycle::ReferralController;
pub use recording::RecordingLogger;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_service_version() -> String {
    // A hash injected by the release build wins over the one found at compile time
    if let Some(git_hash) = option_env!("REFERRAL_DESK_GIT_HASH") {
        if git_hash.len() >= 8 {
            git_hash[..8].to_string()
        } else {
            git_hash.to_string()
        }
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        // Fall back to built crate's git detection (for cargo builds)
        if git_hash.len() >= 8 {
            git_hash[..8].to_string()
        } else {
            git_hash.to_string()
        }
    } else {
        built_info::PKG_VERSION.to_string()
    }
}

pub struct AppState {
    pub controller: ReferralController,
    pub config: Config,
    pub recording_logger: Option<RecordingLogger>,
}

/// All routes, without the tracing layer.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::health_router())
        .merge(webhook::slack_router(state.clone()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_version_is_short_hash_or_package_version() {
        let version = get_service_version();
        assert!(!version.is_empty());
        assert!(version.len() <= 8 || version == env!("CARGO_PKG_VERSION"));
    }
}
