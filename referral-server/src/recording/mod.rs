pub mod logger;
pub mod middleware;

pub use logger::RecordingLogger;
pub use middleware::{create_http_client, create_http_client_from, RecordingMiddleware};
pub use referral_core::recording::*;
