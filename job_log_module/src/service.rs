mod config;
mod server;
mod state;
mod verify;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{
    ConfigError, ServiceConfig, DEFAULT_CHANNEL_HISTORY_LIMIT, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_MAX_BODY_BYTES,
};
pub use server::{build_dispatcher, build_router, run_server};
pub use state::AppState;
