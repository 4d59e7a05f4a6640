//! Text-chat relay with rooms and file distribution.
//!
//! The server multiplexes sessions into named rooms and broadcasts chat lines
//! inside a room. Files move either through the server (`--send_file`,
//! `--get_file`) or directly between clients over a short-lived peer link
//! (`--send_by_link`, `--get_by_link`). Both transfer paths share the text
//! connection and mark end-of-file with a sentinel, see [`transfer`].
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod transfer;
pub mod utils {
    pub mod clean;
}

pub use error::{AppErr, AppResult};
pub use state::{AppState, Registry};

/// `fmt` subscriber honouring `RUST_LOG`, `info` otherwise.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
