use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// Peer hung up while a prompt or a file stream was still pending.
    #[error("Connection closed")]
    Closed,

    #[error("Link expired")]
    LinkExpired,

    #[error("Config: {0}")]
    Config(String),
}

impl AppErr {
    /// Connection-level failures; the affected session is dropped, nobody else is.
    pub fn is_disconnect(&self) -> bool {
        match self {
            AppErr::Closed => true,
            AppErr::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/* ── small helpers: turn any error into Bad / Config ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }

pub fn config<E: Display>(key: &str, e: E) -> AppErr {
    AppErr::Config(format!("{key}: {e}"))
}
