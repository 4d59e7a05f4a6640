//! Runtime settings, read from the environment (a `.env` file is loaded first).
use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use crate::error::{config, AppResult};

pub const DEFAULT_PORT: u16 = 1702;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr:       SocketAddr,
    pub files_dir:  PathBuf,
    /// Uploaded files older than this are swept.
    pub file_ttl:   Duration,
    pub sweep_every: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr:        SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            files_dir:   PathBuf::from("server_files"),
            file_ttl:    Duration::from_secs(60),
            sweep_every: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();
        Ok(Self {
            addr:        var_or("CHAT_ADDR", d.addr)?,
            files_dir:   var_or("CHAT_FILES_DIR", d.files_dir)?,
            file_ttl:    secs_or("CHAT_FILE_TTL_SECS", d.file_ttl)?,
            sweep_every: secs_or("CHAT_SWEEP_SECS", d.sweep_every)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server:        SocketAddr,
    pub downloads_dir: PathBuf,
    /// Interface the peer-link listener binds to; also what gets advertised.
    pub link_host:     IpAddr,
    pub link_ttl:      Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server:        SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            downloads_dir: PathBuf::from("downloads"),
            link_host:     IpAddr::V4(Ipv4Addr::LOCALHOST),
            link_ttl:      Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();
        Ok(Self {
            server:        var_or("CHAT_SERVER", d.server)?,
            downloads_dir: var_or("CHAT_DOWNLOADS_DIR", d.downloads_dir)?,
            link_host:     var_or("CHAT_LINK_HOST", d.link_host)?,
            link_ttl:      secs_or("CHAT_LINK_TTL_SECS", d.link_ttl)?,
        })
    }
}

fn var_or<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| config(key, e)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(config(key, e)),
    }
}

fn secs_or(key: &str, default: Duration) -> AppResult<Duration> {
    var_or(key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    // each test uses its own keys; the process environment is shared across threads
    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let v: u64 = var_or("CHAT_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn bad_values_are_config_errors() {
        env::set_var("CHAT_TEST_BAD_SECS", "soon");
        let err = secs_or("CHAT_TEST_BAD_SECS", Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().starts_with("Config: CHAT_TEST_BAD_SECS"));
    }

    #[test]
    fn seconds_are_parsed() {
        env::set_var("CHAT_TEST_GOOD_SECS", " 90 ");
        let ttl = secs_or("CHAT_TEST_GOOD_SECS", Duration::from_secs(1)).unwrap();
        assert_eq!(ttl, Duration::from_secs(90));
    }
}
