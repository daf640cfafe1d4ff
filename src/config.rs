//! Configuration for docserver

use crate::http::DEFAULT_MAX_UPLOAD_BYTES;
use crate::upload::DEFAULT_MAX_UNPACKED_BYTES;
use serde::{Deserialize, Serialize};
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Default store directory
pub fn default_store_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docserver")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the bundle store. Must already exist.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Interface to bind the HTTP server to
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Largest accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Largest total decompressed size of one upload's entries
    #[serde(default = "default_max_unpacked_bytes")]
    pub max_unpacked_bytes: u64,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_max_unpacked_bytes() -> u64 {
    DEFAULT_MAX_UNPACKED_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            http_host: default_http_host(),
            http_port: default_http_port(),
            max_upload_bytes: default_max_upload_bytes(),
            max_unpacked_bytes: default_max_unpacked_bytes(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Socket address the HTTP server binds to
    ///
    /// `http_host` is an IPv4 or IPv6 address; IPv6 may be bracketed.
    pub fn bind_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let host = self.http_host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let ip: IpAddr = host.parse()?;
        Ok(SocketAddr::new(ip, self.http_port))
    }
}
