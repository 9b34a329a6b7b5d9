//! Server-level configuration: socket binding plus the core's own
//! [`NovaConfig`] (spec.md §6/§9).
//!
//! Grounded in the teacher's `ServerConfig` (`hls-vod-server/src/config.rs`):
//! a thin struct over `host`/`port` plus a nested config section, loaded
//! from an optional TOML file with a safe default fallback.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    pub log_level: String,
    pub core: novastream_core::NovaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_enabled: true,
            log_level: "info".to_string(),
            core: novastream_core::NovaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load from a TOML file, falling back to defaults on any read/parse
    /// error (a missing config file is the common case, not a failure).
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("failed to parse config file {}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_addr_combines_host_and_port() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load_or_default("/no/such/novastream-config.toml");
        assert_eq!(config.port, 8080);
    }
}
