//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 256; ceremony payloads are small)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Relying party identifier, the effective domain (default: localhost)
    pub rp_id: String,
    /// Relying party display name
    pub rp_name: String,
    /// Exact origin browsers will report (default: http://localhost:3000)
    pub rp_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 256,
            timeout_secs: 30,
            rp_id: "localhost".to_string(),
            rp_name: "Passgate Wallet".to_string(),
            rp_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let body_limit_kb = std::env::var("BODY_LIMIT_KB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.body_limit_kb);

        let timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        let rp_id = std::env::var("RP_ID").unwrap_or(defaults.rp_id);
        let rp_name = std::env::var("RP_NAME").unwrap_or(defaults.rp_name);
        let rp_origin = std::env::var("RP_ORIGIN")
            .ok()
            .unwrap_or_else(|| format!("http://{}:{}", "localhost", port));

        Self {
            port,
            host,
            allowed_origins,
            body_limit_kb,
            timeout_secs,
            rp_id,
            rp_name,
            rp_origin,
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Sanity check: the RP id must be a registrable suffix of the origin's
    /// host, or browsers will refuse the ceremony outright.
    pub fn validate(&self) -> Result<(), String> {
        let parsed = url::Url::parse(&self.rp_origin)
            .map_err(|e| format!("RP_ORIGIN {:?} is not a URL: {e}", self.rp_origin))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| format!("RP_ORIGIN {:?} has no host", self.rp_origin))?;
        if host == self.rp_id || host.ends_with(&format!(".{}", self.rp_id)) {
            Ok(())
        } else {
            Err(format!(
                "RP_ID {:?} is not a suffix of RP_ORIGIN host {:?}",
                self.rp_id, host
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.rp_id, "localhost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_subdomain_origin() {
        let config = Config {
            rp_id: "example.com".into(),
            rp_origin: "https://wallet.example.com".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_origin() {
        let config = Config {
            rp_id: "example.com".into(),
            rp_origin: "https://evil.test".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_garbage_origin() {
        let config = Config {
            rp_origin: "not a url".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
