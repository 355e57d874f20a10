use std::{env, net::SocketAddr, str::FromStr};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    /// Origin allowed by CORS; absent mirrors the request origin.
    #[serde(default)]
    pub client_url: Option<String>,
    /// Connection string handed to an external document store adapter.
    #[serde(default)]
    pub store_uri: Option<String>,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Session token lifetime in seconds.
    #[serde(default = "default_jwt_expires_in")]
    pub jwt_expires_in: u64,
    #[serde(default)]
    pub node_env: NodeEnv,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeEnv {
    Development,
    Production,
}

impl Default for NodeEnv {
    fn default() -> Self {
        NodeEnv::Development
    }
}

impl NodeEnv {
    pub fn is_development(&self) -> bool {
        matches!(self, NodeEnv::Development)
    }
}

impl FromStr for NodeEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(NodeEnv::Development),
            "production" | "prod" => Ok(NodeEnv::Production),
            other => Err(anyhow::anyhow!(
                "unsupported environment '{other}' (expected 'development' or 'production')"
            )),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            client_url: None,
            store_uri: None,
            bus: BusConfig::default(),
            jwt_secret: default_jwt_secret(),
            jwt_expires_in: default_jwt_expires_in(),
            node_env: NodeEnv::default(),
        }
    }
}

impl AppConfig {
    const BIND_ADDRESS_ENV: &'static str = "QUILLPAD_BIND_ADDRESS";
    const CLIENT_URL_ENV: &'static str = "QUILLPAD_CLIENT_URL";
    const STORE_URI_ENV: &'static str = "QUILLPAD_STORE_URI";
    const BUS_HOST_ENV: &'static str = "QUILLPAD_BUS_HOST";
    const BUS_PORT_ENV: &'static str = "QUILLPAD_BUS_PORT";
    const BUS_USERNAME_ENV: &'static str = "QUILLPAD_BUS_USERNAME";
    const BUS_PASSWORD_ENV: &'static str = "QUILLPAD_BUS_PASSWORD";
    const JWT_SECRET_ENV: &'static str = "QUILLPAD_JWT_SECRET";
    const JWT_EXPIRES_IN_ENV: &'static str = "QUILLPAD_JWT_EXPIRES_IN";
    const NODE_ENV_ENV: &'static str = "QUILLPAD_NODE_ENV";

    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = env::var(Self::BIND_ADDRESS_ENV) {
            config.bind_address = addr
                .parse()
                .with_context(|| format!("invalid {}", Self::BIND_ADDRESS_ENV))?;
        }

        if let Some(url) = non_empty(env::var(Self::CLIENT_URL_ENV).ok()) {
            config.client_url = Some(url);
        }

        if let Some(uri) = non_empty(env::var(Self::STORE_URI_ENV).ok()) {
            config.store_uri = Some(uri);
        }

        config.bus.host = non_empty(env::var(Self::BUS_HOST_ENV).ok());
        if let Ok(port) = env::var(Self::BUS_PORT_ENV) {
            config.bus.port = Some(port.parse().with_context(|| {
                format!("invalid {} (expected port number)", Self::BUS_PORT_ENV)
            })?);
        }
        config.bus.username = non_empty(env::var(Self::BUS_USERNAME_ENV).ok());
        config.bus.password = non_empty(env::var(Self::BUS_PASSWORD_ENV).ok());

        if let Some(secret) = non_empty(env::var(Self::JWT_SECRET_ENV).ok()) {
            config.jwt_secret = secret;
        }

        if let Ok(expires) = env::var(Self::JWT_EXPIRES_IN_ENV) {
            config.jwt_expires_in = expires.trim().parse().with_context(|| {
                format!("invalid {} (expected seconds)", Self::JWT_EXPIRES_IN_ENV)
            })?;
        }

        if let Ok(node_env) = env::var(Self::NODE_ENV_ENV) {
            config.node_env = NodeEnv::from_str(&node_env)?;
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_owned();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn default_bind_address() -> SocketAddr {
    "127.0.0.1:5000"
        .parse()
        .expect("default bind address must be valid")
}

fn default_jwt_secret() -> String {
    "quillpad-development-secret".to_owned()
}

fn default_jwt_expires_in() -> u64 {
    7 * 24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address.port(), 5000);
        assert_eq!(config.jwt_expires_in, 604_800);
        assert!(config.node_env.is_development());
        assert!(config.client_url.is_none());
        assert!(config.bus.host.is_none());
    }

    #[test]
    fn node_env_parses_common_spellings() {
        assert_eq!(NodeEnv::from_str("production").unwrap(), NodeEnv::Production);
        assert_eq!(NodeEnv::from_str("PROD").unwrap(), NodeEnv::Production);
        assert_eq!(NodeEnv::from_str("dev").unwrap(), NodeEnv::Development);
        assert!(NodeEnv::from_str("staging").is_err());
    }
}
