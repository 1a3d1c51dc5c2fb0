// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route check configuration.
//!
//! Values come from a TOML file, then environment overrides, then CLI flags.
//! The API token is never stored in the file; `token_env` names the
//! environment variable holding it.

use crate::session::SessionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the orchestrator host.
pub const ENV_VCO: &str = "VCO";

/// Environment variable overriding the enterprise id.
pub const ENV_ENTERPRISE_ID: &str = "ENT_ID";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),
}

/// Route check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Orchestrator host name.
    #[serde(default)]
    pub vco: String,

    /// Enterprise id on the orchestrator.
    #[serde(default)]
    pub enterprise_id: u64,

    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Segment queried on gateways.
    #[serde(default)]
    pub segment_id: i64,

    /// Attempts per target before giving up.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    #[serde(default = "default_edge_timeout")]
    pub edge_timeout_secs: u64,

    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_short_wait")]
    pub handshake_timeout_secs: u64,

    /// Upper bound on a single receive; timeouts are swept at least this often.
    #[serde(default = "default_short_wait")]
    pub recv_wait_secs: u64,

    /// Only audit hubs whose name contains this (case-insensitive).
    #[serde(default)]
    pub hub_name_filter: Option<String>,

    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Reuse the cached hub list when present.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Also write every cluster's expected and actual routes.
    #[serde(default = "default_true")]
    pub dump_all_routes: bool,

    /// Skip TLS certificate verification (portal and websocket).
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_token_env() -> String {
    "VCO_TOKEN".to_string()
}

fn default_max_tries() -> u32 {
    5
}

fn default_edge_timeout() -> u64 {
    30
}

fn default_gateway_timeout() -> u64 {
    40
}

fn default_short_wait() -> u64 {
    5
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("route-check-cache.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            vco: String::new(),
            enterprise_id: 0,
            token_env: default_token_env(),
            segment_id: 0,
            max_tries: default_max_tries(),
            edge_timeout_secs: default_edge_timeout(),
            gateway_timeout_secs: default_gateway_timeout(),
            handshake_timeout_secs: default_short_wait(),
            recv_wait_secs: default_short_wait(),
            hub_name_filter: None,
            cache_path: default_cache_path(),
            use_cache: true,
            output_dir: default_output_dir(),
            dump_all_routes: true,
            insecure_tls: false,
        }
    }
}

impl CheckConfig {
    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating, so overrides can still be
    /// applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `VCO` and `ENT_ID` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(vco) = lookup(ENV_VCO).filter(|v| !v.is_empty()) {
            self.vco = vco;
        }

        if let Some(raw) = lookup(ENV_ENTERPRISE_ID).filter(|v| !v.is_empty()) {
            self.enterprise_id = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a valid enterprise id: {}", ENV_ENTERPRISE_ID, raw))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vco.is_empty() {
            return Err(ConfigError::Invalid("No orchestrator (vco) configured".into()));
        }

        if self.vco.contains("://") || self.vco.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "vco must be a host name, got {}",
                self.vco
            )));
        }

        if self.enterprise_id == 0 {
            return Err(ConfigError::Invalid("No enterprise_id configured".into()));
        }

        if self.token_env.is_empty() {
            return Err(ConfigError::Invalid("token_env is empty".into()));
        }

        if self.max_tries == 0 {
            return Err(ConfigError::Invalid("max_tries must be at least 1".into()));
        }

        for (name, value) in [
            ("edge_timeout_secs", self.edge_timeout_secs),
            ("gateway_timeout_secs", self.gateway_timeout_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
            ("recv_wait_secs", self.recv_wait_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    /// API token from the environment.
    pub fn token(&self) -> Result<String, ConfigError> {
        self.token_with(|name| std::env::var(name).ok())
    }

    pub fn token_with<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.token_env)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv(self.token_env.clone()))
    }

    /// Session settings derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            recv_wait: Duration::from_secs(self.recv_wait_secs),
            max_tries: self.max_tries,
            edge_timeout: Duration::from_secs(self.edge_timeout_secs),
            gateway_timeout: Duration::from_secs(self.gateway_timeout_secs),
        }
    }

    /// Example configuration written by `gen-config`.
    pub fn example_toml() -> &'static str {
        r#"# velo-route-check configuration

# Orchestrator host name (overridden by $VCO)
vco = "vco.example.net"

# Enterprise id (overridden by $ENT_ID)
enterprise_id = 1

# Environment variable holding the API token
token_env = "VCO_TOKEN"

# Segment queried on gateways
segment_id = 0

# Attempts per edge or gateway before giving up
max_tries = 5

edge_timeout_secs = 30
gateway_timeout_secs = 40
handshake_timeout_secs = 5
recv_wait_secs = 5

# Only audit hubs whose name contains this string
# hub_name_filter = "hub"

cache_path = "route-check-cache.json"
use_cache = true

output_dir = "."
dump_all_routes = true

# Skip TLS certificate verification
insecure_tls = false
"#
    }
}
