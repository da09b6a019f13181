//! Typed server configuration: YAML file + environment overrides.
//!
//! Mirrors the teacher's `ferron/src/util/load_config.rs` +
//! `env_config.rs` split (parse, then mutate with env vars), but works on a
//! typed `serde` struct instead of a raw YAML tree.

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
const DEFAULT_WEIGHT: u32 = 1;
const DEFAULT_ADMIN_PORT: u16 = 9090;

/// One of the three selection policies named in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
  RoundRobin,
  WeightedRoundRobin,
  LeastConnections,
}

impl FromStr for StrategyKind {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "round-robin" => Ok(StrategyKind::RoundRobin),
      "weighted-round-robin" => Ok(StrategyKind::WeightedRoundRobin),
      "least-connections" => Ok(StrategyKind::LeastConnections),
      other => bail!("unknown load balancing strategy \"{other}\""),
    }
  }
}

impl fmt::Display for StrategyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      StrategyKind::RoundRobin => "round-robin",
      StrategyKind::WeightedRoundRobin => "weighted-round-robin",
      StrategyKind::LeastConnections => "least-connections",
    };
    f.write_str(s)
  }
}

/// One configured upstream, as it appears under `backends:` in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  pub url: String,
  #[serde(default = "default_weight")]
  pub weight: u32,
  #[serde(default = "default_max_consecutive_failures")]
  pub max_consecutive_failures: u32,
}

fn default_weight() -> u32 {
  DEFAULT_WEIGHT
}

fn default_max_consecutive_failures() -> u32 {
  DEFAULT_MAX_CONSECUTIVE_FAILURES
}

/// Connection parameters for the external rate-limit/cache store.
/// An empty `address` selects the in-process store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub password: String,
  #[serde(default)]
  pub db: u32,
}

fn default_admin_port() -> u16 {
  DEFAULT_ADMIN_PORT
}

fn default_rate_limit_per_min() -> u32 {
  100
}

/// The full server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub lb_port: u16,
  pub strategy: String,
  pub backends: Vec<BackendConfig>,
  #[serde(default)]
  pub enable_auth: bool,
  #[serde(default)]
  pub auth_token: String,
  #[serde(default)]
  pub enable_ratelimit: bool,
  #[serde(default = "default_rate_limit_per_min")]
  pub rate_limit_per_min: u32,
  #[serde(default)]
  pub enable_cache: bool,
  #[serde(default)]
  pub cert_file: Option<String>,
  #[serde(default)]
  pub key_file: Option<String>,
  #[serde(default = "default_admin_port")]
  pub admin_port: u16,
  #[serde(default)]
  pub store: StoreConfig,
}

impl Config {
  /// Loads and validates configuration from a YAML file, with environment
  /// overrides applied after the file parse.
  pub fn load(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read configuration file at \"{}\"", path.display()))?;
    let mut config: Config = serde_yaml::from_str(&contents)
      .with_context(|| format!("failed to parse configuration file at \"{}\"", path.display()))?;
    config.normalize_blank_tls_fields();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
  }

  /// An empty `cert_file`/`key_file` string in YAML (as written by a
  /// generated config with TLS left disabled) means the same thing as the
  /// field being absent.
  fn normalize_blank_tls_fields(&mut self) {
    if self.cert_file.as_deref() == Some("") {
      self.cert_file = None;
    }
    if self.key_file.as_deref() == Some("") {
      self.key_file = None;
    }
  }

  /// Mutates the configuration in place using `LB_PORT`, `GOLB_STRATEGY`,
  /// `AUTH_TOKEN`, `CERT_FILE`, `KEY_FILE` and the store env vars, mirroring
  /// the teacher's `apply_env_vars_to_config`.
  pub fn apply_env_overrides(&mut self) {
    if let Ok(port) = env::var("LB_PORT") {
      if let Ok(port) = port.parse::<u16>() {
        self.lb_port = port;
      }
    }
    if let Ok(strategy) = env::var("GOLB_STRATEGY") {
      self.strategy = strategy;
    }
    if let Ok(token) = env::var("AUTH_TOKEN") {
      self.auth_token = token;
    }
    if let Ok(cert) = env::var("CERT_FILE") {
      self.cert_file = Some(cert);
    }
    if let Ok(key) = env::var("KEY_FILE") {
      self.key_file = Some(key);
    }
    if let Ok(address) = env::var("GOLB_STORE_ADDRESS") {
      self.store.address = address;
    }
    if let Ok(password) = env::var("GOLB_STORE_PASSWORD") {
      self.store.password = password;
    }
    if let Ok(db) = env::var("GOLB_STORE_DB") {
      if let Ok(db) = db.parse::<u32>() {
        self.store.db = db;
      }
    }
  }

  /// Resolves the `strategy` field into a [`StrategyKind`], failing if it
  /// names anything other than the three recognized strategies.
  pub fn strategy_kind(&self) -> Result<StrategyKind> {
    self.strategy.parse()
  }

  fn validate(&self) -> Result<()> {
    self.strategy_kind()?;

    if self.backends.is_empty() {
      bail!("configuration must list at least one backend");
    }

    for backend in &self.backends {
      let uri: hyper::Uri = backend
        .url
        .parse()
        .map_err(|err| anyhow!("invalid backend URL \"{}\": {err}", backend.url))?;
      match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => bail!("backend URL \"{}\" must be an absolute HTTP or HTTPS URL", backend.url),
      }
      if uri.host().is_none() {
        bail!("backend URL \"{}\" is missing a host", backend.url);
      }
      if backend.weight < 1 {
        bail!("backend \"{}\" has weight {} but weight must be >= 1", backend.url, backend.weight);
      }
      if backend.max_consecutive_failures < 1 {
        bail!(
          "backend \"{}\" has max_consecutive_failures {} but it must be >= 1",
          backend.url,
          backend.max_consecutive_failures
        );
      }
    }

    if self.enable_ratelimit && self.rate_limit_per_min < 1 {
      bail!("rate_limit_per_min must be >= 1 when rate limiting is enabled");
    }

    if self.cert_file.is_some() != self.key_file.is_some() {
      bail!("cert_file and key_file must both be set to enable TLS, or both left unset");
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_config(contents: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  #[test]
  fn loads_minimal_config_with_defaults() {
    let file = write_config(
      r#"
lb_port: 8080
strategy: round-robin
backends:
  - url: "http://127.0.0.1:9001"
"#,
    );
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.lb_port, 8080);
    assert_eq!(config.backends[0].weight, 1);
    assert_eq!(config.backends[0].max_consecutive_failures, 3);
    assert_eq!(config.admin_port, 9090);
    assert!(!config.enable_auth);
  }

  #[test]
  fn rejects_unknown_strategy() {
    let file = write_config(
      r#"
lb_port: 8080
strategy: bogus
backends:
  - url: "http://127.0.0.1:9001"
"#,
    );
    assert!(Config::load(file.path()).is_err());
  }

  #[test]
  fn rejects_non_http_backend_url() {
    let file = write_config(
      r#"
lb_port: 8080
strategy: round-robin
backends:
  - url: "ftp://127.0.0.1:9001"
"#,
    );
    assert!(Config::load(file.path()).is_err());
  }

  #[test]
  fn env_override_replaces_port_and_strategy() {
    let file = write_config(
      r#"
lb_port: 8080
strategy: round-robin
backends:
  - url: "http://127.0.0.1:9001"
"#,
    );
    env::set_var("LB_PORT", "9000");
    env::set_var("GOLB_STRATEGY", "least-connections");
    let config = Config::load(file.path()).unwrap();
    env::remove_var("LB_PORT");
    env::remove_var("GOLB_STRATEGY");
    assert_eq!(config.lb_port, 9000);
    assert_eq!(config.strategy_kind().unwrap(), StrategyKind::LeastConnections);
  }
}
