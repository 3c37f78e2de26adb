use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rpc::DEFAULT_MAX_FRAME_LEN;

pub const ENV_MAX_FRAME_LEN: &str = "RMI_MAX_FRAME_LEN";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "RMI_CONNECT_TIMEOUT_MS";
pub const ENV_BACKLOG: &str = "RMI_BACKLOG";

/// Tunables shared by skeletons and stubs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Largest frame accepted from a peer, in bytes.
    pub max_frame_len: usize,
    /// Bound on how long a stub waits for a connection. `None` waits as long
    /// as the operating system does.
    pub connect_timeout_ms: Option<u64>,
    /// Listen backlog of the skeleton's accept socket.
    pub backlog: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            connect_timeout_ms: None,
            backlog: 1024,
        }
    }
}

impl Config {
    /// Defaults overridden by `RMI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_MAX_FRAME_LEN) {
            config.max_frame_len = parse(ENV_MAX_FRAME_LEN, &v)?;
        }
        if let Some(v) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout_ms = Some(parse(ENV_CONNECT_TIMEOUT_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_BACKLOG) {
            config.backlog = parse(ENV_BACKLOG, &v)?;
        }
        Ok(config)
    }

    /// Reads a JSON document; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid JSON in {}: {e}", path.display())))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_vars(vars(&[
            (ENV_MAX_FRAME_LEN, "4096"),
            (ENV_CONNECT_TIMEOUT_MS, " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.max_frame_len, 4096);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.backlog, 1024);

        assert_eq!(Config::from_vars(vars(&[])).unwrap(), Config::default());
    }

    #[test]
    fn malformed_variable_is_reported() {
        let err = Config::from_vars(vars(&[(ENV_BACKLOG, "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.starts_with("RMI_BACKLOG")));
    }

    #[test]
    fn file_with_partial_fields() {
        let path = std::env::temp_dir().join(format!("rmi-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "connect_timeout_ms": 1000 }"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.connect_timeout_ms, Some(1000));
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);

        assert!(matches!(
            Config::from_file(path),
            Err(Error::Io(_))
        ));
    }
}
