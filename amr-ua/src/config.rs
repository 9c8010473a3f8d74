//! Server configuration.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. a JSON5 file given with [`ServerConfigBuilder::with_config_file`], or
//!    else the file named by `AMRUA_CONFIG_FILE`
//! 3. `AMRUA_CONFIG_OVERRIDE='key=value;...'` with JSON5 values and
//!    `/`-separated keys, e.g. `transport/mode="client"`
//! 4. overrides set with [`ServerConfigBuilder::with_override`]

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Builder;
use crate::command::NavTarget;
use crate::error::{Error, Result};
use crate::publish::DEFAULT_PUBLISH_INTERVAL;
use crate::zenoh_bridge::DEFAULT_KEY_EXPR;

pub const CONFIG_FILE_ENV: &str = "AMRUA_CONFIG_FILE";
pub const CONFIG_OVERRIDE_ENV: &str = "AMRUA_CONFIG_OVERRIDE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub key_expr: String,
    pub mode: Option<String>,
    pub connect_endpoints: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            key_expr: DEFAULT_KEY_EXPR.to_string(),
            mode: None,
            connect_endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub publish_interval_ms: u64,
    /// Variables to publish; `None` publishes every registered variable.
    pub publish_variables: Option<Vec<String>>,
    pub navigation_nodes: Vec<NavTarget>,
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: DEFAULT_PUBLISH_INTERVAL.as_millis() as u64,
            publish_variables: None,
            navigation_nodes: vec![NavTarget::default()],
            transport: TransportConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }
}

/// Parse `key1=value1;key2=value2` with JSON5 values.
pub fn parse_overrides(overrides: &str) -> Result<Vec<(String, serde_json::Value)>> {
    let mut parsed = Vec::new();
    for pair in overrides.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::Config(format!("invalid override '{pair}', expected 'key=value'"))
        })?;
        let (key, value) = (key.trim(), value.trim());
        let json = json5::from_str::<serde_json::Value>(value).map_err(|e| {
            Error::Config(format!(
                "failed to parse override for '{key}': {e} (value: {value})"
            ))
        })?;
        debug!("[CONFIG] Override: {} = {}", key, json);
        parsed.push((key.to_string(), json));
    }
    Ok(parsed)
}

/// Set `value` at a `/`-separated path, creating intermediate objects.
fn insert_path(root: &mut serde_json::Value, key: &str, value: serde_json::Value) -> Result<()> {
    let mut node = root;
    let mut parts = key.split('/').filter(|p| !p.is_empty()).peekable();
    while let Some(part) = parts.next() {
        let map = node
            .as_object_mut()
            .ok_or_else(|| Error::Config(format!("'{key}': '{part}' is not inside an object")))?;
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return Ok(());
        }
        node = map
            .entry(part.to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
    }
    Err(Error::Config("empty override key".into()))
}

#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config_file: Option<PathBuf>,
    overrides: Vec<(String, serde_json::Value)>,
    invalid_overrides: Vec<String>,
}

impl ServerConfigBuilder {
    pub fn with_config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set `key` to `value`. A value that cannot be serialized fails
    /// [`Builder::build`].
    pub fn with_override<K: Into<String>, V: Serialize>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => self.overrides.push((key, value)),
            Err(e) => self.invalid_overrides.push(format!("override '{key}': {e}")),
        }
        self
    }

    fn base(&self) -> Result<serde_json::Value> {
        let path = self
            .config_file
            .clone()
            .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from));
        match path {
            Some(path) => {
                debug!("[CONFIG] Loading {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                json5::from_str(&text)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
            }
            None => serde_json::to_value(ServerConfig::default())
                .map_err(|e| Error::Config(e.to_string())),
        }
    }
}

impl Builder for ServerConfigBuilder {
    type Output = ServerConfig;

    fn build(self) -> Result<ServerConfig> {
        if let Some(invalid) = self.invalid_overrides.first() {
            return Err(Error::Config(invalid.clone()));
        }
        let mut value = self.base()?;
        if !value.is_object() {
            return Err(Error::Config("configuration root must be an object".into()));
        }

        let env_overrides = match std::env::var(CONFIG_OVERRIDE_ENV) {
            Ok(s) => parse_overrides(&s)?,
            Err(_) => Vec::new(),
        };
        debug!(
            "[CONFIG] Applying {} env and {} explicit overrides",
            env_overrides.len(),
            self.overrides.len()
        );
        for (key, v) in env_overrides.into_iter().chain(self.overrides) {
            insert_path(&mut value, &key, v)?;
        }

        let config: ServerConfig =
            serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))?;
        if config.publish_interval_ms == 0 {
            return Err(Error::Config("publish_interval_ms must be positive".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.publish_interval(), Duration::from_millis(1000));
        assert_eq!(config.navigation_nodes, vec![NavTarget::default()]);
        assert_eq!(config.transport.key_expr, "amr/telemetry");
    }

    #[test]
    fn test_parse_overrides() {
        let parsed = parse_overrides(r#"publish_interval_ms=250; transport/mode="client";"#).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "publish_interval_ms");
        assert_eq!(parsed[0].1, serde_json::json!(250));
        assert_eq!(parsed[1].1, serde_json::json!("client"));

        assert!(parse_overrides("no_equals_sign").is_err());
        assert!(parse_overrides("k={unclosed").is_err());
    }

    #[test]
    fn test_insert_path_creates_objects() {
        let mut root = serde_json::json!({});
        insert_path(&mut root, "transport/connect_endpoints", serde_json::json!(["tcp/1.2.3.4:7447"]))
            .unwrap();
        assert_eq!(root["transport"]["connect_endpoints"][0], "tcp/1.2.3.4:7447");

        let mut scalar_root = serde_json::json!({"a": 1});
        assert!(insert_path(&mut scalar_root, "a/b", serde_json::json!(2)).is_err());
    }

    #[test]
    fn test_builder_with_file_and_override() {
        let path = std::env::temp_dir().join(format!("amr-ua-config-{}.json5", std::process::id()));
        std::fs::write(
            &path,
            "{ publish_interval_ms: 500, navigation_nodes: [{x: 1, y: 2, yaw: 0, vmax: 0.5, accuracy: 0.1}] }",
        )
        .expect("Failed to write config file");

        let config = ServerConfig::builder()
            .with_config_file(&path)
            .with_override("transport/key_expr", "robot/1/telemetry")
            .build()
            .expect("Failed to build config");
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.publish_interval_ms, 500);
        assert_eq!(config.navigation_nodes.len(), 1);
        assert_eq!(config.navigation_nodes[0].x, 1.0);
        assert_eq!(config.transport.key_expr, "robot/1/telemetry");
        assert_eq!(config.transport.mode, None);
    }

    #[test]
    fn test_unserializable_override_rejected() {
        let bad = std::collections::BTreeMap::from([((1u8, 2u8), 3u8)]);
        let err = ServerConfig::builder()
            .with_override("transport", bad)
            .build()
            .unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("override 'transport'"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ServerConfig::builder()
            .with_override("publish_interval_ms", 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
