//! Publishing snapshots over Zenoh.

use std::path::PathBuf;

use tracing::{debug, info};
use zenoh::bytes::Encoding;
use zenoh::key_expr::KeyExpr;
use zenoh::qos::CongestionControl;
use zenoh::{Session, Wait};

use crate::Builder;
use crate::error::{Error, Result, TransportError};
use crate::publish::PublishBridge;
use crate::snapshot::PublishSnapshot;

pub const DEFAULT_KEY_EXPR: &str = "amr/telemetry";

/// Puts each snapshot, encoded as JSON, on a key expression.
pub struct ZenohBridge {
    // Keeps the session open for the publisher.
    _session: Session,
    publisher: zenoh::pubsub::Publisher<'static>,
    key_expr: String,
}

impl ZenohBridge {
    pub fn builder() -> ZenohBridgeBuilder {
        ZenohBridgeBuilder::default()
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }
}

impl PublishBridge for ZenohBridge {
    fn publish(&self, snapshot: &PublishSnapshot) -> std::result::Result<(), TransportError> {
        let payload = snapshot.to_json()?;
        self.publisher
            .put(payload)
            .encoding(Encoding::APPLICATION_JSON)
            .wait()
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ZenohBridgeBuilder {
    key_expr: String,
    mode: Option<String>,
    connect_endpoints: Vec<String>,
    config_file: Option<PathBuf>,
}

impl Default for ZenohBridgeBuilder {
    fn default() -> Self {
        Self {
            key_expr: DEFAULT_KEY_EXPR.to_string(),
            mode: None,
            connect_endpoints: Vec::new(),
            config_file: None,
        }
    }
}

impl ZenohBridgeBuilder {
    pub fn with_key_expr<S: Into<String>>(mut self, key_expr: S) -> Self {
        self.key_expr = key_expr.into();
        self
    }

    /// Zenoh session mode: `peer`, `client` or `router`.
    pub fn with_mode<S: Into<String>>(mut self, mode: S) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_connect_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connect_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }
}

fn transport_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::TransportUnavailable(format!("{context}: {e}"))
}

impl Builder for ZenohBridgeBuilder {
    type Output = ZenohBridge;

    #[tracing::instrument(name = "zenoh_bridge_build", skip(self), fields(key_expr = %self.key_expr))]
    fn build(self) -> Result<ZenohBridge> {
        let mut config = match &self.config_file {
            Some(path) => zenoh::Config::from_file(path)
                .map_err(|e| transport_err("failed to load zenoh config", e))?,
            None => zenoh::Config::default(),
        };

        if let Some(mode) = &self.mode {
            config
                .insert_json5("mode", &format!("\"{mode}\""))
                .map_err(|e| transport_err("invalid mode", e))?;
        }
        if !self.connect_endpoints.is_empty() {
            let endpoints = serde_json::to_string(&self.connect_endpoints)
                .map_err(|e| transport_err("invalid endpoints", e))?;
            config
                .insert_json5("connect/endpoints", &endpoints)
                .map_err(|e| transport_err("invalid endpoints", e))?;
        }

        let key_expr = KeyExpr::try_from(self.key_expr.clone())
            .map_err(|e| transport_err("invalid key expression", e))?;

        let session = zenoh::open(config)
            .wait()
            .map_err(|e| transport_err("failed to open session", e))?;
        debug!("[BRIDGE] Zenoh session opened: zid={}", session.zid());

        let publisher = session
            .declare_publisher(key_expr)
            .congestion_control(CongestionControl::Drop)
            .wait()
            .map_err(|e| transport_err("failed to declare publisher", e))?;
        info!("[BRIDGE] Publishing snapshots on {}", self.key_expr);

        Ok(ZenohBridge {
            _session: session,
            publisher,
            key_expr: self.key_expr,
        })
    }
}
