//! Engine client configuration loaded from environment variables.

use std::time::Duration;

use crate::api::{EngineApi, NodeServiceApi};
use crate::client::PushClient;
use crate::monitor::{MonitorOptions, DEFAULT_COMPLETION_DELAY};

/// Connection configuration for the execution engine and node service.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine REST base URL (default: `http://localhost:8080/v1`).
    pub api_url: String,
    /// Engine WebSocket base URL (default: `ws://localhost:8080`).
    pub ws_url: String,
    /// Node service base URL (default: `http://localhost:8000`).
    pub node_service_url: String,
    /// Status poll interval in milliseconds (default: `200`).
    pub poll_interval_ms: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults,
    /// reading a `.env` file first when one is present.
    ///
    /// | Env Var                      | Default                   |
    /// |------------------------------|---------------------------|
    /// | `PIXELGRAPH_API_URL`         | `http://localhost:8080/v1`|
    /// | `PIXELGRAPH_WS_URL`          | `ws://localhost:8080`     |
    /// | `PIXELGRAPH_NODE_SERVICE_URL`| `http://localhost:8000`   |
    /// | `PIXELGRAPH_POLL_INTERVAL_MS`| `200`                     |
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let api_url = std::env::var("PIXELGRAPH_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080/v1".into());

        let ws_url = std::env::var("PIXELGRAPH_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:8080".into());

        let node_service_url = std::env::var("PIXELGRAPH_NODE_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into());

        let poll_interval_ms: u64 = std::env::var("PIXELGRAPH_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "200".into())
            .parse()
            .expect("PIXELGRAPH_POLL_INTERVAL_MS must be a valid u64");

        Self {
            api_url,
            ws_url,
            node_service_url,
            poll_interval_ms,
        }
    }

    /// REST client against the engine API.
    pub fn engine_api(&self) -> EngineApi {
        EngineApi::new(self.api_url.clone())
    }

    /// REST client against the node service.
    pub fn node_service_api(&self) -> NodeServiceApi {
        NodeServiceApi::new(self.node_service_url.clone())
    }

    /// WebSocket push client for task updates.
    pub fn push_client(&self) -> PushClient {
        PushClient::new(self.ws_url.clone())
    }

    /// Monitor tunables derived from this configuration.
    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            completion_delay: DEFAULT_COMPLETION_DELAY,
        }
    }
}
