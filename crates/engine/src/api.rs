//! REST clients for the execution engine and the node service.
//!
//! [`EngineApi`] wraps the engine's scene/task endpoints (graph
//! submission, status polls) and [`NodeServiceApi`] wraps the node
//! service's configuration endpoint, both using [`reqwest`].

use std::sync::Arc;

use async_trait::async_trait;
use pixelgraph_core::compiler::CompiledGraph;
use pixelgraph_core::registry::{ConfigLoadError, NodeTypeRegistry};
use pixelgraph_core::types::{SceneId, TaskId};
use serde::Deserialize;

use crate::monitor::StatusSource;
use crate::task::TaskSnapshot;

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("engine API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The node configuration document failed validation.
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
}

/// Response returned when a scene is created.
#[derive(Debug, Deserialize)]
pub struct SceneResponse {
    pub id: SceneId,
}

/// HTTP client for the execution engine.
pub struct EngineApi {
    client: reqwest::Client,
    base_url: String,
}

impl EngineApi {
    /// Create a client for the engine.
    ///
    /// * `base_url` - versioned HTTP base, e.g. `http://host:8080/v1`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Create a fresh scene (session workspace) on the engine.
    pub async fn create_scene(&self) -> Result<SceneId, EngineApiError> {
        let response = self
            .client
            .post(format!("{}/scene/", self.base_url))
            .send()
            .await?;

        let scene: SceneResponse = Self::parse_response(response).await?;
        tracing::info!(scene_id = scene.id, "Scene created");
        Ok(scene.id)
    }

    /// Delete a scene and everything the engine holds for it.
    pub async fn delete_scene(&self, scene_id: SceneId) -> Result<(), EngineApiError> {
        let response = self
            .client
            .delete(format!("{}/scene/{}", self.base_url, scene_id))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Submit a compiled graph for execution.
    ///
    /// Sends `POST /scene/{id}/exec` with `{ "nodes": [...] }` and
    /// returns the initial task snapshot. Submission failures surface
    /// once to the caller; no retry is attempted here.
    pub async fn submit_graph(
        &self,
        scene_id: SceneId,
        graph: &CompiledGraph,
    ) -> Result<TaskSnapshot, EngineApiError> {
        let response = self
            .client
            .post(format!("{}/scene/{}/exec", self.base_url, scene_id))
            .json(graph)
            .send()
            .await?;

        let snapshot: TaskSnapshot = Self::parse_response(response).await?;
        tracing::info!(
            scene_id,
            task_id = ?snapshot.id,
            status = ?snapshot.status,
            nodes = graph.nodes.len(),
            "Graph submitted",
        );
        Ok(snapshot)
    }

    /// Poll the status of a submitted task.
    pub async fn task_status(
        &self,
        scene_id: SceneId,
        task_id: TaskId,
    ) -> Result<TaskSnapshot, EngineApiError> {
        let response = self
            .client
            .get(format!(
                "{}/scene/{}/task/{}/status",
                self.base_url, scene_id, task_id
            ))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`EngineApiError::Api`] with
    /// the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, EngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), EngineApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// HTTP client for the node service's configuration endpoint.
pub struct NodeServiceApi {
    client: reqwest::Client,
    base_url: String,
}

impl NodeServiceApi {
    /// Create a client for the node service.
    ///
    /// * `base_url` - HTTP base, e.g. `http://host:8000`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Fetch the raw node-type configuration document (`GET /info`).
    pub async fn fetch_config(&self) -> Result<serde_json::Value, EngineApiError> {
        let response = self
            .client
            .get(format!("{}/info", self.base_url))
            .send()
            .await?;

        let response = EngineApi::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch and validate the node-type configuration into a registry.
    ///
    /// A network or root-shape failure is terminal for the load; an
    /// individual malformed type is dropped by the registry instead.
    pub async fn load_registry(&self) -> Result<NodeTypeRegistry, EngineApiError> {
        let config = self.fetch_config().await?;
        let registry = NodeTypeRegistry::from_config(&config)?;
        tracing::info!(types = registry.len(), "Node type registry loaded");
        Ok(registry)
    }
}

/// [`StatusSource`] adapter binding an [`EngineApi`] to one scene, so
/// the monitor stays scene-agnostic.
pub struct SceneTasks {
    api: Arc<EngineApi>,
    scene_id: SceneId,
}

impl SceneTasks {
    pub fn new(api: Arc<EngineApi>, scene_id: SceneId) -> Self {
        Self { api, scene_id }
    }
}

#[async_trait]
impl StatusSource for SceneTasks {
    async fn task_status(&self, task_id: TaskId) -> Result<TaskSnapshot, EngineApiError> {
        self.api.task_status(self.scene_id, task_id).await
    }
}
