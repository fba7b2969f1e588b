// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the bridge's v1 REST API.
//!
//! Implements the engine's applier interfaces (async, from the
//! orchestrator) and the synchronous actual-state reader used by action
//! bodies on the script host thread. TLS verification is disabled: the
//! bridge serves a self-signed certificate.

use crate::hue::types::{
    GroupResponse, LightResponse, SceneMap, StateBody,
};
use async_trait::async_trait;
use lume_core::{GroupActual, GroupDesired, LightActual, LightDesired};
use lume_engine::{ActualReader, GroupApplier, InvokeError, LightApplier, ReconcileError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HueError {
    #[error("bridge request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bridge returned status {0}")]
    Status(u16),
    #[error("unknown scene '{0}'")]
    UnknownScene(String),
    #[error("no tokio runtime available for blocking bridge reads")]
    NoRuntime,
}

impl From<HueError> for ReconcileError {
    fn from(err: HueError) -> Self {
        match err {
            HueError::UnknownScene(name) => ReconcileError::UnknownScene(name),
            other => ReconcileError::Bridge(other.to_string()),
        }
    }
}

impl From<HueError> for InvokeError {
    fn from(err: HueError) -> Self {
        InvokeError::Bridge(err.to_string())
    }
}

/// Connection settings for one bridge.
#[derive(Debug, Clone)]
pub struct HueConfig {
    /// Host or host:port of the bridge
    pub bridge: String,
    /// Application key ("username" in v1 terms)
    pub token: String,
    pub timeout: Duration,
}

/// Client for one Hue bridge.
pub struct HueClient {
    client: reqwest::Client,
    base: String,
    /// v2 event stream URL, derived from the bridge host
    eventstream_url: String,
    app_key: String,
    /// scene name -> scene id, per group
    scene_cache: Mutex<HashMap<(String, String), String>>,
    /// Captured at construction for blocking reads from the host thread
    runtime: Option<Handle>,
}

impl HueClient {
    pub fn new(config: &HueConfig) -> Result<Self, HueError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.timeout)
            .build()?;
        // Bare host means https (the bridge's own cert); an explicit
        // scheme is honored, which is also what the tests use.
        let origin = if config.bridge.starts_with("http://") || config.bridge.starts_with("https://")
        {
            config.bridge.clone()
        } else {
            format!("https://{}", config.bridge)
        };
        Ok(Self {
            client,
            base: format!("{}/api/{}", origin, config.token),
            eventstream_url: format!("{}/eventstream/clip/v2", origin),
            app_key: config.token.clone(),
            scene_cache: Mutex::new(HashMap::new()),
            runtime: Handle::try_current().ok(),
        })
    }

    pub fn eventstream_url(&self) -> &str {
        &self.eventstream_url
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Share of the underlying HTTP client for the SSE connector.
    pub fn http(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub async fn get_group(&self, id: &str) -> Result<GroupActual, HueError> {
        let response: GroupResponse = self.get_json(&format!("groups/{id}")).await?;
        Ok(GroupActual { any_on: response.state.any_on, all_on: response.state.all_on })
    }

    pub async fn get_light(&self, id: &str) -> Result<LightActual, HueError> {
        let response: LightResponse = self.get_json(&format!("lights/{id}")).await?;
        let state = response.state;
        Ok(LightActual {
            on: state.on,
            bri: state.bri,
            hue: state.hue,
            sat: state.sat,
            xy: state.xy,
            ct: state.ct,
        })
    }

    pub async fn set_group_state(&self, id: &str, body: &StateBody) -> Result<(), HueError> {
        self.put(&format!("groups/{id}/action"), body).await
    }

    pub async fn set_light_state(&self, id: &str, body: &StateBody) -> Result<(), HueError> {
        self.put(&format!("lights/{id}/state"), body).await
    }

    /// Activate a scene by name on a group. Scene ids are cached per
    /// (group, name) until `clear_scene_cache`.
    pub async fn activate_scene(&self, group_id: &str, name: &str) -> Result<(), HueError> {
        let scene_id = self.find_scene(group_id, name).await?;
        let body = StateBody { scene: Some(scene_id), ..Default::default() };
        self.put(&format!("groups/{group_id}/action"), &body).await
    }

    /// Resolve a scene name to its id for a group.
    pub async fn find_scene(&self, group_id: &str, name: &str) -> Result<String, HueError> {
        let cache_key = (group_id.to_string(), name.to_string());
        if let Some(id) = self.scene_cache.lock().get(&cache_key) {
            return Ok(id.clone());
        }
        let scenes: SceneMap = self.get_json("scenes").await?;
        let found = scenes.into_iter().find(|(_, scene)| {
            scene.name == name && scene.group.as_deref().map_or(true, |g| g == group_id)
        });
        match found {
            Some((id, _)) => {
                self.scene_cache.lock().insert(cache_key, id.clone());
                Ok(id)
            }
            None => Err(HueError::UnknownScene(name.to_string())),
        }
    }

    pub fn clear_scene_cache(&self) {
        self.scene_cache.lock().clear();
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, HueError> {
        let url = format!("{}/{}", self.base, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HueError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn put<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<(), HueError> {
        let url = format!("{}/{}", self.base, path);
        debug!(path, "bridge PUT");
        let response = self.client.put(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HueError::Status(status.as_u16()));
        }
        Ok(())
    }

    fn block_on<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, HueError>>,
    ) -> Result<T, HueError> {
        match &self.runtime {
            Some(handle) => handle.block_on(fut),
            None => Err(HueError::NoRuntime),
        }
    }
}

fn state_body_from_group(patch: &GroupDesired) -> StateBody {
    StateBody {
        on: patch.power,
        bri: patch.bri,
        hue: patch.hue,
        sat: patch.sat,
        xy: patch.xy,
        ct: patch.ct,
        scene: None,
    }
}

fn state_body_from_light(patch: &LightDesired) -> StateBody {
    StateBody {
        on: patch.power,
        bri: patch.bri,
        hue: patch.hue,
        sat: patch.sat,
        xy: patch.xy,
        ct: patch.ct,
        scene: None,
    }
}

#[async_trait]
impl GroupApplier for HueClient {
    async fn group_actual(&self, id: &str) -> Result<GroupActual, ReconcileError> {
        Ok(self.get_group(id).await?)
    }

    async fn turn_on_with_scene(&self, id: &str, scene: &str) -> Result<(), ReconcileError> {
        // Scene activation turns the group on as part of the recall
        Ok(self.activate_scene(id, scene).await?)
    }

    async fn apply_scene(&self, id: &str, scene: &str) -> Result<(), ReconcileError> {
        Ok(self.activate_scene(id, scene).await?)
    }

    async fn apply_state(&self, id: &str, patch: &GroupDesired) -> Result<(), ReconcileError> {
        Ok(self.set_group_state(id, &state_body_from_group(patch)).await?)
    }

    async fn turn_off(&self, id: &str) -> Result<(), ReconcileError> {
        let body = StateBody { on: Some(false), ..Default::default() };
        Ok(self.set_group_state(id, &body).await?)
    }

    fn clear_caches(&self) {
        self.clear_scene_cache();
    }
}

#[async_trait]
impl LightApplier for HueClient {
    async fn light_actual(&self, id: &str) -> Result<LightActual, ReconcileError> {
        Ok(self.get_light(id).await?)
    }

    async fn turn_on_with_state(
        &self,
        id: &str,
        patch: &LightDesired,
    ) -> Result<(), ReconcileError> {
        Ok(self.set_light_state(id, &state_body_from_light(patch)).await?)
    }

    async fn turn_off(&self, id: &str) -> Result<(), ReconcileError> {
        let body = StateBody { on: Some(false), ..Default::default() };
        Ok(self.set_light_state(id, &body).await?)
    }

    async fn apply_delta(&self, id: &str, delta: &LightDesired) -> Result<(), ReconcileError> {
        Ok(self.set_light_state(id, &state_body_from_light(delta)).await?)
    }
}

impl ActualReader for HueClient {
    fn group_actual(&self, id: &str) -> Result<GroupActual, InvokeError> {
        self.block_on(self.get_group(id)).map_err(|err| {
            warn!(id, error = %err, "blocking group read failed");
            InvokeError::from(err)
        })
    }

    fn light_actual(&self, id: &str) -> Result<LightActual, InvokeError> {
        self.block_on(self.get_light(id)).map_err(|err| {
            warn!(id, error = %err, "blocking light read failed");
            InvokeError::from(err)
        })
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
