//! Adapter configuration.
//!
//! Every field has a default so a config file only needs the values it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::constants::*;
use crate::error::{AdapterError, AdapterResult};

/// Top-level configuration for one predictor instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// `host:port` of the ComfyUI server.
    pub server_address: String,
    /// `host:port` of the websocket when it is not served next to the HTTP
    /// API, e.g. behind a split reverse proxy. Falls back to `server_address`.
    pub websocket_address: Option<String>,
    /// Directory the engine reads inputs from.
    pub input_dir: PathBuf,
    /// Directory the engine writes final outputs to.
    pub output_dir: PathBuf,
    /// ComfyUI checkout; temp, custom nodes and models live below it.
    pub comfyui_root: PathBuf,
    /// Directory holding the bundled API-format workflow templates.
    pub workflows_dir: PathBuf,
    pub weights_base_url: String,
    pub torch_checkpoints_dir: PathBuf,
    /// Spawn the engine process instead of assuming it is already running.
    pub launch_engine: bool,
    pub python: String,
    pub startup_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            websocket_address: None,
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            comfyui_root: PathBuf::from(DEFAULT_COMFYUI_ROOT),
            workflows_dir: PathBuf::from(DEFAULT_WORKFLOWS_DIR),
            weights_base_url: WEIGHTS_BASE_URL.to_string(),
            torch_checkpoints_dir: default_torch_checkpoints_dir(),
            launch_engine: false,
            python: DEFAULT_PYTHON.to_string(),
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl AdapterConfig {
    /// Load from a JSON file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> AdapterResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path).map_err(|err| AdapterError::io(path, err))?;
        serde_json::from_str(&json).map_err(|err| AdapterError::Config {
            message: format!("{}: {}", path.display(), err),
        })
    }

    pub fn temp_output_dir(&self) -> PathBuf {
        self.comfyui_root.join(COMFYUI_TEMP_SUBDIR)
    }

    pub fn custom_nodes_dir(&self) -> PathBuf {
        self.comfyui_root.join(COMFYUI_CUSTOM_NODES_SUBDIR)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.comfyui_root.join(COMFYUI_MODELS_SUBDIR)
    }

    pub fn server_url(&self) -> String {
        format!("http://{}", self.server_address.trim_end_matches('/'))
    }

    pub fn websocket_url(&self, client_id: &str) -> String {
        let address = self
            .websocket_address
            .as_deref()
            .unwrap_or(&self.server_address);
        format!(
            "ws://{}/ws?clientId={}",
            address.trim_end_matches('/'),
            urlencoding::encode(client_id)
        )
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_torch_checkpoints_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(TORCH_CHECKPOINTS_SUBDIR)
}
