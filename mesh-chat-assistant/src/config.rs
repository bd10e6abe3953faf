use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AssistantError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub max_workers: usize,
    pub implementation: String,
    pub model_path: Option<PathBuf>,
    pub lora_path: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            implementation: "mock".to_string(),
            model_path: None,
            lora_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub blob_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            blob_dir: env::temp_dir().join("mesh-chat-assistant"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub assistant: AssistantConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Loads the config file at `path`, then applies `MESH_ASSISTANT_*`
    /// environment overrides on top of it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&text)
            .map_err(|e| AssistantError::PersistenceFailure(format!("invalid config: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("MESH_ASSISTANT_MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.assistant.max_workers = n;
            }
        }
        if let Ok(v) = env::var("MESH_ASSISTANT_IMPLEMENTATION") {
            self.assistant.implementation = v;
        }
        if let Ok(v) = env::var("MESH_ASSISTANT_MODEL_PATH") {
            self.assistant.model_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("MESH_ASSISTANT_LORA_PATH") {
            self.assistant.lora_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("MESH_SERVER_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Ok(v) = env::var("MESH_SERVER_BLOB_DIR") {
            self.server.blob_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("MESH_LOG_LEVEL") {
            self.log.level = v;
        }
    }
}
