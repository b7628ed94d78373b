use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::{DEFAULT_STATE_LIMIT, ExplorationConfig};
use crate::export::{DEFAULT_GENERATED_WITH, StateIdScheme};

pub const DEFAULT_CONFIG_FILE: &str = "pn.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PnConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exploration: ExplorationSettings,
    #[serde(default)]
    pub export: ExportSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// 为空时允许任意来源。
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// 请求未携带模型时使用的 PNML 文件。
    #[serde(default)]
    pub fallback_model: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExplorationSettings {
    /// 0 表示不限制状态数。
    #[serde(default = "default_state_limit")]
    pub state_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportSettings {
    #[serde(default)]
    pub state_ids: StateIdScheme,
    #[serde(default = "default_generated_with")]
    pub generated_with: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_origins: Vec::new(),
            fallback_model: None,
        }
    }
}

impl Default for ExplorationSettings {
    fn default() -> Self {
        Self {
            state_limit: default_state_limit(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            state_ids: StateIdScheme::default(),
            generated_with: default_generated_with(),
        }
    }
}

impl PnConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExplorationSettings {
    pub fn exploration_config(&self) -> ExplorationConfig {
        limit_to_config(self.state_limit)
    }

    /// 请求方给出的上限只能收紧配置的上限，不能放宽或关闭它。
    pub fn capped_limit(&self, requested: Option<usize>) -> usize {
        match (requested, self.state_limit) {
            (None, configured) => configured,
            (Some(requested), 0) => requested,
            (Some(requested), configured) => requested.min(configured),
        }
    }
}

/// 把配置/命令行中的上限（0 表示不限制）转换为探索配置。
pub fn limit_to_config(state_limit: usize) -> ExplorationConfig {
    ExplorationConfig::with_state_limit(state_limit)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_state_limit() -> usize {
    DEFAULT_STATE_LIMIT
}

fn default_generated_with() -> String {
    DEFAULT_GENERATED_WITH.to_string()
}
