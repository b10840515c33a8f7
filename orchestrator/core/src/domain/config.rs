// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Settings for the engine connection and the execution engine:
// - Engine socket / timeout
// - Worker pool size for per-layer concurrency
// - Stop timeout and image pull behaviour
//
// Discovery order: explicit path, STEVEDORE_CONFIG_PATH, ./stevedore-config.yaml,
// ~/.stevedore/config.yaml, /etc/stevedore/config.yaml, then defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the Docker socket
    /// Default: local defaults ("/var/run/docker.sock" or "//./pipe/docker_engine")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    /// Per-request timeout against the engine API
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_secs: default_engine_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of services operated on concurrently within a layer
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Grace period before a stopping container is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Pull missing images before creating containers
    #[serde(default = "default_true")]
    pub pull_images: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            stop_timeout_secs: default_stop_timeout(),
            pull_images: true,
        }
    }
}

impl ExecutionConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl OrchestratorConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("STEVEDORE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./stevedore-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".stevedore").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/stevedore/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Stevedore\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fall back to defaults, then apply
    /// environment overrides and validate.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::debug!("No configuration file found in standard locations, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("STEVEDORE_PARALLELISM") {
            match val.parse::<usize>() {
                Ok(parallelism) => {
                    tracing::info!("Environment override: STEVEDORE_PARALLELISM={}", parallelism);
                    self.execution.parallelism = parallelism;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for STEVEDORE_PARALLELISM: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("STEVEDORE_STOP_TIMEOUT") {
            match val.parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Environment override: STEVEDORE_STOP_TIMEOUT={}", secs);
                    self.execution.stop_timeout_secs = secs;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for STEVEDORE_STOP_TIMEOUT: '{}'. Expected seconds. Ignoring.",
                    val
                ),
            }
        }

        if let Some(host) = lookup("DOCKER_HOST") {
            if let Some(path) = host.strip_prefix("unix://") {
                tracing::info!("Environment override: DOCKER_HOST={}", host);
                self.engine.socket_path = Some(path.to_string());
            } else if let Some(pipe) = host.strip_prefix("npipe://") {
                self.engine.socket_path = Some(pipe.to_string());
            } else {
                tracing::warn!("Unsupported DOCKER_HOST '{}', only local sockets are supported. Ignoring.", host);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.execution.parallelism == 0 {
            anyhow::bail!("execution.parallelism must be at least 1");
        }
        if self.engine.timeout_secs == 0 {
            anyhow::bail!("engine.timeout_secs must be at least 1");
        }
        if let Some(path) = &self.engine.socket_path {
            if path.is_empty() {
                anyhow::bail!("engine.socket_path cannot be empty");
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_engine_timeout() -> u64 {
    120
}

fn default_parallelism() -> usize {
    8
}

fn default_stop_timeout() -> u64 {
    10
}
