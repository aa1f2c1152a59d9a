//! Engine configuration loaded from TOML.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::QuestError;
use crate::quest::policy::{QuestPolicy, DEFAULT_STARTER_MAIN_QUESTS};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    pub data: DataConfig,
    pub storage: StorageConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub worker_count: usize,
    /// Envelopes queued or in flight over all players
    pub backlog_capacity: usize,
    /// Envelopes one mailbox may drain before yielding its worker
    pub drain_batch: usize,
    pub precheck_delay_ms: u64,
}

impl DispatchConfig {
    pub fn precheck_delay(&self) -> Duration {
        Duration::from_millis(self.precheck_delay_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            backlog_capacity: 1000,
            drain_batch: 32,
            precheck_delay_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
}

impl DataConfig {
    pub fn quests_dir(&self) -> PathBuf {
        self.data_dir.join("quests")
    }

    pub fn activities_file(&self) -> PathBuf {
        self.data_dir.join("activities.toml")
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// A sqlx SQLite url, or "memory" for a process-local store
    pub database_url: String,
}

impl StorageConfig {
    pub fn is_memory(&self) -> bool {
        self.database_url == "memory"
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_url: "sqlite:quests.db?mode=rwc".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub starter_main_quests: Vec<u32>,
    /// Keys are main quest ids; TOML table keys are always strings
    pub companions: HashMap<String, Vec<u32>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let policy = QuestPolicy::default();
        Self {
            starter_main_quests: DEFAULT_STARTER_MAIN_QUESTS.to_vec(),
            companions: policy
                .companions
                .into_iter()
                .map(|(id, list)| (id.to_string(), list))
                .collect(),
        }
    }
}

impl PolicyConfig {
    pub fn to_policy(&self) -> Result<QuestPolicy, QuestError> {
        let mut companions = HashMap::new();
        for (key, list) in &self.companions {
            let id = key
                .parse::<u32>()
                .map_err(|_| QuestError::Config(format!("companion key '{}' is not a main quest id", key)))?;
            companions.insert(id, list.clone());
        }
        Ok(QuestPolicy::new(self.starter_main_quests.clone(), companions))
    }
}

impl EngineConfig {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, QuestError> {
        if !path.exists() {
            warn!("Config file not found: {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| QuestError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, QuestError> {
        let config: Self =
            toml::from_str(content).map_err(|e| QuestError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), QuestError> {
        let dispatch = &self.dispatch;
        if dispatch.worker_count == 0 {
            return Err(QuestError::Config("dispatch.worker_count must be at least 1".into()));
        }
        if dispatch.backlog_capacity == 0 {
            return Err(QuestError::Config("dispatch.backlog_capacity must be at least 1".into()));
        }
        if dispatch.drain_batch == 0 {
            return Err(QuestError::Config("dispatch.drain_batch must be at least 1".into()));
        }
        self.policy.to_policy()?;
        Ok(())
    }
}
