// planner/src/config.rs

use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    error::{Result, StoreError},
    prune::DEFAULT_MAX_AGE_DAYS,
};

pub const DEFAULT_NAMESPACE: &str = "noxis-planner:v1:";
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub persistence: PersistenceConfig,
    pub retention: RetentionConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: Option<PathBuf>,          // defaults to the platform data dir
    pub namespace: String,
}
impl Default for StorageConfig {
    fn default() -> Self { Self { dir: None, namespace: DEFAULT_NAMESPACE.into() } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet period before a write; 0 writes synchronously.
    pub debounce_ms: u64,
}
impl Default for PersistenceConfig {
    fn default() -> Self { Self { debounce_ms: DEFAULT_DEBOUNCE_MS } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_days: u32,
}
impl Default for RetentionConfig {
    fn default() -> Self { Self { max_age_days: DEFAULT_MAX_AGE_DAYS as u32 } }
}

impl Config {
    pub fn debounce(&self) -> Duration { Duration::from_millis(self.persistence.debounce_ms) }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope { User, Workspace, Runtime }

/// One file's worth of settings. Only fields that are set override lower layers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "LayerStorage::is_empty")]
    pub storage: LayerStorage,
    #[serde(skip_serializing_if = "LayerPersistence::is_empty")]
    pub persistence: LayerPersistence,
    #[serde(skip_serializing_if = "LayerRetention::is_empty")]
    pub retention: LayerRetention,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerStorage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
impl LayerStorage { fn is_empty(&self) -> bool { self.dir.is_none() && self.namespace.is_none() } }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPersistence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}
impl LayerPersistence { fn is_empty(&self) -> bool { self.debounce_ms.is_none() } }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerRetention {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
}
impl LayerRetention { fn is_empty(&self) -> bool { self.max_age_days.is_none() } }

fn overlay<T: Clone>(dst: &mut Option<T>, src: &Option<T>) { if src.is_some() { *dst = src.clone(); } }

fn merge_layer(a: &mut ConfigLayer, b: &ConfigLayer) {
    overlay(&mut a.storage.dir, &b.storage.dir);
    overlay(&mut a.storage.namespace, &b.storage.namespace);
    overlay(&mut a.persistence.debounce_ms, &b.persistence.debounce_ms);
    overlay(&mut a.retention.max_age_days, &b.retention.max_age_days);
}

fn apply(cfg: &mut Config, layer: &ConfigLayer) {
    if let Some(dir) = &layer.storage.dir { cfg.storage.dir = Some(dir.clone()); }
    if let Some(ns) = &layer.storage.namespace { cfg.storage.namespace = ns.clone(); }
    if let Some(ms) = layer.persistence.debounce_ms { cfg.persistence.debounce_ms = ms; }
    if let Some(days) = layer.retention.max_age_days { cfg.retention.max_age_days = days; }
}

fn config_paths(workspace_root: &Path) -> Result<(PathBuf, PathBuf)> {
    let proj = ProjectDirs::from("dev", "noxis", "planner")
        .ok_or_else(|| StoreError::Config("no home directory for user config".into()))?;
    let user = proj.config_dir().join("config.toml");
    let workspace = workspace_root.join(".planner").join("config.toml");
    Ok((user, workspace))
}

/// Merged view of user, workspace and runtime settings, in that order.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<RwLock<Config>>,
    tx: broadcast::Sender<Config>,
    user_path: PathBuf,
    workspace_path: PathBuf,
    runtime_overlay: Arc<RwLock<ConfigLayer>>,
}

impl ConfigManager {
    pub fn load(workspace_root: impl AsRef<Path>) -> Result<Self> {
        let (user, workspace) = config_paths(workspace_root.as_ref())?;
        Ok(Self::from_paths(user, workspace))
    }

    /// Explicit file locations, e.g. for tests.
    pub fn from_paths(user_path: impl Into<PathBuf>, workspace_path: impl Into<PathBuf>) -> Self {
        let cm = Self {
            inner: Arc::new(RwLock::new(Config::default())),
            tx: broadcast::channel(16).0,
            user_path: user_path.into(),
            workspace_path: workspace_path.into(),
            runtime_overlay: Arc::new(RwLock::new(ConfigLayer::default())),
        };
        cm.reload_all();
        cm
    }

    fn read_file(path: &Path) -> Option<ConfigLayer> {
        let text = fs::read_to_string(path).ok()?;
        match toml::from_str(&text) {
            Ok(layer) => Some(layer),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparsable config");
                None
            }
        }
    }

    pub fn reload_all(&self) -> Config {
        let mut merged = Config::default();
        for path in [&self.user_path, &self.workspace_path] {
            if let Some(layer) = Self::read_file(path) { apply(&mut merged, &layer); }
        }
        apply(&mut merged, &self.runtime_overlay.read());
        debug!(?merged, "config reloaded");
        *self.inner.write() = merged.clone();
        let _ = self.tx.send(merged.clone());
        merged
    }

    pub fn get(&self) -> Config { self.inner.read().clone() }
    pub fn subscribe(&self) -> broadcast::Receiver<Config> { self.tx.subscribe() }

    pub fn apply_runtime_overlay(&self, patch: ConfigLayer) -> Config {
        merge_layer(&mut self.runtime_overlay.write(), &patch);
        self.reload_all()
    }

    /// Merges `patch` into the file for `scope` and reloads.
    pub fn write_patch(&self, scope: Scope, patch: &ConfigLayer) -> Result<Config> {
        let path = match scope {
            Scope::User => &self.user_path,
            Scope::Workspace => &self.workspace_path,
            Scope::Runtime => return Err(StoreError::Config("runtime scope is ephemeral; cannot persist".into())),
        };
        let key = path.display().to_string();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::storage(&key, e))?;
        }
        let mut merged = Self::read_file(path).unwrap_or_default();
        merge_layer(&mut merged, patch);
        let text = toml::to_string_pretty(&merged).map_err(|e| StoreError::Config(format!("serialize toml: {e}")))?;
        fs::write(path, text).map_err(|e| StoreError::storage(key, e))?;
        Ok(self.reload_all())
    }
}
