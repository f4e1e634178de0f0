use crate::error::{Result, WebError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uiblocks_core::CONFIG_FILE_NAME;

/// Settings of the web collaborators. Read from the same
/// `uiblocks.config.json` as [`uiblocks_core::UiConfig`]; unknown keys are
/// left to the core loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebConfig {
    /// Byte budget of the compiled template cache, in MiB.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,
    /// Where minified bundles are written.
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,
    /// Public URL under which `bundle_dir` is served.
    #[serde(default = "default_bundle_url")]
    pub bundle_url: String,
}

fn default_max_memory_mb() -> usize {
    64
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from("ui/_bundles")
}

fn default_bundle_url() -> String {
    "/ui/_bundles/".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            bundle_dir: default_bundle_dir(),
            bundle_url: default_bundle_url(),
        }
    }
}

impl WebConfig {
    pub fn load_dir(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut cfg = if path.is_file() {
            let content = fs::read_to_string(&path).map_err(|e| WebError::io(&path, e))?;
            serde_json::from_str::<WebConfig>(&content)
                .map_err(|e| WebError::Config(format!("failed to parse {}: {e}", path.display())))?
        } else {
            WebConfig::default()
        };

        if !cfg.bundle_dir.is_absolute() {
            cfg.bundle_dir = root.join(&cfg.bundle_dir);
        }
        if !cfg.bundle_url.ends_with('/') {
            cfg.bundle_url.push('/');
        }
        Ok(cfg)
    }

    pub fn max_cache_bytes(&self) -> usize {
        self.max_memory_mb.max(1) * 1024 * 1024
    }
}
