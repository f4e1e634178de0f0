use crate::error::{Result, UiError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "uiblocks.config.json";

/// Process-wide defaults every block falls back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    /// Filesystem directory holding one sub-directory per block type.
    #[serde(default = "default_ui_root")]
    pub ui_root: PathBuf,
    /// Public URL under which `ui_root` is served.
    #[serde(default = "default_ui_url")]
    pub ui_url: String,
    #[serde(default = "default_true")]
    pub ajax: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub minify: bool,
    #[serde(default = "default_true")]
    pub merge: bool,
    #[serde(default = "default_true")]
    pub use_foot_scripts: bool,
    #[serde(default = "default_true")]
    pub manage_assets: bool,
    #[serde(default = "default_true")]
    pub check_path: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub ajax_request_url: Option<String>,
    #[serde(default = "default_view_extension")]
    pub view_extension: String,
}

fn default_ui_root() -> PathBuf {
    PathBuf::from("ui")
}

fn default_ui_url() -> String {
    "/ui/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_view_extension() -> String {
    "html".to_string()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            ui_root: default_ui_root(),
            ui_url: default_ui_url(),
            ajax: true,
            debug: false,
            minify: true,
            merge: true,
            use_foot_scripts: true,
            manage_assets: true,
            check_path: true,
            version: None,
            ajax_request_url: None,
            view_extension: default_view_extension(),
        }
    }
}

impl UiConfig {
    pub fn with_root(ui_root: impl Into<PathBuf>) -> Self {
        Self {
            ui_root: ui_root.into(),
            ..Self::default()
        }
    }

    /// Reads `uiblocks.config.json` from `root` when present, defaults otherwise.
    /// A relative `uiRoot` is resolved against `root`.
    pub fn load_dir(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut cfg = if path.is_file() {
            let content = fs::read_to_string(&path)
                .map_err(|e| UiError::Config(format!("failed to read {}: {e}", path.display())))?;
            serde_json::from_str::<UiConfig>(&content)
                .map_err(|e| UiError::Config(format!("failed to parse {}: {e}", path.display())))?
        } else {
            UiConfig::default()
        };

        if !cfg.ui_root.is_absolute() {
            cfg.ui_root = root.join(&cfg.ui_root);
        }
        Ok(cfg)
    }

    /// Filesystem directory of a block type.
    pub fn type_dir(&self, dir: &str) -> PathBuf {
        self.ui_root.join(dir.trim_matches('/'))
    }

    /// Public URL of a block type's directory, always ending in `/`.
    pub fn type_url(&self, dir: &str) -> String {
        let base = self.ui_url.trim_end_matches('/');
        let dir = dir.trim_matches('/');
        if dir.is_empty() {
            format!("{base}/")
        } else {
            format!("{base}/{dir}/")
        }
    }
}

/// Per-instance configuration. Unset values fall back to the block type's
/// defaults, then to [`UiConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlockOptions {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub wrapper: Option<bool>,
    #[serde(default)]
    pub wrapper_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: Option<String>,
    #[serde(default)]
    pub minify: Option<bool>,
    #[serde(default)]
    pub merge: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub manage_assets: Option<bool>,
    #[serde(default)]
    pub view: Option<PathBuf>,
}

impl BlockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a loose key/value map; unknown keys are rejected.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| UiError::Config(format!("invalid block options: {e}")))
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn wrapper(mut self, enabled: bool) -> Self {
        self.wrapper = Some(enabled);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.wrapper_attributes.insert(key.into(), value.into());
        self
    }

    pub fn classes(mut self, classes: impl Into<String>) -> Self {
        self.classes = Some(classes.into());
        self
    }

    pub fn minify(mut self, enabled: bool) -> Self {
        self.minify = Some(enabled);
        self
    }

    pub fn merge(mut self, enabled: bool) -> Self {
        self.merge = Some(enabled);
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = Some(enabled);
        self
    }

    pub fn manage_assets(mut self, enabled: bool) -> Self {
        self.manage_assets = Some(enabled);
        self
    }

    pub fn view(mut self, view: impl Into<PathBuf>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Fills every unset value from `fallback`. Wrapper attributes are merged,
    /// with keys already present here winning.
    pub fn or(mut self, fallback: BlockOptions) -> Self {
        self.id = self.id.or(fallback.id);
        self.version = self.version.or(fallback.version);
        self.wrapper = self.wrapper.or(fallback.wrapper);
        self.classes = self.classes.or(fallback.classes);
        self.minify = self.minify.or(fallback.minify);
        self.merge = self.merge.or(fallback.merge);
        self.debug = self.debug.or(fallback.debug);
        self.manage_assets = self.manage_assets.or(fallback.manage_assets);
        self.view = self.view.or(fallback.view);
        for (key, value) in fallback.wrapper_attributes {
            self.wrapper_attributes.entry(key).or_insert(value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_enable_ajax_assets_and_path_checking() {
        let cfg = UiConfig::default();
        assert!(cfg.ajax);
        assert!(!cfg.debug);
        assert!(cfg.minify && cfg.merge);
        assert!(cfg.use_foot_scripts);
        assert!(cfg.check_path);
        assert_eq!(cfg.view_extension, "html");
    }

    #[test]
    fn type_url_always_ends_with_slash() {
        let mut cfg = UiConfig::default();
        assert_eq!(cfg.type_url("Cart"), "/ui/Cart/");
        cfg.ui_url = "https://cdn.example.com/templates".to_string();
        assert_eq!(cfg.type_url("/shop/Cart/"), "https://cdn.example.com/templates/shop/Cart/");
        assert_eq!(cfg.type_url(""), "https://cdn.example.com/templates/");
    }

    #[test]
    fn load_dir_resolves_relative_root_and_keeps_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"uiRoot": "blocks", "debug": true, "version": "7", "maxMemoryMb": 32}"#,
        )
        .expect("write config");

        let cfg = UiConfig::load_dir(dir.path()).expect("config loads");
        assert_eq!(cfg.ui_root, dir.path().join("blocks"));
        assert!(cfg.debug);
        assert_eq!(cfg.version.as_deref(), Some("7"));
        assert!(cfg.minify, "unset fields keep their defaults");
    }

    #[test]
    fn load_dir_without_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = UiConfig::load_dir(dir.path()).expect("config loads");
        assert_eq!(cfg.ui_root, dir.path().join("ui"));
        assert_eq!(cfg.ui_url, "/ui/");
    }

    #[test]
    fn block_options_reject_unknown_keys() {
        let map = json!({"id": "cart", "colour": "red"});
        let Value::Object(map) = map else {
            unreachable!()
        };
        let err = BlockOptions::from_map(map).expect_err("unknown key must fail");
        assert!(matches!(err, UiError::Config(msg) if msg.contains("colour")));
    }

    #[test]
    fn block_options_from_map_reads_camel_case() {
        let Value::Object(map) = json!({
            "id": "cart",
            "wrapper": false,
            "wrapperAttributes": {"data-role": "basket"},
            "classes": "wide"
        }) else {
            unreachable!()
        };
        let options = BlockOptions::from_map(map).expect("valid options");
        assert_eq!(options.id.as_deref(), Some("cart"));
        assert_eq!(options.wrapper, Some(false));
        assert_eq!(options.wrapper_attributes["data-role"], "basket");
        assert_eq!(options.classes.as_deref(), Some("wide"));
    }

    #[test]
    fn caller_options_win_over_type_defaults() {
        let caller = BlockOptions::new().id("foo").attribute("data-a", "caller");
        let defaults = BlockOptions::new()
            .id("bar")
            .wrapper(false)
            .attribute("data-a", "default")
            .attribute("data-b", "default");
        let merged = caller.or(defaults);
        assert_eq!(merged.id.as_deref(), Some("foo"));
        assert_eq!(merged.wrapper, Some(false));
        assert_eq!(merged.wrapper_attributes["data-a"], "caller");
        assert_eq!(merged.wrapper_attributes["data-b"], "default");
    }
}
