use crate::config::WebConfig;
use crate::error::{Result, WebError};
use crate::minify;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uiblocks_core::{AssetPipeline, AssetType, UiConfig, is_external};

/// Bundle lists remembered per (urls, type, merge, source stamps).
const MEMO_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct BundleMemo {
    entries: HashMap<u64, Vec<String>>,
    order: VecDeque<u64>,
}

impl BundleMemo {
    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.order.iter().position(|existing| *existing == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key);
    }

    fn get(&mut self, key: u64) -> Option<Vec<String>> {
        let hit = self.entries.get(&key).cloned();
        if hit.is_some() {
            self.touch(key);
        }
        hit
    }

    fn put(&mut self, key: u64, output: Vec<String>) {
        self.entries.insert(key, output);
        self.touch(key);
        self.gc();
    }

    fn remove(&mut self, key: u64) {
        self.entries.remove(&key);
        if let Some(pos) = self.order.iter().position(|existing| *existing == key) {
            self.order.remove(pos);
        }
    }

    fn gc(&mut self) {
        while self.entries.len() > MEMO_CAPACITY {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

/// Minifies local assets into content-addressed files under the bundle dir.
///
/// Only URLs below the UI base URL can be resolved to files; anything else
/// is passed through untouched. Results are memoized until a source file's
/// mtime or size changes, so repeated renders do not re-read or re-minify.
#[derive(Debug)]
pub struct BundlePipeline {
    ui_root: PathBuf,
    ui_url: String,
    bundle_dir: PathBuf,
    bundle_url: String,
    memo: Mutex<BundleMemo>,
}

impl BundlePipeline {
    pub fn new(ui: &UiConfig, web: &WebConfig) -> Self {
        Self {
            ui_root: ui.ui_root.clone(),
            ui_url: with_trailing_slash(&ui.ui_url),
            bundle_dir: web.bundle_dir.clone(),
            bundle_url: with_trailing_slash(&web.bundle_url),
            memo: Mutex::new(BundleMemo::default()),
        }
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn memo_len(&self) -> usize {
        self.memo().map(|m| m.entries.len()).unwrap_or_default()
    }

    fn memo(&self) -> Result<MutexGuard<'_, BundleMemo>> {
        self.memo.lock().map_err(|_| WebError::CachePoisoned)
    }

    /// Identifies one minify call by its inputs and the current state of
    /// every source file behind them.
    fn memo_key(&self, assets: &[String], asset_type: AssetType, merge: bool) -> u64 {
        let mut hasher = DefaultHasher::new();
        asset_type.extension().hash(&mut hasher);
        merge.hash(&mut hasher);
        for url in assets {
            url.hash(&mut hasher);
            let stamp = self
                .resolve(url)
                .and_then(|file| fs::metadata(file).ok())
                .map(|meta| (meta.modified().ok(), meta.len()));
            stamp.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Memoized output is only good while its bundle files are still there.
    fn bundles_exist(&self, output: &[String]) -> bool {
        output.iter().all(|url| match url.strip_prefix(&self.bundle_url) {
            Some(name) => self.bundle_dir.join(name).is_file(),
            None => true,
        })
    }

    /// Maps an asset URL to its file under the UI root.
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        if is_external(url) {
            return None;
        }
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let rel = Path::new(path.strip_prefix(&self.ui_url)?);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.ui_root.join(rel))
    }

    fn read_minified(&self, url: &str, asset_type: AssetType) -> Option<String> {
        let file = self.resolve(url)?;
        let source = match fs::read_to_string(&file) {
            Ok(source) => source,
            Err(e) => {
                warn!(url, file = %file.display(), error = %e, "asset unreadable, kept as is");
                return None;
            }
        };
        match minify::minify(&source, asset_type) {
            Ok(min) => Some(min),
            Err(e) => {
                warn!(url, error = %e, "asset not minified, kept as is");
                None
            }
        }
    }

    fn write_bundle(&self, content: &str, asset_type: AssetType) -> Result<String> {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        let name = format!("{:016x}.{}", hasher.finish(), asset_type.extension());
        let target = self.bundle_dir.join(&name);

        if !target.is_file() {
            fs::create_dir_all(&self.bundle_dir).map_err(|e| WebError::io(&self.bundle_dir, e))?;
            // Readers only ever see complete bundles: write aside, then rename.
            let mut tmp = tempfile::Builder::new()
                .prefix(".bundle-")
                .tempfile_in(&self.bundle_dir)
                .map_err(|e| WebError::io(&self.bundle_dir, e))?;
            let tmp_path = tmp.path().to_path_buf();
            tmp.write_all(content.as_bytes())
                .map_err(|e| WebError::io(&tmp_path, e))?;
            tmp.persist(&target)
                .map_err(|e| WebError::io(&target, e.error))?;
            debug!(bundle = %target.display(), bytes = content.len(), "bundle written");
        }
        Ok(format!("{}{name}", self.bundle_url))
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn separator(asset_type: AssetType) -> &'static str {
    match asset_type {
        AssetType::Js => ";\n",
        AssetType::Css => "\n",
    }
}

impl AssetPipeline for BundlePipeline {
    fn minify(
        &self,
        assets: &[String],
        asset_type: AssetType,
        merge: bool,
    ) -> std::result::Result<Vec<String>, String> {
        let key = self.memo_key(assets, asset_type, merge);
        let cached = self.memo().map_err(|e| e.to_string())?.get(key);
        if let Some(output) = cached {
            if self.bundles_exist(&output) {
                return Ok(output);
            }
            self.memo().map_err(|e| e.to_string())?.remove(key);
        }

        let output = self.build(assets, asset_type, merge)?;
        self.memo()
            .map_err(|e| e.to_string())?
            .put(key, output.clone());
        Ok(output)
    }
}

impl BundlePipeline {
    fn build(
        &self,
        assets: &[String],
        asset_type: AssetType,
        merge: bool,
    ) -> std::result::Result<Vec<String>, String> {
        let mut out = Vec::with_capacity(assets.len());
        let mut merged: Vec<String> = Vec::new();

        for url in assets {
            let Some(min) = self.read_minified(url, asset_type) else {
                out.push(url.clone());
                continue;
            };
            if merge {
                merged.push(min);
            } else {
                out.push(self.write_bundle(&min, asset_type).map_err(|e| e.to_string())?);
            }
        }

        if !merged.is_empty() {
            let content = merged.join(separator(asset_type));
            out.push(self.write_bundle(&content, asset_type).map_err(|e| e.to_string())?);
        }
        Ok(out)
    }
}
