//! File-backed slot templates.
//!
//! `{{ key }}` inserts an HTML-escaped value, `{{{ key }}}` inserts it raw.
//! Keys may be dotted (`cart.total`, `items.0.name`). Missing keys render as
//! nothing. Compiled templates are cached per file, validated against the
//! file's modification time and evicted oldest-first once the byte budget is
//! exceeded.

use crate::config::WebConfig;
use crate::error::{Result, WebError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::debug;
use uiblocks_core::{ViewData, ViewRenderer, escape_html};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Escaped(Vec<String>),
    Raw(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
    bytes: usize,
}

impl CompiledTemplate {
    pub fn compile(source: &str) -> std::result::Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0usize;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let raw = rest[open..].starts_with("{{{");
            let (open_len, close) = if raw { (3, "}}}") } else { (2, "}}") };
            let body = &rest[open + open_len..];
            let Some(end) = body.find(close) else {
                return Err(format!("unterminated tag at byte {}", offset + open));
            };

            let key = body[..end].trim();
            if key.is_empty() {
                return Err(format!("empty tag at byte {}", offset + open));
            }
            let path = key.split('.').map(|s| s.trim().to_string()).collect();
            segments.push(if raw {
                Segment::Raw(path)
            } else {
                Segment::Escaped(path)
            });

            let consumed = open + open_len + end + close.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            segments,
            bytes: source.len(),
        })
    }

    pub fn render(&self, context: &ViewData) -> String {
        let mut out = String::with_capacity(self.bytes);
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Escaped(path) => {
                    if let Some(value) = lookup(context, path) {
                        out.push_str(&escape_html(&stringify(value)));
                    }
                }
                Segment::Raw(path) => {
                    if let Some(value) = lookup(context, path) {
                        out.push_str(&stringify(value));
                    }
                }
            }
        }
        out
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

fn lookup<'v>(context: &'v ViewData, path: &[String]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut current = context.get(first)?;
    for key in rest {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

struct CacheEntry {
    template: Arc<CompiledTemplate>,
    modified: Option<SystemTime>,
}

#[derive(Default)]
struct TemplateCache {
    entries: HashMap<PathBuf, CacheEntry>,
    order: VecDeque<PathBuf>,
    bytes: usize,
}

impl TemplateCache {
    fn touch(&mut self, key: &Path) {
        if let Some(pos) = self.order.iter().position(|existing| existing == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_path_buf());
    }

    fn get(&mut self, key: &Path, modified: Option<SystemTime>) -> Option<Arc<CompiledTemplate>> {
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.modified == modified)
            .map(|entry| entry.template.clone());
        if hit.is_some() {
            self.touch(key);
        }
        hit
    }

    fn put(&mut self, key: PathBuf, entry: CacheEntry, max_bytes: usize) {
        let bytes = entry.template.bytes();
        if let Some(old) = self.entries.insert(key.clone(), entry) {
            self.bytes = self.bytes.saturating_sub(old.template.bytes());
        }
        self.bytes = self.bytes.saturating_add(bytes);
        self.touch(&key);
        self.gc(max_bytes);
    }

    fn remove(&mut self, key: &Path) {
        if let Some(entry) = self.entries.remove(key) {
            self.bytes = self.bytes.saturating_sub(entry.template.bytes());
        }
        if let Some(pos) = self.order.iter().position(|existing| existing == key) {
            self.order.remove(pos);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.bytes = 0;
    }

    fn gc(&mut self, max_bytes: usize) {
        while self.bytes > max_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(old) = self.entries.remove(&oldest) {
                self.bytes = self.bytes.saturating_sub(old.template.bytes());
                debug!(view = %oldest.display(), "template evicted from cache");
            }
        }
    }
}

/// [`ViewRenderer`] over slot templates on disk. Safe to share between
/// request threads.
pub struct TemplateRenderer {
    max_bytes: usize,
    cache: Mutex<TemplateCache>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::from_config(&WebConfig::default())
    }
}

impl TemplateRenderer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            cache: Mutex::new(TemplateCache::default()),
        }
    }

    pub fn from_config(config: &WebConfig) -> Self {
        Self::new(config.max_cache_bytes())
    }

    fn cache(&self) -> Result<MutexGuard<'_, TemplateCache>> {
        self.cache.lock().map_err(|_| WebError::CachePoisoned)
    }

    /// Returns the compiled template for `view`, compiling it on a miss or
    /// when the file changed since it was cached.
    pub fn load(&self, view: &Path) -> Result<Arc<CompiledTemplate>> {
        let modified = fs::metadata(view)
            .map_err(|e| WebError::io(view, e))?
            .modified()
            .ok();
        if let Some(hit) = self.cache()?.get(view, modified) {
            return Ok(hit);
        }

        let source = fs::read_to_string(view).map_err(|e| WebError::io(view, e))?;
        let template = CompiledTemplate::compile(&source).map_err(|message| WebError::Template {
            path: view.to_path_buf(),
            message,
        })?;
        let template = Arc::new(template);
        debug!(view = %view.display(), bytes = template.bytes(), "template compiled");

        self.cache()?.put(
            view.to_path_buf(),
            CacheEntry {
                template: template.clone(),
                modified,
            },
            self.max_bytes,
        );
        Ok(template)
    }

    /// Drops the given views from the cache; an empty slice drops everything.
    pub fn invalidate(&self, views: &[PathBuf]) -> Result<()> {
        let mut cache = self.cache()?;
        if views.is_empty() {
            cache.clear();
            return Ok(());
        }
        for view in views {
            cache.remove(view);
        }
        Ok(())
    }

    pub fn cached_bytes(&self) -> usize {
        self.cache().map(|c| c.bytes).unwrap_or_default()
    }

    pub fn cached_len(&self) -> usize {
        self.cache().map(|c| c.entries.len()).unwrap_or_default()
    }
}

impl ViewRenderer for TemplateRenderer {
    fn render(&self, view: &Path, context: &ViewData) -> std::result::Result<String, String> {
        let template = self.load(view).map_err(|e| e.to_string())?;
        Ok(template.render(context))
    }
}
