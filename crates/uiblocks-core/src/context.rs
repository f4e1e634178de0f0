use crate::app::UiApp;
use crate::assets::AssetRegistry;
use crate::block::{Block, Component};
use crate::config::{BlockOptions, UiConfig};
use crate::error::Step;
use crate::path::PathTracker;
use crate::request::{RequestKind, UiRequest};
use serde_json::{Map, Value};

/// Request-scoped state threaded through every block of one tree.
///
/// Holds the traversal stack, the asset registry and the ajax output
/// accumulator. One context per request; never shared between requests.
pub struct UiContext<'a> {
    app: &'a UiApp,
    request: &'a UiRequest,
    path: PathTracker,
    assets: AssetRegistry,
    check_path: bool,
    ajax: Value,
    output: String,
}

impl<'a> UiContext<'a> {
    pub fn new(app: &'a UiApp, request: &'a UiRequest) -> Self {
        Self {
            app,
            request,
            path: PathTracker::new(),
            assets: AssetRegistry::new(),
            check_path: app.config().check_path,
            ajax: Value::Object(Map::new()),
            output: String::new(),
        }
    }

    pub fn app(&self) -> &'a UiApp {
        self.app
    }

    pub fn request(&self) -> &'a UiRequest {
        self.request
    }

    pub fn config(&self) -> &'a UiConfig {
        self.app.config()
    }

    pub fn path(&self) -> &PathTracker {
        &self.path
    }

    pub fn path_mut(&mut self) -> &mut PathTracker {
        &mut self.path
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetRegistry {
        &mut self.assets
    }

    /// Classifies the current request; `debug` allows ajax even when
    /// global ajax mode is off.
    pub fn classify(&self, debug: bool) -> RequestKind {
        self.app.classifier().classify(self.request, debug)
    }

    /// Builds and renders a child block with its type defaults.
    pub fn render<C: Component>(&mut self, component: C) -> Step<String> {
        self.render_with(component, BlockOptions::default())
    }

    pub fn render_with<C: Component>(&mut self, component: C, options: BlockOptions) -> Step<String> {
        let mut block = Block::with_options(self, component, options)?;
        block.render(self)
    }

    pub fn path_checking(&self) -> bool {
        self.check_path
    }

    /// Everything below a located dispatch target is treated as relevant.
    pub fn stop_path_checking(&mut self) {
        self.check_path = false;
    }

    /// Buffers stray markup; it prefixes the final HTML and is dropped
    /// before any ajax or redirect response.
    pub fn echo(&mut self, markup: &str) {
        self.output.push_str(markup);
    }

    pub fn discard_output(&mut self) {
        self.output.clear();
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn ajax_insert(&mut self, key: impl Into<String>, value: Value) {
        match &mut self.ajax {
            Value::Object(map) => {
                map.insert(key.into(), value);
            }
            other => {
                let mut map = Map::new();
                map.insert(key.into(), value);
                *other = Value::Object(map);
            }
        }
    }

    /// Objects extend the ajax output (later keys win), `null` is ignored,
    /// anything else replaces it.
    pub fn merge_ajax(&mut self, value: Value) {
        match (value, &mut self.ajax) {
            (Value::Null, _) => {}
            (Value::Object(incoming), Value::Object(current)) => current.extend(incoming),
            (value, current) => *current = value,
        }
    }

    pub fn ajax_output(&self) -> &Value {
        &self.ajax
    }

    pub fn take_ajax(&mut self) -> Value {
        std::mem::replace(&mut self.ajax, Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> UiApp {
        UiApp::builder(UiConfig::default())
            .build()
            .expect("empty app builds")
    }

    #[test]
    fn merge_ajax_extends_ignores_null_and_replaces_scalars() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);

        cx.ajax_insert("a", json!(1));
        cx.merge_ajax(json!({"b": 2, "a": 3}));
        cx.merge_ajax(Value::Null);
        assert_eq!(cx.ajax_output(), &json!({"a": 3, "b": 2}));

        cx.merge_ajax(json!("replaced"));
        assert_eq!(cx.take_ajax(), json!("replaced"));
        assert_eq!(cx.ajax_output(), &json!({}));
    }

    #[test]
    fn insert_after_replacement_starts_a_new_map() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        cx.merge_ajax(json!([1, 2]));
        cx.ajax_insert("k", json!(true));
        assert_eq!(cx.take_ajax(), json!({"k": true}));
    }

    #[test]
    fn echo_buffer_can_be_discarded() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        cx.echo("<!-- a -->");
        cx.echo("<p>b</p>");
        assert_eq!(cx.take_output(), "<!-- a --><p>b</p>");
        cx.echo("stray");
        cx.discard_output();
        assert!(cx.take_output().is_empty());
    }

    #[test]
    fn path_checking_starts_from_config() {
        let app = UiApp::builder(UiConfig {
            check_path: false,
            ..UiConfig::default()
        })
        .build()
        .expect("app builds");
        let request = UiRequest::get("/");
        let cx = app.context(&request);
        assert!(!cx.path_checking());
    }
}
