//! Block lifecycle: construction, path gating, dispatch and view rendering.
//!
//! A [`Component`] is the user-facing part of a block type (its fields and
//! hooks); a [`Block`] wraps one instance of it for exactly one render.

use crate::assets::{AssetLists, AssetPolicy, AssetSlot, discover};
use crate::config::{BlockOptions, UiConfig};
use crate::context::UiContext;
use crate::error::{Interrupt, Result, Step, UiError};
use crate::handlers::{BlockType, HandlerTable};
use crate::path::UiPath;
use crate::request::{PATH_PARAM, RequestKind, UiRequest};
use crate::response::UiResponse;
use crate::view::ViewData;
use crate::wrapper::{self, WrapperParts};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::debug;

/// Built-in ajax function: re-renders the target and answers `{"view": ..}`.
pub const RELOAD: &str = "reload";

/// Component fields never copied into the view context.
const EXCLUDED_FIELDS: [&str; 3] = ["processed", "ajax", "view"];

/// What `run` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// Extra view variables, merged over the component's own fields.
    View(ViewData),
    /// Finished body markup; the view file is not rendered.
    Markup(String),
}

impl Default for RunOutput {
    fn default() -> Self {
        Self::View(ViewData::new())
    }
}

impl RunOutput {
    /// `View` from a JSON object; `null` gives an empty view.
    pub fn data(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::View(map)),
            Value::Null => Ok(Self::default()),
            other => Err(UiError::View(format!(
                "run data must be an object, got {other}"
            ))),
        }
    }
}

/// A block type. Serialized fields become view variables.
pub trait Component: Serialize + Sized + 'static {
    /// Type name; default identity, view file stem and asset file stem.
    const NAME: &'static str;
    /// Directory under the UI root holding the view and assets.
    const DIR: &'static str = Self::NAME;

    /// Options applied under whatever the caller passes.
    fn defaults() -> BlockOptions {
        BlockOptions::default()
    }

    /// Ancestor types whose assets are inherited, root-first.
    fn lineage() -> Vec<BlockType> {
        Vec::new()
    }

    fn handlers(_table: &mut HandlerTable<Self>) {}

    /// Configuration hook, called once at construction before assets are
    /// discovered.
    fn setup(&mut self, _setup: &mut Setup<'_>) {}

    /// Controller logic. Child blocks are rendered from here through the
    /// context; `?` carries a dispatch answer up past this block.
    fn run(&mut self, _cx: &mut UiContext<'_>) -> Step<RunOutput> {
        Ok(RunOutput::default())
    }

    fn end(&mut self, _cx: &mut UiContext<'_>) {}
}

/// What the `setup` hook may touch.
pub struct Setup<'s> {
    pub options: &'s mut BlockOptions,
    pub assets: &'s mut AssetLists,
    config: &'s UiConfig,
    request: &'s UiRequest,
    type_url: &'s str,
}

impl Setup<'_> {
    pub fn config(&self) -> &UiConfig {
        self.config
    }

    pub fn request(&self) -> &UiRequest {
        self.request
    }

    /// Public URL of a file in this block type's directory.
    pub fn asset_url(&self, file: &str) -> String {
        format!("{}{}", self.type_url, file.trim_start_matches('/'))
    }

    /// Adds a script to the configured default slot.
    pub fn add_script(&mut self, url: impl Into<String>) {
        let slot = if self.config.use_foot_scripts {
            AssetSlot::FootScripts
        } else {
            AssetSlot::HeadScripts
        };
        self.assets.push(slot, url);
    }

    pub fn add_head_script(&mut self, url: impl Into<String>) {
        self.assets.push(AssetSlot::HeadScripts, url);
    }

    pub fn add_foot_script(&mut self, url: impl Into<String>) {
        self.assets.push(AssetSlot::FootScripts, url);
    }

    pub fn add_style(&mut self, url: impl Into<String>) {
        self.assets.push(AssetSlot::Styles, url);
    }
}

enum Call<'k> {
    Ajax(&'k str),
    Action(&'k str),
}

/// One instance of a block type, good for a single render.
pub struct Block<C: Component> {
    component: C,
    options: BlockOptions,
    identity: String,
    explicit_id: bool,
    debug: bool,
    view: PathBuf,
    explicit_view: bool,
    assets: AssetLists,
    path: UiPath,
    processed: bool,
}

impl<C: Component> Block<C> {
    pub fn new(cx: &mut UiContext<'_>, component: C) -> Result<Self> {
        Self::with_options(cx, component, BlockOptions::default())
    }

    /// Constructs the block: merges options over the type defaults, runs
    /// `setup`, resolves the view and contributes assets for the type.
    pub fn with_options(
        cx: &mut UiContext<'_>,
        mut component: C,
        options: BlockOptions,
    ) -> Result<Self> {
        cx.app().registry().ensure::<C>()?;
        let config = cx.config();

        let mut options = options.or(C::defaults());
        let mut assets = AssetLists::default();
        let type_url = config.type_url(C::DIR);
        component.setup(&mut Setup {
            options: &mut options,
            assets: &mut assets,
            config,
            request: cx.request(),
            type_url: &type_url,
        });

        let explicit = options.id.clone().filter(|id| !id.trim().is_empty());
        let explicit_id = explicit.is_some();
        let identity = explicit.unwrap_or_else(|| C::NAME.to_string());
        if identity.contains('.') {
            return Err(UiError::Config(format!(
                "block id '{identity}' of type {} must not contain '.'",
                C::NAME
            )));
        }
        let debug = options.debug.unwrap_or(config.debug);

        let type_dir = config.type_dir(C::DIR);
        let (view, explicit_view) = match &options.view {
            Some(view) => (type_dir.join(view), true),
            None => (
                type_dir.join(format!("{}.{}", C::NAME, config.view_extension)),
                false,
            ),
        };

        let mut block = Self {
            component,
            options,
            identity,
            explicit_id,
            debug,
            view,
            explicit_view,
            assets,
            path: UiPath::default(),
            processed: false,
        };
        if !cx.classify(debug).is_call() {
            block.manage_assets(cx);
        }
        Ok(block)
    }

    fn manage_assets(&mut self, cx: &mut UiContext<'_>) {
        if cx.assets().has_type(C::NAME) {
            return;
        }
        let app = cx.app();
        let config = app.config();

        if self.options.manage_assets.unwrap_or(config.manage_assets) {
            let js_slot = if config.use_foot_scripts {
                AssetSlot::FootScripts
            } else {
                AssetSlot::HeadScripts
            };
            let mut chain: Vec<(&str, &str)> = app
                .registry()
                .lineage::<C>()
                .iter()
                .map(|t| (t.name, t.dir))
                .collect();
            chain.push((C::NAME, C::DIR));

            let found = discover(&config.ui_root, |dir| config.type_url(dir), &chain, js_slot);
            for slot in AssetSlot::ALL {
                for url in found.slot(slot) {
                    if !self.assets.contains(url) && !cx.assets().is_seen(url) {
                        self.assets.push(slot, url.clone());
                    }
                }
            }
        }

        let policy = AssetPolicy {
            minify: self.options.minify.unwrap_or(config.minify),
            merge: self.options.merge.unwrap_or(config.merge),
            version: self.options.version.clone().or_else(|| config.version.clone()),
        };
        cx.assets_mut()
            .contribute(C::NAME, &self.assets, &policy, app.pipeline());
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Path computed by the last render; empty before.
    pub fn path(&self) -> &UiPath {
        &self.path
    }

    pub fn options(&self) -> &BlockOptions {
        &self.options
    }

    pub fn assets(&self) -> &AssetLists {
        &self.assets
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut C {
        &mut self.component
    }

    pub fn into_inner(self) -> C {
        self.component
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Processes the block: skip, dispatch or render. Callable once.
    pub fn render(&mut self, cx: &mut UiContext<'_>) -> Step<String> {
        if self.processed {
            return Err(UiError::AlreadyProcessed(self.identity.clone()).into());
        }
        self.processed = true;

        let entry_depth = cx.path().depth();
        self.path = cx.path_mut().enter(&self.identity);
        let result = self.process(cx);
        cx.path_mut().restore(entry_depth);
        result
    }

    fn process(&mut self, cx: &mut UiContext<'_>) -> Step<String> {
        let kind = cx.classify(self.debug);
        let (requested, call) = match &kind {
            RequestKind::Render => return self.render_view(cx),
            RequestKind::Ajax { path, function } => (path, Call::Ajax(function)),
            RequestKind::Action { path, function } => (path, Call::Action(function)),
        };

        let depth = self.path.depth();
        let on_path = requested.segment(depth) == Some(self.identity.as_str());

        if cx.path_checking() && !on_path {
            debug!(block = C::NAME, path = %self.path, requested = %requested, "off requested path, skipped");
            return Ok(String::new());
        }

        if requested.depth() == depth {
            if !on_path {
                return Err(UiError::InvalidPath {
                    identity: self.identity.clone(),
                    depth,
                    requested: requested.to_string(),
                }
                .into());
            }
            cx.stop_path_checking();
            let response = self.dispatch(cx, call)?;
            return Err(Interrupt::Respond(response));
        }

        self.render_view(cx)
    }

    fn dispatch(&mut self, cx: &mut UiContext<'_>, call: Call<'_>) -> Step<UiResponse> {
        let input = cx.request().input();
        let table = cx.app().registry().handlers::<C>()?;

        match call {
            Call::Ajax(function) => {
                debug!(block = C::NAME, path = %self.path, function, "ajax dispatch");
                let value = if let Some(handler) = table.get_ajax(function) {
                    handler(&mut self.component, cx, &input)?
                } else if function == RELOAD {
                    json!({ "view": self.render_view(cx)? })
                } else {
                    return Err(self.unknown_handler(format!("ajax_{function}")));
                };
                cx.merge_ajax(value);
                cx.discard_output();
                Ok(UiResponse::Json(cx.take_ajax()))
            }
            Call::Action(function) => {
                debug!(block = C::NAME, path = %self.path, function, "action dispatch");
                let Some(handler) = table.get_action(function) else {
                    return Err(self.unknown_handler(format!("action_{function}")));
                };
                let reply = handler(&mut self.component, cx, &input)?;
                cx.discard_output();
                Ok(UiResponse::Redirect(reply.location(&cx.request().path)))
            }
        }
    }

    fn unknown_handler(&self, method: String) -> Interrupt {
        UiError::UnknownHandler {
            block: C::NAME.to_string(),
            method,
        }
        .into()
    }

    fn render_view(&mut self, cx: &mut UiContext<'_>) -> Step<String> {
        let body = match self.component.run(cx)? {
            RunOutput::Markup(markup) => markup,
            RunOutput::View(data) => {
                let renderer = cx.app().renderer();
                if self.explicit_view || renderer.has_view(&self.view) {
                    let context = self.view_context(cx.config(), data)?;
                    renderer.render(&self.view, &context).map_err(|e| {
                        UiError::View(format!("{}: {e}", self.view.display()))
                    })?
                } else {
                    debug!(block = C::NAME, view = %self.view.display(), "no view file, empty body");
                    String::new()
                }
            }
        };

        let html = if self.options.wrapper == Some(false) {
            body
        } else {
            let url = self.data_url(cx);
            let header = wrapper::header(&WrapperParts {
                name: C::NAME,
                id: self.explicit_id.then_some(self.identity.as_str()),
                path: self.path.to_string(),
                classes: self.options.classes.as_deref(),
                attributes: Some(&self.options.wrapper_attributes),
                url: url.as_deref(),
            });
            format!("{header}{body}{}", wrapper::footer())
        };

        self.component.end(cx);
        Ok(html)
    }

    /// `data-ui-url` goes on the block sitting at the requested depth; a
    /// request without `ui` counts as requesting depth 1.
    fn data_url(&self, cx: &UiContext<'_>) -> Option<String> {
        let base = cx.config().ajax_request_url.as_ref()?;
        let requested_depth = cx
            .request()
            .param(PATH_PARAM)
            .map_or(1, |raw| UiPath::parse(raw).depth());
        (requested_depth == self.path.depth()).then(|| base.clone())
    }

    fn view_context(&self, config: &UiConfig, data: ViewData) -> Result<ViewData> {
        let mut context = ViewData::new();
        context.insert("ui_name".into(), json!(C::NAME));
        context.insert("id".into(), json!(self.identity));
        context.insert(
            "version".into(),
            json!(self.options.version.as_ref().or(config.version.as_ref())),
        );
        context.insert("ui_path".into(), json!(self.path));
        context.insert("ui_path_string".into(), json!(self.path.to_string()));
        context.insert("depth".into(), json!(self.path.depth()));
        context.insert("url".into(), json!(config.type_url(C::DIR)));
        context.insert(
            "path".into(),
            json!(config.type_dir(C::DIR).display().to_string()),
        );
        context.insert("classes".into(), json!(self.options.classes));
        context.insert(
            "wrapper_attributes".into(),
            json!(self.options.wrapper_attributes),
        );
        context.insert("debug".into(), json!(self.debug));
        context.insert("head_scripts".into(), json!(self.assets.head_scripts));
        context.insert("foot_scripts".into(), json!(self.assets.foot_scripts));
        context.insert("styles".into(), json!(self.assets.styles));

        let fields = serde_json::to_value(&self.component).map_err(|e| {
            UiError::View(format!("failed to serialize {} fields: {e}", C::NAME))
        })?;
        match fields {
            Value::Object(fields) => context.extend(
                fields
                    .into_iter()
                    .filter(|(key, _)| !EXCLUDED_FIELDS.contains(&key.as_str())),
            ),
            Value::Null => {}
            other => {
                return Err(UiError::View(format!(
                    "{} must serialize to a map of fields, got {other}",
                    C::NAME
                )));
            }
        }

        context.extend(data);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::UiApp;
    use crate::view::ViewRenderer;
    use std::path::Path;
    use std::sync::Arc;

    /// Renders `view-name|key=value;...` so tests can inspect the context.
    struct EchoRenderer;

    impl ViewRenderer for EchoRenderer {
        fn has_view(&self, _view: &Path) -> bool {
            true
        }

        fn render(&self, view: &Path, context: &ViewData) -> std::result::Result<String, String> {
            let stem = view
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut keys: Vec<String> = context
                .iter()
                .filter(|(k, _)| ["id", "message", "ui_path_string", "depth", "view"].contains(&k.as_str()))
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            keys.sort();
            Ok(format!("{stem}|{}", keys.join(";")))
        }
    }

    #[derive(Serialize)]
    struct Note {
        message: String,
        view: String,
    }

    impl Component for Note {
        const NAME: &'static str = "Note";

        fn setup(&mut self, setup: &mut Setup<'_>) {
            let url = setup.asset_url("note-extra.js");
            setup.add_head_script(url);
        }
    }

    #[derive(Serialize)]
    struct Raw;

    impl Component for Raw {
        const NAME: &'static str = "Raw";

        fn defaults() -> BlockOptions {
            BlockOptions::new().wrapper(false)
        }

        fn run(&mut self, _cx: &mut UiContext<'_>) -> Step<RunOutput> {
            Ok(RunOutput::Markup("<b>raw</b>".into()))
        }
    }

    fn app() -> UiApp {
        UiApp::builder(UiConfig::default())
            .register::<Note>()
            .register::<Raw>()
            .renderer(Arc::new(EchoRenderer))
            .build()
            .expect("app builds")
    }

    fn note() -> Note {
        Note {
            message: "hi".into(),
            view: "hidden".into(),
        }
    }

    #[test]
    fn view_context_carries_props_and_fields_but_not_excluded_ones() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        let html = cx
            .render_with(note(), BlockOptions::new().id("greeting"))
            .expect("renders");
        assert!(html.starts_with(r#"<div id="ui_greeting" class="ui ui_Note ui_greeting""#));
        assert!(html.contains(r#"Note.html|depth=1;id="greeting";message="hi";ui_path_string="greeting""#));
        assert!(!html.contains("hidden"));
        assert!(html.ends_with("</div>"));
    }

    #[test]
    fn run_data_wins_over_fields() {
        #[derive(Serialize)]
        struct Loud {
            message: String,
        }
        impl Component for Loud {
            const NAME: &'static str = "Loud";
            fn run(&mut self, _cx: &mut UiContext<'_>) -> Step<RunOutput> {
                Ok(RunOutput::data(json!({"message": "HI"}))?)
            }
        }

        let app = UiApp::builder(UiConfig::default())
            .register::<Loud>()
            .renderer(Arc::new(EchoRenderer))
            .build()
            .expect("app builds");
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        let html = cx
            .render(Loud {
                message: "hi".into(),
            })
            .expect("renders");
        assert!(html.contains(r#"message="HI""#));
    }

    #[test]
    fn markup_output_bypasses_view_and_wrapper_can_be_disabled() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        assert_eq!(cx.render(Raw).expect("renders"), "<b>raw</b>");
    }

    #[test]
    fn second_render_is_a_protocol_error() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        let mut block = Block::new(&mut cx, Raw).expect("block builds");
        block.render(&mut cx).expect("first render");
        assert!(block.is_processed());
        let err = block.render(&mut cx).expect_err("second render fails");
        assert!(matches!(
            err,
            Interrupt::Fail(UiError::AlreadyProcessed(id)) if id == "Raw"
        ));
        assert!(cx.path().is_empty());
    }

    #[test]
    fn unregistered_type_is_rejected() {
        #[derive(Serialize)]
        struct Stranger;
        impl Component for Stranger {
            const NAME: &'static str = "Stranger";
        }

        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        assert!(matches!(
            Block::new(&mut cx, Stranger),
            Err(UiError::UnregisteredBlock(name)) if name == "Stranger"
        ));
    }

    #[test]
    fn dotted_ids_are_rejected() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        assert!(matches!(
            Block::with_options(&mut cx, Raw, BlockOptions::new().id("a.b")),
            Err(UiError::Config(_))
        ));
    }

    #[test]
    fn setup_assets_are_contributed_once_per_type() {
        let app = app();
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        let first = Block::new(&mut cx, note()).expect("block builds");
        assert_eq!(first.assets().head_scripts, ["/ui/Note/note-extra.js"]);
        assert!(cx.assets().has_type("Note"));

        let _second = Block::new(&mut cx, note()).expect("block builds");
        assert_eq!(cx.assets().pending().head_scripts, ["/ui/Note/note-extra.js"]);
    }

    #[test]
    fn assets_are_skipped_for_calls() {
        let app = app();
        let request = UiRequest::get("/")
            .with_query("ui", "Note")
            .with_query("ajax", "reload");
        let mut cx = app.context(&request);
        let _block = Block::new(&mut cx, note()).expect("block builds");
        assert!(!cx.assets().has_type("Note"));
        assert!(cx.assets().pending().is_empty());
    }

    #[test]
    fn data_url_marks_block_at_requested_depth() {
        let app = UiApp::builder(UiConfig {
            ajax_request_url: Some("/ajax".into()),
            ..UiConfig::default()
        })
        .register::<Raw>()
        .build()
        .expect("app builds");
        let request = UiRequest::get("/").with_query("ui", "Raw");
        let mut cx = app.context(&request);
        let html = cx
            .render_with(Raw, BlockOptions::new().wrapper(true))
            .expect("renders");
        assert!(html.contains(r#"data-ui-url="/ajax""#));
    }

    #[derive(Serialize)]
    struct Shelf;

    impl Component for Shelf {
        const NAME: &'static str = "Shelf";

        fn run(&mut self, cx: &mut UiContext<'_>) -> Step<RunOutput> {
            let first = cx.render_with(Raw, BlockOptions::new().wrapper(true))?;
            let second = cx.render_with(Raw, BlockOptions::new().wrapper(true))?;
            Ok(RunOutput::Markup(format!("{first}{second}")))
        }
    }

    fn shelf_app(ajax_request_url: Option<&str>) -> UiApp {
        UiApp::builder(UiConfig {
            ajax_request_url: ajax_request_url.map(str::to_string),
            ..UiConfig::default()
        })
        .register::<Shelf>()
        .register::<Raw>()
        .build()
        .expect("app builds")
    }

    #[test]
    fn plain_render_marks_depth_one_with_data_url() {
        let app = shelf_app(Some("/ajax"));
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        let html = cx.render(Shelf).expect("renders");
        assert_eq!(html.matches("data-ui-url").count(), 1);
        assert!(html.starts_with(
            r#"<div class="ui ui_Shelf" data-ui-name="Shelf" data-ui-id="" data-ui-path="Shelf" data-ui-url="/ajax">"#
        ));
    }

    #[test]
    fn blocks_without_id_share_no_dom_id() {
        let app = shelf_app(None);
        let request = UiRequest::get("/");
        let mut cx = app.context(&request);
        let html = cx.render(Shelf).expect("renders");
        assert_eq!(html.matches(r#"data-ui-path="Shelf.Raw""#).count(), 2);
        assert!(!html.contains("id=\"ui_"));
        assert!(!html.contains("ui_Raw ui_Raw"));
        assert!(html.contains(r#"<div class="ui ui_Raw" data-ui-name="Raw" data-ui-id="" data-ui-path="Shelf.Raw"><b>raw</b></div>"#));
    }
}
