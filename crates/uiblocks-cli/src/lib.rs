pub mod demo;

use axum::Router;
use axum::extract::{Path as AxumPath, State as AxumState};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use clap::{Args, Parser, Subcommand};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uiblocks_core::{Method, UiApp, UiConfig, UiRequest, UiResponse};
use uiblocks_web::{AxumUiAdapter, BundlePipeline, TemplateRenderer, WebConfig};

#[derive(Parser, Debug)]
#[command(name = "uiblocks", version, about = "Serve or render a uiblocks tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the block tree over HTTP
    Serve(ServeArgs),
    /// Run one request through the tree and print the response
    Render(RenderArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Site directory holding uiblocks.config.json and the UI root
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Drop cached templates whenever the UI root changes
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Site directory holding uiblocks.config.json and the UI root
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Request target, e.g. `/?ui=layout.home.cart&ajax=reload`
    #[arg(short, long, default_value = "/")]
    pub url: String,

    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Form field sent with the request, `key=value`; repeatable
    #[arg(short, long = "form", value_name = "KEY=VALUE")]
    pub form: Vec<String>,
}

/// Everything one served directory needs.
pub struct Site {
    pub app: Arc<UiApp>,
    pub renderer: Arc<TemplateRenderer>,
}

impl Site {
    pub fn load(dir: &Path) -> Result<Self, String> {
        let ui = UiConfig::load_dir(dir).map_err(|e| e.to_string())?;
        let web = WebConfig::load_dir(dir).map_err(|e| e.to_string())?;
        Self::from_configs(ui, web)
    }

    pub fn from_configs(ui: UiConfig, web: WebConfig) -> Result<Self, String> {
        let renderer = Arc::new(TemplateRenderer::from_config(&web));
        let pipeline = BundlePipeline::new(&ui, &web);
        let app = demo::register(UiApp::builder(ui))
            .renderer(renderer.clone())
            .pipeline(Arc::new(pipeline))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            app: Arc::new(app),
            renderer,
        })
    }

    pub fn config(&self) -> &UiConfig {
        self.app.config()
    }
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Render(args) => {
            let site = Site::load(&args.dir)?;
            let request = build_request(&args)?;
            let response = site
                .app
                .respond(&request, |cx| demo::root()(cx))
                .map_err(|e| e.to_string())?;
            println!("{}", format_response(&response));
            Ok(())
        }
    }
}

pub fn build_request(args: &RenderArgs) -> Result<UiRequest, String> {
    let mut request = UiRequest::from_target(Method::parse(&args.method), &args.url);
    for pair in &args.form {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("form field '{pair}' must look like key=value"))?;
        request = request.with_form(key.trim(), value);
    }
    Ok(request)
}

pub fn format_response(response: &UiResponse) -> String {
    match response {
        UiResponse::Html(html) => html.clone(),
        UiResponse::Json(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        UiResponse::Redirect(to) => format!("{} See Other\nLocation: {to}", response.status()),
    }
}

#[derive(Clone)]
struct StaticState {
    ui_root: PathBuf,
    view_extension: String,
}

async fn serve(args: ServeArgs) -> Result<(), String> {
    let dir = args
        .dir
        .canonicalize()
        .map_err(|e| format!("failed to resolve {}: {e}", args.dir.display()))?;
    let site = Site::load(&dir)?;
    let config = site.config().clone();

    if args.watch {
        let ui_root = config.ui_root.clone();
        let renderer = site.renderer.clone();
        tokio::spawn(async move {
            watch_loop(ui_root, renderer).await;
        });
    }

    let adapter = AxumUiAdapter::new(site.app.clone(), demo::root());
    let mut router = Router::new();
    if config.ui_url.starts_with('/') && !config.ui_url.starts_with("//") {
        let route = format!("{}/{{*path}}", config.ui_url.trim_end_matches('/'));
        router = router.route(
            &route,
            get(static_asset).with_state(Arc::new(StaticState {
                ui_root: config.ui_root.clone(),
                view_extension: config.view_extension.clone(),
            })),
        );
    }
    let router = router.merge(adapter.router());

    let host = format!("0.0.0.0:{}", args.port);
    info!(root = %dir.display(), ui_root = %config.ui_root.display(), watch = args.watch, "uiblocks serve");
    info!("listening on http://localhost:{}", args.port);

    let listener = tokio::net::TcpListener::bind(&host)
        .await
        .map_err(|e| format!("failed to bind {host}: {e}"))?;
    axum::serve(listener, router)
        .await
        .map_err(|e| format!("server failed: {e}"))
}

async fn static_asset(
    AxumPath(path): AxumPath<String>,
    AxumState(state): AxumState<Arc<StaticState>>,
) -> Response {
    let Some(rel) = sanitize_rel_path(&path) else {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    };
    match resolve_static_file(&state.ui_root, &rel, &state.view_extension) {
        Some(file) => serve_static(&file).await,
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

fn sanitize_rel_path(path: &str) -> Option<PathBuf> {
    let rel = PathBuf::from(path.trim_start_matches('/'));
    if rel.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return None;
    }
    Some(rel)
}

/// Only scripts, styles and media are public; view files stay private.
fn resolve_static_file(root: &Path, rel: &Path, view_extension: &str) -> Option<PathBuf> {
    if rel.as_os_str().is_empty() {
        return None;
    }
    let full = root.join(rel);
    if !full.is_file() {
        return None;
    }
    let ext = full
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if ext == view_extension || ext == "json" {
        return None;
    }
    Some(full)
}

async fn serve_static(path: &Path) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(v) => v,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "static read failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to read file").into_response();
        }
    };

    let content_type = match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
    {
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    };

    let mut response = bytes.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn watch_loop(ui_root: PathBuf, renderer: Arc<TemplateRenderer>) {
    let (_watcher, mut rx) = match start_fs_watcher(&ui_root) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "watch disabled");
            return;
        }
    };
    info!(root = %ui_root.display(), "watching UI root");

    while rx.recv().await.is_some() {
        debounce_fs_events(&mut rx).await;
        match renderer.invalidate(&[]) {
            Ok(()) => info!("change detected, template cache cleared"),
            Err(e) => warn!(error = %e, "template cache not cleared"),
        }
    }
}

async fn debounce_fs_events(rx: &mut mpsc::UnboundedReceiver<()>) {
    let window = Duration::from_millis(120);
    let sleep = tokio::time::sleep_until(Instant::now() + window);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => break,
            maybe = rx.recv() => {
                if maybe.is_none() {
                    break;
                }
                sleep.as_mut().reset(Instant::now() + window);
            }
        }
    }
}

fn start_fs_watcher(root: &Path) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>), String> {
    let (tx, rx) = mpsc::unbounded_channel::<()>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if event_is_relevant(&event) => {
            let _ = tx.send(());
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "watch error"),
    })
    .map_err(|e| format!("failed to initialize filesystem watcher: {e}"))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| format!("failed to watch {}: {e}", root.display()))?;
    Ok((watcher, rx))
}

/// Bundle output is written under the UI root; it must not trigger reloads.
fn event_is_relevant(event: &Event) -> bool {
    event.paths.iter().any(|path| {
        !path.components().any(|c| match c {
            Component::Normal(seg) => {
                let seg = seg.to_string_lossy();
                seg.starts_with('_') || seg.starts_with('.')
            }
            _ => false,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_site(bundles: &Path) -> Site {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("demo");
        let ui = UiConfig::load_dir(&dir).expect("demo ui config");
        let web = WebConfig {
            bundle_dir: bundles.to_path_buf(),
            ..WebConfig::load_dir(&dir).expect("demo web config")
        };
        Site::from_configs(ui, web).expect("demo site builds")
    }

    fn render(site: &Site, args: RenderArgs) -> UiResponse {
        let request = build_request(&args).expect("valid request");
        site.app
            .respond(&request, |cx| demo::root()(cx))
            .expect("demo responds")
    }

    fn args(url: &str) -> RenderArgs {
        RenderArgs {
            dir: PathBuf::from("."),
            url: url.to_string(),
            method: "GET".to_string(),
            form: Vec::new(),
        }
    }

    #[test]
    fn cli_parses_render_flags() {
        let cli = Cli::try_parse_from([
            "uiblocks", "render", "site", "--url", "/cart", "-m", "POST", "-f", "ui=layout.home.cart",
            "-f", "action=checkout",
        ])
        .expect("parses");
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.dir, PathBuf::from("site"));
        let request = build_request(&args).expect("request");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.form["action"], "checkout");
    }

    #[test]
    fn malformed_form_field_is_rejected() {
        let mut bad = args("/");
        bad.form.push("no-equals".into());
        assert!(build_request(&bad).is_err());
    }

    #[test]
    fn demo_page_renders_whole_tree_with_bundled_assets() {
        let bundles = tempfile::tempdir().expect("temp dir");
        let site = demo_site(bundles.path());
        let UiResponse::Html(html) = render(&site, args("/")) else {
            panic!("expected html");
        };
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains(r#"data-ui-path="layout.home.cart""#));
        assert!(html.contains(r#"data-ui-path="layout.home.Widget""#));
        assert!(html.contains(r#"data-ui-path="layout.footer""#));
        assert!(html.contains("<link rel=\"stylesheet\" href=\"/ui/_bundles/"));
        assert!(html.contains("<script src=\"/ui/_bundles/"));
        assert!(std::fs::read_dir(bundles.path()).expect("bundles").count() >= 2);
    }

    #[test]
    fn demo_cart_reload_and_add() {
        let bundles = tempfile::tempdir().expect("temp dir");
        let site = demo_site(bundles.path());

        let UiResponse::Json(reload) =
            render(&site, args("/?ui=layout.home.cart&ajax=reload"))
        else {
            panic!("expected json");
        };
        let view = reload["view"].as_str().expect("view markup");
        assert!(view.starts_with(r#"<div id="ui_cart" class="ui ui_Cart ui_cart cart""#));
        assert!(view.contains(r#"data-ui-url="/""#));
        assert!(!view.contains("<footer>"));

        let add = render(&site, args("/?ui=layout.home.cart&ajax=add&count=2&qty=3"));
        assert_eq!(add, UiResponse::Json(serde_json::json!({ "count": 5 })));
        assert_eq!(std::fs::read_dir(bundles.path()).expect("bundles").count(), 0);
    }

    #[test]
    fn demo_checkout_redirects() {
        let bundles = tempfile::tempdir().expect("temp dir");
        let site = demo_site(bundles.path());
        let mut post = args("/shop");
        post.method = "POST".into();
        post.form = vec!["ui=layout.home.cart".into(), "action=checkout".into()];

        let response = render(&site, post);
        assert_eq!(response, UiResponse::Redirect("/shop?success=1".into()));
        assert_eq!(format_response(&response), "303 See Other\nLocation: /shop?success=1");

        let UiResponse::Html(html) = render(&site, args("/shop?success=1")) else {
            panic!("expected html");
        };
        assert!(html.contains(r#"data-show="true""#));
    }

    #[test]
    fn json_output_is_pretty() {
        let out = format_response(&UiResponse::Json(serde_json::json!({"a": 1})));
        assert_eq!(out, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn static_files_exclude_views_and_escapes() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("demo/ui");
        assert!(sanitize_rel_path("../secret").is_none());
        let css = sanitize_rel_path("Cart/Cart.css").expect("clean path");
        assert!(resolve_static_file(&dir, &css, "html").is_some());
        let view = sanitize_rel_path("Cart/Cart.html").expect("clean path");
        assert!(resolve_static_file(&dir, &view, "html").is_none());
    }

    #[test]
    fn bundle_writes_do_not_count_as_changes() {
        let event = Event::new(notify::EventKind::Any)
            .add_path(PathBuf::from("/site/ui/_bundles/abc.css"));
        assert!(!event_is_relevant(&event));
        let event = Event::new(notify::EventKind::Any)
            .add_path(PathBuf::from("/site/ui/Cart/Cart.html"));
        assert!(event_is_relevant(&event));
    }
}
