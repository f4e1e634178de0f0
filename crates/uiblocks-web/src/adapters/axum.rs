use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use std::sync::Arc;
use tracing::error;
use uiblocks_core::request::parse_urlencoded;
use uiblocks_core::{RootFn, UiApp, UiError, UiRequest, UiResponse};

/// Serves a block tree over axum: every request runs the root block once.
///
/// Processing is synchronous, so each request runs on the blocking pool with
/// its own `UiContext`.
#[derive(Clone)]
pub struct AxumUiAdapter {
    app: Arc<UiApp>,
    root: RootFn,
}

impl AxumUiAdapter {
    pub fn new(app: Arc<UiApp>, root: RootFn) -> Self {
        Self { app, root }
    }

    pub fn app(&self) -> &Arc<UiApp> {
        &self.app
    }

    /// Router answering every path through the tree; merge it below static
    /// routes.
    pub fn router(self) -> Router {
        Router::new().fallback(handle).with_state(self)
    }

    pub async fn respond(&self, request: UiRequest) -> Response {
        let app = self.app.clone();
        let root = self.root.clone();
        let path = request.path.clone();

        let outcome =
            tokio::task::spawn_blocking(move || app.respond(&request, |cx| root(cx))).await;
        match outcome {
            Ok(Ok(response)) => ui_response_to_axum(response),
            Ok(Err(err)) => error_response(&path, &err),
            Err(join) => {
                error!(path = %path, error = %join, "ui request task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "ui request task failed").into_response()
            }
        }
    }
}

async fn handle(
    State(adapter): State<AxumUiAdapter>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = request_from_parts(&method, &uri, &headers, &body);
    adapter.respond(request).await
}

/// Builds the block-tree view of an HTTP request. Form bodies are read when
/// the content type is urlencoded (or missing).
pub fn request_from_parts(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> UiRequest {
    let mut request = UiRequest {
        method: uiblocks_core::Method::parse(method.as_str()),
        path: uri.path().to_string(),
        query: parse_urlencoded(uri.query().unwrap_or_default()),
        form: Default::default(),
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/x-www-form-urlencoded");
    if !body.is_empty() && content_type.starts_with("application/x-www-form-urlencoded") {
        if let Ok(raw) = std::str::from_utf8(body) {
            request.form = parse_urlencoded(raw);
        }
    }
    request
}

pub fn ui_response_to_axum(response: UiResponse) -> Response {
    match response {
        UiResponse::Html(html) => Html(html).into_response(),
        UiResponse::Json(value) => Json(value).into_response(),
        UiResponse::Redirect(to) => Redirect::to(&to).into_response(),
    }
}

fn error_response(path: &str, err: &UiError) -> Response {
    error!(path, error = %err, protocol = err.is_protocol(), "ui request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}
