use serde_json::Value;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// What a processed request turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum UiResponse {
    /// A full render of the tree.
    Html(String),
    /// Output of an ajax call; the whole response body.
    Json(Value),
    /// Outcome of an action call (post/redirect/get).
    Redirect(String),
}

impl UiResponse {
    pub fn status(&self) -> u16 {
        match self {
            Self::Html(_) | Self::Json(_) => 200,
            Self::Redirect(_) => 303,
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Html(_) => Some(HTML_CONTENT_TYPE),
            Self::Json(_) => Some(JSON_CONTENT_TYPE),
            Self::Redirect(_) => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Redirect(to) => Some(to),
            _ => None,
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Html(html) => html.clone(),
            Self::Json(value) => value.to_string(),
            Self::Redirect(_) => String::new(),
        }
    }
}
