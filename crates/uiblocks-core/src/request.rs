use crate::config::UiConfig;
use crate::path::UiPath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Requested block path, e.g. `ui=layout.cart`.
pub const PATH_PARAM: &str = "ui";
/// Ajax function short name, e.g. `ajax=reload`.
pub const AJAX_PARAM: &str = "ajax";
/// Action function short name, e.g. `action=checkout`.
pub const ACTION_PARAM: &str = "action";

const ROUTING_PARAMS: [&str; 3] = [PATH_PARAM, AJAX_PARAM, ACTION_PARAM];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Other,
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Self::Get,
            "POST" => Self::Post,
            _ => Self::Other,
        }
    }
}

/// The slice of an HTTP request the block tree cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiRequest {
    #[serde(default)]
    pub method: Method,
    /// Current URL path without query string; action redirects return here.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub form: HashMap<String, String>,
}

impl UiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Builds a request from a method and a `path?query` target.
    pub fn from_target(method: Method, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query: parse_urlencoded(query),
            form: HashMap::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }

    /// Looks a parameter up in the query string first, then the posted form.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .or_else(|| self.form.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn form_param(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Handler input: posted fields for POST, query otherwise, routing keys stripped.
    pub fn input(&self) -> Input {
        let source = if self.method == Method::Post {
            &self.form
        } else {
            &self.query
        };
        Input(
            source
                .iter()
                .filter(|(k, _)| !ROUTING_PARAMS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

pub fn parse_urlencoded(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

/// Fields handed to an ajax or action handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Input(HashMap<String, String>);

impl Input {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Input {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Render,
    Ajax { path: UiPath, function: String },
    Action { path: UiPath, function: String },
}

impl RequestKind {
    pub fn is_call(&self) -> bool {
        !matches!(self, Self::Render)
    }

    /// Requested block path of an ajax or action call.
    pub fn target(&self) -> Option<&UiPath> {
        match self {
            Self::Render => None,
            Self::Ajax { path, .. } | Self::Action { path, .. } => Some(path),
        }
    }

    /// Handler name with its `ajax_` / `action_` prefix.
    pub fn handler_name(&self) -> Option<String> {
        match self {
            Self::Render => None,
            Self::Ajax { function, .. } => Some(format!("ajax_{function}")),
            Self::Action { function, .. } => Some(format!("action_{function}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestClassifier {
    ajax_enabled: bool,
}

impl RequestClassifier {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            ajax_enabled: config.ajax,
        }
    }

    /// Ajax calls need `ui` and `ajax`, plus global ajax mode or a debug
    /// override. Action calls are POSTs carrying `ui` and `action`.
    pub fn classify(&self, request: &UiRequest, debug: bool) -> RequestKind {
        if let (Some(function), Some(path)) =
            (request.param(AJAX_PARAM), request.param(PATH_PARAM))
        {
            if self.ajax_enabled || debug {
                return RequestKind::Ajax {
                    path: UiPath::parse(path),
                    function: function.to_string(),
                };
            }
        }

        if request.method == Method::Post {
            if let (Some(path), Some(function)) = (
                request.form_param(PATH_PARAM),
                request.form_param(ACTION_PARAM),
            ) {
                return RequestKind::Action {
                    path: UiPath::parse(path),
                    function: function.to_string(),
                };
            }
        }

        RequestKind::Render
    }
}
