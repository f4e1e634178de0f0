use serde_json::{Map, Value};
use std::path::Path;

/// Variables a view template sees.
pub type ViewData = Map<String, Value>;

/// Turns a view file plus its context into markup.
pub trait ViewRenderer: Send + Sync {
    fn has_view(&self, view: &Path) -> bool {
        view.is_file()
    }

    fn render(&self, view: &Path, context: &ViewData) -> Result<String, String>;
}

/// Renderer for trees whose blocks produce markup in code only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl ViewRenderer for NullRenderer {
    fn has_view(&self, _view: &Path) -> bool {
        false
    }

    fn render(&self, view: &Path, _context: &ViewData) -> Result<String, String> {
        Err(format!("no view renderer configured for {}", view.display()))
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
