use crate::view::escape_html;
use std::collections::BTreeMap;

/// Everything the wrapper element of one block is made of.
#[derive(Debug, Clone, Default)]
pub struct WrapperParts<'a> {
    pub name: &'a str,
    /// Explicit instance id. Without one the wrapper gets no DOM id and no
    /// id class, so untitled siblings never collide.
    pub id: Option<&'a str>,
    pub path: String,
    pub classes: Option<&'a str>,
    pub attributes: Option<&'a BTreeMap<String, String>>,
    /// Emitted as `data-ui-url` when set.
    pub url: Option<&'a str>,
}

pub fn header(parts: &WrapperParts<'_>) -> String {
    let name = escape_html(parts.name);
    let id = parts.id.map(escape_html);

    let mut class = format!("ui ui_{name}");
    if let Some(id) = &id {
        class.push_str(&format!(" ui_{id}"));
    }
    if let Some(extra) = parts.classes.map(str::trim).filter(|c| !c.is_empty()) {
        class.push(' ');
        class.push_str(&escape_html(extra));
    }

    let mut out = String::from("<div");
    if let Some(id) = &id {
        out.push_str(&format!(" id=\"ui_{id}\""));
    }
    out.push_str(&format!(
        " class=\"{class}\" data-ui-name=\"{name}\" data-ui-id=\"{}\" data-ui-path=\"{}\"",
        id.as_deref().unwrap_or_default(),
        escape_html(&parts.path)
    ));
    if let Some(url) = parts.url {
        out.push_str(&format!(" data-ui-url=\"{}\"", escape_html(url)));
    }
    for (key, value) in parts.attributes.into_iter().flatten() {
        out.push_str(&format!(" {}=\"{}\"", escape_html(key), escape_html(value)));
    }
    out.push('>');
    out
}

pub fn footer() -> &'static str {
    "</div>"
}
