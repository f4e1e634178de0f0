use crate::view::escape_html;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    Js,
    Css,
}

impl AssetType {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Css => "css",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetSlot {
    HeadScripts,
    FootScripts,
    Styles,
}

impl AssetSlot {
    pub const ALL: [AssetSlot; 3] = [Self::HeadScripts, Self::FootScripts, Self::Styles];

    pub fn asset_type(self) -> AssetType {
        match self {
            Self::HeadScripts | Self::FootScripts => AssetType::Js,
            Self::Styles => AssetType::Css,
        }
    }
}

/// Asset URLs a block wants on the page, one ordered list per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLists {
    pub head_scripts: Vec<String>,
    pub foot_scripts: Vec<String>,
    pub styles: Vec<String>,
}

impl AssetLists {
    pub fn slot(&self, slot: AssetSlot) -> &Vec<String> {
        match slot {
            AssetSlot::HeadScripts => &self.head_scripts,
            AssetSlot::FootScripts => &self.foot_scripts,
            AssetSlot::Styles => &self.styles,
        }
    }

    pub fn slot_mut(&mut self, slot: AssetSlot) -> &mut Vec<String> {
        match slot {
            AssetSlot::HeadScripts => &mut self.head_scripts,
            AssetSlot::FootScripts => &mut self.foot_scripts,
            AssetSlot::Styles => &mut self.styles,
        }
    }

    /// Appends `url` to `slot` unless it is already listed there.
    pub fn push(&mut self, slot: AssetSlot, url: impl Into<String>) {
        let url = url.into();
        let list = self.slot_mut(slot);
        if !list.contains(&url) {
            list.push(url);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        AssetSlot::ALL
            .iter()
            .any(|slot| self.slot(*slot).iter().any(|u| u == url))
    }

    pub fn is_empty(&self) -> bool {
        self.head_scripts.is_empty() && self.foot_scripts.is_empty() && self.styles.is_empty()
    }
}

/// Treatment applied to one block's assets when they are contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPolicy {
    pub minify: bool,
    pub merge: bool,
    pub version: Option<String>,
}

/// Transforms local asset URLs into minified (and optionally merged) bundles.
///
/// Takes and returns URLs. Implementations must only be handed local assets.
pub trait AssetPipeline: Send + Sync {
    fn minify(
        &self,
        assets: &[String],
        asset_type: AssetType,
        merge: bool,
    ) -> std::result::Result<Vec<String>, String>;
}

pub fn is_external(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

/// Appends the cache-busting token `v=<version>`.
pub fn with_version(url: &str, version: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}v={version}")
}

/// Finds `<Name>.js` / `<Name>.css` next to each type in `lineage`, which
/// lists block types root-first as `(name, dir)` pairs.
pub fn discover(
    ui_root: &Path,
    type_url: impl Fn(&str) -> String,
    lineage: &[(&str, &str)],
    js_slot: AssetSlot,
) -> AssetLists {
    let mut lists = AssetLists::default();
    for (name, dir) in lineage {
        let base = ui_root.join(dir.trim_matches('/'));
        for asset_type in [AssetType::Js, AssetType::Css] {
            let file = format!("{name}.{}", asset_type.extension());
            if !base.join(&file).is_file() {
                continue;
            }
            let url = format!("{}{file}", type_url(dir));
            let slot = match asset_type {
                AssetType::Js => js_slot,
                AssetType::Css => AssetSlot::Styles,
            };
            lists.push(slot, url);
        }
    }
    lists
}

/// Per-request asset state shared by every block in the tree.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    seen: HashSet<String>,
    types: HashSet<String>,
    pending: AssetLists,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Whether a block of this type already contributed its assets.
    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    pub fn pending(&self) -> &AssetLists {
        &self.pending
    }

    /// Records a block type's assets. URLs already seen anywhere in this
    /// request are dropped; first-seen order is kept.
    pub fn contribute(
        &mut self,
        name: &str,
        lists: &AssetLists,
        policy: &AssetPolicy,
        pipeline: Option<&dyn AssetPipeline>,
    ) {
        self.types.insert(name.to_string());

        for slot in AssetSlot::ALL {
            let fresh: Vec<String> = lists
                .slot(slot)
                .iter()
                .filter(|url| self.seen.insert((*url).clone()))
                .cloned()
                .collect();
            if fresh.is_empty() {
                continue;
            }

            let out = match pipeline {
                Some(pipeline) if policy.minify => {
                    let (external, local): (Vec<String>, Vec<String>) =
                        fresh.into_iter().partition(|u| is_external(u));
                    let mut out = external;
                    if !local.is_empty() {
                        match pipeline.minify(&local, slot.asset_type(), policy.merge) {
                            Ok(bundled) => out.extend(bundled),
                            Err(e) => {
                                warn!(block = name, error = %e, "asset minify failed, serving originals");
                                out.extend(version_all(&local, policy.version.as_deref()));
                            }
                        }
                    }
                    out
                }
                _ => version_all(&fresh, policy.version.as_deref()),
            };

            debug!(block = name, slot = ?slot, count = out.len(), "assets contributed");
            let pending = self.pending.slot_mut(slot);
            for url in out {
                if !pending.contains(&url) {
                    pending.push(url);
                }
            }
        }
    }

    /// Tag markup for everything queued in `slot`.
    pub fn render_tags(&self, slot: AssetSlot) -> String {
        self.pending
            .slot(slot)
            .iter()
            .map(|url| match slot.asset_type() {
                AssetType::Js => format!("<script src=\"{}\"></script>", escape_html(url)),
                AssetType::Css => {
                    format!("<link rel=\"stylesheet\" href=\"{}\">", escape_html(url))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn version_all(urls: &[String], version: Option<&str>) -> Vec<String> {
    urls.iter()
        .map(|url| match version {
            Some(v) if !is_external(url) => with_version(url, v),
            _ => url.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bundler;

    impl AssetPipeline for Bundler {
        fn minify(
            &self,
            assets: &[String],
            asset_type: AssetType,
            merge: bool,
        ) -> std::result::Result<Vec<String>, String> {
            if merge {
                Ok(vec![format!("/bundle/all.{}", asset_type.extension())])
            } else {
                Ok(assets.iter().map(|a| format!("{a}.min")).collect())
            }
        }
    }

    struct Broken;

    impl AssetPipeline for Broken {
        fn minify(&self, _: &[String], _: AssetType, _: bool) -> std::result::Result<Vec<String>, String> {
            Err("disk full".into())
        }
    }

    fn lists(head: &[&str], foot: &[&str], styles: &[&str]) -> AssetLists {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        AssetLists {
            head_scripts: own(head),
            foot_scripts: own(foot),
            styles: own(styles),
        }
    }

    #[test]
    fn versioning_respects_existing_query() {
        assert_eq!(with_version("/a.js", "3"), "/a.js?v=3");
        assert_eq!(with_version("/a.js?x=1", "3"), "/a.js?x=1&v=3");
    }

    #[test]
    fn external_detection() {
        assert!(is_external("https://cdn.example.com/x.js"));
        assert!(is_external("//cdn.example.com/x.js"));
        assert!(!is_external("/ui/Cart/Cart.js"));
    }

    #[test]
    fn duplicates_across_blocks_are_dropped() {
        let mut registry = AssetRegistry::new();
        let policy = AssetPolicy::default();
        registry.contribute("A", &lists(&[], &["/x.js", "/a.js"], &[]), &policy, None);
        registry.contribute("B", &lists(&[], &["/x.js", "/b.js"], &[]), &policy, None);
        assert_eq!(registry.pending().foot_scripts, ["/x.js", "/a.js", "/b.js"]);
        assert!(registry.has_type("A") && registry.has_type("B"));
        assert!(registry.is_seen("/b.js"));
    }

    #[test]
    fn version_applies_only_to_local_urls_without_minify() {
        let mut registry = AssetRegistry::new();
        let policy = AssetPolicy {
            minify: false,
            merge: true,
            version: Some("9".into()),
        };
        registry.contribute(
            "A",
            &lists(&[], &[], &["/a.css", "https://cdn.example.com/b.css"]),
            &policy,
            Some(&Bundler),
        );
        assert_eq!(
            registry.pending().styles,
            ["/a.css?v=9", "https://cdn.example.com/b.css"]
        );
    }

    #[test]
    fn minify_keeps_externals_first_and_merges_locals() {
        let mut registry = AssetRegistry::new();
        let policy = AssetPolicy {
            minify: true,
            merge: true,
            version: None,
        };
        registry.contribute(
            "A",
            &lists(&["/a.js", "//cdn.example.com/lib.js", "/b.js"], &[], &[]),
            &policy,
            Some(&Bundler),
        );
        assert_eq!(
            registry.pending().head_scripts,
            ["//cdn.example.com/lib.js", "/bundle/all.js"]
        );
    }

    #[test]
    fn minify_without_merge_maps_one_to_one() {
        let mut registry = AssetRegistry::new();
        let policy = AssetPolicy {
            minify: true,
            merge: false,
            version: None,
        };
        registry.contribute("A", &lists(&[], &["/a.js", "/b.js"], &[]), &policy, Some(&Bundler));
        assert_eq!(registry.pending().foot_scripts, ["/a.js.min", "/b.js.min"]);
    }

    #[test]
    fn failing_pipeline_falls_back_to_originals() {
        let mut registry = AssetRegistry::new();
        let policy = AssetPolicy {
            minify: true,
            merge: true,
            version: Some("2".into()),
        };
        registry.contribute("A", &lists(&[], &[], &["/a.css"]), &policy, Some(&Broken));
        assert_eq!(registry.pending().styles, ["/a.css?v=2"]);
    }

    #[test]
    fn discover_walks_lineage_root_first() {
        let dir = tempfile::tempdir().expect("temp dir");
        for (name, files) in [("Base", &["Base.css"][..]), ("Cart", &["Cart.js", "Cart.css"][..])] {
            let sub = dir.path().join(name);
            std::fs::create_dir_all(&sub).expect("mkdir");
            for file in files {
                std::fs::write(sub.join(file), "/* */").expect("write asset");
            }
        }

        let found = discover(
            dir.path(),
            |d| format!("/ui/{d}/"),
            &[("Base", "Base"), ("Cart", "Cart")],
            AssetSlot::FootScripts,
        );
        assert_eq!(found.styles, ["/ui/Base/Base.css", "/ui/Cart/Cart.css"]);
        assert_eq!(found.foot_scripts, ["/ui/Cart/Cart.js"]);
        assert!(found.head_scripts.is_empty());
    }

    #[test]
    fn render_tags_escapes_urls() {
        let mut registry = AssetRegistry::new();
        registry.contribute(
            "A",
            &lists(&[], &["/a.js?x=1&y=2"], &["/a.css"]),
            &AssetPolicy::default(),
            None,
        );
        assert_eq!(
            registry.render_tags(AssetSlot::FootScripts),
            "<script src=\"/a.js?x=1&amp;y=2\"></script>"
        );
        assert_eq!(
            registry.render_tags(AssetSlot::Styles),
            "<link rel=\"stylesheet\" href=\"/a.css\">"
        );
        assert!(registry.render_tags(AssetSlot::HeadScripts).is_empty());
    }
}
