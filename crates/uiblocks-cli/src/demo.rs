//! Block tree served by `uiblocks serve` and `uiblocks render`.
//!
//! ```text
//! layout (Layout, no wrapper)
//! ├── home (Home)
//! │   ├── Widget
//! │   └── cart (Cart)      ajax: add    action: checkout
//! └── footer (Footer)
//! ```

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uiblocks_core::{
    ActionReply, AssetSlot, BlockOptions, Component, HandlerTable, RootFn, RunOutput, Setup, Step,
    UiAppBuilder, UiContext,
};

pub fn register(builder: UiAppBuilder) -> UiAppBuilder {
    builder
        .register::<Layout>()
        .register::<Home>()
        .register::<Widget>()
        .register::<Cart>()
        .register::<Footer>()
}

pub fn root() -> RootFn {
    Arc::new(|cx: &mut UiContext<'_>| cx.render(Layout::new("uiblocks demo")))
}

#[derive(Serialize)]
pub struct Layout {
    title: String,
}

impl Layout {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Component for Layout {
    const NAME: &'static str = "Layout";

    fn defaults() -> BlockOptions {
        BlockOptions::new().id("layout").wrapper(false)
    }

    fn run(&mut self, cx: &mut UiContext<'_>) -> Step<RunOutput> {
        let content = cx.render(Home::default())?;
        let footer = cx.render(Footer {
            note: "Rendered block by block.".to_string(),
        })?;

        // Every child has contributed its assets by now.
        let assets = cx.assets();
        Ok(RunOutput::data(json!({
            "content": content,
            "footer": footer,
            "style_tags": assets.render_tags(AssetSlot::Styles),
            "head_tags": assets.render_tags(AssetSlot::HeadScripts),
            "foot_tags": assets.render_tags(AssetSlot::FootScripts),
        }))?)
    }
}

#[derive(Serialize)]
pub struct Home {
    heading: String,
}

impl Default for Home {
    fn default() -> Self {
        Self {
            heading: "Welcome".to_string(),
        }
    }
}

impl Component for Home {
    const NAME: &'static str = "Home";

    fn defaults() -> BlockOptions {
        BlockOptions::new().id("home")
    }

    fn run(&mut self, cx: &mut UiContext<'_>) -> Step<RunOutput> {
        let widget = cx.render(Widget {
            message: "Each block ships its own view, styles and scripts.".to_string(),
        })?;
        let cart = cx.render(Cart::default())?;
        Ok(RunOutput::data(json!({ "widget": widget, "cart": cart }))?)
    }
}

#[derive(Serialize)]
pub struct Widget {
    message: String,
}

impl Component for Widget {
    const NAME: &'static str = "Widget";
}

#[derive(Serialize, Default)]
pub struct Cart {
    count: u32,
    success: bool,
}

impl Component for Cart {
    const NAME: &'static str = "Cart";

    fn defaults() -> BlockOptions {
        BlockOptions::new().id("cart").classes("cart")
    }

    fn handlers(table: &mut HandlerTable<Self>) {
        table
            .ajax("add", |cart, _cx, input| {
                let base = input.parse::<u32>("count").unwrap_or(cart.count);
                let qty = input.parse::<u32>("qty").unwrap_or(1);
                cart.count = base.saturating_add(qty);
                Ok(json!({ "count": cart.count }))
            })
            .action("checkout", |_cart, _cx, _input| {
                Ok(ActionReply::query([("success", "1")]))
            });
    }

    fn setup(&mut self, setup: &mut Setup<'_>) {
        self.success = setup.request().param("success") == Some("1");
    }
}

#[derive(Serialize)]
pub struct Footer {
    note: String,
}

impl Component for Footer {
    const NAME: &'static str = "Footer";

    fn defaults() -> BlockOptions {
        BlockOptions::new().id("footer")
    }
}
