//! UI Blocks core crate.
//!
//! A page is a tree of blocks. Each block type pairs controller logic (a
//! [`Component`]) with a view file and optional scripts/styles living in a
//! directory named after the type. Blocks are addressable by their dot path
//! (`layout.cart`) so a single block can be re-rendered over ajax or can
//! handle a POSTed action without the rest of the page executing.
//!
//! Layers:
//!
//! - `config` / `request` / `response`: process defaults, the slice of HTTP
//!   the tree reads, and what comes back out.
//! - `path` + `assets`: request-scoped traversal stack and asset registry,
//!   owned by [`UiContext`].
//! - `handlers`: per-type ajax/action tables, validated at registration.
//! - `block`: lifecycle (setup, skip/dispatch/render, end).
//! - `app`: immutable application state plus the `respond` entry point.
//!
//! Request termination is ordinary control flow: a dispatch target answers
//! with [`Interrupt::Respond`], which `?` carries up through every ancestor.

pub mod app;
pub mod assets;
pub mod block;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod path;
pub mod request;
pub mod response;
pub mod view;
pub mod wrapper;

pub use app::{RootFn, UiApp, UiAppBuilder};
pub use assets::{
    AssetLists, AssetPipeline, AssetPolicy, AssetRegistry, AssetSlot, AssetType, is_external,
    with_version,
};
pub use block::{Block, Component, RELOAD, RunOutput, Setup};
pub use config::{BlockOptions, CONFIG_FILE_NAME, UiConfig};
pub use context::UiContext;
pub use error::{Interrupt, Result, Step, UiError};
pub use handlers::{ActionHandler, ActionReply, AjaxHandler, BlockRegistry, BlockType, HandlerTable};
pub use path::{PathTracker, UiPath};
pub use request::{
    ACTION_PARAM, AJAX_PARAM, Input, Method, PATH_PARAM, RequestClassifier, RequestKind,
    UiRequest,
};
pub use response::UiResponse;
pub use view::{NullRenderer, ViewData, ViewRenderer, escape_html};
