//! Concrete collaborators for `uiblocks-core`: a slot template renderer,
//! a JS/CSS minifier with a bundle-writing asset pipeline, and (feature
//! `axum`) an HTTP adapter.

#[cfg(feature = "axum")]
pub mod adapters;
pub mod config;
pub mod error;
pub mod minify;
pub mod pipeline;
pub mod template;

#[cfg(feature = "axum")]
pub use adapters::axum::{AxumUiAdapter, request_from_parts, ui_response_to_axum};
pub use config::WebConfig;
pub use error::{Result, WebError};
pub use minify::{minify, minify_css, minify_js};
pub use pipeline::BundlePipeline;
pub use template::{CompiledTemplate, TemplateRenderer};
