use crate::assets::AssetPipeline;
use crate::block::Component;
use crate::config::UiConfig;
use crate::context::UiContext;
use crate::error::{Interrupt, Result, Step, UiError};
use crate::handlers::BlockRegistry;
use crate::request::{RequestClassifier, UiRequest};
use crate::response::UiResponse;
use crate::view::{NullRenderer, ViewRenderer};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Builds the root block of a tree inside a request context.
pub type RootFn = Arc<dyn Fn(&mut UiContext<'_>) -> Step<String> + Send + Sync>;

/// Process-wide, immutable application state: configuration, registered
/// block types and the external collaborators. Shared by all requests.
pub struct UiApp {
    config: UiConfig,
    classifier: RequestClassifier,
    registry: BlockRegistry,
    renderer: Arc<dyn ViewRenderer>,
    pipeline: Option<Arc<dyn AssetPipeline>>,
}

impl UiApp {
    pub fn builder(config: UiConfig) -> UiAppBuilder {
        UiAppBuilder {
            config,
            registry: BlockRegistry::new(),
            renderer: Arc::new(NullRenderer),
            pipeline: None,
            errors: Vec::new(),
        }
    }

    pub fn config(&self) -> &UiConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &dyn ViewRenderer {
        self.renderer.as_ref()
    }

    pub fn pipeline(&self) -> Option<&dyn AssetPipeline> {
        self.pipeline.as_deref()
    }

    /// Fresh request scope: empty path stack, empty asset registry.
    pub fn context<'a>(&'a self, request: &'a UiRequest) -> UiContext<'a> {
        UiContext::new(self, request)
    }

    /// Runs one request through the tree built by `root`.
    ///
    /// A plain render yields HTML. An ajax or action call yields whatever the
    /// dispatch target answered; if the tree finishes without reaching one
    /// the call is reported as [`UiError::TargetNotFound`].
    pub fn respond<F>(&self, request: &UiRequest, root: F) -> Result<UiResponse>
    where
        F: FnOnce(&mut UiContext<'_>) -> Step<String>,
    {
        let mut cx = self.context(request);
        let kind = self.classifier.classify(request, self.config.debug);

        match root(&mut cx) {
            Ok(markup) => {
                if let Some(target) = kind.target() {
                    error!(requested = %target, "call did not reach a target block");
                    return Err(UiError::TargetNotFound(target.to_string()));
                }
                let mut html = cx.take_output();
                html.push_str(&markup);
                Ok(UiResponse::Html(html))
            }
            Err(Interrupt::Respond(response)) => {
                debug!(status = response.status(), "request answered by target block");
                Ok(response)
            }
            Err(Interrupt::Fail(err)) => {
                if err.is_protocol() {
                    error!(error = %err, path = %request.path, "ui protocol error");
                } else {
                    warn!(error = %err, path = %request.path, "ui request failed");
                }
                Err(err)
            }
        }
    }
}

pub struct UiAppBuilder {
    config: UiConfig,
    registry: BlockRegistry,
    renderer: Arc<dyn ViewRenderer>,
    pipeline: Option<Arc<dyn AssetPipeline>>,
    errors: Vec<UiError>,
}

impl UiAppBuilder {
    pub fn register<C: Component>(mut self) -> Self {
        if let Err(err) = self.registry.register::<C>() {
            self.errors.push(err);
        }
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<dyn AssetPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn build(mut self) -> Result<UiApp> {
        if self.errors.len() == 1 {
            return Err(self.errors.remove(0));
        }
        if !self.errors.is_empty() {
            let joined = self
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(UiError::Registration(joined));
        }
        Ok(UiApp {
            classifier: RequestClassifier::new(&self.config),
            config: self.config,
            registry: self.registry,
            renderer: self.renderer,
            pipeline: self.pipeline,
        })
    }
}
