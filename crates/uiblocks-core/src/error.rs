use thiserror::Error;

use crate::response::UiResponse;

/// Errors raised while building or processing a block tree.
///
/// The first five variants are protocol errors: they indicate a routing or
/// deployment bug (bad path, dead handler reference, double render) and are
/// never recovered from.
#[derive(Debug, Error)]
pub enum UiError {
    #[error("block '{0}' was already processed; a block renders at most once")]
    AlreadyProcessed(String),

    #[error("invalid ui path: block '{identity}' at depth {depth} is not on requested path '{requested}'")]
    InvalidPath {
        identity: String,
        depth: usize,
        requested: String,
    },

    #[error("requested ui path '{0}' did not reach a target block")]
    TargetNotFound(String),

    #[error("the method {method} does not exist on block '{block}'")]
    UnknownHandler { block: String, method: String },

    #[error("block type '{0}' is not registered")]
    UnregisteredBlock(String),

    #[error("block registration failed: {0}")]
    Registration(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("view error: {0}")]
    View(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("handler error: {0}")]
    Handler(String),
}

impl UiError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::AlreadyProcessed(_)
                | Self::InvalidPath { .. }
                | Self::TargetNotFound(_)
                | Self::UnknownHandler { .. }
                | Self::UnregisteredBlock(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, UiError>;

/// Unwinds block traversal early.
///
/// `Respond` is not a failure: it carries the response produced by the
/// dispatch target and travels up through every ancestor's `run` via `?`, so
/// no block rendered after the target contributes markup.
#[derive(Debug, Error)]
pub enum Interrupt {
    #[error("request answered by dispatch target")]
    Respond(UiResponse),

    #[error(transparent)]
    Fail(#[from] UiError),
}

impl Interrupt {
    pub fn into_error(self) -> Option<UiError> {
        match self {
            Self::Respond(_) => None,
            Self::Fail(err) => Some(err),
        }
    }
}

/// Result of a traversal step: a value, or an [`Interrupt`] that ends the request.
pub type Step<T> = std::result::Result<T, Interrupt>;
