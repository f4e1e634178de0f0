use serde::Serialize;
use std::fmt;

/// Chain of block identities from the root to a block, e.g. `layout.store.cart`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UiPath(Vec<String>);

impl UiPath {
    /// Splits on `.` and keeps every segment as sent, empty ones included,
    /// so `a..b` has three segments and addresses no block.
    pub fn parse(raw: &str) -> Self {
        Self(raw.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identity at a 1-based depth.
    pub fn segment(&self, depth: usize) -> Option<&str> {
        depth
            .checked_sub(1)
            .and_then(|idx| self.0.get(idx))
            .map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for UiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Stack of blocks currently open in one request.
///
/// While the tree is walked synchronously the stack equals the path from the
/// root to the block that is executing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTracker {
    stack: Vec<String>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &[String] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Pushes `identity` and returns the resulting path.
    pub fn enter(&mut self, identity: &str) -> UiPath {
        self.stack.push(identity.to_string());
        UiPath(self.stack.clone())
    }

    /// Pops back to `depth`, whatever happened in between.
    pub fn restore(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }
}
