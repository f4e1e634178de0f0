use crate::block::Component;
use crate::context::UiContext;
use crate::error::{Result, Step, UiError};
use crate::request::Input;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Ajax handler: its JSON result is merged into the ajax output.
pub type AjaxHandler<C> =
    Arc<dyn Fn(&mut C, &mut UiContext<'_>, &Input) -> Step<Value> + Send + Sync>;
/// Action handler: its reply decides where the browser is redirected.
pub type ActionHandler<C> =
    Arc<dyn Fn(&mut C, &mut UiContext<'_>, &Input) -> Step<ActionReply> + Send + Sync>;

/// Where an action call sends the browser afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionReply {
    /// Explicit target URL.
    Redirect(String),
    /// Back to the current path with these query parameters.
    Query(Vec<(String, String)>),
    /// Back to the current path unchanged.
    #[default]
    Refresh,
}

impl ActionReply {
    pub fn query<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Query(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn location(&self, current: &str) -> String {
        match self {
            Self::Redirect(to) => to.clone(),
            Self::Refresh => current.to_string(),
            Self::Query(pairs) if pairs.is_empty() => current.to_string(),
            Self::Query(pairs) => {
                let mut ser = url::form_urlencoded::Serializer::new(String::new());
                for (k, v) in pairs {
                    ser.append_pair(k, v);
                }
                let sep = if current.contains('?') { '&' } else { '?' };
                format!("{current}{sep}{}", ser.finish())
            }
        }
    }
}

impl From<()> for ActionReply {
    fn from(_: ()) -> Self {
        Self::Refresh
    }
}

impl From<String> for ActionReply {
    fn from(to: String) -> Self {
        Self::Redirect(to)
    }
}

impl From<&str> for ActionReply {
    fn from(to: &str) -> Self {
        Self::Redirect(to.to_string())
    }
}

impl From<Map<String, Value>> for ActionReply {
    fn from(map: Map<String, Value>) -> Self {
        Self::Query(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect(),
        )
    }
}

impl From<Value> for ActionReply {
    fn from(value: Value) -> Self {
        match value {
            Value::String(to) => Self::Redirect(to),
            Value::Object(map) => map.into(),
            _ => Self::Refresh,
        }
    }
}

/// Named ajax and action handlers of one block type.
pub struct HandlerTable<C> {
    block: &'static str,
    ajax: HashMap<String, AjaxHandler<C>>,
    action: HashMap<String, ActionHandler<C>>,
    problems: Vec<String>,
}

impl<C> HandlerTable<C> {
    pub fn new(block: &'static str) -> Self {
        Self {
            block,
            ajax: HashMap::new(),
            action: HashMap::new(),
            problems: Vec::new(),
        }
    }

    /// Registers `ajax_<name>`.
    pub fn ajax<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut C, &mut UiContext<'_>, &Input) -> Step<Value> + Send + Sync + 'static,
    {
        if self.check_name("ajax", name, self.ajax.contains_key(name)) {
            self.ajax.insert(name.to_string(), Arc::new(handler));
        }
        self
    }

    /// Registers `action_<name>`.
    pub fn action<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut C, &mut UiContext<'_>, &Input) -> Step<ActionReply> + Send + Sync + 'static,
    {
        if self.check_name("action", name, self.action.contains_key(name)) {
            self.action.insert(name.to_string(), Arc::new(handler));
        }
        self
    }

    pub fn get_ajax(&self, name: &str) -> Option<AjaxHandler<C>> {
        self.ajax.get(name).cloned()
    }

    pub fn get_action(&self, name: &str) -> Option<ActionHandler<C>> {
        self.action.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.ajax.len() + self.action.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_name(&mut self, kind: &str, name: &str, taken: bool) -> bool {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            self.problems
                .push(format!("{}: invalid {kind} handler name '{name}'", self.block));
            return false;
        }
        if taken {
            self.problems
                .push(format!("{}: duplicate {kind} handler '{name}'", self.block));
            return false;
        }
        true
    }
}

/// Static identity of a block type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockType {
    pub name: &'static str,
    /// Directory under the UI root holding the type's view and assets.
    pub dir: &'static str,
}

impl BlockType {
    pub fn of<C: Component>() -> Self {
        Self {
            name: C::NAME,
            dir: C::DIR,
        }
    }
}

struct Entry {
    type_id: TypeId,
    lineage: Vec<BlockType>,
    handlers: Box<dyn Any + Send + Sync>,
}

/// Every block type an application may instantiate, validated up front.
#[derive(Default)]
pub struct BlockRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: Component>(&mut self) -> Result<()> {
        let name = C::NAME;
        if name.is_empty() || name.contains('.') || name.chars().any(char::is_whitespace) {
            return Err(UiError::Registration(format!(
                "block name '{name}' must be non-empty without dots or whitespace"
            )));
        }
        if let Some(existing) = self.entries.get(name) {
            return Err(UiError::Registration(if existing.type_id == TypeId::of::<C>() {
                format!("block type '{name}' registered twice")
            } else {
                format!("block name '{name}' is already used by another type")
            }));
        }

        let mut table = HandlerTable::<C>::new(name);
        C::handlers(&mut table);
        if !table.problems.is_empty() {
            return Err(UiError::Registration(table.problems.join("; ")));
        }

        debug!(block = name, handlers = table.len(), "block type registered");
        self.entries.insert(
            name,
            Entry {
                type_id: TypeId::of::<C>(),
                lineage: C::lineage(),
                handlers: Box::new(table),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fails unless `C` itself is registered under its name.
    pub fn ensure<C: Component>(&self) -> Result<()> {
        match self.entries.get(C::NAME) {
            Some(entry) if entry.type_id == TypeId::of::<C>() => Ok(()),
            _ => Err(UiError::UnregisteredBlock(C::NAME.to_string())),
        }
    }

    pub fn handlers<C: Component>(&self) -> Result<&HandlerTable<C>> {
        self.entries
            .get(C::NAME)
            .and_then(|entry| entry.handlers.downcast_ref::<HandlerTable<C>>())
            .ok_or_else(|| UiError::UnregisteredBlock(C::NAME.to_string()))
    }

    /// Ancestor types declared at registration, root-first.
    pub fn lineage<C: Component>(&self) -> &[BlockType] {
        self.entries
            .get(C::NAME)
            .map(|entry| entry.lineage.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Component, RunOutput};
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Cart;

    impl Component for Cart {
        const NAME: &'static str = "Cart";

        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .ajax("add", |_, _, _| Ok(json!({"added": true})))
                .action("checkout", |_, _, _| Ok(ActionReply::Refresh));
        }

        fn run(&mut self, _cx: &mut UiContext<'_>) -> Step<RunOutput> {
            Ok(RunOutput::default())
        }
    }

    #[derive(Serialize)]
    struct BadHandlers;

    impl Component for BadHandlers {
        const NAME: &'static str = "Bad";

        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .ajax("add-item", |_, _, _| Ok(Value::Null))
                .ajax("ok", |_, _, _| Ok(Value::Null))
                .ajax("ok", |_, _, _| Ok(Value::Null));
        }
    }

    #[derive(Serialize)]
    struct Dotted;

    impl Component for Dotted {
        const NAME: &'static str = "shop.Cart";
    }

    #[derive(Serialize)]
    struct Impostor;

    impl Component for Impostor {
        const NAME: &'static str = "Cart";
    }

    #[test]
    fn register_stores_handlers_by_type() {
        let mut registry = BlockRegistry::new();
        registry.register::<Cart>().expect("cart registers");
        let table = registry.handlers::<Cart>().expect("table");
        assert!(table.get_ajax("add").is_some());
        assert!(table.get_action("checkout").is_some());
        assert!(table.get_ajax("checkout").is_none());
        assert!(registry.ensure::<Cart>().is_ok());
    }

    #[test]
    fn register_rejects_bad_and_duplicate_handler_names() {
        let mut registry = BlockRegistry::new();
        let err = registry.register::<BadHandlers>().expect_err("must fail");
        let UiError::Registration(msg) = err else {
            panic!("unexpected error kind");
        };
        assert!(msg.contains("invalid ajax handler name 'add-item'"));
        assert!(msg.contains("duplicate ajax handler 'ok'"));
        assert!(!registry.contains("Bad"));
    }

    #[test]
    fn register_rejects_dotted_and_reused_names() {
        let mut registry = BlockRegistry::new();
        assert!(registry.register::<Dotted>().is_err());

        registry.register::<Cart>().expect("cart registers");
        assert!(registry.register::<Cart>().is_err());
        assert!(registry.register::<Impostor>().is_err());
        assert!(matches!(
            registry.ensure::<Impostor>(),
            Err(UiError::UnregisteredBlock(name)) if name == "Cart"
        ));
    }

    #[test]
    fn action_reply_locations() {
        assert_eq!(ActionReply::Refresh.location("/cart"), "/cart");
        assert_eq!(ActionReply::from("/done").location("/cart"), "/done");
        assert_eq!(
            ActionReply::from(json!({"success": "1"})).location("/cart"),
            "/cart?success=1"
        );
        assert_eq!(
            ActionReply::query([("q", "a b")]).location("/s?page=2"),
            "/s?page=2&q=a+b"
        );
        assert_eq!(ActionReply::from(json!(42)), ActionReply::Refresh);
        assert_eq!(ActionReply::from(json!({"n": 3})).location("/"), "/?n=3");
    }
}
