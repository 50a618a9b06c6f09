use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::coalesce::Coalescer;
use crate::schema::{EventHandler, Schema};

/// A handler bound to the node that declared it.
#[derive(Debug)]
pub struct RegisteredHandler {
    pub node_id: String,
    pub handler: EventHandler,
    /// Registration order across the whole registry.
    pub seq: u64,
    pub(crate) coalescer: Coalescer,
}

/// Handlers keyed by owning node id.
///
/// Dispatch order for one event name is registration order, regardless of
/// which node the handler belongs to.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Vec<Arc<RegisteredHandler>>>,
    next_seq: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: &str, handler: EventHandler) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Registering `{}` handler on node `{}`", handler.event, node_id);
        self.handlers
            .entry(node_id.to_string())
            .or_default()
            .push(Arc::new(RegisteredHandler {
                node_id: node_id.to_string(),
                handler,
                seq,
                coalescer: Coalescer::default(),
            }));
    }

    /// Registers every handler declared in the tree; returns how many.
    pub fn register_schema(&self, schema: &Schema) -> usize {
        let mut count = 0;
        for node in schema.collect_nodes() {
            for handler in &node.events {
                self.register(&node.id, handler.clone());
                count += 1;
            }
        }
        count
    }

    /// Drops the node's handlers, or only those for `event` when given.
    /// Pending debounced runs of removed handlers are cancelled.
    pub fn unregister(&self, node_id: &str, event: Option<&str>) -> usize {
        let mut removed = Vec::new();
        if let Some(mut entry) = self.handlers.get_mut(node_id) {
            let (drop, keep): (Vec<_>, Vec<_>) = entry
                .drain(..)
                .partition(|registered| event.map_or(true, |name| registered.handler.event == name));
            *entry = keep;
            removed = drop;
        }
        self.handlers.remove_if(node_id, |_, handlers| handlers.is_empty());

        for registered in &removed {
            registered.coalescer.cancel();
        }
        removed.len()
    }

    pub fn clear(&self) {
        for entry in self.handlers.iter() {
            entry.value().iter().for_each(|h| h.coalescer.cancel());
        }
        self.handlers.clear();
    }

    /// Every handler listening for `event`, in registration order.
    pub fn handlers_for(&self, event: &str) -> Vec<Arc<RegisteredHandler>> {
        let mut matching: Vec<_> = self
            .handlers
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|registered| registered.handler.event == event)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        matching.sort_by_key(|registered| registered.seq);
        matching
    }

    pub fn len(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Node;

    fn handler(event: &str) -> EventHandler {
        EventHandler::new(event, vec![])
    }

    #[test]
    fn test_dispatch_order_is_registration_order() {
        let registry = HandlerRegistry::new();
        registry.register("b", handler("click"));
        registry.register("a", handler("click"));
        registry.register("b", handler("hover"));
        registry.register("b", handler("click"));

        let order: Vec<_> = registry
            .handlers_for("click")
            .iter()
            .map(|h| (h.node_id.clone(), h.seq))
            .collect();
        assert_eq!(
            order,
            vec![("b".to_string(), 0), ("a".to_string(), 1), ("b".to_string(), 3)]
        );
    }

    #[test]
    fn test_unregister_by_event_and_node() {
        let registry = HandlerRegistry::new();
        registry.register("n", handler("click"));
        registry.register("n", handler("hover"));
        registry.register("m", handler("click"));

        assert_eq!(registry.unregister("n", Some("click")), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.unregister("n", None), 1);
        assert_eq!(registry.unregister("missing", None), 0);
        assert_eq!(registry.handlers_for("click").len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_schema_walks_slots() {
        let mut footer = Node::new("footer", "Button");
        footer.events = vec![handler("click")];
        let mut root = Node::new("root", "Page");
        root.events = vec![handler("load"), handler("click")];
        root.slots.insert("footer".to_string(), vec![footer]);

        let registry = HandlerRegistry::new();
        assert_eq!(registry.register_schema(&Schema::new("s", "1.0.0", root)), 3);
        assert_eq!(registry.handlers_for("click").len(), 2);
    }
}
