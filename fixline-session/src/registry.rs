/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Handler registration keyed by direction and message type.
//!
//! Registration ids are global across all keys, so a dispatch snapshot
//! interleaves typed and wildcard handlers in the order they were added.

use fixline_core::message::MsgType;
use fixline_core::types::Direction;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which messages a handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageFilter {
    /// Every message in the direction.
    Any,
    /// One message type.
    Type(MsgType),
}

impl From<MsgType> for MessageFilter {
    fn from(msg_type: MsgType) -> Self {
        Self::Type(msg_type)
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Type(msg_type) => f.write_str(msg_type.name()),
        }
    }
}

/// Identifier returned by [`HandlerRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

struct Entry<H: ?Sized> {
    id: HandlerId,
    handler: Arc<H>,
}

impl<H: ?Sized> Clone for Entry<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

type Key = (Direction, MessageFilter);

/// Ordered handler lists per `(Direction, MessageFilter)`.
pub struct HandlerRegistry<H: ?Sized> {
    entries: RwLock<HashMap<Key, Vec<Entry<H>>>>,
    next_id: AtomicU64,
}

impl<H: ?Sized> HandlerRegistry<H> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a handler for the key and returns its id.
    pub fn add(&self, handler: Arc<H>, direction: Direction, filter: MessageFilter) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .entry((direction, filter))
            .or_default()
            .push(Entry { id, handler });
        id
    }

    /// Removes the earliest registration of this exact handler under the key.
    ///
    /// Handlers are compared by pointer identity. Returns false if the
    /// triple was not registered.
    pub fn remove(&self, handler: &Arc<H>, direction: Direction, filter: &MessageFilter) -> bool {
        let mut entries = self.entries.write();
        let key = (direction, filter.clone());
        let Some(list) = entries.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list
            .iter()
            .position(|e| std::ptr::addr_eq(Arc::as_ptr(&e.handler), Arc::as_ptr(handler)))
        else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            entries.remove(&key);
        }
        true
    }

    /// Removes a registration by id.
    pub fn remove_id(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write();
        let mut emptied = None;
        let mut found = false;
        for (key, list) in entries.iter_mut() {
            if let Some(pos) = list.iter().position(|e| e.id == id) {
                list.remove(pos);
                found = true;
                if list.is_empty() {
                    emptied = Some(key.clone());
                }
                break;
            }
        }
        if let Some(key) = emptied {
            entries.remove(&key);
        }
        found
    }

    /// Returns the handlers that should see a message, in registration order.
    ///
    /// The result is a copy: later registrations or removals do not affect it.
    #[must_use]
    pub fn snapshot(&self, direction: Direction, msg_type: &MsgType) -> Vec<Arc<H>> {
        let entries = self.entries.read();
        let typed = entries.get(&(direction, MessageFilter::Type(msg_type.clone())));
        let wildcard = entries.get(&(direction, MessageFilter::Any));

        let mut merged: Vec<Entry<H>> = typed
            .into_iter()
            .chain(wildcard)
            .flat_map(|list| list.iter().cloned())
            .collect();
        drop(entries);

        merged.sort_by_key(|e| e.id);
        merged.into_iter().map(|e| e.handler).collect()
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for HandlerRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registrations", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Handler(&'static str);

    impl Named for Handler {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn named(name: &'static str) -> Arc<dyn Named> {
        Arc::new(Handler(name))
    }

    fn names(handlers: &[Arc<dyn Named>]) -> Vec<&str> {
        handlers.iter().map(|h| h.name()).collect()
    }

    #[test]
    fn test_snapshot_interleaves_typed_and_wildcard() {
        let registry: HandlerRegistry<dyn Named> = HandlerRegistry::new();
        registry.add(named("any-1"), Direction::Inbound, MessageFilter::Any);
        registry.add(
            named("order"),
            Direction::Inbound,
            MsgType::NewOrderSingle.into(),
        );
        registry.add(named("any-2"), Direction::Inbound, MessageFilter::Any);
        registry.add(named("logon"), Direction::Inbound, MsgType::Logon.into());
        registry.add(named("out"), Direction::Outbound, MessageFilter::Any);

        let snapshot = registry.snapshot(Direction::Inbound, &MsgType::NewOrderSingle);
        assert_eq!(names(&snapshot), vec!["any-1", "order", "any-2"]);

        let snapshot = registry.snapshot(Direction::Outbound, &MsgType::Logon);
        assert_eq!(names(&snapshot), vec!["out"]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_remove_by_identity() {
        let registry: HandlerRegistry<dyn Named> = HandlerRegistry::new();
        let first = named("same");
        let second = named("same");
        let filter = MessageFilter::Type(MsgType::Heartbeat);
        registry.add(Arc::clone(&first), Direction::Inbound, filter.clone());
        registry.add(Arc::clone(&second), Direction::Inbound, filter.clone());

        assert!(!registry.remove(&first, Direction::Outbound, &filter));
        assert!(!registry.remove(&first, Direction::Inbound, &MessageFilter::Any));
        assert!(registry.remove(&first, Direction::Inbound, &filter));
        assert!(!registry.remove(&first, Direction::Inbound, &filter));

        let snapshot = registry.snapshot(Direction::Inbound, &MsgType::Heartbeat);
        assert_eq!(snapshot.len(), 1);
        assert!(Arc::ptr_eq(&snapshot[0], &second));
    }

    #[test]
    fn test_remove_by_id() {
        let registry: HandlerRegistry<dyn Named> = HandlerRegistry::new();
        let id = registry.add(named("a"), Direction::Inbound, MessageFilter::Any);
        registry.add(named("b"), Direction::Inbound, MessageFilter::Any);

        assert!(registry.remove_id(id));
        assert!(!registry.remove_id(id));
        assert_eq!(
            names(&registry.snapshot(Direction::Inbound, &MsgType::Logout)),
            vec!["b"]
        );
    }

    #[test]
    fn test_snapshot_unaffected_by_later_changes() {
        let registry: HandlerRegistry<dyn Named> = HandlerRegistry::new();
        let handler = named("a");
        registry.add(Arc::clone(&handler), Direction::Inbound, MessageFilter::Any);

        let snapshot = registry.snapshot(Direction::Inbound, &MsgType::Heartbeat);
        registry.remove(&handler, Direction::Inbound, &MessageFilter::Any);
        registry.add(named("b"), Direction::Inbound, MessageFilter::Any);

        assert_eq!(names(&snapshot), vec!["a"]);
        assert!(registry.snapshot(Direction::Inbound, &MsgType::Heartbeat).len() == 1);
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(MessageFilter::Any.to_string(), "*");
        assert_eq!(
            MessageFilter::from(MsgType::NewOrderSingle).to_string(),
            "NewOrderSingle"
        );
    }
}
