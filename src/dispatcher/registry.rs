use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use log::debug;
use thiserror::Error;

use crate::{
    clock::ClockError,
    ubx::{Message, MessageType},
};

/// Fatal conditions raised by a [Handler]. They terminate the read loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to set system clock: {0}")]
    Clock(#[from] ClockError),
}

/// Message [Handler]. Invoked on the dispatching thread, in registration order.
/// A [Handler] must never block indefinitely.
pub trait Handler: Send + Sync {
    fn handle(&self, msg: &Message) -> Result<(), HandlerError>;
}

/// Unique registration identifier, returned by [HandlerRegistry::register].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Entries = Vec<(HandlerId, Arc<dyn Handler>)>;

/// [MessageType] to [Handler]s routing table.
/// The lock is only held to read or mutate the table, never while handlers run:
/// a dispatch works on a snapshot taken at lookup time.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<MessageType, Entries>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<MessageType, Entries>> {
        // handlers never run under this lock, a poisoned table is still consistent
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new [Handler] for given [MessageType]
    pub fn register(&self, msg_type: MessageType, handler: Arc<dyn Handler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table().entry(msg_type).or_default().push((id, handler));
        debug!("{} - handler #{} registered", msg_type, id.0);
        id
    }

    /// Removes a [Handler]. Returns false if it was not registered.
    /// Messages dispatched after this returns will not reach this [Handler].
    pub fn deregister(&self, msg_type: MessageType, id: HandlerId) -> bool {
        let mut table = self.table();

        let Some(entries) = table.get_mut(&msg_type) else {
            return false;
        };

        let size = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        let removed = entries.len() < size;

        if entries.is_empty() {
            table.remove(&msg_type);
        }

        if removed {
            debug!("{} - handler #{} deregistered", msg_type, id.0);
        }

        removed
    }

    /// Number of [Handler]s currently registered for this [MessageType]
    #[cfg(test)]
    pub fn len(&self, msg_type: MessageType) -> usize {
        self.table().get(&msg_type).map(|e| e.len()).unwrap_or(0)
    }

    fn snapshot(&self, msg_type: MessageType) -> Vec<Arc<dyn Handler>> {
        self.table()
            .get(&msg_type)
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Invokes every [Handler] registered for this [Message] type.
    /// Returns the number of handlers that were invoked.
    /// The first [HandlerError] interrupts the dispatch.
    pub fn dispatch(&self, msg: &Message) -> Result<usize, HandlerError> {
        let handlers = self.snapshot(msg.message_type());

        for handler in handlers.iter() {
            handler.handle(msg)?;
        }

        Ok(handlers.len())
    }
}
