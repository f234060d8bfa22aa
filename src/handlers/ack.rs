use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::{
    dispatcher::{Handler, HandlerError},
    ubx::{AssistanceAck, Message},
};

/// Hands MGA-ACK messages over to the uploader currently waiting for one.
/// There is a single slot: at most one ack can be outstanding.
/// Acks arriving while nobody waits are dropped.
#[derive(Default)]
pub struct AckCorrelator {
    waiter: Mutex<Option<oneshot::Sender<AssistanceAck>>>,
    unsolicited: AtomicUsize,
}

impl AckCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<oneshot::Sender<AssistanceAck>>> {
        self.waiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arms the slot and returns the receiving end.
    /// Must be called before the request is written, so a prompt ack is not lost.
    /// Replaces any previous (abandoned) waiter.
    pub fn arm(&self) -> oneshot::Receiver<AssistanceAck> {
        let (tx, rx) = oneshot::channel();
        *self.slot() = Some(tx);
        rx
    }

    /// True when an uploader is currently waiting
    pub fn is_waiting(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Number of acks that did not match any waiting uploader
    pub fn unsolicited(&self) -> usize {
        self.unsolicited.load(Ordering::Relaxed)
    }

    /// Delivers an ack to the waiting uploader. Never blocks.
    /// Returns false when the ack was dropped.
    pub fn deliver(&self, ack: AssistanceAck) -> bool {
        let waiter = self.slot().take();

        let delivered = match waiter {
            Some(tx) => tx.send(ack).is_ok(),
            None => false,
        };

        if !delivered {
            self.unsolicited.fetch_add(1, Ordering::Relaxed);
            warn!(
                "unsolicited MGA-ACK (sv={}, gnss={}, info={:?}): dropped",
                ack.satellite_id(),
                ack.gnss_id(),
                ack.info_code
            );
        }

        delivered
    }
}

impl Handler for AckCorrelator {
    fn handle(&self, msg: &Message) -> Result<(), HandlerError> {
        if let Message::AssistanceAck(ack) = msg {
            match serde_json::to_string(ack) {
                Ok(json) => debug!("got ack: {}", json),
                Err(_) => debug!("got ack: {:?}", ack),
            }
            self.deliver(*ack);
        }
        Ok(())
    }
}
