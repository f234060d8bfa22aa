use std::sync::{Arc, Mutex, OnceLock, Weak};

use hifitime::prelude::Epoch;
use log::{debug, info, warn};
use tokio::sync::oneshot;

use crate::{
    clock::SystemClock,
    dispatcher::{Handler, HandlerError, HandlerId, HandlerRegistry},
    ubx::{Message, MessageType},
};

/// Waits on the first valid fix. Once obtained, the [Epoch] never changes.
pub struct AcquiredTime {
    rx: Option<oneshot::Receiver<Epoch>>,
    epoch: Option<Epoch>,
}

impl AcquiredTime {
    fn new(rx: oneshot::Receiver<Epoch>) -> Self {
        Self {
            rx: Some(rx),
            epoch: None,
        }
    }

    /// Acquired [Epoch], if already known. Does not wait.
    pub fn epoch(&mut self) -> Option<Epoch> {
        if self.epoch.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                match rx.try_recv() {
                    Ok(t) => {
                        self.epoch = Some(t);
                        self.rx = None;
                    },
                    Err(oneshot::error::TryRecvError::Empty) => {},
                    Err(oneshot::error::TryRecvError::Closed) => {
                        self.rx = None;
                    },
                }
            }
        }
        self.epoch
    }

    /// Waits for the acquisition. Returns None if it may no longer happen.
    /// Cancel safe.
    pub async fn wait(&mut self) -> Option<Epoch> {
        if self.epoch.is_some() {
            return self.epoch;
        }

        let rx = self.rx.as_mut()?;
        let acquired = rx.await.ok();

        self.rx = None;
        self.epoch = acquired;
        self.epoch
    }

    /// Waits for the acquisition, for at most `grace`.
    pub async fn wait_for(&mut self, grace: std::time::Duration) -> Option<Epoch> {
        tokio::time::timeout(grace, self.wait())
            .await
            .unwrap_or(None)
    }
}

/// NAV-PVT [Handler] that acquires UTC time from the first fix
/// that carries a valid date, applies it to the [SystemClock],
/// publishes it once and removes itself from the [HandlerRegistry].
pub struct TimeAcquisition {
    clock: Arc<dyn SystemClock>,
    tx: Mutex<Option<oneshot::Sender<Epoch>>>,
    registry: Weak<HandlerRegistry>,
    id: OnceLock<HandlerId>,
}

impl TimeAcquisition {
    /// Registers a new [TimeAcquisition] handler and returns
    /// the matching [AcquiredTime] signal.
    pub fn install(registry: &Arc<HandlerRegistry>, clock: Arc<dyn SystemClock>) -> AcquiredTime {
        let (tx, rx) = oneshot::channel();

        let handler = Arc::new(Self {
            clock,
            tx: Mutex::new(Some(tx)),
            registry: Arc::downgrade(registry),
            id: OnceLock::new(),
        });

        let id = registry.register(MessageType::PositionFix, handler.clone());
        let _ = handler.id.set(id);

        AcquiredTime::new(rx)
    }

    fn deregister(&self) {
        if let (Some(registry), Some(id)) = (self.registry.upgrade(), self.id.get()) {
            registry.deregister(MessageType::PositionFix, *id);
        }
    }
}

impl Handler for TimeAcquisition {
    fn handle(&self, msg: &Message) -> Result<(), HandlerError> {
        let Message::PositionFix(fix) = msg else {
            return Ok(());
        };

        debug!(
            "NAV-PVT - itow={} valid={:?} t_acc={}ns nsv={}",
            fix.itow,
            fix.valid_flags(),
            fix.time_accuracy,
            fix.num_sv
        );

        if !fix.has_valid_date() {
            return Ok(());
        }

        let Some(t) = fix.epoch() else {
            warn!(
                "NAV-PVT - invalid calendar {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                fix.year, fix.month, fix.day, fix.hour, fix.minute, fix.second
            );
            return Ok(());
        };

        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        // published already: a fix dispatched from a stale snapshot
        let Some(tx) = tx else {
            return Ok(());
        };

        info!("{} - valid date acquired (t_acc={}ns)", t, fix.time_accuracy);

        self.clock.set_system_clock(t)?;

        if tx.send(t).is_err() {
            debug!("{} - nobody is waiting for time", t);
        }

        self.deregister();
        Ok(())
    }
}
