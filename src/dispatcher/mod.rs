use std::{io::Read, sync::Arc};

use log::{Level, debug, error, info, log_enabled, trace, warn};
use thiserror::Error;
use tokio::sync::watch::Receiver as WatchRx;

mod registry;

pub use registry::{Handler, HandlerError, HandlerId, HandlerRegistry};

use crate::ubx::{DecodeError, Decoded, Decoder};

/// Fatal conditions that terminate the read loop
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("fatal decoding error: {0}")]
    Decoding(#[source] DecodeError),
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),
}

/// Read loop statistics
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Total number of decoded messages
    pub messages: usize,
    /// Messages that no handler was interested in
    pub unhandled: usize,
    /// Recoverable framing anomalies (checksum, length)
    pub anomalies: usize,
}

/// [Dispatcher] owns the inbound half of the transport and
/// routes each decoded message to the [HandlerRegistry].
pub struct Dispatcher<R: Read> {
    decoder: Decoder<R>,
    registry: Arc<HandlerRegistry>,
    shutdown: Option<WatchRx<bool>>,
    stats: DispatchStats,
}

impl<R: Read> Dispatcher<R> {
    pub fn new(reader: R, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            shutdown: None,
            decoder: Decoder::new(reader),
            stats: Default::default(),
        }
    }

    /// Stop reading once this channel turns true.
    /// Checked before every decoding step.
    pub fn with_shutdown(mut self, shutdown: WatchRx<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow() || rx.has_changed().is_err())
            .unwrap_or(false)
    }

    /// Runs the read loop until end of stream (or shutdown).
    /// Blocking: run it on a dedicated thread.
    pub fn run(mut self) -> Result<DispatchStats, DispatchError> {
        loop {
            if self.shutdown_requested() {
                info!("read loop: shutdown requested");
                return Ok(self.stats);
            }

            let msg = match self.decoder.decode_next() {
                Ok(Decoded::Message(msg)) => msg,
                Ok(Decoded::Idle) => continue,
                Ok(Decoded::EndOfStream) => {
                    info!("read loop: end of stream");
                    return Ok(self.stats);
                },
                Err(e) if e.is_recoverable() => {
                    warn!("read loop: {}", e);
                    self.stats.anomalies += 1;
                    continue;
                },
                Err(e) => {
                    error!("read loop: {}", e);
                    return Err(DispatchError::Decoding(e));
                },
            };

            self.stats.messages += 1;

            let handled = self.registry.dispatch(&msg)?;

            if handled == 0 {
                let (class, id) = msg.class_id();
                debug!("unhandled message class=0x{:02x} id=0x{:02x}", class, id);

                if log_enabled!(Level::Trace) {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        trace!("{}", json);
                    }
                }

                self.stats.unhandled += 1;
            }
        }
    }
}
