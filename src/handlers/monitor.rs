use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use log::{info, warn};

use crate::{
    dispatcher::{Handler, HandlerError, HandlerRegistry},
    ubx::{Message, MessageType},
};

/// Dumps every decoded message as JSON.
/// NAV-PVT solutions are also reported as UTC time.
#[derive(Default)]
pub struct Monitor {
    dumped: AtomicUsize,
}

impl Monitor {
    /// Subscribes a new [Monitor] to every [MessageType]
    pub fn install(registry: &HandlerRegistry) -> Arc<Self> {
        let monitor = Arc::new(Self::default());
        for msg_type in MessageType::ALL {
            registry.register(msg_type, monitor.clone());
        }
        monitor
    }

    /// Number of messages dumped so far
    pub fn dumped(&self) -> usize {
        self.dumped.load(Ordering::Relaxed)
    }
}

impl Handler for Monitor {
    fn handle(&self, msg: &Message) -> Result<(), HandlerError> {
        match serde_json::to_string(msg) {
            Ok(json) => info!("{} - {}", msg.message_type(), json),
            Err(e) => warn!("{} - failed to serialize: {}", msg.message_type(), e),
        }

        if let Message::PositionFix(fix) = msg {
            match fix.epoch() {
                Some(t) => info!("NAV-PVT - time: {} (valid={:?})", t, fix.valid_flags()),
                None => info!("NAV-PVT - no time (valid={:?})", fix.valid_flags()),
            }
        }

        self.dumped.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dispatcher::Dispatcher,
        ubx::{AckInfoCode, AssistanceAck, AssistanceRecord, PositionFix},
    };
    use std::io::Cursor;

    #[test]
    fn dumps_every_message_type() {
        let registry = Arc::new(HandlerRegistry::new());
        let monitor = Monitor::install(&registry);

        for msg_type in MessageType::ALL {
            assert_eq!(registry.len(msg_type), 1);
        }

        let record = AssistanceRecord::new(0, 3, 23, 5, 1);

        let mut bytes = Vec::new();
        for msg in [
            Message::PositionFix(PositionFix {
                year: 2023,
                month: 5,
                day: 1,
                valid: 1,
                ..Default::default()
            }),
            Message::AssistanceAck(AssistanceAck::for_record(&record, AckInfoCode::Accepted)),
            Message::AssistanceRecord(record),
            Message::Other {
                class: 0xf0,
                id: 0x01,
                payload: vec![1, 2],
            },
        ] {
            bytes.extend(msg.encode().unwrap());
        }

        let stats = Dispatcher::new(Cursor::new(bytes), registry)
            .run()
            .unwrap();

        assert_eq!(stats.messages, 4);
        assert_eq!(stats.unhandled, 0);
        assert_eq!(monitor.dumped(), 4);
    }

    #[test]
    fn other_messages_serialize_with_their_identity() {
        let msg = Message::Other {
            class: 0x0a,
            id: 0x04,
            payload: vec![7],
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"Other":{"class":10,"id":4,"payload":[7]}}"#);

        Monitor::default().handle(&msg).unwrap();
    }
}
