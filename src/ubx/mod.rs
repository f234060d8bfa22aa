//! UBX message model. Inbound frames are parsed by the `ublox` crate,
//! only the MGA-ANO encoding is framed here.
//!
//! Only the handful of messages this application acts upon are interpreted,
//! everything else travels as [Message::Other].

mod decoder;
mod packets;

use serde::Serialize;
use thiserror::Error;

use ublox::{UbxPacket, packetref_proto23::PacketRef};

pub use decoder::{DecodeError, Decoded, Decoder};
pub use packets::{AckInfoCode, AssistanceAck, AssistanceRecord, PositionFix};

/// First UBX sync character
pub const SYNC_CHAR_1: u8 = 0xb5;

/// Second UBX sync character
pub const SYNC_CHAR_2: u8 = 0x62;

/// Sync (2) + class (1) + id (1) + length (2)
pub const HEADER_LEN: usize = 6;

/// Largest payload we frame.
pub const MAX_PAYLOAD_LEN: usize = 8192;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload too large: {0} bytes")]
    Oversized(usize),
}

/// Message tag, used as dispatching key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MessageType {
    /// UBX-NAV-PVT
    PositionFix,
    /// UBX-MGA-ACK-DATA0
    AssistanceAck,
    /// UBX-MGA-ANO
    AssistanceRecord,
    /// Any other UBX message
    Other,
}

impl MessageType {
    pub const ALL: [Self; 4] = [
        Self::PositionFix,
        Self::AssistanceAck,
        Self::AssistanceRecord,
        Self::Other,
    ];
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::PositionFix => write!(f, "NAV-PVT"),
            Self::AssistanceAck => write!(f, "MGA-ACK"),
            Self::AssistanceRecord => write!(f, "MGA-ANO"),
            Self::Other => write!(f, "UBX"),
        }
    }
}

/// Decoded UBX [Message]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Message {
    PositionFix(PositionFix),
    AssistanceAck(AssistanceAck),
    AssistanceRecord(AssistanceRecord),
    /// Payload is only retained for messages `ublox` does not know about
    Other { class: u8, id: u8, payload: Vec<u8> },
}

impl Message {
    /// Returns the [MessageType] tag of this [Message]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::PositionFix(_) => MessageType::PositionFix,
            Self::AssistanceAck(_) => MessageType::AssistanceAck,
            Self::AssistanceRecord(_) => MessageType::AssistanceRecord,
            Self::Other { .. } => MessageType::Other,
        }
    }

    /// Returns (class, id) of this [Message]
    pub fn class_id(&self) -> (u8, u8) {
        match self {
            Self::PositionFix(_) => (PositionFix::CLASS, PositionFix::ID),
            Self::AssistanceAck(_) => (AssistanceAck::CLASS, AssistanceAck::ID),
            Self::AssistanceRecord(_) => (AssistanceRecord::CLASS, AssistanceRecord::ID),
            Self::Other { class, id, .. } => (*class, *id),
        }
    }

    /// Converts a packet framed by the `ublox` parser.
    pub(crate) fn from_packet(packet: UbxPacket) -> Result<Self, DecodeError> {
        match packet {
            UbxPacket::Proto23(PacketRef::NavPvt(pvt)) => Ok(Self::PositionFix(PositionFix {
                itow: pvt.itow(),
                year: pvt.year(),
                month: pvt.month(),
                day: pvt.day(),
                hour: pvt.hour(),
                minute: pvt.min(),
                second: pvt.sec(),
                valid: pvt.valid().bits(),
                time_accuracy: pvt.time_accuracy(),
                nanosecond: pvt.nanosec(),
                num_sv: pvt.num_satellites(),
            })),
            UbxPacket::Proto23(PacketRef::MgaAck(ack)) => Ok(Self::AssistanceAck(AssistanceAck {
                ack_type: ack.ack_type(),
                version: ack.version(),
                info_code: AckInfoCode::from(ack.info_code() as u8),
                msg_id: ack.msg_id(),
                payload_start: ack.msg_payload_start(),
            })),
            UbxPacket::Proto23(PacketRef::Unknown(unknown)) => {
                Self::from_payload(unknown.class, unknown.msg_id, unknown.payload)
            },
            UbxPacket::Proto23(other) => {
                let (class, id) = other.class_and_msg_id();
                Ok(Self::Other {
                    class,
                    id,
                    payload: Vec::new(),
                })
            },
            #[allow(unreachable_patterns)]
            _ => Err(DecodeError::InvalidPacket(
                "unsupported protocol version".to_string(),
            )),
        }
    }

    /// Interprets a (class, id, payload) triplet the `ublox` crate left uninterpreted.
    pub(crate) fn from_payload(class: u8, id: u8, payload: &[u8]) -> Result<Self, DecodeError> {
        match (class, id) {
            (AssistanceRecord::CLASS, AssistanceRecord::ID) => {
                Ok(Self::AssistanceRecord(AssistanceRecord::parse(payload)?))
            },
            (class, id) => Ok(Self::Other {
                class,
                id,
                payload: payload.to_vec(),
            }),
        }
    }

    /// Encodes this [Message] as a complete UBX frame.
    /// Only [AssistanceRecord]s are ever sent, other messages are
    /// framed to synthesize receiver output.
    #[cfg(test)]
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let (class, id) = self.class_id();
        match self {
            Self::PositionFix(fix) => Ok(frame(class, id, &fix.to_payload())),
            Self::AssistanceAck(ack) => Ok(frame(class, id, &ack.to_payload())),
            Self::AssistanceRecord(rec) => rec.encode(),
            Self::Other { payload, .. } => Ok(frame(class, id, payload)),
        }
    }
}

/// Builds a UBX frame: header, payload and checksum.
pub fn frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(payload.len() + HEADER_LEN + 2);
    packet.extend_from_slice(&[SYNC_CHAR_1, SYNC_CHAR_2, class, id]);
    packet.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    packet.extend_from_slice(payload);

    let (ck_a, ck_b) = checksum(&packet[2..]);
    packet.push(ck_a);
    packet.push(ck_b);
    packet
}

/// 8-bit Fletcher checksum over class, id, length and payload.
pub fn checksum(data: &[u8]) -> (u8, u8) {
    let mut ck_a = 0_u8;
    let mut ck_b = 0_u8;
    for byte in data {
        ck_a = ck_a.wrapping_add(*byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checksum_of_mon_ver_poll() {
        // UBX-MON-VER poll request, as documented
        let frame = frame(0x0a, 0x04, &[]);
        assert_eq!(frame, vec![0xb5, 0x62, 0x0a, 0x04, 0x00, 0x00, 0x0e, 0x34]);
    }

    #[test]
    fn unknown_messages_keep_their_identity() {
        let msg = Message::from_payload(0x0a, 0x04, &[1, 2, 3]).unwrap();
        assert_eq!(msg.message_type(), MessageType::Other);
        assert_eq!(msg.class_id(), (0x0a, 0x04));
        assert_eq!(msg.encode().unwrap(), frame(0x0a, 0x04, &[1, 2, 3]));
    }
}
