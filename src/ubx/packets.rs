use hifitime::prelude::{Duration, Epoch};
use serde::Serialize;

use ublox::nav_pvt::common::NavPvtValidFlags;

use crate::ubx::{DecodeError, EncodeError, MAX_PAYLOAD_LEN, frame};

/// Position/Time solution, decoded from UBX-NAV-PVT.
/// Only the time related fields are retained.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct PositionFix {
    /// GPS time of week (ms)
    pub itow: u32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Raw [NavPvtValidFlags]
    pub valid: u8,
    /// Time accuracy estimate (ns)
    pub time_accuracy: u32,
    /// Fraction of second, may be negative
    pub nanosecond: i32,
    pub num_sv: u8,
}

impl PositionFix {
    pub const CLASS: u8 = 0x01;
    pub const ID: u8 = 0x07;

    #[cfg(test)]
    pub const PAYLOAD_LEN: usize = 92;

    /// Serializes the retained fields. Position and velocity are zeroed.
    #[cfg(test)]
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let mut payload = vec![0; Self::PAYLOAD_LEN];
        payload[0..4].copy_from_slice(&self.itow.to_le_bytes());
        payload[4..6].copy_from_slice(&self.year.to_le_bytes());
        payload[6] = self.month;
        payload[7] = self.day;
        payload[8] = self.hour;
        payload[9] = self.minute;
        payload[10] = self.second;
        payload[11] = self.valid;
        payload[12..16].copy_from_slice(&self.time_accuracy.to_le_bytes());
        payload[16..20].copy_from_slice(&self.nanosecond.to_le_bytes());
        payload[23] = self.num_sv;
        payload
    }

    /// Validity flags, as reported by the receiver
    pub fn valid_flags(&self) -> NavPvtValidFlags {
        NavPvtValidFlags::from_bits_truncate(self.valid)
    }

    /// True when the receiver reports a valid UTC date
    pub fn has_valid_date(&self) -> bool {
        self.valid_flags().contains(NavPvtValidFlags::VALID_DATE)
    }

    /// Converts this solution to a UTC [Epoch].
    /// Seconds and (possibly negative) nanoseconds are added to the minute,
    /// so leap seconds and rounding offsets are normalized.
    /// Returns None when the calendar fields do not form a valid date.
    pub fn epoch(&self) -> Option<Epoch> {
        let minute = Epoch::maybe_from_gregorian_utc(
            self.year as i32,
            self.month,
            self.day,
            self.hour,
            self.minute,
            0,
            0,
        )
        .ok()?;

        let offset_nanos = self.second as i128 * 1_000_000_000 + self.nanosecond as i128;
        Some(minute + Duration::from_total_nanoseconds(offset_nanos))
    }
}

/// Assistance acknowledgment information code.
/// Mirrors `ublox::MsgAckInfoCode` so it can be logged as JSON.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum AckInfoCode {
    Accepted,
    RejectedNoTime,
    RejectedBadVersion,
    RejectedBadSize,
    RejectedDbStoreFailed,
    RejectedNotReady,
    RejectedUnknownType,
    Unknown(u8),
}

impl From<u8> for AckInfoCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Accepted,
            1 => Self::RejectedNoTime,
            2 => Self::RejectedBadVersion,
            3 => Self::RejectedBadSize,
            4 => Self::RejectedDbStoreFailed,
            5 => Self::RejectedNotReady,
            6 => Self::RejectedUnknownType,
            code => Self::Unknown(code),
        }
    }
}

#[cfg(test)]
impl From<AckInfoCode> for u8 {
    fn from(code: AckInfoCode) -> u8 {
        match code {
            AckInfoCode::Accepted => 0,
            AckInfoCode::RejectedNoTime => 1,
            AckInfoCode::RejectedBadVersion => 2,
            AckInfoCode::RejectedBadSize => 3,
            AckInfoCode::RejectedDbStoreFailed => 4,
            AckInfoCode::RejectedNotReady => 5,
            AckInfoCode::RejectedUnknownType => 6,
            AckInfoCode::Unknown(code) => code,
        }
    }
}

/// Assistance acknowledgment, decoded from UBX-MGA-ACK-DATA0
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct AssistanceAck {
    /// 1: message accepted, 0: not used
    pub ack_type: u8,
    pub version: u8,
    pub info_code: AckInfoCode,
    /// UBX id of the acknowledged MGA message
    pub msg_id: u8,
    /// First 4 payload bytes of the acknowledged message
    pub payload_start: [u8; 4],
}

impl AssistanceAck {
    pub const CLASS: u8 = 0x13;
    pub const ID: u8 = 0x60;

    /// Builds the acknowledgment a receiver would return for this [AssistanceRecord]
    #[cfg(test)]
    pub fn for_record(record: &AssistanceRecord, info_code: AckInfoCode) -> Self {
        Self {
            ack_type: if info_code == AckInfoCode::Accepted { 1 } else { 0 },
            version: 0,
            info_code,
            msg_id: AssistanceRecord::ID,
            payload_start: [record.msg_type, record.version, record.sv_id, record.gnss_id],
        }
    }

    #[cfg(test)]
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(8);
        payload.push(self.ack_type);
        payload.push(self.version);
        payload.push(self.info_code.into());
        payload.push(self.msg_id);
        payload.extend_from_slice(&self.payload_start);
        payload
    }

    /// Satellite identifier of the acknowledged MGA-ANO record
    pub fn satellite_id(&self) -> u8 {
        self.payload_start[2]
    }

    /// GNSS identifier of the acknowledged MGA-ANO record
    pub fn gnss_id(&self) -> u8 {
        self.payload_start[3]
    }

    /// True when the receiver accepted the assistance data
    pub fn accepted(&self) -> bool {
        self.ack_type == 1 && self.info_code == AckInfoCode::Accepted
    }

    /// True when this acknowledges given [AssistanceRecord]
    pub fn acknowledges(&self, record: &AssistanceRecord) -> bool {
        self.msg_id == AssistanceRecord::ID
            && self.satellite_id() == record.sv_id
            && self.gnss_id() == record.gnss_id
    }
}

/// AssistNow Offline record, as stored in UBX-MGA-ANO frames.
/// The `ublox` parser does not interpret this message, it is
/// extracted from the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistanceRecord {
    /// Message type (0x00)
    pub msg_type: u8,
    pub version: u8,
    /// Satellite identifier
    pub sv_id: u8,
    /// GNSS identifier
    pub gnss_id: u8,
    /// Year of validity, offset by 2000
    pub year: u8,
    pub month: u8,
    pub day: u8,
    #[serde(skip)]
    reserved: u8,
    /// Prediction data, preserved verbatim (data + trailing reserved bytes)
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl AssistanceRecord {
    pub const CLASS: u8 = 0x13;
    pub const ID: u8 = 0x20;
    pub const PAYLOAD_LEN: usize = 76;

    const HEADER_LEN: usize = 8;

    /// Builds a new [AssistanceRecord] with zeroed prediction data
    #[cfg(test)]
    pub fn new(gnss_id: u8, sv_id: u8, year: u8, month: u8, day: u8) -> Self {
        Self {
            msg_type: 0,
            version: 0,
            sv_id,
            gnss_id,
            year,
            month,
            day,
            reserved: 0,
            data: vec![0; Self::PAYLOAD_LEN - Self::HEADER_LEN],
        }
    }

    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(DecodeError::InvalidLength {
                class: Self::CLASS,
                id: Self::ID,
                len: payload.len(),
            });
        }

        Ok(Self {
            msg_type: payload[0],
            version: payload[1],
            sv_id: payload[2],
            gnss_id: payload[3],
            year: payload[4],
            month: payload[5],
            day: payload[6],
            reserved: payload[7],
            data: payload[Self::HEADER_LEN..].to_vec(),
        })
    }

    fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(Self::HEADER_LEN + self.data.len());
        payload.extend_from_slice(&[
            self.msg_type,
            self.version,
            self.sv_id,
            self.gnss_id,
            self.year,
            self.month,
            self.day,
            self.reserved,
        ]);
        payload.extend_from_slice(&self.data);
        payload
    }

    /// Frames this record, ready to be written to the receiver.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let payload = self.to_payload();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(EncodeError::Oversized(payload.len()));
        }
        Ok(frame(Self::CLASS, Self::ID, &payload))
    }

    /// Calendar date (year, month, day) this record is valid for
    pub fn date(&self) -> (i32, u8, u8) {
        (self.year as i32 + 2000, self.month, self.day)
    }

    /// True when this record is valid for the calendar day of given [Epoch]
    pub fn is_valid_on(&self, epoch: Epoch) -> bool {
        let (y, m, d, _, _, _, _) = epoch.to_gregorian_utc();
        self.date() == (y, m, d)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ubx::{Decoded, Decoder, Message};
    use hifitime::prelude::{Duration, Epoch};
    use std::{io::Cursor, str::FromStr};

    fn fix(valid: NavPvtValidFlags) -> PositionFix {
        PositionFix {
            year: 2023,
            month: 5,
            day: 1,
            hour: 12,
            minute: 30,
            second: 15,
            valid: valid.bits(),
            time_accuracy: 25,
            nanosecond: 250_000_000,
            num_sv: 9,
            ..Default::default()
        }
    }

    #[test]
    fn position_fix_epoch() {
        let fix = fix(NavPvtValidFlags::VALID_DATE | NavPvtValidFlags::VALID_TIME);
        assert!(fix.has_valid_date());
        assert!(fix.valid_flags().contains(NavPvtValidFlags::VALID_TIME));

        let expected = Epoch::from_gregorian_utc(2023, 5, 1, 12, 30, 15, 250_000_000);
        assert_eq!(fix.epoch(), Some(expected));
    }

    #[test]
    fn position_fix_negative_nanos() {
        let mut fix = fix(NavPvtValidFlags::VALID_DATE);
        fix.second = 0;
        fix.nanosecond = -1_000;

        let expected = Epoch::from_gregorian_utc(2023, 5, 1, 12, 29, 59, 999_999_000);
        assert_eq!(fix.epoch(), Some(expected));
    }

    #[test]
    fn position_fix_without_date() {
        let fix = fix(NavPvtValidFlags::VALID_TIME | NavPvtValidFlags::FULLY_RESOLVED);
        assert!(!fix.has_valid_date());
    }

    #[test]
    fn position_fix_invalid_calendar() {
        let mut fix = fix(NavPvtValidFlags::VALID_DATE);
        fix.month = 0;
        assert!(fix.epoch().is_none());
    }

    #[test]
    fn position_fix_through_ublox_parser() {
        let mut fix = fix(NavPvtValidFlags::VALID_DATE);
        fix.itow = 345_615_000;

        let bytes = Message::PositionFix(fix).encode().unwrap();
        assert_eq!(bytes.len(), PositionFix::PAYLOAD_LEN + 8);

        let mut decoder = Decoder::new(Cursor::new(bytes));
        match decoder.decode_next().unwrap() {
            Decoded::Message(Message::PositionFix(decoded)) => assert_eq!(decoded, fix),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ack_through_ublox_parser() {
        let record = AssistanceRecord::new(2, 11, 23, 5, 1);
        let ack = AssistanceAck::for_record(&record, AckInfoCode::RejectedNotReady);

        let bytes = Message::AssistanceAck(ack).encode().unwrap();

        let mut decoder = Decoder::new(Cursor::new(bytes));
        match decoder.decode_next().unwrap() {
            Decoded::Message(Message::AssistanceAck(decoded)) => {
                assert_eq!(decoded, ack);
                assert!(decoded.acknowledges(&record));
                assert!(!decoded.accepted());
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn record_date_filter() {
        let record = AssistanceRecord::new(0, 12, 23, 5, 1);
        assert_eq!(record.date(), (2023, 5, 1));

        let t = Epoch::from_str("2023-05-01T23:59:59 UTC").unwrap();
        assert!(record.is_valid_on(t));

        let t = Epoch::from_str("2023-05-02T00:00:00 UTC").unwrap();
        assert!(!record.is_valid_on(t));
    }

    #[test]
    fn record_payload_is_preserved() {
        let mut payload = (0..AssistanceRecord::PAYLOAD_LEN as u8).collect::<Vec<_>>();
        payload[0] = 0;
        let record = AssistanceRecord::parse(&payload).unwrap();
        assert_eq!(record.sv_id, 2);
        assert_eq!(record.gnss_id, 3);
        assert_eq!(record.to_payload(), payload);
    }

    #[test]
    fn oversized_record_is_not_framed() {
        let mut record = AssistanceRecord::new(0, 1, 23, 5, 1);
        record.data = vec![0; MAX_PAYLOAD_LEN];
        assert!(matches!(record.encode(), Err(EncodeError::Oversized(_))));
    }

    #[test]
    fn ack_for_record() {
        let record = AssistanceRecord::new(6, 17, 23, 5, 1);
        let ack = AssistanceAck::for_record(&record, AckInfoCode::Accepted);

        assert_eq!(ack.satellite_id(), 17);
        assert_eq!(ack.gnss_id(), 6);
        assert!(ack.accepted());
        assert!(ack.acknowledges(&record));
        assert!(!ack.acknowledges(&AssistanceRecord::new(6, 18, 23, 5, 1)));

        let rejected = AssistanceAck::for_record(&record, AckInfoCode::RejectedNoTime);
        assert!(!rejected.accepted());
    }

    #[test]
    fn ack_info_codes() {
        assert_eq!(AckInfoCode::from(5), AckInfoCode::RejectedNotReady);
        assert_eq!(AckInfoCode::from(42), AckInfoCode::Unknown(42));
        assert_eq!(u8::from(AckInfoCode::Unknown(42)), 42);
    }
}
