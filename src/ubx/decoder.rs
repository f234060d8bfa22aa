use std::{
    collections::VecDeque,
    io::{ErrorKind, Read},
};

use log::trace;
use thiserror::Error;

use ublox::{Parser, ParserError, proto23::Proto23};

use crate::ubx::Message;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid UBX checksum")]
    Checksum,
    #[error("invalid UBX packet: {0}")]
    InvalidPacket(String),
    #[error("invalid payload length {len} (class=0x{class:02x}, id=0x{id:02x})")]
    InvalidLength { class: u8, id: u8, len: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ParserError> for DecodeError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::InvalidChecksum { .. } => Self::Checksum,
            e => Self::InvalidPacket(e.to_string()),
        }
    }
}

impl DecodeError {
    /// Framing anomalies that only cost us one frame: the parser
    /// resynchronizes and reading may continue.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Result of one [Decoder::decode_next] step
#[derive(Debug)]
pub enum Decoded {
    /// New [Message] was framed
    Message(Message),
    /// Read timed out, no complete frame yet
    Idle,
    /// Underlying reader is exhausted
    EndOfStream,
}

/// UBX stream [Decoder], built on the `ublox` [Parser]. Bytes that do
/// not belong to a UBX frame (NMEA sentences, line noise) are discarded.
pub struct Decoder<R: Read> {
    reader: R,
    parser: Parser<Vec<u8>, Proto23>,
    pending: VecDeque<Result<Message, DecodeError>>,
    chunk: Vec<u8>,
    eos: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            eos: false,
            parser: Parser::<_, Proto23>::new(vec![]),
            pending: VecDeque::new(),
            chunk: vec![0; 1024],
        }
    }

    /// Pulls bytes from the reader until one frame is complete.
    /// Read timeouts are reported as [Decoded::Idle].
    pub fn decode_next(&mut self) -> Result<Decoded, DecodeError> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return next.map(Decoded::Message);
            }

            if self.eos {
                return Ok(Decoded::EndOfStream);
            }

            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.eos = true;
                },
                Ok(size) => {
                    self.consume(size);
                },
                Err(e) => match e.kind() {
                    ErrorKind::TimedOut | ErrorKind::WouldBlock => return Ok(Decoded::Idle),
                    ErrorKind::Interrupted => {},
                    _ => return Err(DecodeError::Io(e)),
                },
            }
        }
    }

    /// Feeds new bytes to the parser and queues everything it framed.
    fn consume(&mut self, size: usize) {
        let mut it = self.parser.consume_ubx(&self.chunk[..size]);

        while let Some(packet) = it.next() {
            match packet {
                Ok(packet) => {
                    let msg = Message::from_packet(packet);
                    if let Ok(msg) = &msg {
                        let (class, id) = msg.class_id();
                        trace!("ubx frame class=0x{:02x} id=0x{:02x}", class, id);
                    }
                    self.pending.push_back(msg);
                },
                Err(e) => {
                    self.pending.push_back(Err(e.into()));
                },
            }
        }
    }
}
