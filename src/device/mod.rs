use std::{
    io::{Read, Write},
    time::Duration,
};

use log::{debug, info};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to split {port}: {source}")]
    Split {
        port: String,
        #[source]
        source: serialport::Error,
    },
}

/// Serial link [Settings]
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: String,
    pub baud: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Read timeout. Shutdown is polled at this rate.
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyAMA1".to_string(),
            baud: 38_400,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(250),
        }
    }
}

/// Receiving half of the U-Blox link
pub struct PortReader(Box<dyn SerialPort>);

/// Transmitting half of the U-Blox link
pub struct PortWriter(Box<dyn SerialPort>);

impl Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Opens the serial port and splits it into a reader and a writer.
/// The port closes once both halves are dropped.
pub fn open(settings: &Settings) -> Result<(PortReader, PortWriter), DeviceError> {
    let port = serialport::new(&settings.port, settings.baud)
        .data_bits(DataBits::Eight)
        .parity(settings.parity)
        .stop_bits(settings.stop_bits)
        .timeout(settings.timeout)
        .open()
        .map_err(|source| DeviceError::Open {
            port: settings.port.clone(),
            source,
        })?;

    let writer = port.try_clone().map_err(|source| DeviceError::Split {
        port: settings.port.clone(),
        source,
    })?;

    info!(
        "{} - opened ({} bauds, {:?} parity, {:?} stop bit)",
        settings.port, settings.baud, settings.parity, settings.stop_bits
    );

    debug!("{} - read timeout {:?}", settings.port, settings.timeout);

    Ok((PortReader(port), PortWriter(writer)))
}
