use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command, value_parser};
use hifitime::prelude::Duration;
use serialport::{Parity, StopBits};

use std::{path::PathBuf, str::FromStr};

use crate::{
    device::Settings as SerialSettings, uploader::Settings as UploadSettings,
    utils::to_std_duration,
};

/// Parses hifitime [Duration] descriptions, like "5 s" or "100 ms"
fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    let dt = Duration::from_str(s.trim())
        .map_err(|e| format!("invalid duration \"{}\": {}", s, e))?;

    if dt.total_nanoseconds() < 0 {
        return Err(format!("negative duration \"{}\"", s));
    }

    Ok(to_std_duration(dt))
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    match s.trim().to_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "odd" | "o" => Ok(Parity::Odd),
        "even" | "e" => Ok(Parity::Even),
        _ => Err(format!("invalid parity \"{}\"", s)),
    }
}

fn parse_stop_bits(s: &str) -> Result<StopBits, String> {
    match s.trim() {
        "1" => Ok(StopBits::One),
        "2" => Ok(StopBits::Two),
        _ => Err(format!("invalid number of stop bits \"{}\"", s)),
    }
}

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    fn command() -> Command {
        Command::new("anoloader")
            .author("Guillaume W. Bres, <guillaume.bressaix@gmail.com>")
            .version(env!("CARGO_PKG_VERSION"))
            .about("U-Blox AssistNow Offline loader and system time synchronizer")
            .color(ColorChoice::Always)
            .arg_required_else_help(true)
            .arg(
                Arg::new("file")
                    .value_name("FILENAME")
                    .required(true)
                    .value_parser(value_parser!(PathBuf))
                    .help("AssistNow Offline file (UBX-MGA-ANO frames).
Gzip compressed files are supported, they must be terminated with '.gz'"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Raise default log level to debug. RUST_LOG has precedence."),
            )
            .next_help_heading("Serial port")
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .default_value("/dev/ttyAMA1")
                    .help("Define serial port. Example /dev/ttyUSB0 on Linux"),
            )
            .arg(
                Arg::new("baudrate")
                    .short('b')
                    .long("baud")
                    .value_name("Baudrate (u32)")
                    .default_value("38400")
                    .value_parser(value_parser!(u32))
                    .help("Define serial port baud rate. Communications will not work if your U-Blox streams at a different data-rate."),
            )
            .arg(
                Arg::new("parity")
                    .long("parity")
                    .value_name("none|odd|even")
                    .default_value("none")
                    .value_parser(parse_parity)
                    .help("Define serial port parity"),
            )
            .arg(
                Arg::new("stop-bits")
                    .long("stop-bits")
                    .value_name("1|2")
                    .default_value("1")
                    .value_parser(parse_stop_bits)
                    .help("Define number of stop bits"),
            )
            .next_help_heading("Assistance upload")
            .arg(
                Arg::new("grace")
                    .long("grace")
                    .value_name("DURATION")
                    .default_value("5 s")
                    .value_parser(parse_duration)
                    .help("Maximal wait for a valid fix before uploading. When no fix came in time,
all records are uploaded, regardless of their date."),
            )
            .arg(
                Arg::new("ack-timeout")
                    .long("ack-timeout")
                    .value_name("DURATION")
                    .default_value("5 s")
                    .value_parser(parse_duration)
                    .help("Maximal wait for each MGA-ACK. Upload is aborted on timeout."),
            )
            .arg(
                Arg::new("write-pause")
                    .long("write-pause")
                    .value_name("DURATION")
                    .default_value("100 ms")
                    .value_parser(parse_duration)
                    .help("Pause after each record written"),
            )
            .arg(
                Arg::new("strict-ack")
                    .long("strict-ack")
                    .action(ArgAction::SetTrue)
                    .help("Only accept acks that match the satellite of the record just sent.
By default, any ack releases the next record."),
            )
            .next_help_heading("System time")
            .arg(
                Arg::new("no-clock")
                    .long("no-clock")
                    .action(ArgAction::SetTrue)
                    .help("Do not set the system clock, only report the acquired time"),
            )
            .next_help_heading("Monitoring")
            .arg(
                Arg::new("monitor")
                    .short('m')
                    .long("monitor")
                    .action(ArgAction::SetTrue)
                    .help("Dump every received UBX message as JSON, NAV-PVT solutions as UTC time.
The session then keeps running until Ctrl+C or the link closes."),
            )
    }

    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: Self::command().get_matches(),
        }
    }

    #[cfg(test)]
    fn try_from_args(args: &[&str]) -> Result<Self, clap::Error> {
        Ok(Self {
            matches: Self::command().try_get_matches_from(args)?,
        })
    }

    pub fn assistance_file(&self) -> PathBuf {
        self.matches
            .get_one::<PathBuf>("file")
            .cloned()
            .unwrap_or_default()
    }

    pub fn verbose(&self) -> bool {
        self.matches.get_flag("verbose")
    }

    pub fn monitor(&self) -> bool {
        self.matches.get_flag("monitor")
    }

    pub fn set_clock(&self) -> bool {
        !self.matches.get_flag("no-clock")
    }

    fn duration(&self, key: &str) -> std::time::Duration {
        self.matches
            .get_one::<std::time::Duration>(key)
            .copied()
            .unwrap_or_default()
    }

    /// Time gate duration
    pub fn grace_period(&self) -> std::time::Duration {
        self.duration("grace")
    }

    pub fn serial_settings(&self) -> SerialSettings {
        let mut settings = SerialSettings::default();

        if let Some(port) = self.matches.get_one::<String>("port") {
            settings.port = port.clone();
        }

        if let Some(baud) = self.matches.get_one::<u32>("baudrate") {
            settings.baud = *baud;
        }

        if let Some(parity) = self.matches.get_one::<Parity>("parity") {
            settings.parity = *parity;
        }

        if let Some(stop_bits) = self.matches.get_one::<StopBits>("stop-bits") {
            settings.stop_bits = *stop_bits;
        }

        settings
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            ack_timeout: self.duration("ack-timeout"),
            write_pause: self.duration("write-pause"),
            strict_ack: self.matches.get_flag("strict-ack"),
        }
    }
}
