use std::{io, path::PathBuf, process::Command};

use hifitime::prelude::Epoch;
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("failed to run date command: {0}")]
    Io(#[from] io::Error),
    #[error("clock update rejected: {0}")]
    Rejected(String),
}

/// Host clock the acquired time is applied to
pub trait SystemClock: Send + Sync {
    fn set_system_clock(&self, t: Epoch) -> Result<(), ClockError>;
}

/// Formats an [Epoch] the way `date --set` expects it (UTC)
pub fn date_string(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, _) = t.to_gregorian_utc();
    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, hh, mm, ss)
}

/// Sets the system clock by running `date -u --set`.
/// Requires privileges (CAP_SYS_TIME).
pub struct DateCommand {
    program: PathBuf,
}

impl Default for DateCommand {
    fn default() -> Self {
        Self::new("date")
    }
}

impl DateCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SystemClock for DateCommand {
    fn set_system_clock(&self, t: Epoch) -> Result<(), ClockError> {
        let date = date_string(t);

        let mut cmd = Command::new(&self.program);
        cmd.args(["-u", "--set", &date]);

        debug!("running {:?}", cmd);

        let output = cmd.output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ClockError::Rejected(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }));
        }

        info!("system clock set to {} UTC", date);
        Ok(())
    }
}

/// Leaves the host clock untouched
pub struct NoopClock;

impl SystemClock for NoopClock {
    fn set_system_clock(&self, t: Epoch) -> Result<(), ClockError> {
        info!("system clock left untouched (would be set to {} UTC)", date_string(t));
        Ok(())
    }
}
