use std::{collections::BTreeMap, io::Write, sync::Arc, time::Duration};

use hifitime::prelude::Epoch;
use log::{debug, error, info, trace, warn};
use thiserror::Error;
use tokio::{sync::oneshot, time::Instant};

use crate::{
    assistance::{AssistanceSource, SourceError},
    handlers::{AckCorrelator, AcquiredTime},
    ubx::{AssistanceAck, AssistanceRecord, EncodeError},
    utils::gnss_name,
};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("timeout waiting for ack (gnss={gnss_id}, sv={sv_id})")]
    AckTimeout { gnss_id: u8, sv_id: u8 },
    #[error("ack channel closed")]
    AckChannelClosed,
    #[error("failed to write record: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Upload [State]s
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    TimeGate,
    Filtering,
    Sending,
    AwaitingAck,
    Done,
    Failed,
}

/// Record selection [Mode], resolved by the time gate
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Mode {
    /// Only records valid on this day
    DateFiltered(Epoch),
    /// Every record, regardless of its date
    LoadAll,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximal wait for each ack
    pub ack_timeout: Duration,
    /// Pause after each write
    pub write_pause: Duration,
    /// Only accept acks that match the record just sent
    pub strict_ack: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(5),
            write_pause: Duration::from_millis(100),
            strict_ack: false,
        }
    }
}

/// Upload [Summary]. Counts are partial when `state` is [State::Failed].
#[derive(Debug, Default)]
pub struct Summary {
    pub state: State,
    /// Records pulled out of the source
    pub records_considered: usize,
    /// Records written to the receiver
    pub records_sent: usize,
    /// Records that were acknowledged
    pub records_acknowledged: usize,
    /// Acknowledged, but not accepted by the receiver
    pub records_rejected: usize,
    /// Acks ignored because they did not match (strict mode only)
    pub acks_mismatched: usize,
    /// Sent records, per GNSS id
    pub sent_per_gnss: BTreeMap<u8, usize>,
    /// Cause of [State::Failed]
    pub first_error: Option<UploadError>,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.state == State::Done
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:?}: considered={} sent={} acknowledged={} rejected={}",
            self.state,
            self.records_considered,
            self.records_sent,
            self.records_acknowledged,
            self.records_rejected
        )?;

        for (gnss_id, count) in self.sent_per_gnss.iter() {
            write!(f, " {}={}", gnss_name(*gnss_id), count)?;
        }

        if let Some(e) = &self.first_error {
            write!(f, " ({})", e)?;
        }

        Ok(())
    }
}

/// Lock-step AssistNow Offline [Uploader]: one record is written,
/// then its ack is awaited (bounded) before the next one is considered.
/// No pipelining: there is never more than one record in flight.
pub struct Uploader<W: Write> {
    writer: W,
    correlator: Arc<AckCorrelator>,
    settings: Settings,
    state: State,
    summary: Summary,
}

impl<W: Write> Uploader<W> {
    pub fn new(writer: W, correlator: Arc<AckCorrelator>, settings: Settings) -> Self {
        Self {
            writer,
            settings,
            correlator,
            state: State::Idle,
            summary: Default::default(),
        }
    }

    /// Current [State]
    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, state: State) {
        if self.state != state {
            trace!("upload: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Races the time acquisition against the grace period.
    pub async fn time_gate(&mut self, time: &mut AcquiredTime, grace: Duration) -> Mode {
        self.transition(State::TimeGate);

        match time.wait_for(grace).await {
            Some(t) => {
                info!("{} - uploading records valid on this day", t);
                Mode::DateFiltered(t)
            },
            None => {
                warn!("no valid time within {:?}: uploading all records", grace);
                Mode::LoadAll
            },
        }
    }

    /// Uploads the selected records and returns the [Summary].
    pub async fn run<S: AssistanceSource>(mut self, mode: Mode, source: &mut S) -> Summary {
        match self.upload(mode, source).await {
            Ok(()) => {
                self.transition(State::Done);
                info!("upload completed: {} record(s) sent", self.summary.records_sent);
            },
            Err(e) => {
                self.transition(State::Failed);
                error!("upload failed: {}", e);
                self.summary.first_error = Some(e);
            },
        }

        self.summary.state = self.state;
        self.summary
    }

    async fn upload<S: AssistanceSource>(
        &mut self,
        mode: Mode,
        source: &mut S,
    ) -> Result<(), UploadError> {
        loop {
            self.transition(State::Filtering);

            let Some(record) = source.next_record()? else {
                return Ok(());
            };

            self.summary.records_considered += 1;

            if let Mode::DateFiltered(t) = mode {
                if !record.is_valid_on(t) {
                    let (y, m, d) = record.date();
                    trace!(
                        "{}({}) - skipping record of {:04}-{:02}-{:02}",
                        gnss_name(record.gnss_id),
                        record.sv_id,
                        y,
                        m,
                        d
                    );
                    continue;
                }
            }

            self.transition(State::Sending);

            let pending = self.send(&record).await?;

            self.transition(State::AwaitingAck);

            let ack = self.await_ack(&record, pending).await?;

            self.summary.records_acknowledged += 1;

            if !ack.accepted() {
                self.summary.records_rejected += 1;
                warn!(
                    "{}({}) - record not accepted: {:?}",
                    gnss_name(record.gnss_id),
                    record.sv_id,
                    ack.info_code
                );
            }
        }
    }

    /// Writes one record. The ack slot is armed prior writing.
    async fn send(
        &mut self,
        record: &AssistanceRecord,
    ) -> Result<oneshot::Receiver<AssistanceAck>, UploadError> {
        let bytes = record.encode()?;

        let pending = self.correlator.arm();

        self.writer
            .write_all(&bytes)
            .and_then(|_| self.writer.flush())
            .map_err(UploadError::Write)?;

        self.summary.records_sent += 1;
        *self.summary.sent_per_gnss.entry(record.gnss_id).or_default() += 1;

        debug!(
            "{}({}) - MGA-ANO sent",
            gnss_name(record.gnss_id),
            record.sv_id
        );

        if !self.settings.write_pause.is_zero() {
            tokio::time::sleep(self.settings.write_pause).await;
        }

        Ok(pending)
    }

    async fn await_ack(
        &mut self,
        record: &AssistanceRecord,
        mut pending: oneshot::Receiver<AssistanceAck>,
    ) -> Result<AssistanceAck, UploadError> {
        let deadline = Instant::now() + self.settings.ack_timeout;

        loop {
            let ack = match tokio::time::timeout_at(deadline, &mut pending).await {
                Ok(Ok(ack)) => ack,
                Ok(Err(_)) => return Err(UploadError::AckChannelClosed),
                Err(_) => {
                    return Err(UploadError::AckTimeout {
                        gnss_id: record.gnss_id,
                        sv_id: record.sv_id,
                    });
                },
            };

            if self.settings.strict_ack && !ack.acknowledges(record) {
                warn!(
                    "{}({}) - ignoring ack for gnss={} sv={}",
                    gnss_name(record.gnss_id),
                    record.sv_id,
                    ack.gnss_id(),
                    ack.satellite_id()
                );
                self.summary.acks_mismatched += 1;
                pending = self.correlator.arm();
                continue;
            }

            return Ok(ack);
        }
    }
}
