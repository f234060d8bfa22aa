#![doc(
    html_logo_url = "https://raw.githubusercontent.com/nav-solutions/.github/master/logos/logo2.jpg"
)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

/*
 * ANOLOADER is part of the nav-solutions framework.
 * Authors: Guillaume W. Bres <guillaume.bressaix@gmail.com> et al,
 * (cf. https://github.com/nav-solutions/anoloader/graphs/contributors)
 * This framework is shipped under Mozilla Public V2 license.
 *
 * Documentation: https://github.com/nav-solutions/anoloader
 */

use env_logger::{Builder, Env, Target};

use log::{debug, error, info, warn};

use tokio::{
    signal,
    sync::watch,
    task::{JoinError, JoinHandle},
};

use std::sync::Arc;

mod assistance;
mod cli;
mod clock;
mod device;
mod dispatcher;
mod error;
mod handlers;
mod ubx;
mod uploader;
mod utils;

use crate::{
    assistance::AnoFile,
    cli::Cli,
    clock::{DateCommand, NoopClock, SystemClock},
    dispatcher::{DispatchError, DispatchStats, Dispatcher, HandlerRegistry},
    error::Error,
    handlers::{AckCorrelator, Monitor, TimeAcquisition},
    ubx::MessageType,
    uploader::{Summary, Uploader},
};

type ReadLoop = JoinHandle<Result<DispatchStats, DispatchError>>;

type ReadLoopResult = Result<Result<DispatchStats, DispatchError>, JoinError>;

async fn run(cli: &Cli) -> Result<Summary, Error> {
    // assistance file is verified before the link is opened
    let path = cli.assistance_file();
    let mut source = AnoFile::open(&path)?;

    let (reader, writer) = device::open(&cli.serial_settings())?;

    let clock: Arc<dyn SystemClock> = if cli.set_clock() {
        Arc::new(DateCommand::default())
    } else {
        Arc::new(NoopClock)
    };

    let registry = Arc::new(HandlerRegistry::new());

    let mut time = TimeAcquisition::install(&registry, clock);

    let correlator = Arc::new(AckCorrelator::new());
    registry.register(MessageType::AssistanceAck, correlator.clone());

    let monitor = cli.monitor().then(|| Monitor::install(&registry));

    // shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Dispatcher::new(reader, registry.clone()).with_shutdown(shutdown_rx);

    let mut read_loop: ReadLoop = tokio::task::spawn_blocking(move || dispatcher.run());
    let mut read_result: Option<ReadLoopResult> = None;

    let grace = cli.grace_period();
    let uploader = Uploader::new(writer, correlator.clone(), cli.upload_settings());

    let upload = async {
        let mut uploader = uploader;
        let mode = uploader.time_gate(&mut time, grace).await;
        uploader.run(mode, &mut source).await
    };

    let outcome = tokio::select! {
        summary = upload => Ok(summary),
        joined = &mut read_loop => {
            read_result = Some(joined);
            Err(Error::LinkClosed)
        },
        _ = signal::ctrl_c() => {
            warn!("interrupted during upload");
            Err(Error::Interrupted)
        },
    };

    if source.skipped() > 0 {
        warn!(
            "{} non MGA-ANO frame(s) ignored in \"{}\"",
            source.skipped(),
            path.display()
        );
    }

    if let Ok(summary) = &outcome {
        info!("upload summary - {}", summary);

        let mut interrupted = false;

        if summary.is_success() && read_result.is_none() && time.epoch().is_none() {
            info!("waiting for time..");

            tokio::select! {
                t = time.wait() => {
                    if let Some(t) = t {
                        info!("{} - time acquired", t);
                    }
                },
                joined = &mut read_loop => {
                    read_result = Some(joined);
                },
                _ = signal::ctrl_c() => {
                    warn!("interrupted while waiting for time");
                    interrupted = true;
                },
            }
        }

        if monitor.is_some() && read_result.is_none() && !interrupted {
            info!("monitoring, Ctrl+C to exit..");

            tokio::select! {
                joined = &mut read_loop => {
                    read_result = Some(joined);
                },
                _ = signal::ctrl_c() => {},
            }
        }
    }

    let _ = shutdown_tx.send(true);

    let joined = match read_result {
        Some(joined) => joined,
        None => read_loop.await,
    };

    // fatal read loop conditions (clock failure, corrupt stream) prevail
    let stats = joined??;

    debug!(
        "read loop - {} message(s), {} unhandled, {} anomalies",
        stats.messages, stats.unhandled, stats.anomalies
    );

    if let Some(monitor) = &monitor {
        debug!("monitor - {} message(s) dumped", monitor.dumped());
    }

    if correlator.is_waiting() {
        debug!("upload abandoned while awaiting an ack");
    }

    if correlator.unsolicited() > 0 {
        warn!("{} unsolicited ack(s) dropped", correlator.unsolicited());
    }

    outcome
}

#[tokio::main]
pub async fn main() {
    // cli
    let cli = Cli::new();

    let default_level = if cli.verbose() { "debug" } else { "info" };

    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    match run(&cli).await {
        Ok(summary) => {
            if !summary.is_success() {
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        },
    }
}
