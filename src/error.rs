use thiserror::Error;

use crate::{assistance::SourceError, device::DeviceError, dispatcher::DispatchError};

/// Process level [Error]s
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("read loop terminated abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("link closed before upload completion")]
    LinkClosed,
    #[error("interrupted")]
    Interrupted,
}
