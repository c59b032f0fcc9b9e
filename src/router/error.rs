//! Router errors.

use thiserror::Error;

use crate::bus::BusError;

#[derive(Debug, Error)]
pub enum RouterError {
    /// `run` was called on a router that already ran.
    #[error("router is already running")]
    AlreadyRunning,
    /// A registration could not be subscribed; earlier ones were stopped.
    #[error("failed to subscribe {topic}/{group}: {source}")]
    Subscribe {
        topic: String,
        group: String,
        #[source]
        source: BusError,
    },
}
