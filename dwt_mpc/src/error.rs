use std::io;

use futures::channel::oneshot;
use thiserror::Error;

use crate::beaver::TripleState;
use crate::transport::TransportError;

/// Errors of the dealer, preprocessing and online protocols.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    ProtocolState(#[from] ProtocolStateError),
    #[error("bundle store exhausted after {completed} evaluations")]
    StoreExhausted { completed: usize },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("worker pool task was dropped before completing")]
    WorkerCanceled(#[from] oneshot::Canceled),
    #[error("invalid parameters: {0}")]
    Parameters(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Beaver triple operation invoked outside its required state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolStateError {
    #[error("invalid state transition: cannot {operation} a triple in state {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: TripleState,
    },
    #[error("triple not ready")]
    NotReady,
}

/// Failure reported by an FSS or DCF engine.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("FSS engine: {0}")]
    Fss(String),
    #[error("DCF engine: {0}")]
    Dcf(String),
}

/// A role run that stopped early, with the byte counters accumulated before
/// the failure.
#[derive(Debug, Error)]
#[error("run aborted: {error}")]
pub struct Aborted<C> {
    #[source]
    pub error: Error,
    pub partial: C,
}

impl<C> Aborted<C> {
    pub fn new(error: impl Into<Error>, partial: C) -> Self {
        Self {
            error: error.into(),
            partial,
        }
    }
}
