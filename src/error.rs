use thiserror::Error;

use crate::state::NodeState;

/// Everything that can go wrong while running a node: a failed element
/// command, a failed buffer forward, a `poll(2)` failure, running out of
/// ports, or an illegal state transition. `CarriedError` is the node's own
/// "sticky" error slot — once a node enters
/// [`NodeState::Error`](crate::state::NodeState::Error) it carries the error
/// that put it there until the next suspend.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("element command failed: {0}")]
    ElementCommandFailed(String),

    #[error("forwarding buffer on port {port} failed: {source}")]
    BufferForwardFailed {
        port: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("poll(2) wait failed: {0}")]
    PollWaitFailed(#[source] std::io::Error),

    #[error("no free port available in direction {0:?}")]
    NoPortAvailable(crate::port::Direction),

    #[error("illegal state transition from {from:?} to {to:?}")]
    InvalidTransition { from: NodeState, to: NodeState },

    #[error("node is carrying a prior error: {0}")]
    CarriedError(String),

    #[error("poll set is at capacity ({0} items)")]
    PollSetFull(usize),

    #[error("failed to create eventfd: {0}")]
    EventFdCreate(#[source] std::io::Error),

    #[error("failed to create timerfd: {0}")]
    TimerFdCreate(#[source] std::io::Error),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
