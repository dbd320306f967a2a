use crate::message::{Id, Message, Role};

/// Failures that stop a process. Timeouts and failed local work are
/// protocol outcomes and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Peer sent a message that is illegal in the receiver's current state.
    #[error("{role} {id} received unexpected {message} from {from} in state {state}")]
    UnexpectedMessage {
        role: Role,
        id: Id,
        state: String,
        from: Id,
        message: Message,
    },

    /// Attempted transition would regress the recorded state.
    #[error("{role} {id} cannot move from state {from} to {to}")]
    IllegalTransition {
        role: Role,
        id: Id,
        from: String,
        to: String,
    },

    /// A peer is further along than the decision being resolved or adopted.
    #[error("participant {id} in state {state} conflicts with {peer} reporting {reported}")]
    ConflictingState {
        id: Id,
        state: String,
        peer: Id,
        reported: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("stable log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stable log encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Process task panicked or was cancelled.
    #[error("process task failed: {0}")]
    Task(String),
}
