use serde_derive::{Deserialize, Serialize};

use crate::state::ParticipantState;

/// Group-unique process address. Ids are handed out in join order,
/// which gives the total order the election relies on.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub usize);

impl std::fmt::Display for Id {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// Roles a process can register under.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Coordinator,
    Participant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
        | Role::Coordinator => write!(fmt, "Coordinator"),
        | Role::Participant => write!(fmt, "Participant"),
        }
    }
}

/// Protocol messages exchanged over the group channel.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Message {
    /// Coordinator asks every participant to vote.
    VoteRequest,

    /// Participant finished its local work.
    VoteCommit,

    /// Participant failed its local work.
    VoteAbort,

    /// Every participant voted to commit.
    PrepareCommit,

    /// Participant acknowledges `PrepareCommit`.
    ReadyCommit,

    GlobalCommit,

    GlobalAbort,

    /// Decision query sent to the elected participant, tagged with the
    /// state of the participant asking.
    NeedDecision(ParticipantState),

    /// State resolved by the elected participant.
    Decision(ParticipantState),
}

impl std::fmt::Display for Message {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
        | Message::VoteRequest => write!(fmt, "VOTE_REQUEST"),
        | Message::VoteCommit => write!(fmt, "VOTE_COMMIT"),
        | Message::VoteAbort => write!(fmt, "VOTE_ABORT"),
        | Message::PrepareCommit => write!(fmt, "PREPARE_COMMIT"),
        | Message::ReadyCommit => write!(fmt, "READY_COMMIT"),
        | Message::GlobalCommit => write!(fmt, "GLOBAL_COMMIT"),
        | Message::GlobalAbort => write!(fmt, "GLOBAL_ABORT"),
        | Message::NeedDecision(state) => write!(fmt, "NEED_DECISION({})", state),
        | Message::Decision(state) => write!(fmt, "DECISION({})", state),
        }
    }
}
