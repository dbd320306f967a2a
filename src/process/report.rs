use std::fmt;

use crate::error::Error;
use crate::message::{Id, Role};
use crate::state::{CoordinatorState, ParticipantState};

/// Why a process stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cause {
    /// Coordinator gave up waiting for votes.
    Timeout,

    /// Coordinator received `VOTE_ABORT` from the given participant.
    LocalAbortFrom(Id),

    /// Participant failed its local work, or never saw a vote request.
    LocalAbort,

    GlobalCommit,

    GlobalAbort,

    /// Injected coordinator crash.
    Crashed,
}

impl fmt::Display for Cause {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
        | Cause::Timeout => write!(fmt, "timeout"),
        | Cause::LocalAbortFrom(id) => write!(fmt, "local_abort from {}", id),
        | Cause::LocalAbort => write!(fmt, "LOCAL_ABORT"),
        | Cause::GlobalCommit => write!(fmt, "GLOBAL_COMMIT"),
        | Cause::GlobalAbort => write!(fmt, "GLOBAL_ABORT"),
        | Cause::Crashed => write!(fmt, "crash"),
        }
    }
}

/// Final word of a process's `run` loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Termination<S> {
    pub role: Role,
    pub id: Id,
    pub state: S,
    pub cause: Cause,
}

impl<S: fmt::Display> fmt::Display for Termination<S> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.cause {
        | Cause::Crashed => write!(
            fmt,
            "{} {} crashed in state {}.",
            self.role, self.id, self.state,
        ),
        | cause => write!(
            fmt,
            "{} {} terminated in state {} due to {}.",
            self.role, self.id, self.state, cause,
        ),
        }
    }
}

/// Results of every process in one transaction.
#[derive(Debug)]
pub struct Report {
    pub coordinator: Result<Termination<CoordinatorState>, Error>,
    pub participants: Vec<Result<Termination<ParticipantState>, Error>>,
}

impl Report {
    /// Common final state of every participant that returned normally,
    /// or `None` if they disagree or none returned.
    pub fn decision(&self) -> Option<ParticipantState> {
        let mut states = self.participants
            .iter()
            .filter_map(|result| result.as_ref().ok())
            .map(|termination| termination.state);
        let first = states.next()?;
        if states.all(|state| state == first) {
            Some(first)
        } else {
            None
        }
    }

    /// Whether any process stopped with an error.
    pub fn has_errors(&self) -> bool {
        self.coordinator.is_err() || self.participants.iter().any(Result::is_err)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.coordinator {
        | Ok(termination) => writeln!(fmt, "{}", termination)?,
        | Err(error) => writeln!(fmt, "Coordinator failed: {}", error)?,
        }
        for participant in &self.participants {
            match participant {
            | Ok(termination) => writeln!(fmt, "{}", termination)?,
            | Err(error) => writeln!(fmt, "Participant failed: {}", error)?,
            }
        }
        Ok(())
    }
}
