//! # Summary
//!
//! State machines for both protocol roles. Declaration order is the
//! protocol order, so the derived `Ord` compares progress along the
//! commit path. `Abort` sits off that path and is only reachable through
//! the explicit transitions below.

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParticipantState {
    New,
    Init,
    Ready,
    Precommit,
    Commit,
    Abort,
}

impl ParticipantState {
    pub fn is_terminal(self) -> bool {
        match self {
        | ParticipantState::Commit | ParticipantState::Abort => true,
        | _ => false,
        }
    }

    /// Whether moving to `next` keeps the recorded state monotone.
    pub fn can_advance_to(self, next: ParticipantState) -> bool {
        match (self, next) {
        | (current, _) if current.is_terminal() => false,
        | (ParticipantState::New, ParticipantState::Abort) => false,
        | (_, ParticipantState::Abort) => true,
        | (current, next) => next > current,
        }
    }
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
        | ParticipantState::New => "NEW",
        | ParticipantState::Init => "INIT",
        | ParticipantState::Ready => "READY",
        | ParticipantState::Precommit => "PRECOMMIT",
        | ParticipantState::Commit => "COMMIT",
        | ParticipantState::Abort => "ABORT",
        };
        write!(fmt, "{}", name)
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoordinatorState {
    Init,
    Wait,
    Precommit,
    Commit,
    Abort,
}

impl CoordinatorState {
    pub fn is_terminal(self) -> bool {
        match self {
        | CoordinatorState::Commit | CoordinatorState::Abort => true,
        | _ => false,
        }
    }

    /// Coordinators may only abort while collecting votes.
    pub fn can_advance_to(self, next: CoordinatorState) -> bool {
        match (self, next) {
        | (CoordinatorState::Init, CoordinatorState::Wait)
        | (CoordinatorState::Wait, CoordinatorState::Precommit)
        | (CoordinatorState::Wait, CoordinatorState::Abort)
        | (CoordinatorState::Precommit, CoordinatorState::Commit) => true,
        | _ => false,
        }
    }
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
        | CoordinatorState::Init => "INIT",
        | CoordinatorState::Wait => "WAIT",
        | CoordinatorState::Precommit => "PRECOMMIT",
        | CoordinatorState::Commit => "COMMIT",
        | CoordinatorState::Abort => "ABORT",
        };
        write!(fmt, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::ParticipantState::*;
    use super::CoordinatorState;

    #[test]
    fn participant_moves_forward_only() {
        assert!(New.can_advance_to(Init));
        assert!(Init.can_advance_to(Ready));
        assert!(Ready.can_advance_to(Precommit));
        assert!(Ready.can_advance_to(Commit));
        assert!(Precommit.can_advance_to(Commit));
        assert!(!Precommit.can_advance_to(Ready));
        assert!(!Ready.can_advance_to(Init));
        assert!(!Ready.can_advance_to(Ready));
    }

    #[test]
    fn participant_aborts_from_active_states() {
        assert!(Init.can_advance_to(Abort));
        assert!(Ready.can_advance_to(Abort));
        assert!(Precommit.can_advance_to(Abort));
        assert!(!New.can_advance_to(Abort));
    }

    #[test]
    fn terminal_states_are_final() {
        for next in &[New, Init, Ready, Precommit, Commit, Abort] {
            assert!(!Commit.can_advance_to(*next));
            assert!(!Abort.can_advance_to(*next));
        }
    }

    #[test]
    fn coordinator_aborts_only_while_waiting() {
        assert!(CoordinatorState::Wait.can_advance_to(CoordinatorState::Abort));
        assert!(!CoordinatorState::Init.can_advance_to(CoordinatorState::Abort));
        assert!(!CoordinatorState::Precommit.can_advance_to(CoordinatorState::Abort));
        assert!(!CoordinatorState::Init.can_advance_to(CoordinatorState::Precommit));
        assert!(CoordinatorState::Precommit.can_advance_to(CoordinatorState::Commit));
    }

    #[test]
    fn renders_upper_case() {
        assert_eq!(Precommit.to_string(), "PRECOMMIT");
        assert_eq!(CoordinatorState::Wait.to_string(), "WAIT");
    }
}
