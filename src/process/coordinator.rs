//! # Summary
//!
//! This module defines the `Coordinator`, which drives one transaction
//! through the vote, prepare-commit and global-decision rounds.
//!
//! Every state is appended to the stable log before the round's broadcast
//! goes out. Crash points from `FaultInjection` stop the run right after a
//! state is entered; a crashed coordinator never resumes.

use std::collections::BTreeSet as Set;
use std::time;

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{Config, FaultInjection};
use crate::error::Error;
use crate::group::{Endpoint, Group};
use crate::message::{Id, Message, Role};
use crate::process::{Cause, Termination};
use crate::state::CoordinatorState;
use crate::storage;

pub struct Coordinator<L: storage::Log> {
    /// Group address
    id: Id,

    /// Shared group registry, for membership snapshots
    group: Group,

    /// Bound receiving side
    endpoint: Endpoint,

    /// Write-ahead log of state entries
    log: L,

    /// Snapshot of participants taken in `init`
    participants: Set<Id>,

    /// `None` until `init`
    state: Option<CoordinatorState>,

    timeout: time::Duration,

    faults: FaultInjection,

    rng: StdRng,
}

impl<L: storage::Log> Coordinator<L> {

    /// Registers a coordinator with the group and opens its stable log.
    pub fn join<S>(group: &Group, store: &S, config: &Config) -> Result<Self, Error>
        where S: storage::Store<Log = L>
    {
        config.validate()?;
        let id = group.join(Role::Coordinator);
        let log = store.open(&format!("coordinator-{}", id))?;
        Ok(Coordinator {
            id,
            group: group.clone(),
            endpoint: group.bind(id),
            log,
            participants: Set::new(),
            state: None,
            timeout: config.timeout(),
            faults: config.faults(),
            rng: config.rng(id),
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Enters INIT and snapshots the participant set.
    pub fn init(&mut self) -> Result<(), Error> {
        self.enter_state(CoordinatorState::Init)?;
        self.participants = self.group.subgroup(Role::Participant);
        Ok(())
    }

    pub async fn run(mut self) -> Result<Termination<CoordinatorState>, Error> {
        if self.crash(self.faults.init) {
            return Ok(self.terminate(Cause::Crashed))
        }

        self.enter_state(CoordinatorState::Wait)?;
        self.endpoint.send_to(&self.participants, Message::VoteRequest);

        if self.crash(self.faults.wait) {
            return Ok(self.terminate(Cause::Crashed))
        }

        // Any abort vote or a missing vote aborts the transaction
        let mut waiting = self.participants.clone();
        while !waiting.is_empty() {
            match self.endpoint.receive_from(&self.participants, self.timeout).await {
            | None => {
                info!("Coordinator {} timed out waiting for votes from {:?}", self.id, waiting);
                return self.abort(Cause::Timeout)
            }
            | Some((from, Message::VoteAbort)) => {
                return self.abort(Cause::LocalAbortFrom(from))
            }
            | Some((from, Message::VoteCommit)) => {
                if !waiting.remove(&from) {
                    return Err(self.unexpected(from, Message::VoteCommit))
                }
                debug!("Coordinator {} received commit vote from {}", self.id, from);
            }
            | Some((from, message)) => return Err(self.unexpected(from, message)),
            }
        }

        self.enter_state(CoordinatorState::Precommit)?;
        self.endpoint.send_to(&self.participants, Message::PrepareCommit);

        if self.crash(self.faults.precommit) {
            return Ok(self.terminate(Cause::Crashed))
        }

        // Participants in PRECOMMIT resolve to commit on their own, so a
        // missing acknowledgement only ends the wait
        let mut waiting = self.participants.clone();
        while !waiting.is_empty() {
            match self.endpoint.receive_from(&self.participants, self.timeout).await {
            | None => {
                warn!("Coordinator {} missing READY_COMMIT from {:?}", self.id, waiting);
                break
            }
            | Some((from, Message::ReadyCommit)) => {
                if !waiting.remove(&from) {
                    return Err(self.unexpected(from, Message::ReadyCommit))
                }
                debug!("Coordinator {} received READY_COMMIT from {}", self.id, from);
            }
            | Some((from, message)) => return Err(self.unexpected(from, message)),
            }
        }

        self.enter_state(CoordinatorState::Commit)?;
        self.endpoint.send_to(&self.participants, Message::GlobalCommit);
        Ok(self.terminate(Cause::GlobalCommit))
    }

    fn abort(&mut self, cause: Cause) -> Result<Termination<CoordinatorState>, Error> {
        self.enter_state(CoordinatorState::Abort)?;
        self.endpoint.send_to(&self.participants, Message::GlobalAbort);
        Ok(self.terminate(cause))
    }

    fn crash(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.rng.gen_bool(rate)
    }

    fn current(&self) -> CoordinatorState {
        self.state.unwrap_or(CoordinatorState::Init)
    }

    fn enter_state(&mut self, state: CoordinatorState) -> Result<(), Error> {
        let legal = match self.state {
        | None => state == CoordinatorState::Init,
        | Some(current) => current.can_advance_to(state),
        };
        if !legal {
            return Err(Error::IllegalTransition {
                role: Role::Coordinator,
                id: self.id,
                from: self.state.map_or_else(|| "NONE".to_string(), |state| state.to_string()),
                to: state.to_string(),
            })
        }
        self.log.append(&state.to_string())?;
        info!("Coordinator {} entered state {}.", self.id, state);
        self.state = Some(state);
        Ok(())
    }

    fn terminate(&self, cause: Cause) -> Termination<CoordinatorState> {
        let termination = Termination {
            role: Role::Coordinator,
            id: self.id,
            state: self.current(),
            cause,
        };
        info!("{}", termination);
        termination
    }

    fn unexpected(&self, from: Id, message: Message) -> Error {
        let error = Error::UnexpectedMessage {
            role: Role::Coordinator,
            id: self.id,
            state: self.current().to_string(),
            from,
            message,
        };
        error!("{}", error);
        error
    }
}
