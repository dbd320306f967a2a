//! # Summary
//!
//! This module defines the `Participant`, which votes on the transaction,
//! follows the coordinator, and falls back to the termination protocol
//! when the coordinator goes silent.
//!
//! The termination protocol needs no election round: every participant
//! picks the lowest id in its membership snapshot. The elected participant
//! resolves a decision from its own state and broadcasts it; everyone else
//! keeps asking the elected participant until the decision arrives. If the
//! elected participant has left the group without answering, it is dropped
//! from the local view and the election runs again.

use std::collections::BTreeSet as Set;
use std::time;

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::Config;
use crate::error::Error;
use crate::group::{Endpoint, Group};
use crate::message::{Id, Message, Role};
use crate::process::{Cause, Termination, View};
use crate::state::ParticipantState;
use crate::storage;

pub struct Participant<L: storage::Log> {
    /// Group address
    id: Id,

    /// Shared group registry, for membership snapshots
    group: Group,

    /// Bound receiving side
    endpoint: Endpoint,

    /// Write-ahead log of state entries
    log: L,

    /// Membership snapshot taken in `init`
    view: View,

    state: ParticipantState,

    timeout: time::Duration,

    /// Probability that local work fails
    failure_rate: f64,

    rng: StdRng,
}

impl<L: storage::Log> Participant<L> {

    /// Registers the `index`-th participant with the group and opens its stable log.
    pub fn join<S>(group: &Group, store: &S, config: &Config, index: usize) -> Result<Self, Error>
        where S: storage::Store<Log = L>
    {
        config.validate()?;
        let id = group.join(Role::Participant);
        let log = store.open(&format!("participant-{}", id))?;
        let view = View::new(id, Default::default(), Default::default());
        Ok(Participant {
            id,
            group: group.clone(),
            endpoint: group.bind(id),
            log,
            view,
            state: ParticipantState::New,
            timeout: config.timeout(),
            failure_rate: config.failure_rate(index),
            rng: config.rng(id),
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Snapshots membership and enters INIT.
    pub fn init(&mut self) -> Result<(), Error> {
        self.view = View::new(
            self.id,
            self.group.subgroup(Role::Coordinator),
            self.group.subgroup(Role::Participant),
        );
        self.enter_state(ParticipantState::Init)
    }

    pub async fn run(mut self) -> Result<Termination<ParticipantState>, Error> {

        // Nobody has voted yet, so no one can have committed either
        let (from, message) = match self.receive_coordinator().await {
        | Some(envelope) => envelope,
        | None => {
            info!("Participant {} saw no vote request, aborting locally", self.id);
            self.enter_state(ParticipantState::Abort)?;
            return Ok(self.terminate(Cause::LocalAbort))
        }
        };

        if message != Message::VoteRequest {
            return Err(self.unexpected(from, message))
        }

        if !self.do_work() {
            self.enter_state(ParticipantState::Abort)?;
            self.endpoint.send_to(self.view.coordinator(), Message::VoteAbort);
            return Ok(self.terminate(Cause::LocalAbort))
        }

        self.enter_state(ParticipantState::Ready)?;
        self.endpoint.send_to(self.view.coordinator(), Message::VoteCommit);

        loop {
            match self.state {
            | ParticipantState::Commit => return Ok(self.terminate(Cause::GlobalCommit)),
            | ParticipantState::Abort => return Ok(self.terminate(Cause::GlobalAbort)),
            | _ => (),
            }
            match self.receive_coordinator().await {
            | Some((from, message)) => self.respond(from, message)?,
            | None => self.terminate_without_coordinator().await?,
            }
        }
    }

    /// Simulated local transaction.
    fn do_work(&mut self) -> bool {
        !self.rng.gen_bool(self.failure_rate)
    }

    async fn receive_coordinator(&mut self) -> Option<(Id, Message)> {
        self.endpoint
            .receive_from(self.view.coordinator(), self.timeout)
            .await
    }

    fn respond(&mut self, from: Id, message: Message) -> Result<(), Error> {
        match (self.state, message) {
        | (ParticipantState::Ready, Message::PrepareCommit) => {
            self.enter_state(ParticipantState::Precommit)?;
            self.endpoint.send_to(self.view.coordinator(), Message::ReadyCommit);
        }
        | (ParticipantState::Ready, Message::GlobalAbort)
        | (ParticipantState::Precommit, Message::GlobalAbort) => {
            self.enter_state(ParticipantState::Abort)?;
        }
        | (ParticipantState::Precommit, Message::GlobalCommit) => {
            self.enter_state(ParticipantState::Commit)?;
        }
        | (_, message) => return Err(self.unexpected(from, message)),
        }
        Ok(())
    }

    /// Runs the termination protocol until this participant holds a
    /// decision or has resolved one itself.
    async fn terminate_without_coordinator(&mut self) -> Result<(), Error> {
        info!("Participant {} suspects coordinator crash in state {}", self.id, self.state);
        loop {
            let elected = self.view.elect();
            if elected == self.id {
                return self.resolve().await
            }

            debug!("Participant {} asking {} for a decision", self.id, elected);
            let target: Set<Id> = std::iter::once(elected).collect();
            let delivered = self.endpoint.send_to(&target, Message::NeedDecision(self.state)) > 0;

            // An elected participant that already left may still have
            // broadcast its decision, so check what has arrived first
            let timeout = if delivered { self.timeout } else { time::Duration::default() };

            match self.endpoint.receive_from(&target, timeout).await {
            | Some((from, Message::Decision(decision))) => {
                if self.adopt(from, decision)? {
                    return Ok(())
                }
            }
            | Some((from, message)) => return Err(self.unexpected(from, message)),
            | None if !delivered => {
                warn!("Participant {} cannot reach elected participant {}", self.id, elected);
                self.view.remove(elected);
            }
            | None => debug!("Participant {} retrying decision query to {}", self.id, elected),
            }
        }
    }

    /// Decides as the elected participant and tells everyone else.
    async fn resolve(&mut self) -> Result<(), Error> {
        let decision = match self.state {
        | ParticipantState::Ready => ParticipantState::Abort,
        | ParticipantState::Precommit => ParticipantState::Commit,
        | state => state,
        };
        info!("Participant {} elected to decide {} from state {}", self.id, decision, self.state);

        // Without precommit knowledge nobody else may be past READY
        let peers = self.view.peers();
        while let Some((from, message)) = self.endpoint.receive_from(&peers, time::Duration::default()).await {
            match message {
            | Message::NeedDecision(reported) => {
                debug!("Participant {} queried by {} in state {}", self.id, from, reported);
                let ahead = reported == ParticipantState::Precommit || reported == ParticipantState::Commit;
                if self.state == ParticipantState::Ready && ahead {
                    return Err(self.conflict(from, reported))
                }
            }
            | message => return Err(self.unexpected(from, message)),
            }
        }

        if decision != self.state {
            self.enter_state(decision)?;
        }
        self.endpoint.send_to(&peers, Message::Decision(decision));
        Ok(())
    }

    /// Adopts the elected participant's decision. Returns false if the
    /// decision would regress our state and was ignored.
    fn adopt(&mut self, from: Id, decision: ParticipantState) -> Result<bool, Error> {
        debug!("Participant {} received decision {} from {}", self.id, decision, from);
        if self.state == ParticipantState::Precommit && decision == ParticipantState::Abort {
            return Err(self.conflict(from, decision))
        }
        if decision == self.state {
            return Ok(true)
        }
        if !self.state.can_advance_to(decision) {
            warn!("Participant {} ignoring regressing decision {} in state {}", self.id, decision, self.state);
            return Ok(false)
        }
        self.enter_state(decision)?;
        Ok(true)
    }

    fn enter_state(&mut self, state: ParticipantState) -> Result<(), Error> {
        if !self.state.can_advance_to(state) {
            return Err(Error::IllegalTransition {
                role: Role::Participant,
                id: self.id,
                from: self.state.to_string(),
                to: state.to_string(),
            })
        }
        self.log.append(&state.to_string())?;
        info!("Participant {} entered state {}.", self.id, state);
        self.state = state;
        Ok(())
    }

    fn terminate(&self, cause: Cause) -> Termination<ParticipantState> {
        let termination = Termination {
            role: Role::Participant,
            id: self.id,
            state: self.state,
            cause,
        };
        info!("{}", termination);
        termination
    }

    fn unexpected(&self, from: Id, message: Message) -> Error {
        let error = Error::UnexpectedMessage {
            role: Role::Participant,
            id: self.id,
            state: self.state.to_string(),
            from,
            message,
        };
        error!("{}", error);
        error
    }

    fn conflict(&self, peer: Id, reported: ParticipantState) -> Error {
        let error = Error::ConflictingState {
            id: self.id,
            state: self.state.to_string(),
            peer,
            reported: reported.to_string(),
        };
        error!("{}", error);
        error
    }
}
