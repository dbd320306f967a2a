use std::time;

use hashbrown::HashMap as Map;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::group::Group;
use crate::message::Id;
use crate::process::{Coordinator, Participant, Report};
use crate::storage;

/// Crash probabilities for the coordinator, checked right after it
/// enters each state. Meant for fault-tolerance testing.
#[derive(Serialize, Deserialize)]
#[serde(default)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FaultInjection {
    /// Crash before sending the vote request
    pub init: f64,

    /// Crash right after sending the vote request
    pub wait: f64,

    /// Crash right after sending prepare-commit
    pub precommit: f64,
}

impl FaultInjection {
    pub fn none() -> Self {
        FaultInjection::default()
    }

    pub fn crash_in_init(mut self, rate: f64) -> Self {
        self.init = rate;
        self
    }

    pub fn crash_in_wait(mut self, rate: f64) -> Self {
        self.wait = rate;
        self
    }

    pub fn crash_in_precommit(mut self, rate: f64) -> Self {
        self.precommit = rate;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Number of participants
    participants: usize,

    /// Bound on every receive
    timeout: time::Duration,

    /// Coordinator crash points
    faults: FaultInjection,

    /// Probability that a participant's local work fails
    failure_rate: f64,

    /// Per-participant overrides of `failure_rate`, by join index
    failures: Map<usize, f64>,

    /// Seed for reproducible runs
    seed: Option<u64>,
}

impl Config {
    pub fn new(participants: usize) -> Self {
        Config {
            participants,
            timeout: time::Duration::from_secs(1),
            faults: FaultInjection::none(),
            failure_rate: 0.0,
            failures: Map::default(),
            seed: None,
        }
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_faults(mut self, faults: FaultInjection) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Overrides the failure rate of the participant that joins `index`-th.
    pub fn with_participant_failure_rate(mut self, index: usize, rate: f64) -> Self {
        self.failures.insert(index, rate);
        self
    }

    /// Makes the participant that joins `index`-th fail its local work.
    pub fn with_failing(self, index: usize) -> Self {
        self.with_participant_failure_rate(index, 1.0)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    pub fn timeout(&self) -> time::Duration {
        self.timeout
    }

    pub fn faults(&self) -> FaultInjection {
        self.faults
    }

    pub fn failure_rate(&self, index: usize) -> f64 {
        self.failures
            .get(&index)
            .copied()
            .unwrap_or(self.failure_rate)
    }

    /// Random source for process `id`. Seeded runs give every process a
    /// distinct but reproducible stream.
    pub fn rng(&self, id: Id) -> StdRng {
        match self.seed {
        | Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.0 as u64)),
        | None => StdRng::from_entropy(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.participants == 0 {
            return Err(Error::Config("at least one participant is required".to_string()))
        }
        if self.timeout == time::Duration::default() {
            return Err(Error::Config("timeout must be positive".to_string()))
        }
        let rates = [
            ("init crash rate", self.faults.init),
            ("wait crash rate", self.faults.wait),
            ("precommit crash rate", self.faults.precommit),
            ("failure rate", self.failure_rate),
        ];
        let overrides = self.failures
            .values()
            .map(|rate| ("participant failure rate", *rate));
        for (name, rate) in rates.iter().copied().chain(overrides) {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!("{} {} is outside [0, 1]", name, rate)))
            }
        }
        Ok(())
    }

    /// Runs one transaction: a coordinator and `participants` participants
    /// over a fresh group, each process on its own task.
    ///
    /// Everyone joins and takes its membership snapshot before any run
    /// loop starts, so every view is identical.
    pub async fn run<S: storage::Store>(self, store: S) -> Result<Report, Error> {
        self.validate()?;

        let group = Group::new();
        let mut coordinator = Coordinator::join(&group, &store, &self)?;
        let mut participants = (0..self.participants)
            .map(|index| Participant::join(&group, &store, &self, index))
            .collect::<Result<Vec<_>, _>>()?;

        coordinator.init()?;
        for participant in &mut participants {
            participant.init()?;
        }

        let coordinator = tokio::spawn(coordinator.run());
        let participants = participants
            .into_iter()
            .map(|participant| tokio::spawn(participant.run()))
            .collect::<Vec<_>>();

        let coordinator = Self::join_task(coordinator.await);
        let mut results = Vec::with_capacity(participants.len());
        for participant in participants {
            results.push(Self::join_task(participant.await));
        }

        Ok(Report {
            coordinator,
            participants: results,
        })
    }

    fn join_task<T>(result: Result<Result<T, Error>, tokio::task::JoinError>) -> Result<T, Error> {
        result.map_err(|error| Error::Task(error.to_string()))?
    }
}
