use std::collections::BTreeSet as Set;

use crate::message::Id;

/// One participant's picture of the group, captured at initialization.
///
/// Membership is never refreshed from the group. The only mutation is
/// local removal of a participant presumed dead, which is how the
/// election moves past an unreachable candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    id: Id,
    coordinator: Set<Id>,
    participants: Set<Id>,
}

impl View {
    pub fn new(id: Id, coordinator: Set<Id>, mut participants: Set<Id>) -> Self {
        participants.insert(id);
        View { id, coordinator, participants }
    }

    pub fn coordinator(&self) -> &Set<Id> {
        &self.coordinator
    }

    pub fn participants(&self) -> &Set<Id> {
        &self.participants
    }

    /// Every surviving participant except ourselves.
    pub fn peers(&self) -> Set<Id> {
        self.participants
            .iter()
            .filter(|id| **id != self.id)
            .copied()
            .collect()
    }

    /// Lowest surviving id. Every participant computes this from the
    /// same snapshot, so no election messages are needed.
    pub fn elect(&self) -> Id {
        self.participants
            .iter()
            .next()
            .copied()
            .unwrap_or(self.id)
    }

    /// Drops a participant presumed dead. We never remove ourselves.
    pub fn remove(&mut self, id: Id) {
        if id != self.id {
            self.participants.remove(&id);
        }
    }
}
