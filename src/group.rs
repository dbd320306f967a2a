//! # Summary
//!
//! This module implements the group channel: role registration, membership
//! snapshots and addressed delivery between processes. We wrap the central
//! `State` registry with Arc<RwLock<T>> so every process can share it while
//! running concurrently.
//!
//! Delivery is best effort. A message addressed to a process that never
//! bound, or whose `Endpoint` has been dropped, is silently discarded and
//! only shows up in the delivered count returned to the sender.

use std::collections::{BTreeSet as Set, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap as Map;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time;

use crate::internal;
use crate::message::{Id, Message, Role};

/// Sender address paired with the message it sent.
pub type Envelope = (Id, Message);

/// Thread-safe handle to the group registry.
#[derive(Clone, Default)]
pub struct Group(Arc<RwLock<State>>);

impl Group {

    pub fn new() -> Self {
        Group::default()
    }

    /// Registers a new process under `role` and hands out its address.
    pub fn join(&self, role: Role) -> Id {
        let id = self.write().register(role);
        debug!("{} {} joined the group", role, id);
        id
    }

    /// Activates receiving for `id`.
    pub fn bind(&self, id: Id) -> Endpoint {
        let (rx, tx) = internal::new();
        self.write().connect(id, tx);
        Endpoint {
            id,
            group: self.clone(),
            rx,
            backlog: VecDeque::new(),
        }
    }

    /// Snapshot of every address registered under `role`.
    pub fn subgroup(&self, role: Role) -> Set<Id> {
        self.read()
            .roles
            .get(&role)
            .cloned()
            .unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<State> {
        self.0.read()
    }

    fn write(&self) -> RwLockWriteGuard<State> {
        self.0.write()
    }
}

/// Registered roles and the mailboxes of currently bound processes.
#[derive(Default)]
struct State {
    next: usize,
    roles: Map<Role, Set<Id>>,
    mailboxes: Map<Id, internal::Tx<Envelope>>,
}

impl State {
    fn register(&mut self, role: Role) -> Id {
        let id = Id(self.next);
        self.next += 1;
        self.roles.entry(role).or_default().insert(id);
        id
    }

    fn connect(&mut self, id: Id, tx: internal::Tx<Envelope>) {
        self.mailboxes.insert(id, tx);
    }

    fn disconnect(&mut self, id: Id) {
        self.mailboxes.remove(&id);
    }

    fn send(&self, from: Id, to: Id, message: Message) -> bool {
        match self.mailboxes.get(&to) {
        | Some(tx) => tx.try_send((from, message)),
        | None => false,
        }
    }
}

/// Receiving side of one bound process.
///
/// Messages from senders a caller is not currently interested in are kept
/// in `backlog` in arrival order until a later receive asks for them.
pub struct Endpoint {
    id: Id,
    group: Group,
    rx: internal::Rx<Envelope>,
    backlog: VecDeque<Envelope>,
}

impl Endpoint {
    pub fn id(&self) -> Id {
        self.id
    }

    /// Sends `message` to each of `ids`, returning how many were delivered.
    pub fn send_to<'a, T>(&self, ids: T, message: Message) -> usize
        where T: IntoIterator<Item = &'a Id>
    {
        let group = self.group.read();
        let mut delivered = 0;
        for id in ids {
            if group.send(self.id, *id, message) {
                trace!("{} sent {} to {}", self.id, message, id);
                delivered += 1;
            } else {
                trace!("{} could not deliver {} to {}", self.id, message, id);
            }
        }
        delivered
    }

    /// Waits up to `timeout` for a message from any of `senders`.
    pub async fn receive_from(&mut self, senders: &Set<Id>, timeout: Duration) -> Option<Envelope> {
        self.receive(|id| senders.contains(&id), timeout).await
    }

    /// Waits up to `timeout` for a message from anyone.
    pub async fn receive_from_any(&mut self, timeout: Duration) -> Option<Envelope> {
        self.receive(|_| true, timeout).await
    }

    async fn receive<F>(&mut self, accept: F, timeout: Duration) -> Option<Envelope>
        where F: Fn(Id) -> bool
    {
        if let Some(index) = self.backlog.iter().position(|(from, _)| accept(*from)) {
            return self.backlog.remove(index)
        }

        let deadline = time::Instant::now() + timeout;
        loop {
            match time::timeout_at(deadline, self.rx.next()).await {
            | Ok(Some((from, message))) if accept(from) => {
                trace!("{} received {} from {}", self.id, message, from);
                return Some((from, message))
            }
            | Ok(Some(envelope)) => self.backlog.push_back(envelope),
            | Ok(None) | Err(_) => return None,
            }
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        debug!("{} left the group", self.id);
        self.group.write().disconnect(self.id);
    }
}
