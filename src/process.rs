//! # Summary
//!
//! This module contains the two protocol roles of three-phase commit.
//!
//! Each role is a single sequential state machine driven by its own `run`
//! loop. The only blocking operation is a bounded receive on the group
//! channel, so every wait ends either with a message or with a timeout
//! that the role turns into a protocol transition.

/// Three-round transaction driver.
pub mod coordinator;

/// Voter and, on coordinator silence, termination protocol.
pub mod participant;

/// Termination reports returned by `run`.
mod report;

/// Membership snapshot and election.
mod view;

pub use self::coordinator::Coordinator;
pub use self::participant::Participant;
pub use self::report::{Cause, Report, Termination};
pub use self::view::View;
