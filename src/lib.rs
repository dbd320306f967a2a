//! # Summary
//!
//! Three-phase commit over a crash-stop group of processes. A coordinator
//! drives one transaction through vote, prepare-commit and decision rounds;
//! participants that lose the coordinator elect a replacement among
//! themselves and finish the transaction without blocking.

#[macro_use] extern crate derivative;
#[macro_use] extern crate log;

mod config;
mod error;
mod group;
mod internal;
mod message;
mod process;
mod state;
pub mod storage;

pub use crate::config::{Config, FaultInjection};
pub use crate::error::Error;
pub use crate::group::{Endpoint, Envelope, Group};
pub use crate::message::{Id, Message, Role};
pub use crate::process::{Cause, Coordinator, Participant, Report, Termination, View};
pub use crate::state::{CoordinatorState, ParticipantState};
