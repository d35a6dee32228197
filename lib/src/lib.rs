// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Keycard flow orchestration engine
//!
//! An [Orchestrator] runs at most one interactive [flow](flow::Flow) at a
//! time against a card reached through a [CardChannel]. Flows pause to
//! request input from the host (PINs, pairing passwords, mnemonics, a
//! card to be inserted) and are resumed or cancelled through the
//! orchestrator, with progress reported as [Notification]s.

/// Re-export `keycard-flow-core` for consumers
pub use keycard_flow_core::{self as core};

mod config;
pub use config::Config;

mod error;
pub use error::Error;

pub mod card;
pub use card::{CardChannel, CardError, CardEvent, CommandSet, Session};

mod kind;
pub use kind::OperationKind;

pub mod pairing;
pub use pairing::{Pairing, PairingStore};

mod state;
pub use state::{OperationState, StateMachine};

pub mod flow;
pub use flow::{Action, FlowError, Notification, Params};

mod orchestrator;
pub use orchestrator::Orchestrator;
