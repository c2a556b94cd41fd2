//! Referral lifecycle as an explicit state machine.
//!
//! - **State**: what is known about one referral (`LifecycleState`)
//! - **Events**: what happened (`Event`)
//! - **Effects**: what to do about it (`Effect`)
//! - **Transition**: pure `(State, Event) -> (State, Vec<Effect>)`
//!
//! The interpreter runs effects against the collaborators and feeds result
//! events back in; the controller drives one flow per inbound interaction.

pub mod controller;
pub mod effect;
pub mod event;
pub mod interpreter;
pub mod state;
pub mod transition;

pub use controller::{Clock, ReactionOutcome, ReferralController, SystemClock};
pub use effect::*;
pub use event::*;
pub use interpreter::{CriticalEffectFailed, EffectError, InterpreterContext};
pub use state::*;
pub use transition::*;
