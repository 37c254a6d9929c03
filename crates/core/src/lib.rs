//! Core types for the Bracha block-agreement engine: [`Action`], the
//! [`StateMachine`] and [`NetworkPort`] traits, and the blocking [`Inbox`].

mod action;
mod error;
mod inbox;
mod traits;

pub use action::Action;
pub use error::NetworkError;
pub use inbox::{Inbox, RunFlag};
pub use traits::{NetworkPort, StateMachine};
