//! State tracking for dispatched requests
//!
//! This module contains the lifecycle state machine every dispatch walks
//! through, from construction to its terminal outcome.

mod dispatch_state;

pub use dispatch_state::DispatchState;
