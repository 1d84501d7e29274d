/// Dispatch state definitions
///
/// A dispatched request moves through
/// `Built → (Aborted | Dispatched) → (Retried)* → Completed | Failed`.
use std::fmt;

/// Represents where a request is in its dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    // ===== Active States =====
    /// Request has been built and is running through before-request hooks
    Built,

    /// Request has been handed to the transport (or answered from cache)
    Dispatched,

    /// The last attempt met the retry condition and the request is being re-issued
    Retried,

    // ===== Terminal States =====
    /// A before-request hook aborted the request; nothing was sent
    Aborted,

    /// A final response was produced and after-response hooks ran
    Completed,

    /// The dispatch ended with an error
    Failed,
}

impl DispatchState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted | Self::Completed | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Built, Aborted)
                | (Built, Dispatched)
                | (Built, Failed)
                | (Dispatched, Retried)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Retried, Dispatched)
                | (Retried, Failed)
        )
    }

    /// Moves to `next`, logging the transition
    ///
    /// Illegal transitions are a bug in the dispatch loop; they are reported
    /// at error level and the state is updated anyway.
    pub fn advance(&mut self, next: DispatchState, request_id: u32) {
        if self.can_transition_to(next) {
            tracing::trace!(request_id, "Dispatch state {} -> {}", self, next);
        } else {
            tracing::error!(request_id, "Invalid dispatch transition {} -> {}", self, next);
        }
        *self = next;
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Dispatched => "dispatched",
            Self::Retried => "retried",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
