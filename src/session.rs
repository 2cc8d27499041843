//! The analysis lifecycle seen by the person uploading a bill.
//!
//! ```text
//!          begin            finish(Ok)
//!   Idle ────────▶ Processing ─────────▶ Ready(BillData)
//!    ▲                 │
//!    │   reset         │ finish(Err)
//!    └─────────────────┴──────────────▶ Failed(message)
//! ```
//!
//! Each [`begin`](AnalysisSession::begin) hands out a [`Ticket`] stamped with
//! a generation number. [`reset`](AnalysisSession::reset) bumps the
//! generation, so a request that was in flight when the user started over can
//! still complete but its result is dropped instead of overwriting the fresh
//! state. Only one request may be outstanding at a time.
//!
//! A failed extraction leaves no partial data behind: the state holds the
//! generic user-facing message, and the cause goes to the log.

use crate::error::BillError;
use crate::model::BillData;
use crate::prompts::USER_ERROR_MESSAGE;
use std::sync::Arc;
use tracing::{debug, error};

/// Current state of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Processing,
    Ready(Arc<BillData>),
    Failed(String),
}

/// Proof that a request was started in a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

/// Single-request state machine with stale-result protection.
#[derive(Debug)]
pub struct AnalysisSession {
    state: SessionState,
    generation: u64,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_processing(&self) -> bool {
        self.state == SessionState::Processing
    }

    /// The current result, if the last analysis succeeded.
    pub fn result(&self) -> Option<&Arc<BillData>> {
        match self.state {
            SessionState::Ready(ref bill) => Some(bill),
            _ => None,
        }
    }

    /// Start a new analysis, discarding any previous result or error.
    pub fn begin(&mut self) -> Result<Ticket, BillError> {
        if self.is_processing() {
            return Err(BillError::SessionBusy);
        }
        self.generation += 1;
        self.state = SessionState::Processing;
        debug!("Session generation {} started", self.generation);
        Ok(Ticket {
            generation: self.generation,
        })
    }

    /// Record the outcome of the request started with `ticket`.
    ///
    /// Returns `false` (and changes nothing) when the ticket is stale.
    pub fn finish(&mut self, ticket: Ticket, outcome: Result<Arc<BillData>, &BillError>) -> bool {
        if ticket.generation != self.generation || !self.is_processing() {
            debug!(
                "Dropping stale result for generation {} (current {})",
                ticket.generation, self.generation
            );
            return false;
        }
        self.state = match outcome {
            Ok(bill) => SessionState::Ready(bill),
            Err(e) => {
                error!("Analysis Error: {}", e);
                SessionState::Failed(USER_ERROR_MESSAGE.to_string())
            }
        };
        true
    }

    /// Return to idle. Any outstanding request becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = SessionState::Idle;
    }
}
