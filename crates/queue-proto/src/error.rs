use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ticket::{TicketId, TicketStatus};

/// Everything a queue operation can fail with.  Travels over the wire inside
/// `Reply` broadcasts, so it stays plain data.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum QueueError {
    /// The ticket is not in the state the transition needs.
    #[error("ticket {ticket_id} cannot {action} while {status}")]
    InvalidTransition {
        ticket_id: TicketId,
        status: TicketStatus,
        action: String,
    },

    /// The counter is already serving a ticket.
    #[error("counter {counter} is already serving {label}")]
    CounterBusy { counter: u32, label: String },

    /// Nothing left to call.  An empty state, not a failure, for the operator.
    #[error("no tickets waiting")]
    NoTicketsWaiting,

    #[error("ticket sequencer unavailable: {reason}")]
    SequencerUnavailable { reason: String },

    #[error("storage error: {reason}")]
    PersistenceError { reason: String },

    /// The referenced ticket vanished; the viewer should resync.
    #[error("ticket {ticket_id} not found")]
    NotFound { ticket_id: TicketId },
}

impl QueueError {
    pub fn invalid(ticket_id: TicketId, status: TicketStatus, action: &str) -> Self {
        Self::InvalidTransition {
            ticket_id,
            status,
            action: action.to_string(),
        }
    }

    pub fn persistence(reason: impl ToString) -> Self {
        Self::PersistenceError {
            reason: reason.to_string(),
        }
    }

    /// Backend trouble that the operator can only retry.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::SequencerUnavailable { .. } | Self::PersistenceError { .. }
        )
    }

    /// The caller's view is stale and must be refetched.
    pub fn needs_resync(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidTransition { .. } | Self::CounterBusy { .. }
        )
    }

    /// Message for an inline toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoTicketsWaiting => "Tidak ada antrian".to_string(),
            e if e.is_backend() => "Gagal terhubung, coba lagi".to_string(),
            e => e.to_string(),
        }
    }
}
