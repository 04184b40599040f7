use crate::store::{bounded_write, TicketStore};
use chrono::NaiveDate;
use queue_proto::error::QueueError;
use queue_proto::ticket::ServiceType;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Hands out per-(service, day) queue numbers.  A failure or a slow backend
/// surfaces as `SequencerUnavailable`; no number is ever guessed locally.
#[derive(Clone)]
pub struct Sequencer {
    store: Arc<dyn TicketStore>,
    timeout: Duration,
}

impl Sequencer {
    pub fn new(store: Arc<dyn TicketStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn next_number(&self, service: ServiceType, day: NaiveDate) -> Result<u32, QueueError> {
        bounded_write(&self.store, self.timeout, "sequence", move |store, latch| async move {
            store.next_sequence(service, day, &latch).await
        })
        .await
        .map_err(|e| {
            warn!("Sequencer failed for {} on {}: {}", service, day, e);
            QueueError::SequencerUnavailable {
                reason: e.to_string(),
            }
        })
    }
}
