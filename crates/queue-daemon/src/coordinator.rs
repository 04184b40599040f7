//! The queue coordinator: every ticket mutation in the system goes through
//! here.
//!
//! The coordinator holds no ticket state of its own.  It reads from the
//! store, runs the pure state machine, and writes back with a conditional
//! update; correctness under concurrent counters comes from that conditional
//! write, not from any lock held here.  Every store call is bounded by the
//! configured storage timeout; writes go through [`bounded_write`] so a
//! timeout never leaves one half applied.

use crate::notifier::ChangeNotifier;
use crate::printer::ReceiptPrinter;
use crate::sequencer::Sequencer;
use crate::store::{bounded_write, StoreError, TicketStore, UpdateGuard, WriteLatch};
use chrono::{Local, NaiveDate, Utc};
use queue_proto::config::{Config, CounterConfig};
use queue_proto::display::{self, DailyStats, TvView};
use queue_proto::error::QueueError;
use queue_proto::machine::{self, Transition};
use queue_proto::protocol::{Command, Outcome};
use queue_proto::receipt::PrintRecord;
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter, TicketId, TicketStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs the coordinator needs from the config file.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub storage_timeout: Duration,
    pub call_next_attempts: u32,
    pub counters: Vec<CounterConfig>,
    pub history_len: usize,
    pub public_base_url: String,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage_timeout: config.queue.storage_timeout(),
            call_next_attempts: config.queue.call_next_attempts.max(1),
            counters: config.counters.clone(),
            history_len: config.display.history_len,
            public_base_url: config.printer.public_base_url.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Ticket plus its position, as shown on the visitor's status page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketStatusView {
    pub ticket: Ticket,
    pub label: String,
    pub queues_ahead: usize,
}

pub struct Coordinator {
    store: Arc<dyn TicketStore>,
    sequencer: Sequencer,
    notifier: ChangeNotifier,
    printer: Option<Arc<dyn ReceiptPrinter>>,
    settings: CoordinatorSettings,
}

fn map_store_error(e: StoreError) -> QueueError {
    match e {
        StoreError::NotFound(ticket_id) => QueueError::NotFound { ticket_id },
        StoreError::CounterOccupied { counter, label } => QueueError::CounterBusy { counter, label },
        other => QueueError::persistence(other),
    }
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: ChangeNotifier,
        printer: Option<Arc<dyn ReceiptPrinter>>,
        settings: CoordinatorSettings,
    ) -> Self {
        let sequencer = Sequencer::new(store.clone(), settings.storage_timeout);
        Self {
            store,
            sequencer,
            notifier,
            printer,
            settings,
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    /// Bound a read.  Reads change nothing, so dropping one is harmless.
    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.settings.storage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Store {} timed out after {} ms",
                    op,
                    self.settings.storage_timeout.as_millis()
                );
                Err(StoreError::Unavailable(format!(
                    "{} timed out after {} ms",
                    op,
                    self.settings.storage_timeout.as_millis()
                )))
            }
        }
    }

    async fn write<T, F, Fut>(&self, op: &str, write: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn TicketStore>, Arc<WriteLatch>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        bounded_write(&self.store, self.settings.storage_timeout, op, write).await
    }

    async fn update(&self, guard: UpdateGuard, next: Ticket) -> Result<Ticket, StoreError> {
        self.write("update", move |store, latch| async move {
            store.update_if(guard, next, &latch).await
        })
        .await
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub async fn get_ticket(&self, id: TicketId) -> Result<Ticket, QueueError> {
        self.bounded("get", self.store.get(id))
            .await
            .map_err(map_store_error)
    }

    pub async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, QueueError> {
        self.bounded("list", self.store.list(filter))
            .await
            .map_err(map_store_error)
    }

    pub async fn ticket_status(&self, id: TicketId) -> Result<TicketStatusView, QueueError> {
        let ticket = self.get_ticket(id).await?;
        let waiting = self
            .list(&TicketFilter::statuses([TicketStatus::Waiting]).with_service(ticket.service_type))
            .await?;
        Ok(TicketStatusView {
            label: ticket.label(),
            queues_ahead: display::queues_ahead(&waiting, &ticket),
            ticket,
        })
    }

    pub async fn tv_view(&self) -> Result<TvView, QueueError> {
        let tickets = self.list(&TicketFilter::live(Self::today())).await?;
        let refs: Vec<&Ticket> = tickets.iter().collect();
        Ok(display::tv_view(
            &refs,
            &self.settings.counters,
            Self::today(),
            self.settings.history_len,
        ))
    }

    pub async fn counter_list(&self, service: ServiceType) -> Result<Vec<Ticket>, QueueError> {
        let tickets = self
            .list(&TicketFilter::live(Self::today()).with_service(service))
            .await?;
        let refs: Vec<&Ticket> = tickets.iter().collect();
        Ok(display::counter_list(&refs, service, Self::today()))
    }

    pub async fn stats(&self, service: ServiceType) -> Result<DailyStats, QueueError> {
        let tickets = self
            .list(&TicketFilter::live(Self::today()).with_service(service))
            .await?;
        Ok(display::daily_stats(&tickets, service, Self::today()))
    }

    async fn active_at(&self, counter: u32) -> Result<Option<Ticket>, QueueError> {
        let called = self
            .list(&TicketFilter::statuses([TicketStatus::Called]).with_counter(counter))
            .await?;
        Ok(machine::active_at(&called, counter).cloned())
    }

    /// Move closed tickets of earlier days out of the live store.
    pub async fn archive_closed_days(&self) -> Result<usize, QueueError> {
        self.store
            .archive_before(Self::today())
            .await
            .map_err(map_store_error)
    }

    // ── Issuing ──────────────────────────────────────────────────────────────

    pub async fn issue_ticket(&self, service: ServiceType) -> Result<Ticket, QueueError> {
        let day = Self::today();
        let number = self.sequencer.next_number(service, day).await?;
        let ticket = Ticket::new(service, number, day, Utc::now());

        let ticket = self
            .write("insert", move |store, latch| async move {
                store.insert(ticket, &latch).await
            })
            .await
            .map_err(map_store_error)?;

        info!("Issued {} ({})", ticket.label(), ticket.id);
        self.notifier.publish(&ticket);

        if let Some(printer) = &self.printer {
            printer.print(PrintRecord::for_ticket(&ticket, &self.settings.public_base_url));
        }
        Ok(ticket)
    }

    // ── Counter operations ───────────────────────────────────────────────────

    /// Claim the lowest waiting ticket of `service` for `counter`.
    ///
    /// Two counters racing for the same ticket both read it as waiting; only
    /// one conditional write succeeds.  The loser re-reads and tries the next
    /// ticket, up to the configured number of attempts.
    pub async fn call_next(&self, counter: u32, service: ServiceType) -> Result<Ticket, QueueError> {
        machine::ensure_counter_idle(self.active_at(counter).await?.as_ref(), counter)?;

        let waiting_filter = TicketFilter::statuses([TicketStatus::Waiting]).with_service(service);
        for attempt in 1..=self.settings.call_next_attempts {
            let waiting = self.list(&waiting_filter).await?;
            let Some(candidate) = machine::select_next(&waiting, service) else {
                debug!("Counter {}: nothing waiting for {}", counter, service);
                return Err(QueueError::NoTicketsWaiting);
            };

            let next = machine::apply(candidate, Transition::CallNext, counter, Utc::now())?;
            let guard = UpdateGuard::claiming(candidate.rev, counter);
            match self.update(guard, next).await {
                Ok(called) => {
                    info!("Counter {} called {}", counter, called.label());
                    self.notifier.publish(&called);
                    return Ok(called);
                }
                Err(StoreError::Conflict { ticket_id, .. }) => {
                    debug!(
                        "Counter {} lost the race for {} (attempt {})",
                        counter, ticket_id, attempt
                    );
                }
                Err(e) => return Err(map_store_error(e)),
            }
        }

        warn!(
            "Counter {} gave up on {} after {} contended attempts",
            counter, service, self.settings.call_next_attempts
        );
        Err(QueueError::NoTicketsWaiting)
    }

    async fn transition(
        &self,
        counter: u32,
        ticket_id: TicketId,
        transition: Transition,
    ) -> Result<Ticket, QueueError> {
        let ticket = self.get_ticket(ticket_id).await?;

        if transition.claims_counter() {
            machine::ensure_counter_idle(self.active_at(counter).await?.as_ref(), counter)?;
        }

        let next = machine::apply(&ticket, transition, counter, Utc::now())?;
        let guard = if transition.claims_counter() {
            UpdateGuard::claiming(ticket.rev, counter)
        } else {
            UpdateGuard::rev(ticket.rev)
        };

        match self.update(guard, next).await {
            Ok(updated) => {
                info!(
                    "Counter {}: {} {} -> {}",
                    counter,
                    transition.name(),
                    updated.label(),
                    updated.status
                );
                self.notifier.publish(&updated);
                Ok(updated)
            }
            Err(StoreError::Conflict { .. }) => {
                // Someone else moved the ticket between our read and write.
                let status = match self.get_ticket(ticket_id).await {
                    Ok(fresh) => fresh.status,
                    Err(_) => ticket.status,
                };
                Err(QueueError::invalid(ticket_id, status, transition.name()))
            }
            Err(e) => Err(map_store_error(e)),
        }
    }

    /// Re-announce the ticket being served at `counter`.
    pub async fn recall(&self, counter: u32, ticket_id: TicketId) -> Result<Ticket, QueueError> {
        self.transition(counter, ticket_id, Transition::Recall).await
    }

    /// Park the current ticket; the counter becomes free.
    pub async fn hold(&self, counter: u32, ticket_id: TicketId) -> Result<Ticket, QueueError> {
        self.transition(counter, ticket_id, Transition::Hold).await
    }

    pub async fn recall_from_hold(
        &self,
        counter: u32,
        ticket_id: TicketId,
    ) -> Result<Ticket, QueueError> {
        self.transition(counter, ticket_id, Transition::RecallFromHold)
            .await
    }

    pub async fn complete(&self, counter: u32, ticket_id: TicketId) -> Result<Ticket, QueueError> {
        self.transition(counter, ticket_id, Transition::Complete).await
    }

    pub async fn cancel(&self, counter: u32, ticket_id: TicketId) -> Result<Ticket, QueueError> {
        self.transition(counter, ticket_id, Transition::Cancel).await
    }

    /// Run a ticket command received from a viewer.  Subscription commands
    /// are connection state and are answered by the socket layer.
    pub async fn execute(&self, command: Command) -> Outcome {
        let result = match command {
            Command::Subscribe { .. } | Command::Resync => return Outcome::Ok { ticket: None },
            Command::IssueTicket { service } => self.issue_ticket(service).await,
            Command::GetTicket { ticket_id } => self.get_ticket(ticket_id).await,
            Command::CallNext { counter, service } => self.call_next(counter, service).await,
            Command::Recall { counter, ticket_id } => self.recall(counter, ticket_id).await,
            Command::Hold { counter, ticket_id } => self.hold(counter, ticket_id).await,
            Command::RecallFromHold { counter, ticket_id } => {
                self.recall_from_hold(counter, ticket_id).await
            }
            Command::Complete { counter, ticket_id } => self.complete(counter, ticket_id).await,
            Command::Cancel { counter, ticket_id } => self.cancel(counter, ticket_id).await,
        };
        if let Err(e) = &result {
            if e.is_backend() {
                warn!("Command failed: {}", e);
            } else {
                debug!("Command refused: {}", e);
            }
        }
        Outcome::from(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn coordinator() -> Coordinator {
        Coordinator::new(
            Arc::new(MemoryStore::new()),
            ChangeNotifier::default(),
            None,
            CoordinatorSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_issue_numbers_per_service() {
        let c = coordinator();
        let a = c.issue_ticket(ServiceType::Ak1).await.unwrap();
        let b = c.issue_ticket(ServiceType::Ak1).await.unwrap();
        let j = c.issue_ticket(ServiceType::Jkp).await.unwrap();
        assert_eq!((a.queue_number, b.queue_number, j.queue_number), (1, 2, 1));
        assert_eq!(a.status, TicketStatus::Waiting);
        assert_eq!(a.call_count, 0);
        assert_eq!(a.counter_number, None);
    }

    #[tokio::test]
    async fn test_call_next_on_empty_queue() {
        let c = coordinator();
        assert_eq!(
            c.call_next(1, ServiceType::Tka).await,
            Err(QueueError::NoTicketsWaiting)
        );
    }

    #[tokio::test]
    async fn test_busy_counter_refuses_call_next() {
        let c = coordinator();
        c.issue_ticket(ServiceType::Tka).await.unwrap();
        c.issue_ticket(ServiceType::Tka).await.unwrap();
        let first = c.call_next(1, ServiceType::Tka).await.unwrap();

        let err = c.call_next(1, ServiceType::Tka).await.unwrap_err();
        assert_eq!(
            err,
            QueueError::CounterBusy {
                counter: 1,
                label: first.label()
            }
        );
    }

    #[tokio::test]
    async fn test_status_view_counts_queues_ahead() {
        let c = coordinator();
        c.issue_ticket(ServiceType::Jkp).await.unwrap();
        c.issue_ticket(ServiceType::Jkp).await.unwrap();
        let third = c.issue_ticket(ServiceType::Jkp).await.unwrap();

        let view = c.ticket_status(third.id).await.unwrap();
        assert_eq!(view.queues_ahead, 2);
        assert_eq!(view.label, "JKP003");
    }

    #[tokio::test]
    async fn test_execute_wraps_errors() {
        let c = coordinator();
        let outcome = c
            .execute(Command::GetTicket {
                ticket_id: TicketId::new(),
            })
            .await;
        assert!(matches!(
            outcome,
            Outcome::Err {
                error: QueueError::NotFound { .. }
            }
        ));
    }
}
