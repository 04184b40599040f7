//! Change fan-out.
//!
//! Every accepted mutation is published once here; each connected viewer
//! holds a [`Subscription`] that drops pushes outside its filter.  A viewer
//! that falls behind the channel is told to resync instead of silently
//! missing changes.

use queue_proto::ticket::{Ticket, TicketFilter};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel depth; a burst bigger than this forces a resync.
pub const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum Notification {
    TicketChanged(Arc<Ticket>),
    /// Forwarded WARN/ERROR log line.
    Log(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Ticket(Ticket),
    Log(String),
    /// Pushes were lost; the subscriber must refetch its snapshot.
    Resync,
    Closed,
}

#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<Notification>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<Notification> {
        self.tx.clone()
    }

    pub fn publish(&self, ticket: &Ticket) {
        // No receivers is fine.
        let _ = self.tx.send(Notification::TicketChanged(Arc::new(ticket.clone())));
    }

    pub fn subscribe(&self, filter: TicketFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Notification>,
    filter: TicketFilter,
}

impl Subscription {
    pub fn filter(&self) -> &TicketFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: TicketFilter) {
        self.filter = filter;
    }

    /// Next event relevant to this subscription.
    pub async fn recv(&mut self) -> SubscriptionEvent {
        loop {
            match self.rx.recv().await {
                Ok(Notification::TicketChanged(ticket)) => {
                    if self.filter.may_concern(&ticket) {
                        return SubscriptionEvent::Ticket((*ticket).clone());
                    }
                }
                Ok(Notification::Log(message)) => return SubscriptionEvent::Log(message),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscriber missed {} notifications", n);
                    return SubscriptionEvent::Resync;
                }
                Err(broadcast::error::RecvError::Closed) => return SubscriptionEvent::Closed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use queue_proto::ticket::ServiceType;

    fn ticket(service: ServiceType, n: u32) -> Ticket {
        Ticket::new(service, n, NaiveDate::from_ymd_opt(2026, 1, 13).unwrap(), Utc::now())
    }

    #[tokio::test]
    async fn test_subscription_skips_other_services() {
        let notifier = ChangeNotifier::default();
        let mut sub = notifier.subscribe(TicketFilter::all().with_service(ServiceType::Jkp));

        notifier.publish(&ticket(ServiceType::Tka, 1));
        let jkp = ticket(ServiceType::Jkp, 1);
        notifier.publish(&jkp);

        assert_eq!(sub.recv().await, SubscriptionEvent::Ticket(jkp));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told_to_resync() {
        let notifier = ChangeNotifier::new(2);
        let mut sub = notifier.subscribe(TicketFilter::all());
        for n in 1..=5 {
            notifier.publish(&ticket(ServiceType::Ak1, n));
        }
        assert_eq!(sub.recv().await, SubscriptionEvent::Resync);
        // After the resync marker the newest pushes are still delivered.
        assert!(matches!(sub.recv().await, SubscriptionEvent::Ticket(_)));
    }
}
