//! TicketBoard: a viewer's local replica of the ticket set.
//!
//! Fed by `Hello`/`Snapshot` (full resync) and `Ticket` (single record) pushes.
//! Pushes are replace-by-id and idempotent: replaying one, or receiving an
//! older revision after a newer one, leaves the board unchanged.  That holds
//! for tickets that left the board too: their last revision is kept as a
//! tombstone.  The board is never authoritative; it only lives until the next
//! resync.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::ticket::{Ticket, TicketFilter, TicketId};

#[derive(Debug, Clone, Default)]
pub struct TicketBoard {
    tickets: HashMap<TicketId, Ticket>,
    /// Only tickets matching this are kept.
    filter: TicketFilter,
    /// Last revision (and issue day) of tickets seen outside the filter.
    gone: HashMap<TicketId, (u64, NaiveDate)>,
}

impl TicketBoard {
    pub fn new(filter: TicketFilter) -> Self {
        Self {
            tickets: HashMap::new(),
            filter,
            gone: HashMap::new(),
        }
    }

    pub fn filter(&self) -> &TicketFilter {
        &self.filter
    }

    /// Replace the whole board with an authoritative snapshot.
    pub fn resync(&mut self, snapshot: Vec<Ticket>) {
        self.tickets = snapshot
            .into_iter()
            .filter(|t| self.filter.matches(t))
            .map(|t| (t.id, t))
            .collect();
        let tickets = &self.tickets;
        self.gone.retain(|id, _| !tickets.contains_key(id));
        // Stale pushes only come from the current day's traffic.
        if let Some(latest) = self.gone.values().map(|(_, day)| *day).max() {
            self.gone.retain(|_, (_, day)| *day >= latest);
        }
    }

    /// Apply one pushed record.  Returns `true` if the board changed.
    pub fn apply(&mut self, ticket: Ticket) -> bool {
        let last_rev = self
            .tickets
            .get(&ticket.id)
            .map(|t| t.rev)
            .or_else(|| self.gone.get(&ticket.id).map(|(rev, _)| *rev));
        if last_rev.is_some_and(|rev| rev >= ticket.rev) {
            return false;
        }
        if !self.filter.matches(&ticket) {
            // Left the subscribed set (e.g. waiting -> completed on a
            // waiting-only view).
            self.gone.insert(ticket.id, (ticket.rev, ticket.issue_day));
            return self.tickets.remove(&ticket.id).is_some();
        }
        self.gone.remove(&ticket.id);
        self.tickets.insert(ticket.id, ticket);
        true
    }

    pub fn get(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::{ServiceType, TicketStatus};
    use chrono::{NaiveDate, Utc};

    fn ticket(n: u32) -> Ticket {
        Ticket::new(
            ServiceType::Ak1,
            n,
            NaiveDate::from_ymd_opt(2026, 1, 13).unwrap(),
            Utc::now(),
        )
    }

    fn contents(board: &TicketBoard) -> Vec<Ticket> {
        let mut v: Vec<Ticket> = board.iter().cloned().collect();
        v.sort_by_key(|t| t.queue_key());
        v
    }

    #[test]
    fn test_replaying_push_is_idempotent() {
        let mut board = TicketBoard::default();
        let mut t = ticket(1);
        assert!(board.apply(t.clone()));
        t.status = TicketStatus::Called;
        t.rev = 2;
        assert!(board.apply(t.clone()));
        let before: Vec<Ticket> = contents(&board);
        assert!(!board.apply(t.clone()));
        let after: Vec<Ticket> = contents(&board);
        assert_eq!(before, after);
    }

    #[test]
    fn test_older_revision_is_dropped() {
        let mut board = TicketBoard::default();
        let mut t = ticket(1);
        t.rev = 3;
        t.status = TicketStatus::Completed;
        board.apply(t.clone());
        let mut stale = t.clone();
        stale.rev = 2;
        stale.status = TicketStatus::Called;
        assert!(!board.apply(stale));
        assert_eq!(board.get(&t.id).unwrap().status, TicketStatus::Completed);
    }

    #[test]
    fn test_ticket_leaving_filter_is_removed() {
        let mut board = TicketBoard::new(TicketFilter::statuses([TicketStatus::Waiting]));
        let mut t = ticket(1);
        board.apply(t.clone());
        assert_eq!(board.len(), 1);
        t.status = TicketStatus::Called;
        t.rev = 2;
        assert!(board.apply(t));
        assert!(board.is_empty());
    }

    #[test]
    fn test_stale_push_cannot_bring_back_a_ticket_that_left() {
        let mut board = TicketBoard::new(TicketFilter::statuses([TicketStatus::Waiting]));
        let waiting = ticket(1);
        let mut called = waiting.clone();
        called.status = TicketStatus::Called;
        called.rev = 2;

        assert!(board.apply(waiting.clone()));
        assert!(board.apply(called.clone()));
        assert!(!board.apply(waiting.clone()), "redelivered rev 1");
        assert!(board.is_empty());

        // Out of order from the start: the newer push arrives first.
        let mut other = TicketBoard::new(TicketFilter::statuses([TicketStatus::Waiting]));
        assert!(!other.apply(called));
        assert!(!other.apply(waiting));
        assert!(other.is_empty());
    }

    #[test]
    fn test_resync_keeps_tombstones_of_absent_tickets() {
        let mut board = TicketBoard::new(TicketFilter::statuses([TicketStatus::Waiting]));
        let waiting = ticket(1);
        let mut called = waiting.clone();
        called.status = TicketStatus::Called;
        called.rev = 2;
        board.apply(waiting.clone());
        board.apply(called);

        board.resync(vec![ticket(2)]);
        assert!(!board.apply(waiting));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_resync_replaces_everything() {
        let mut board = TicketBoard::default();
        board.apply(ticket(1));
        board.apply(ticket(2));
        let fresh = ticket(7);
        board.resync(vec![fresh.clone()]);
        assert_eq!(board.len(), 1);
        assert!(board.get(&fresh.id).is_some());
    }
}
