//! Display aggregation: what each viewer renders, derived from a ticket set.
//!
//! Nothing here owns state except [`Announcer`], which only remembers what it
//! already announced.  All projections are recomputed from the board after
//! every push.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CounterConfig;
use crate::machine;
use crate::ticket::{ServiceType, Ticket, TicketId, TicketStatus};

// ── List projections ──────────────────────────────────────────────────────────

/// Waiting tickets of `service` in call order, truncated to `limit`.
pub fn waiting_list<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    service: ServiceType,
    limit: usize,
) -> Vec<Ticket> {
    let mut waiting: Vec<&Ticket> = tickets
        .into_iter()
        .filter(|t| t.status == TicketStatus::Waiting && t.service_type == service)
        .collect();
    waiting.sort_by_key(|t| t.queue_key());
    waiting.into_iter().take(limit).cloned().collect()
}

/// Held tickets of `service`, oldest number first.
pub fn held_list<'a>(tickets: impl IntoIterator<Item = &'a Ticket>, service: ServiceType) -> Vec<Ticket> {
    let mut held: Vec<&Ticket> = tickets
        .into_iter()
        .filter(|t| t.status == TicketStatus::Skipped && t.service_type == service)
        .collect();
    held.sort_by_key(|t| t.queue_key());
    held.into_iter().cloned().collect()
}

/// Shared rule for counter lists and TV columns:
/// `[called] ++ waiting`, or `[last completed] ++ waiting` while no waiting
/// ticket arrived after that completion, or just `waiting`.
fn compose(called: Option<&Ticket>, last_completed: Option<&Ticket>, waiting: Vec<Ticket>) -> Vec<Ticket> {
    if let Some(called) = called {
        let mut out = Vec::with_capacity(waiting.len() + 1);
        out.push(called.clone());
        out.extend(waiting);
        return out;
    }
    if let Some(done) = last_completed {
        if let Some(completed_at) = done.completed_at {
            let newer_arrival = waiting.iter().any(|w| w.created_at > completed_at);
            if !newer_arrival {
                let mut out = Vec::with_capacity(waiting.len() + 1);
                out.push(done.clone());
                out.extend(waiting);
                return out;
            }
        }
    }
    waiting
}

fn latest_completed<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    today: NaiveDate,
    pred: impl Fn(&Ticket) -> bool,
) -> Option<&'a Ticket> {
    tickets
        .into_iter()
        .filter(|t| t.status == TicketStatus::Completed && t.issue_day == today && pred(t))
        .max_by_key(|t| t.completed_at)
}

/// Counter-list view for one service.
pub fn counter_list(tickets: &[&Ticket], service: ServiceType, today: NaiveDate) -> Vec<Ticket> {
    let called = tickets
        .iter()
        .copied()
        .filter(|t| t.status == TicketStatus::Called && t.service_type == service)
        .max_by_key(|t| t.called_at);
    let done = latest_completed(tickets.iter().copied(), today, |t| t.service_type == service);
    compose(called, done, waiting_list(tickets.iter().copied(), service, usize::MAX))
}

// ── TV board ──────────────────────────────────────────────────────────────────

/// Grid layout column for one counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TvColumn {
    pub counter: u32,
    pub service: ServiceType,
    pub entries: Vec<Ticket>,
}

impl TvColumn {
    pub fn is_top_called(&self) -> bool {
        self.entries
            .first()
            .is_some_and(|t| t.status == TicketStatus::Called)
    }
}

/// Split layout row: one big "now serving" card per counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitRow {
    pub counter: u32,
    pub service: ServiceType,
    pub now_serving: Option<Ticket>,
}

impl SplitRow {
    pub fn is_called(&self) -> bool {
        self.now_serving
            .as_ref()
            .is_some_and(|t| t.status == TicketStatus::Called)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TvView {
    pub columns: Vec<TvColumn>,
    pub split: Vec<SplitRow>,
    /// Most recent calls, newest first.
    pub history: Vec<Ticket>,
}

fn column_for(tickets: &[&Ticket], counter: &CounterConfig, today: NaiveDate) -> TvColumn {
    // What the counter is really serving wins, even in manual mode.
    let called = machine::active_at(tickets.iter().copied(), counter.number);
    let done = latest_completed(tickets.iter().copied(), today, |t| {
        t.counter_number == Some(counter.number)
    });
    TvColumn {
        counter: counter.number,
        service: counter.service,
        entries: compose(
            called,
            done,
            waiting_list(tickets.iter().copied(), counter.service, usize::MAX),
        ),
    }
}

pub fn tv_view(
    tickets: &[&Ticket],
    counters: &[CounterConfig],
    today: NaiveDate,
    history_len: usize,
) -> TvView {
    let columns: Vec<TvColumn> = counters
        .iter()
        .map(|c| column_for(tickets, c, today))
        .collect();

    let split = columns
        .iter()
        .map(|col| SplitRow {
            counter: col.counter,
            service: col.service,
            now_serving: col.entries.first().cloned(),
        })
        .collect();

    let mut calls: Vec<&Ticket> = tickets
        .iter()
        .copied()
        .filter(|t| {
            t.issue_day == today
                && t.called_at.is_some()
                && matches!(t.status, TicketStatus::Called | TicketStatus::Completed)
        })
        .collect();
    calls.sort_by(|a, b| b.called_at.cmp(&a.called_at));
    let history = calls.into_iter().take(history_len).cloned().collect();

    TvView {
        columns,
        split,
        history,
    }
}

/// Which TV layout is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvLayout {
    Grid,
    Split,
}

/// Layout for `elapsed` time since the board started, alternating every
/// `cycle`.  Purely a presentation timer.
pub fn layout_at(elapsed: Duration, cycle: Duration) -> TvLayout {
    if cycle.is_zero() {
        return TvLayout::Grid;
    }
    if (elapsed.as_millis() / cycle.as_millis()) % 2 == 0 {
        TvLayout::Grid
    } else {
        TvLayout::Split
    }
}

// ── Status page / stats ───────────────────────────────────────────────────────

/// Number of waiting tickets ahead of `ticket` in its service.
pub fn queues_ahead<'a>(tickets: impl IntoIterator<Item = &'a Ticket>, ticket: &Ticket) -> usize {
    if ticket.status != TicketStatus::Waiting {
        return 0;
    }
    tickets
        .into_iter()
        .filter(|t| {
            t.status == TicketStatus::Waiting
                && t.service_type == ticket.service_type
                && t.queue_key() < ticket.queue_key()
        })
        .count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub waiting: usize,
    pub completed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

pub fn daily_stats<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    service: ServiceType,
    day: NaiveDate,
) -> DailyStats {
    let mut stats = DailyStats::default();
    for t in tickets
        .into_iter()
        .filter(|t| t.service_type == service && t.issue_day == day)
    {
        match t.status {
            TicketStatus::Waiting => stats.waiting += 1,
            TicketStatus::Completed => stats.completed += 1,
            TicketStatus::Skipped => stats.skipped += 1,
            TicketStatus::Cancelled => stats.cancelled += 1,
            TicketStatus::Called => {}
        }
    }
    stats
}

// ── Announcements ─────────────────────────────────────────────────────────────

pub const DEFAULT_ANNOUNCEMENT_TEMPLATE: &str =
    "Nomor antrian, {code}, {number}, silakan ke loket {counter}";

#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub ticket_id: TicketId,
    pub label: String,
    pub counter: u32,
    pub text: String,
}

/// Produces exactly one announcement per transition into `called`.
///
/// A call is identified by `(call_count, called_at)`: a first call, every
/// recall and every recall from hold change that pair, while replayed pushes
/// and non-call transitions do not.
#[derive(Debug, Default)]
pub struct Announcer {
    seen: HashMap<TicketId, (u32, Option<DateTime<Utc>>)>,
    template: String,
}

impl Announcer {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            seen: HashMap::new(),
            template: template.into(),
        }
    }

    /// Remember the calls in a snapshot without announcing them, so a viewer
    /// joining (or resyncing) mid-day stays quiet.
    pub fn prime<'a>(&mut self, tickets: impl IntoIterator<Item = &'a Ticket>) {
        self.seen = tickets
            .into_iter()
            .filter(|t| t.status == TicketStatus::Called)
            .map(|t| (t.id, (t.call_count, t.called_at)))
            .collect();
    }

    /// Only tickets currently `Called` are remembered.  Feed it pushes that
    /// already passed the board's revision check.
    pub fn observe(&mut self, ticket: &Ticket) -> Option<Announcement> {
        if ticket.status != TicketStatus::Called {
            self.seen.remove(&ticket.id);
            return None;
        }
        let key = (ticket.call_count, ticket.called_at);
        if self.seen.get(&ticket.id) == Some(&key) {
            return None;
        }
        self.seen.insert(ticket.id, key);
        let counter = ticket.counter_number.unwrap_or(1);
        Some(Announcement {
            ticket_id: ticket.id,
            label: ticket.label(),
            counter,
            text: self.render(ticket, counter),
        })
    }

    fn render(&self, ticket: &Ticket, counter: u32) -> String {
        let template = if self.template.is_empty() {
            DEFAULT_ANNOUNCEMENT_TEMPLATE
        } else {
            &self.template
        };
        // Spell the code letter by letter so "AK1" is read "A K 1".
        let spelled: Vec<String> = ticket
            .service_type
            .code()
            .chars()
            .map(|c| c.to_string())
            .collect();
        template
            .replace("{code}", &spelled.join(" "))
            .replace("{number}", &ticket.queue_number.to_string())
            .replace("{counter}", &counter.to_string())
    }
}
