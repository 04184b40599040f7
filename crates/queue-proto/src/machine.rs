//! Queue state machine: the legal ticket transitions and their side effects.
//!
//! Everything here is pure: given a ticket snapshot, a counter and a clock
//! reading, produce the next ticket or say why not.  The store applies the
//! result with a conditional update so two counters can never both win.
//!
//! ```text
//!  waiting --call_next--> called --complete--> completed
//!                           |  ^  --cancel----> cancelled
//!                      hold |  | recall_from_hold
//!                           v  |
//!                          skipped
//!  called --recall--> called   (re-announce, call_count + 1)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::ticket::{ServiceType, Ticket, TicketStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    CallNext,
    Recall,
    Hold,
    RecallFromHold,
    Complete,
    Cancel,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::CallNext => "call next",
            Transition::Recall => "recall",
            Transition::Hold => "hold",
            Transition::RecallFromHold => "recall from hold",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
        }
    }

    /// Status the ticket must be in for the transition to apply.
    pub fn required_status(self) -> TicketStatus {
        match self {
            Transition::CallNext => TicketStatus::Waiting,
            Transition::RecallFromHold => TicketStatus::Skipped,
            Transition::Recall | Transition::Hold | Transition::Complete | Transition::Cancel => {
                TicketStatus::Called
            }
        }
    }

    pub fn target_status(self) -> TicketStatus {
        match self {
            Transition::CallNext | Transition::Recall | Transition::RecallFromHold => {
                TicketStatus::Called
            }
            Transition::Hold => TicketStatus::Skipped,
            Transition::Complete => TicketStatus::Completed,
            Transition::Cancel => TicketStatus::Cancelled,
        }
    }

    /// Transitions that put a ticket on a counter and therefore need the
    /// counter to be free.
    pub fn claims_counter(self) -> bool {
        matches!(self, Transition::CallNext | Transition::RecallFromHold)
    }

    /// Transitions that act on the ticket currently served at the counter.
    pub fn acts_on_current(self) -> bool {
        self.required_status() == TicketStatus::Called
    }
}

/// Apply `transition` at `counter` to `ticket`.  Never partially mutates:
/// the result is either a complete new record or an error and the input is
/// untouched.  The caller is responsible for the counter-vacancy guard of
/// claiming transitions (see [`ensure_counter_idle`]).
pub fn apply(
    ticket: &Ticket,
    transition: Transition,
    counter: u32,
    now: DateTime<Utc>,
) -> Result<Ticket, QueueError> {
    if ticket.status != transition.required_status() {
        return Err(QueueError::invalid(ticket.id, ticket.status, transition.name()));
    }
    if transition.acts_on_current() && ticket.counter_number != Some(counter) {
        return Err(QueueError::invalid(ticket.id, ticket.status, transition.name()));
    }

    let mut next = ticket.clone();
    next.status = transition.target_status();
    match transition {
        Transition::CallNext | Transition::RecallFromHold => {
            next.counter_number = Some(counter);
            next.called_at = Some(now);
            next.call_count = 1;
        }
        Transition::Recall => {
            next.called_at = Some(now);
            next.call_count = ticket.call_count.saturating_add(1);
        }
        Transition::Hold => {
            next.counter_number = None;
        }
        Transition::Complete => {
            next.completed_at = Some(now);
        }
        Transition::Cancel => {}
    }
    Ok(next)
}

/// The ticket `call_next` should claim: lowest position among waiting
/// tickets of `service`.
pub fn select_next<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    service: ServiceType,
) -> Option<&'a Ticket> {
    tickets
        .into_iter()
        .filter(|t| t.status == TicketStatus::Waiting && t.service_type == service)
        .min_by_key(|t| t.queue_key())
}

/// The ticket currently served at `counter`, if any.
pub fn active_at<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    counter: u32,
) -> Option<&'a Ticket> {
    tickets
        .into_iter()
        .filter(|t| t.is_called_at(counter))
        .max_by_key(|t| t.called_at)
}

pub fn ensure_counter_idle(active: Option<&Ticket>, counter: u32) -> Result<(), QueueError> {
    match active {
        Some(t) => Err(QueueError::CounterBusy {
            counter,
            label: t.label(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 13).unwrap()
    }

    fn waiting(service: ServiceType, n: u32) -> Ticket {
        Ticket::new(service, n, day(), Utc::now())
    }

    #[test]
    fn test_call_next_sets_counter_and_first_call() {
        let t = waiting(ServiceType::Ak1, 1);
        let now = Utc::now();
        let called = apply(&t, Transition::CallNext, 3, now).unwrap();
        assert_eq!(called.status, TicketStatus::Called);
        assert_eq!(called.counter_number, Some(3));
        assert_eq!(called.called_at, Some(now));
        assert_eq!(called.call_count, 1);
        // input untouched
        assert_eq!(t.status, TicketStatus::Waiting);
    }

    #[test]
    fn test_recall_bumps_count_and_time() {
        let t = waiting(ServiceType::Ak1, 1);
        let t0 = Utc::now();
        let called = apply(&t, Transition::CallNext, 3, t0).unwrap();
        let t1 = t0 + Duration::seconds(30);
        let recalled = apply(&called, Transition::Recall, 3, t1).unwrap();
        assert_eq!(recalled.call_count, 2);
        assert_eq!(recalled.called_at, Some(t1));
        assert_eq!(recalled.status, TicketStatus::Called);
    }

    #[test]
    fn test_hold_then_recall_from_hold_resets_count() {
        let t = waiting(ServiceType::Ak1, 1);
        let t0 = Utc::now();
        let called = apply(&t, Transition::CallNext, 3, t0).unwrap();
        let called = apply(&called, Transition::Recall, 3, t0).unwrap();
        let held = apply(&called, Transition::Hold, 3, t0).unwrap();
        assert_eq!(held.status, TicketStatus::Skipped);
        assert_eq!(held.counter_number, None);

        let t1 = t0 + Duration::minutes(5);
        let back = apply(&held, Transition::RecallFromHold, 3, t1).unwrap();
        assert_eq!(back.status, TicketStatus::Called);
        assert_eq!(back.counter_number, Some(3));
        assert_eq!(back.call_count, 1);
        assert_eq!(back.called_at, Some(t1));
    }

    #[test]
    fn test_complete_keeps_counter_for_audit() {
        let t = waiting(ServiceType::Tka, 1);
        let called = apply(&t, Transition::CallNext, 1, Utc::now()).unwrap();
        let done = apply(&called, Transition::Complete, 1, Utc::now()).unwrap();
        assert_eq!(done.status, TicketStatus::Completed);
        assert_eq!(done.counter_number, Some(1));
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let t = waiting(ServiceType::Tka, 1);
        let called = apply(&t, Transition::CallNext, 1, Utc::now()).unwrap();
        let done = apply(&called, Transition::Complete, 1, Utc::now()).unwrap();
        for tr in [
            Transition::CallNext,
            Transition::Recall,
            Transition::Hold,
            Transition::RecallFromHold,
            Transition::Complete,
            Transition::Cancel,
        ] {
            let err = apply(&done, tr, 1, Utc::now()).unwrap_err();
            assert!(matches!(err, QueueError::InvalidTransition { .. }), "{tr:?}");
        }
    }

    #[test]
    fn test_acting_from_another_counter_is_rejected() {
        let t = waiting(ServiceType::Tka, 1);
        let called = apply(&t, Transition::CallNext, 1, Utc::now()).unwrap();
        let err = apply(&called, Transition::Complete, 2, Utc::now()).unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));
    }

    #[test]
    fn test_select_next_picks_lowest_waiting_of_service() {
        let a1 = waiting(ServiceType::Ak1, 1);
        let a2 = waiting(ServiceType::Ak1, 2);
        let t1 = waiting(ServiceType::Tka, 1);
        let mut a3 = waiting(ServiceType::Ak1, 3);
        a3.status = TicketStatus::Skipped;
        let pool = vec![a2.clone(), t1, a3, a1.clone()];
        assert_eq!(select_next(&pool, ServiceType::Ak1).map(|t| t.id), Some(a1.id));
        assert!(select_next(&pool, ServiceType::Jkp).is_none());
    }

    #[test]
    fn test_select_next_prefers_older_days() {
        let mut old = waiting(ServiceType::Ak1, 9);
        old.issue_day = day().pred_opt().unwrap();
        let today = waiting(ServiceType::Ak1, 1);
        let pool = vec![today, old.clone()];
        assert_eq!(select_next(&pool, ServiceType::Ak1).map(|t| t.id), Some(old.id));
    }

    #[test]
    fn test_counter_idle_guard() {
        let t = waiting(ServiceType::Ak1, 1);
        let called = apply(&t, Transition::CallNext, 3, Utc::now()).unwrap();
        let pool = vec![called];
        let active = active_at(&pool, 3);
        assert!(matches!(
            ensure_counter_idle(active, 3),
            Err(QueueError::CounterBusy { counter: 3, .. })
        ));
        assert!(ensure_counter_idle(active_at(&pool, 2), 2).is_ok());
    }
}
