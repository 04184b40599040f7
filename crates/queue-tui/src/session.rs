//! Counter session: one physical counter's view of the queue.
//!
//! The session never decides anything about ticket state.  It turns
//! operator keys into daemon commands, keeps a local board fed by pushes,
//! and layers optimistic hints on top: a ticket being called is hidden from
//! the waiting list until the daemon either confirms or refuses.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use queue_proto::board::TicketBoard;
use queue_proto::display::{self, DailyStats};
use queue_proto::error::QueueError;
use queue_proto::machine;
use queue_proto::protocol::{Command, Outcome};
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter, TicketId, TicketStatus};

use crate::intent::IntentState;

/// Replies slower than this roll the optimistic view back.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(4);

/// Held tickets called fewer times than this get an explicit warning.
const HOLD_WARNING_CALLS: u32 = 3;

/// Which service the counter pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceBinding {
    /// The configured default for this counter.
    Auto(ServiceType),
    /// Operator override.
    Manual(ServiceType),
}

impl ServiceBinding {
    pub fn service(self) -> ServiceType {
        match self {
            ServiceBinding::Auto(s) | ServiceBinding::Manual(s) => s,
        }
    }

    pub fn is_manual(self) -> bool {
        matches!(self, ServiceBinding::Manual(_))
    }
}

/// Operator actions on the counter panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    CallNext,
    Recall,
    Hold,
    RecallFromHold,
    Complete,
    Cancel,
}

impl CounterAction {
    pub fn needs_confirmation(self) -> bool {
        matches!(self, CounterAction::Hold | CounterAction::Cancel)
    }

    fn verb(self) -> &'static str {
        match self {
            CounterAction::CallNext => "panggil",
            CounterAction::Recall => "panggil ulang",
            CounterAction::Hold => "tahan",
            CounterAction::RecallFromHold => "panggil dari tahanan",
            CounterAction::Complete => "selesaikan",
            CounterAction::Cancel => "batalkan",
        }
    }
}

/// Why a key press did not turn into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    /// Another call is still waiting for its reply.
    Busy,
    /// The counter is serving a ticket; finish it first.
    Serving(String),
    NothingServing,
    NothingWaiting,
    NothingHeld,
}

impl Refusal {
    pub fn message(&self) -> String {
        match self {
            Refusal::Busy => "Menunggu jawaban server".to_string(),
            Refusal::Serving(label) => format!("Masih melayani {label}"),
            Refusal::NothingServing => "Tidak ada antrian yang sedang dilayani".to_string(),
            Refusal::NothingWaiting => "Tidak ada antrian".to_string(),
            Refusal::NothingHeld => "Tidak ada antrian yang ditahan".to_string(),
        }
    }
}

/// Pending confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub action: CounterAction,
    pub ticket_id: TicketId,
    pub prompt: String,
}

#[derive(Debug, Clone)]
struct InFlight {
    action: CounterAction,
    /// Ticket hidden from the waiting list for this request.
    hidden: Option<TicketId>,
    since: Instant,
}

/// What the app should do after a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyEffect {
    /// Text for a toast.  `None` means silent.
    pub message: Option<String>,
    pub is_error: bool,
    /// The local board is stale; request a resync.
    pub resync: bool,
}

pub struct CounterSession {
    counter: u32,
    binding: ServiceBinding,
    board: TicketBoard,
    list_len: usize,
    in_flight: HashMap<u64, InFlight>,
    hidden: HashSet<TicketId>,
    /// What the counter is serving, as the operator intends it.
    serving: IntentState<Option<TicketId>>,
    selected_held: usize,
    confirmation: Option<Confirmation>,
}

impl CounterSession {
    pub fn new(counter: u32, binding: ServiceBinding, list_len: usize) -> Self {
        Self {
            counter,
            binding,
            board: TicketBoard::new(TicketFilter::all()),
            list_len,
            in_flight: HashMap::new(),
            hidden: HashSet::new(),
            serving: IntentState::new(None),
            selected_held: 0,
            confirmation: None,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn binding(&self) -> ServiceBinding {
        self.binding
    }

    pub fn service(&self) -> ServiceType {
        self.binding.service()
    }

    pub fn serving_intent(&self) -> &IntentState<Option<TicketId>> {
        &self.serving
    }

    /// Switch to `service` in manual mode.
    pub fn set_manual(&mut self, service: ServiceType) {
        self.binding = ServiceBinding::Manual(service);
        self.selected_held = 0;
    }

    pub fn set_auto(&mut self, default: ServiceType) {
        self.binding = ServiceBinding::Auto(default);
        self.selected_held = 0;
    }

    // ── Feed ─────────────────────────────────────────────────────────────────

    pub fn resync(&mut self, snapshot: Vec<Ticket>) {
        self.board.resync(snapshot);
        self.reconcile_hidden();
        self.confirm_serving();
    }

    pub fn apply_push(&mut self, ticket: Ticket) -> bool {
        let changed = self.board.apply(ticket);
        if changed {
            self.reconcile_hidden();
            self.confirm_serving();
        }
        changed
    }

    fn confirm_serving(&mut self) {
        let current = self.current().map(|t| t.id);
        self.serving.on_confirmed(current);
    }

    /// A hidden ticket stays hidden only while it is still waiting and its
    /// request is still open.
    fn reconcile_hidden(&mut self) {
        let open: HashSet<TicketId> = self.in_flight.values().filter_map(|f| f.hidden).collect();
        let board = &self.board;
        self.hidden.retain(|id| {
            open.contains(id)
                && board
                    .get(id)
                    .is_some_and(|t| t.status == TicketStatus::Waiting)
        });
    }

    // ── Projections ──────────────────────────────────────────────────────────

    /// Ticket currently served at this counter, whatever its service.
    pub fn current(&self) -> Option<&Ticket> {
        machine::active_at(self.board.iter(), self.counter)
    }

    pub fn waiting(&self) -> Vec<Ticket> {
        display::waiting_list(
            self.board.iter().filter(|t| !self.hidden.contains(&t.id)),
            self.service(),
            self.list_len,
        )
    }

    pub fn held(&self) -> Vec<Ticket> {
        display::held_list(self.board.iter(), self.service())
    }

    pub fn stats(&self, today: NaiveDate) -> DailyStats {
        display::daily_stats(self.board.iter(), self.service(), today)
    }

    pub fn selected_held(&self) -> usize {
        self.selected_held
    }

    pub fn select_held(&mut self, delta: isize) {
        let len = self.held().len();
        if len == 0 {
            self.selected_held = 0;
            return;
        }
        let next = (self.selected_held as isize + delta).rem_euclid(len as isize);
        self.selected_held = next as usize;
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    // ── Operator actions ─────────────────────────────────────────────────────

    /// Build the command for `action`.  Hold and cancel return the
    /// confirmation prompt instead; call [`Self::confirm`] to get the command.
    pub fn prepare(&mut self, action: CounterAction) -> Result<Prepared, Refusal> {
        if self.has_in_flight() {
            return Err(Refusal::Busy);
        }
        let counter = self.counter;
        match action {
            CounterAction::CallNext => {
                if let Some(cur) = self.current() {
                    return Err(Refusal::Serving(cur.label()));
                }
                if self.waiting().is_empty() {
                    return Err(Refusal::NothingWaiting);
                }
                Ok(Prepared::Command(Command::CallNext {
                    counter,
                    service: self.service(),
                }))
            }
            CounterAction::RecallFromHold => {
                if let Some(cur) = self.current() {
                    return Err(Refusal::Serving(cur.label()));
                }
                let held = self.held();
                let ticket = held
                    .get(self.selected_held.min(held.len().saturating_sub(1)))
                    .ok_or(Refusal::NothingHeld)?;
                Ok(Prepared::Command(Command::RecallFromHold {
                    counter,
                    ticket_id: ticket.id,
                }))
            }
            CounterAction::Recall | CounterAction::Complete => {
                let ticket_id = self.current().ok_or(Refusal::NothingServing)?.id;
                Ok(Prepared::Command(match action {
                    CounterAction::Recall => Command::Recall { counter, ticket_id },
                    _ => Command::Complete { counter, ticket_id },
                }))
            }
            CounterAction::Hold | CounterAction::Cancel => {
                let cur = self.current().ok_or(Refusal::NothingServing)?;
                let mut prompt = format!("{} {}?", capitalize(action.verb()), cur.label());
                if action == CounterAction::Hold && cur.call_count < HOLD_WARNING_CALLS {
                    prompt.push_str(&format!(
                        " Baru dipanggil {} kali.",
                        cur.call_count
                    ));
                }
                let confirmation = Confirmation {
                    action,
                    ticket_id: cur.id,
                    prompt,
                };
                self.confirmation = Some(confirmation.clone());
                Ok(Prepared::Confirm(confirmation))
            }
        }
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    /// Operator accepted the prompt.
    pub fn confirm(&mut self) -> Option<Command> {
        let c = self.confirmation.take()?;
        let counter = self.counter;
        Some(match c.action {
            CounterAction::Hold => Command::Hold {
                counter,
                ticket_id: c.ticket_id,
            },
            _ => Command::Cancel {
                counter,
                ticket_id: c.ticket_id,
            },
        })
    }

    pub fn dismiss(&mut self) {
        self.confirmation = None;
    }

    /// Record that `command` went out as `request_id` and apply the
    /// optimistic hint for it.
    pub fn sent(&mut self, request_id: u64, command: &Command) {
        let (action, hidden) = match command {
            Command::CallNext { .. } => {
                let hidden = self.waiting().first().map(|t| t.id);
                self.serving.set_intent(hidden);
                (CounterAction::CallNext, hidden)
            }
            Command::Recall { .. } => (CounterAction::Recall, None),
            Command::Hold { .. } => {
                self.serving.set_intent(None);
                (CounterAction::Hold, None)
            }
            Command::RecallFromHold { ticket_id, .. } => {
                self.serving.set_intent(Some(*ticket_id));
                (CounterAction::RecallFromHold, None)
            }
            Command::Complete { .. } => {
                self.serving.set_intent(None);
                (CounterAction::Complete, None)
            }
            Command::Cancel { .. } => {
                self.serving.set_intent(None);
                (CounterAction::Cancel, None)
            }
            _ => return,
        };
        if let Some(id) = hidden {
            self.hidden.insert(id);
        }
        self.in_flight.insert(
            request_id,
            InFlight {
                action,
                hidden,
                since: Instant::now(),
            },
        );
    }

    fn roll_back(&mut self, flight: &InFlight) {
        if let Some(id) = flight.hidden {
            self.hidden.remove(&id);
        }
        self.serving.abandon();
        self.confirm_serving();
    }

    /// Handle the daemon's reply to one of our requests.  Replies to
    /// requests this session did not send are ignored.
    pub fn on_reply(&mut self, request_id: u64, outcome: Outcome) -> ReplyEffect {
        let Some(flight) = self.in_flight.remove(&request_id) else {
            return ReplyEffect::default();
        };
        match outcome {
            Outcome::Ok { ticket } => {
                let message = ticket.as_ref().map(|t| match flight.action {
                    CounterAction::CallNext | CounterAction::RecallFromHold => {
                        format!("Memanggil {} ke loket {}", t.label(), self.counter)
                    }
                    CounterAction::Recall => {
                        format!("Panggil ulang {} ({}x)", t.label(), t.call_count)
                    }
                    CounterAction::Hold => format!("{} ditahan", t.label()),
                    CounterAction::Complete => format!("{} selesai", t.label()),
                    CounterAction::Cancel => format!("{} dibatalkan", t.label()),
                });
                if let Some(t) = ticket {
                    self.apply_push(t);
                }
                // The push for a lost race may already have re-shown the
                // ticket; make sure nothing stays hidden for a closed request.
                self.roll_back(&flight);
                ReplyEffect {
                    message,
                    is_error: false,
                    resync: false,
                }
            }
            Outcome::Err { error } => {
                self.roll_back(&flight);
                ReplyEffect {
                    message: Some(error.user_message()),
                    is_error: !matches!(error, QueueError::NoTicketsWaiting),
                    resync: error.needs_resync(),
                }
            }
        }
    }

    /// The link never delivered `request_id`.
    pub fn on_undelivered(&mut self, request_id: u64) -> Option<String> {
        let flight = self.in_flight.remove(&request_id)?;
        self.roll_back(&flight);
        Some(QueueError::persistence("not delivered").user_message())
    }

    /// Drop requests that have waited too long for a reply.  Returns true if
    /// anything was rolled back.
    pub fn expire(&mut self, now: Instant) -> bool {
        let stale: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| now.duration_since(f.since) >= REPLY_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            if let Some(flight) = self.in_flight.remove(id) {
                self.roll_back(&flight);
            }
        }
        self.serving.tick();
        !stale.is_empty()
    }

    /// Connection dropped: nothing in flight will be answered.
    pub fn on_disconnect(&mut self) {
        let flights: Vec<InFlight> = self.in_flight.drain().map(|(_, f)| f).collect();
        for f in &flights {
            self.roll_back(f);
        }
    }
}

/// Result of [`CounterSession::prepare`].
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    Command(Command),
    Confirm(Confirmation),
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
