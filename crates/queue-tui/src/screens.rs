//! State for the read-mostly screens: TV board, kiosk and ticket status.
//!
//! Each screen owns a [`TicketBoard`] fed from the daemon link and exposes
//! projections for `ui.rs`.  No rendering happens here.

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use queue_proto::board::TicketBoard;
use queue_proto::config::CounterConfig;
use queue_proto::display::{self, Announcement, Announcer, TvLayout, TvView};
use queue_proto::protocol::{Command, Outcome};
use queue_proto::receipt;
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter, TicketId, TicketStatus};

/// How long a call stays in the TV banner.
pub const BANNER_SECS: u64 = 10;

// ── TV ───────────────────────────────────────────────────────────────────────

pub struct TvScreen {
    board: TicketBoard,
    announcer: Announcer,
    counters: Vec<CounterConfig>,
    history_len: usize,
    cycle: Duration,
    started: Instant,
    banner: Option<(Announcement, Instant)>,
}

impl TvScreen {
    pub fn new(
        counters: Vec<CounterConfig>,
        history_len: usize,
        cycle: Duration,
        template: impl Into<String>,
    ) -> Self {
        Self {
            board: TicketBoard::new(TicketFilter::all()),
            announcer: Announcer::new(template),
            counters,
            history_len,
            cycle,
            started: Instant::now(),
            banner: None,
        }
    }

    /// Calls already on the board when the snapshot arrives stay silent.
    pub fn resync(&mut self, snapshot: Vec<Ticket>) {
        self.board.resync(snapshot);
        self.announcer.prime(self.board.iter());
    }

    /// Apply a push and return the announcement it triggers, if any.
    pub fn apply_push(&mut self, ticket: Ticket) -> Option<Announcement> {
        if !self.board.apply(ticket.clone()) {
            return None;
        }
        let announcement = self.announcer.observe(&ticket)?;
        self.banner = Some((announcement.clone(), Instant::now()));
        Some(announcement)
    }

    pub fn view(&self, today: NaiveDate) -> TvView {
        let tickets: Vec<&Ticket> = self.board.iter().collect();
        display::tv_view(&tickets, &self.counters, today, self.history_len)
    }

    pub fn layout(&self, now: Instant) -> TvLayout {
        display::layout_at(now.duration_since(self.started), self.cycle)
    }

    pub fn banner(&self, now: Instant) -> Option<&Announcement> {
        self.banner
            .as_ref()
            .filter(|(_, at)| now.duration_since(*at) < Duration::from_secs(BANNER_SECS))
            .map(|(a, _)| a)
    }
}

// ── Kiosk ────────────────────────────────────────────────────────────────────

/// What the kiosk shows below the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum KioskNotice {
    Idle,
    Issuing(ServiceType),
    Issued { label: String, status_url: String },
    Failed(String),
}

pub struct KioskScreen {
    /// Waiting tickets, for the per-service counts next to the catalog.
    board: TicketBoard,
    selected: usize,
    pending: Option<u64>,
    notice: KioskNotice,
    public_base_url: String,
}

impl KioskScreen {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            board: TicketBoard::new(Self::filter()),
            selected: 0,
            pending: None,
            notice: KioskNotice::Idle,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn filter() -> TicketFilter {
        TicketFilter::statuses([TicketStatus::Waiting])
    }

    pub fn catalog(&self) -> &'static [ServiceType] {
        &ServiceType::ALL
    }

    pub fn resync(&mut self, snapshot: Vec<Ticket>) {
        self.board.resync(snapshot);
    }

    pub fn apply_push(&mut self, ticket: Ticket) -> bool {
        self.board.apply(ticket)
    }

    pub fn waiting_count(&self, service: ServiceType) -> usize {
        self.board
            .iter()
            .filter(|t| t.service_type == service)
            .count()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn notice(&self) -> &KioskNotice {
        &self.notice
    }

    pub fn select(&mut self, delta: isize) {
        let len = ServiceType::ALL.len() as isize;
        self.selected = (self.selected as isize + delta).rem_euclid(len) as usize;
    }

    pub fn select_index(&mut self, index: usize) {
        if index < ServiceType::ALL.len() {
            self.selected = index;
        }
    }

    /// Command for the highlighted service, unless one is already in flight.
    pub fn issue(&mut self) -> Option<Command> {
        if self.pending.is_some() {
            return None;
        }
        let service = ServiceType::ALL[self.selected];
        self.notice = KioskNotice::Issuing(service);
        Some(Command::IssueTicket { service })
    }

    pub fn sent(&mut self, request_id: u64) {
        self.pending = Some(request_id);
    }

    pub fn on_reply(&mut self, request_id: u64, outcome: Outcome) -> bool {
        if self.pending != Some(request_id) {
            return false;
        }
        self.pending = None;
        self.notice = match outcome {
            Outcome::Ok {
                ticket: Some(ticket),
            } => KioskNotice::Issued {
                label: ticket.label(),
                status_url: receipt::status_url(&self.public_base_url, ticket.id),
            },
            Outcome::Ok { ticket: None } => KioskNotice::Idle,
            Outcome::Err { error } => KioskNotice::Failed(error.user_message()),
        };
        true
    }

    /// The request never made it out, or the link dropped before the reply.
    pub fn on_lost(&mut self, request_id: Option<u64>) {
        if request_id.is_some() && self.pending != request_id {
            return;
        }
        if self.pending.take().is_some() {
            self.notice = KioskNotice::Failed("Gagal terhubung, coba lagi".to_string());
        }
    }
}

// ── Ticket status ────────────────────────────────────────────────────────────

pub struct StatusScreen {
    ticket_id: TicketId,
    board: TicketBoard,
}

impl StatusScreen {
    pub fn new(ticket_id: TicketId) -> Self {
        Self {
            ticket_id,
            board: TicketBoard::new(TicketFilter::all()),
        }
    }

    pub fn ticket_id(&self) -> TicketId {
        self.ticket_id
    }

    /// Subscription this screen needs.  Until the ticket is known only the
    /// ticket itself; then its service from the ticket's day on, so the count
    /// of tickets ahead can follow every call.
    pub fn wanted_filter(&self) -> TicketFilter {
        match self.ticket() {
            Some(t) => TicketFilter::all()
                .with_service(t.service_type)
                .since(t.issue_day),
            None => TicketFilter::ticket(self.ticket_id),
        }
    }

    pub fn resync(&mut self, snapshot: Vec<Ticket>) {
        self.board.resync(snapshot);
    }

    pub fn apply_push(&mut self, ticket: Ticket) -> bool {
        self.board.apply(ticket)
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.board.get(&self.ticket_id)
    }

    pub fn queues_ahead(&self) -> Option<usize> {
        let ticket = self.ticket()?;
        (ticket.status == TicketStatus::Waiting)
            .then(|| display::queues_ahead(self.board.iter(), ticket))
    }

    /// One line describing where the ticket stands.
    pub fn headline(&self) -> String {
        let Some(t) = self.ticket() else {
            return "Tiket tidak ditemukan".to_string();
        };
        match t.status {
            TicketStatus::Waiting => match self.queues_ahead() {
                Some(0) => format!("{}: berikutnya dipanggil", t.label()),
                Some(n) => format!("{}: {} antrian di depan", t.label(), n),
                None => t.label(),
            },
            TicketStatus::Called => format!(
                "{}: silakan ke loket {}",
                t.label(),
                t.counter_number.unwrap_or_default()
            ),
            TicketStatus::Skipped => format!("{}: ditahan, tunggu panggilan ulang", t.label()),
            TicketStatus::Completed => format!("{}: selesai", t.label()),
            TicketStatus::Cancelled => format!("{}: dibatalkan", t.label()),
        }
    }
}
