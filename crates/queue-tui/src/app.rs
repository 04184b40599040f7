//! App: one terminal screen driven by keys and daemon pushes.
//!
//! - A `tokio::mpsc` channel carries `AppMessage` events in from the key
//!   reader and the daemon link.
//! - The loop draws when something changed, then awaits the next message or
//!   timer tick.
//! - Commands to the daemon go out through `DaemonLink`.

use std::io;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use queue_proto::protocol::{Broadcast, Command, Outcome, PROTOCOL_VERSION};
use queue_proto::ticket::{ServiceType, Ticket, TicketFilter};

use crate::connection::{DaemonLink, LinkEvent};
use crate::screens::{KioskScreen, StatusScreen, TvScreen};
use crate::session::{CounterAction, CounterSession, Prepared};
use crate::ui;
use crate::widgets::toast::ToastManager;

enum AppMessage {
    Event(Event),
    Link(LinkEvent),
}

pub enum Screen {
    Counter {
        session: CounterSession,
        /// Configured default, restored when leaving manual mode.
        default_service: ServiceType,
    },
    Tv(TvScreen),
    Kiosk(KioskScreen),
    Status(StatusScreen),
}

impl Screen {
    /// Subscription the screen starts with.
    pub fn initial_filter(&self) -> TicketFilter {
        match self {
            Screen::Counter { .. } | Screen::Tv(_) => TicketFilter::live(today()),
            Screen::Kiosk(_) => KioskScreen::filter(),
            Screen::Status(s) => s.wanted_filter(),
        }
    }

    fn title(&self) -> String {
        match self {
            Screen::Counter { session, .. } => format!("Loket {}", session.counter()),
            Screen::Tv(_) => "Antrian".to_string(),
            Screen::Kiosk(_) => "Ambil nomor antrian".to_string(),
            Screen::Status(_) => "Status antrian".to_string(),
        }
    }

    fn keys(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Screen::Counter { .. } => &[
                ("n", "panggil"),
                ("r", "ulang"),
                ("h", "tahan"),
                ("c", "selesai"),
                ("x", "batal"),
                ("p", "dari tahanan"),
                ("m", "layanan"),
                ("a", "auto"),
                ("q", "keluar"),
            ],
            Screen::Kiosk(_) => &[("↑↓/1-4", "pilih"), ("enter", "ambil"), ("esc", "keluar")],
            Screen::Tv(_) | Screen::Status(_) => &[("q", "keluar")],
        }
    }

    fn resync(&mut self, snapshot: Vec<Ticket>) {
        match self {
            Screen::Counter { session, .. } => session.resync(snapshot),
            Screen::Tv(tv) => tv.resync(snapshot),
            Screen::Kiosk(k) => k.resync(snapshot),
            Screen::Status(s) => s.resync(snapshot),
        }
    }
}

pub struct App {
    screen: Screen,
    link: DaemonLink,
    toast: ToastManager,
    connected: bool,
    /// What the daemon is currently pushing to us.
    subscribed: TicketFilter,
    should_quit: bool,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn next_service(current: ServiceType) -> ServiceType {
    let all = ServiceType::ALL;
    let i = all.iter().position(|s| *s == current).unwrap_or(0);
    all[(i + 1) % all.len()]
}

impl App {
    pub fn new(screen: Screen, link: DaemonLink) -> Self {
        let subscribed = screen.initial_filter();
        Self {
            screen,
            link,
            toast: ToastManager::new(),
            connected: false,
            subscribed,
            should_quit: false,
        }
    }

    // ── Main run loop ────────────────────────────────────────────────────────

    pub async fn run(mut self, mut link_rx: mpsc::Receiver<LinkEvent>) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);
        self.toast.spinner("Menghubungkan ke server antrian");

        // ── Background task: keyboard events ─────────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: daemon link events ──────────────────────────────
        let link_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(ev) = link_rx.recv().await {
                if link_tx.send(AppMessage::Link(ev)).await.is_err() {
                    break;
                }
            }
        });

        // Toast expiry, spinner frames, reply timeouts.
        let mut toast_tick = tokio::time::interval(Duration::from_millis(100));
        toast_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // TV layout cycle and banner expiry.
        let mut clock_tick = tokio::time::interval(Duration::from_secs(1));
        clock_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    const MAX_DRAIN: usize = 256;
                    self.handle_message(msg);
                    let mut drained = 0usize;
                    while drained < MAX_DRAIN {
                        let Ok(next) = rx.try_recv() else { break };
                        self.handle_message(next);
                        drained += 1;
                    }
                    needs_redraw = true;
                }

                _ = toast_tick.tick() => {
                    let had_toasts = !self.toast.is_empty();
                    self.toast.tick();
                    let rolled_back = match &mut self.screen {
                        Screen::Counter { session, .. } => session.expire(Instant::now()),
                        _ => false,
                    };
                    if rolled_back {
                        self.toast.error("Server tidak menjawab, coba lagi");
                    }
                    let pulsing = matches!(
                        &self.screen,
                        Screen::Counter { session, .. } if session.serving_intent().is_pending()
                    );
                    needs_redraw = had_toasts || rolled_back || pulsing || !self.toast.is_empty();
                }

                _ = clock_tick.tick() => {
                    needs_redraw = matches!(self.screen, Screen::Tv(_) | Screen::Counter { .. });
                }
            }
        }

        // ── Teardown ─────────────────────────────────────────────────────────
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        Ok(())
    }

    fn draw(&self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        ui::draw_header(frame, rows[0], &self.screen.title(), self.connected);
        match &self.screen {
            Screen::Counter { session, .. } => ui::draw_counter(frame, rows[1], session, today()),
            Screen::Tv(tv) => ui::draw_tv(frame, rows[1], tv, today(), Instant::now()),
            Screen::Kiosk(k) => ui::draw_kiosk(frame, rows[1], k),
            Screen::Status(s) => ui::draw_status(frame, rows[1], s),
        }
        ui::draw_footer(frame, rows[2], self.screen.keys());
        self.toast.draw(frame, area);
    }

    // ── Message handling ─────────────────────────────────────────────────────

    fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                self.handle_key(key)
            }
            AppMessage::Event(_) => {}
            AppMessage::Link(ev) => self.handle_link(ev),
        }
    }

    fn handle_link(&mut self, ev: LinkEvent) {
        match ev {
            LinkEvent::Connected => {
                self.connected = true;
                self.toast.dismiss_spinner();
                self.toast.success("Terhubung");
            }
            LinkEvent::Disconnected(reason) => {
                debug!("link down: {}", reason);
                self.connected = false;
                self.toast.spinner("Koneksi terputus, menghubungkan ulang");
                match &mut self.screen {
                    Screen::Counter { session, .. } => session.on_disconnect(),
                    Screen::Kiosk(k) => k.on_lost(None),
                    _ => {}
                }
            }
            LinkEvent::Undelivered(id) => match &mut self.screen {
                Screen::Counter { session, .. } => {
                    if let Some(msg) = session.on_undelivered(id) {
                        self.toast.error(msg);
                    }
                }
                Screen::Kiosk(k) => k.on_lost(Some(id)),
                _ => {}
            },
            LinkEvent::Broadcast(b) => self.handle_broadcast(b),
        }
    }

    fn handle_broadcast(&mut self, b: Broadcast) {
        match b {
            Broadcast::Hello {
                protocol_version,
                snapshot,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "Daemon speaks protocol {}, this client {}",
                        protocol_version, PROTOCOL_VERSION
                    );
                    self.toast.warning(format!(
                        "Versi server ({}) berbeda dengan aplikasi ({})",
                        protocol_version, PROTOCOL_VERSION
                    ));
                }
                self.screen.resync(snapshot);
            }
            Broadcast::Snapshot { tickets } => {
                self.screen.resync(tickets);
                self.follow_status_filter();
            }
            Broadcast::Ticket { ticket } => {
                match &mut self.screen {
                    Screen::Counter { session, .. } => {
                        session.apply_push(ticket);
                    }
                    Screen::Tv(tv) => {
                        if let Some(a) = tv.apply_push(ticket) {
                            info!("Announce: {}", a.text);
                        }
                    }
                    Screen::Kiosk(k) => {
                        k.apply_push(ticket);
                    }
                    Screen::Status(s) => {
                        s.apply_push(ticket);
                    }
                }
                self.follow_status_filter();
            }
            Broadcast::Reply {
                request_id,
                outcome,
            } => self.handle_reply(request_id, outcome),
            Broadcast::Log { message } => self.toast.warning(message),
        }
    }

    fn handle_reply(&mut self, request_id: u64, outcome: Outcome) {
        let mut resync = false;
        match &mut self.screen {
            Screen::Counter { session, .. } => {
                let effect = session.on_reply(request_id, outcome);
                if let Some(msg) = effect.message {
                    if effect.is_error {
                        self.toast.error(msg);
                    } else {
                        self.toast.info(msg);
                    }
                }
                resync = effect.resync;
            }
            Screen::Kiosk(k) => {
                k.on_reply(request_id, outcome);
            }
            Screen::Tv(_) | Screen::Status(_) => {
                if let Outcome::Err { error } = outcome {
                    debug!("request {} failed: {}", request_id, error);
                    resync = error.needs_resync();
                }
            }
        }
        if resync {
            self.link.request(Command::Resync);
        }
    }

    /// The status screen widens its subscription once it knows the ticket's
    /// service.
    fn follow_status_filter(&mut self) {
        let Screen::Status(s) = &self.screen else {
            return;
        };
        let wanted = s.wanted_filter();
        if wanted != self.subscribed {
            self.subscribed = wanted.clone();
            self.link.request(Command::Subscribe { filter: wanted });
        }
    }

    // ── Keys ─────────────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if matches!(self.screen, Screen::Counter { .. }) {
            self.handle_counter_key(key.code);
            return;
        }
        match &mut self.screen {
            Screen::Counter { .. } => {}
            Screen::Kiosk(k) => match key.code {
                KeyCode::Esc => self.should_quit = true,
                KeyCode::Up => k.select(-1),
                KeyCode::Down => k.select(1),
                KeyCode::Char(c @ '1'..='9') => {
                    k.select_index(c as usize - '1' as usize);
                }
                KeyCode::Enter => {
                    if let Some(cmd) = k.issue() {
                        match self.link.request(cmd) {
                            Some(id) => k.sent(id),
                            None => k.on_lost(None),
                        }
                    }
                }
                _ => {}
            },
            Screen::Tv(_) | Screen::Status(_) => {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    self.should_quit = true;
                }
            }
        }
    }

    fn handle_counter_key(&mut self, code: KeyCode) {
        let Screen::Counter {
            session,
            default_service,
        } = &mut self.screen
        else {
            return;
        };

        if session.confirmation().is_some() {
            let command = match code {
                KeyCode::Char('y') | KeyCode::Enter => session.confirm(),
                KeyCode::Char('n') | KeyCode::Esc => {
                    session.dismiss();
                    None
                }
                _ => None,
            };
            if let Some(cmd) = command {
                Self::send(&mut self.link, &mut self.toast, session, cmd);
            }
            return;
        }

        let action = match code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('m') => {
                let next = next_service(session.service());
                session.set_manual(next);
                self.toast.info(format!("Mode manual: {}", next.code()));
                return;
            }
            KeyCode::Char('a') => {
                session.set_auto(*default_service);
                self.toast.info(format!("Mode auto: {}", default_service.code()));
                return;
            }
            KeyCode::Up => {
                session.select_held(-1);
                return;
            }
            KeyCode::Down => {
                session.select_held(1);
                return;
            }
            KeyCode::Char('n') | KeyCode::Enter => CounterAction::CallNext,
            KeyCode::Char('r') => CounterAction::Recall,
            KeyCode::Char('h') => CounterAction::Hold,
            KeyCode::Char('p') => CounterAction::RecallFromHold,
            KeyCode::Char('c') => CounterAction::Complete,
            KeyCode::Char('x') => CounterAction::Cancel,
            _ => return,
        };

        match session.prepare(action) {
            Ok(Prepared::Command(cmd)) => Self::send(&mut self.link, &mut self.toast, session, cmd),
            Ok(Prepared::Confirm(_)) => {}
            Err(refusal) => self.toast.warning(refusal.message()),
        }
    }

    fn send(
        link: &mut DaemonLink,
        toast: &mut ToastManager,
        session: &mut CounterSession,
        command: Command,
    ) {
        match link.request(command.clone()) {
            Some(id) => session.sent(id, &command),
            None => toast.error("Gagal terhubung, coba lagi"),
        }
    }
}
