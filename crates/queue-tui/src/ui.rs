//! Rendering.  Every function here reads state and draws; none mutate.

use std::time::Instant;

use chrono::NaiveDate;
use queue_proto::display::{TvLayout, TvView};
use queue_proto::ticket::{Ticket, TicketStatus};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::intent::RenderHint;
use crate::screens::{KioskNotice, KioskScreen, StatusScreen, TvScreen};
use crate::session::CounterSession;
use crate::theme::*;

/// One-line title bar with the link badge on the right.
pub fn draw_header(frame: &mut Frame, area: Rect, title: &str, connected: bool) {
    let badge = if connected { " ● LIVE " } else { " ● OFFLINE " };
    let badge_style = Style::default()
        .fg(if connected { C_BADGE_LIVE } else { C_BADGE_ERR })
        .add_modifier(Modifier::BOLD);
    let pad = (area.width as usize).saturating_sub(title.width() + badge.width() + 1);
    let line = Line::from(vec![
        Span::styled(format!(" {title}"), style_default().add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(pad)),
        Span::styled(badge, badge_style),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

pub fn draw_footer(frame: &mut Frame, area: Rect, keys: &[(&str, &str)]) {
    let mut spans = Vec::with_capacity(keys.len() * 2);
    for (key, label) in keys {
        spans.push(Span::styled(format!(" {key} "), style_called()));
        spans.push(Span::styled(format!("{label}  "), style_secondary()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn panel(title: &str, focused: bool) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(style_border(focused))
        .title(Span::styled(format!(" {title} "), style_secondary()))
}

fn status_style(ticket: &Ticket) -> Style {
    match ticket.status {
        TicketStatus::Called => style_called(),
        TicketStatus::Skipped => Style::default().fg(C_HELD),
        TicketStatus::Completed => Style::default().fg(C_DONE),
        TicketStatus::Cancelled => style_muted(),
        TicketStatus::Waiting => style_default(),
    }
}

// ── Counter ──────────────────────────────────────────────────────────────────

pub fn draw_counter(frame: &mut Frame, area: Rect, session: &CounterSession, today: NaiveDate) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(4), Constraint::Length(3)])
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[1]);

    // Now serving.
    let hint = session.serving_intent().render_state();
    let serving = match session.current() {
        Some(t) => vec![
            Line::from(Span::styled(
                t.label(),
                style_called().add_modifier(Modifier::REVERSED),
            )),
            Line::from(Span::styled(
                format!("{} · dipanggil {}x", t.service_type.name(), t.call_count),
                style_secondary(),
            )),
        ],
        None => vec![Line::from(Span::styled("Loket kosong", style_muted()))],
    };
    let title = match hint {
        RenderHint::Normal => "Sedang dilayani".to_string(),
        RenderHint::PendingVisible => "Sedang dilayani ⟳".to_string(),
        RenderHint::PendingHidden => "Sedang dilayani".to_string(),
        RenderHint::TimedOut => "Sedang dilayani ?".to_string(),
    };
    frame.render_widget(
        Paragraph::new(serving)
            .alignment(Alignment::Center)
            .block(panel(&title, true)),
        rows[0],
    );

    // Waiting list.
    let mode = if session.binding().is_manual() { "manual" } else { "auto" };
    let waiting: Vec<ListItem> = session
        .waiting()
        .iter()
        .enumerate()
        .map(|(i, t)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>2}. ", i + 1), style_muted()),
                Span::styled(t.label(), status_style(t)),
                Span::styled(
                    format!("  {}", t.created_at.with_timezone(&chrono::Local).format("%H:%M")),
                    style_secondary(),
                ),
            ]))
        })
        .collect();
    frame.render_widget(
        List::new(waiting).block(panel(
            &format!("Menunggu · {} ({mode})", session.service().code()),
            false,
        )),
        cols[0],
    );

    // Held list.
    let selected = session.selected_held();
    let held: Vec<ListItem> = session
        .held()
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let style = if i == selected { style_selected() } else { status_style(t) };
            ListItem::new(Span::styled(
                format!("{}  ({}x)", t.label(), t.call_count),
                style,
            ))
        })
        .collect();
    frame.render_widget(List::new(held).block(panel("Ditahan", false)), cols[1]);

    // Daily stats.
    let stats = session.stats(today);
    let line = Line::from(vec![
        Span::styled(format!(" Menunggu {} ", stats.waiting), style_default()),
        Span::styled(format!(" Selesai {} ", stats.completed), Style::default().fg(C_DONE)),
        Span::styled(format!(" Ditahan {} ", stats.skipped), Style::default().fg(C_HELD)),
        Span::styled(format!(" Batal {} ", stats.cancelled), style_muted()),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(panel(&format!("Loket {}", session.counter()), false)),
        rows[2],
    );

    if let Some(confirm) = session.confirmation() {
        draw_prompt(frame, area, &confirm.prompt);
    }
}

fn draw_prompt(frame: &mut Frame, area: Rect, prompt: &str) {
    let width = (prompt.width() as u16 + 6).max(30).min(area.width);
    let rect = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + area.height / 2 - 2.min(area.height / 2),
        width,
        height: 4.min(area.height),
    };
    frame.render_widget(Clear, rect);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(Span::styled(prompt, style_default())),
            Line::from(Span::styled("[y] ya   [n] tidak", style_secondary())),
        ])
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(C_ACCENT))),
        rect,
    );
}

// ── TV ───────────────────────────────────────────────────────────────────────

pub fn draw_tv(frame: &mut Frame, area: Rect, screen: &TvScreen, today: NaiveDate, now: Instant) {
    let view = screen.view(today);
    let banner = screen.banner(now);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(if banner.is_some() { 3 } else { 0 }),
            Constraint::Min(4),
        ])
        .split(area);

    if let Some(a) = banner {
        frame.render_widget(
            Paragraph::new(Line::from(format!("{}  →  LOKET {}", a.label, a.counter)))
                .alignment(Alignment::Center)
                .style(style_banner())
                .block(Block::default().borders(Borders::ALL)),
            rows[0],
        );
    }

    match screen.layout(now) {
        TvLayout::Grid => draw_tv_grid(frame, rows[1], &view),
        TvLayout::Split => draw_tv_split(frame, rows[1], &view),
    }
}

fn draw_tv_grid(frame: &mut Frame, area: Rect, view: &TvView) {
    if view.columns.is_empty() {
        return;
    }
    let constraints = vec![Constraint::Ratio(1, view.columns.len() as u32); view.columns.len()];
    let cells = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);
    for (col, cell) in view.columns.iter().zip(cells.iter()) {
        let items: Vec<ListItem> = col
            .entries
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let style = if i == 0 && col.is_top_called() {
                    style_called().add_modifier(Modifier::REVERSED)
                } else {
                    status_style(t)
                };
                ListItem::new(Span::styled(t.board_label(), style))
            })
            .collect();
        let title = format!("LOKET {} · {}", col.counter, col.service.board_code());
        frame.render_widget(
            List::new(items).block(panel(&title, col.is_top_called())),
            *cell,
        );
    }
}

fn draw_tv_split(frame: &mut Frame, area: Rect, view: &TvView) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let rows: Vec<Line> = view
        .split
        .iter()
        .map(|row| {
            let (text, style) = match &row.now_serving {
                Some(t) if row.is_called() => (t.board_label(), style_called()),
                Some(t) => (t.board_label(), status_style(t)),
                None => ("—".to_string(), style_muted()),
            };
            Line::from(vec![
                Span::styled(format!(" LOKET {:<3}", row.counter), style_secondary()),
                Span::styled(text, style),
            ])
        })
        .collect();
    frame.render_widget(
        Paragraph::new(rows).block(panel("Sedang dilayani", true)),
        halves[0],
    );

    let history: Vec<ListItem> = view
        .history
        .iter()
        .map(|t| {
            ListItem::new(Span::styled(
                format!(
                    "{}  → {}",
                    t.board_label(),
                    t.counter_number.map(|c| c.to_string()).unwrap_or_default()
                ),
                status_style(t),
            ))
        })
        .collect();
    frame.render_widget(List::new(history).block(panel("Riwayat", false)), halves[1]);
}

// ── Kiosk ────────────────────────────────────────────────────────────────────

pub fn draw_kiosk(frame: &mut Frame, area: Rect, kiosk: &KioskScreen) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(5)])
        .split(area);

    let items: Vec<ListItem> = kiosk
        .catalog()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let style = if i == kiosk.selected() { style_selected() } else { style_default() };
            ListItem::new(vec![
                Line::from(Span::styled(format!(" {}. {}", i + 1, s.name()), style)),
                Line::from(Span::styled(
                    format!("    {} · {} menunggu", s.description(), kiosk.waiting_count(*s)),
                    style_secondary(),
                )),
            ])
        })
        .collect();
    frame.render_widget(List::new(items).block(panel("Pilih layanan", true)), rows[0]);

    let notice = match kiosk.notice() {
        KioskNotice::Idle => vec![Line::from(Span::styled(
            "Tekan Enter untuk mengambil nomor antrian",
            style_secondary(),
        ))],
        KioskNotice::Issuing(s) => vec![Line::from(Span::styled(
            format!("Mencetak tiket {}…", s.code()),
            style_secondary(),
        ))],
        KioskNotice::Issued { label, status_url } => vec![
            Line::from(Span::styled(label.clone(), style_called())),
            Line::from(Span::styled(status_url.clone(), style_secondary())),
        ],
        KioskNotice::Failed(msg) => vec![Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(C_BADGE_ERR),
        ))],
    };
    frame.render_widget(
        Paragraph::new(notice)
            .alignment(Alignment::Center)
            .block(panel("Tiket", false)),
        rows[1],
    );
}

// ── Status ───────────────────────────────────────────────────────────────────

pub fn draw_status(frame: &mut Frame, area: Rect, screen: &StatusScreen) {
    let mut lines = vec![Line::from(Span::styled(
        screen.headline(),
        style_default().add_modifier(Modifier::BOLD),
    ))];
    if let Some(t) = screen.ticket() {
        lines.push(Line::from(Span::styled(t.service_type.name(), style_secondary())));
        lines.push(Line::from(Span::styled(t.status.as_str(), status_style(t))));
    }
    lines.push(Line::from(Span::styled(
        screen.ticket_id().to_string(),
        style_muted(),
    )));
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(panel("Status antrian", true)),
        area,
    );
}
