//! Colours and styles shared by every screen.

use ratatui::style::{Color, Modifier, Style};

pub const C_ACCENT: Color = Color::Rgb(240, 110, 90);
pub const C_CALLED: Color = Color::Rgb(90, 210, 130);
pub const C_HELD: Color = Color::Rgb(255, 184, 80);
pub const C_DONE: Color = Color::Rgb(80, 140, 200);
pub const C_MUTED: Color = Color::Rgb(78, 80, 92);
pub const C_SECONDARY: Color = Color::Rgb(120, 124, 140);
pub const C_PRIMARY: Color = Color::Rgb(220, 222, 230);
pub const C_SELECTION_BG: Color = Color::Rgb(30, 34, 48);
pub const C_PANEL_BORDER: Color = Color::Rgb(44, 46, 58);
pub const C_PANEL_BORDER_FOCUSED: Color = Color::Rgb(90, 150, 220);
pub const C_BANNER_BG: Color = Color::Rgb(20, 60, 40);
pub const C_TOAST_INFO: Color = C_DONE;
pub const C_TOAST_SUCCESS: Color = C_CALLED;
pub const C_TOAST_WARNING: Color = C_HELD;
pub const C_TOAST_ERROR: Color = C_ACCENT;
pub const C_BADGE_LIVE: Color = C_CALLED;
pub const C_BADGE_ERR: Color = C_ACCENT;

pub fn style_default() -> Style {
    Style::default().fg(C_PRIMARY)
}

pub fn style_secondary() -> Style {
    Style::default().fg(C_SECONDARY)
}

pub fn style_muted() -> Style {
    Style::default().fg(C_MUTED)
}

pub fn style_called() -> Style {
    Style::default().fg(C_CALLED).add_modifier(Modifier::BOLD)
}

pub fn style_selected() -> Style {
    Style::default()
        .bg(C_SELECTION_BG)
        .fg(C_PRIMARY)
        .add_modifier(Modifier::BOLD)
}

pub fn style_border(focused: bool) -> Style {
    if focused {
        Style::default().fg(C_PANEL_BORDER_FOCUSED)
    } else {
        Style::default().fg(C_PANEL_BORDER)
    }
}

pub fn style_banner() -> Style {
    Style::default()
        .bg(C_BANNER_BG)
        .fg(C_PRIMARY)
        .add_modifier(Modifier::BOLD)
}
