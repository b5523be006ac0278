use anyhow::Error;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

use crate::error::{classify, ErrorClass};
use crate::models::{AccountStatus, BookingStatus, ExperienceStatus};

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Message to show for a failed action. Typed failures carry a message meant
/// for the user; anything else falls back to its innermost cause.
pub(crate) fn surface_error(err: &Error) -> String {
    match classify(err) {
        ErrorClass::Validation(validation) => validation.message,
        ErrorClass::Backend(backend) => backend.to_string(),
        ErrorClass::Unknown => err
            .chain()
            .last()
            .map(|cause| format!("Something went wrong: {cause}"))
            .unwrap_or_else(|| err.to_string()),
    }
}

pub(crate) fn format_money(amount: f64) -> String {
    format!("${amount:.2}")
}

/// A `[key] label` pair for footers.
pub(crate) fn key_hint(key: &str, label: &str) -> [Span<'static>; 2] {
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    [
        Span::styled(format!("[{key}]"), key_style),
        Span::raw(format!(" {label}   ")),
    ]
}

pub(crate) fn experience_status_style(status: ExperienceStatus) -> Style {
    match status {
        ExperienceStatus::Pending => Style::default().fg(Color::Yellow),
        ExperienceStatus::Approved => Style::default().fg(Color::Green),
        ExperienceStatus::Rejected => Style::default().fg(Color::Red),
    }
}

pub(crate) fn booking_status_style(status: BookingStatus) -> Style {
    match status {
        BookingStatus::Pending => Style::default().fg(Color::Yellow),
        BookingStatus::Confirmed => Style::default().fg(Color::Green),
        BookingStatus::Cancelled => Style::default().fg(Color::DarkGray),
    }
}

pub(crate) fn account_status_style(status: AccountStatus) -> Style {
    match status {
        AccountStatus::Active => Style::default().fg(Color::Green),
        AccountStatus::Suspended => Style::default().fg(Color::Red),
    }
}

/// Horizontal bar scaled so `max` fills `width` cells.
pub(crate) fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let cells = ((value / max) * width as f64).round() as usize;
    "█".repeat(cells.clamp(1, width))
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;
    use crate::error::{BackendError, ValidationError};

    #[test]
    fn typed_errors_surface_their_own_message() {
        let err = Err::<(), _>(BackendError::CapacityExceeded { remaining: 2 })
            .context("failed to create booking")
            .unwrap_err();
        assert_eq!(surface_error(&err), "Only 2 spots left for this experience.");

        let err: Error = ValidationError::new("email", "Invalid email format.").into();
        assert_eq!(surface_error(&err), "Invalid email format.");

        let err = anyhow!("disk full").context("failed to save profile");
        assert_eq!(surface_error(&err), "Something went wrong: disk full");
    }

    #[test]
    fn bars_scale_to_width() {
        assert_eq!(bar(0.0, 10.0, 8), "");
        assert_eq!(bar(10.0, 10.0, 8).chars().count(), 8);
        assert_eq!(bar(0.1, 10.0, 8).chars().count(), 1);
        assert_eq!(format_money(12.5), "$12.50");
    }
}
