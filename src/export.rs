//! Flat CSV export of the dashboard series. Each section is a title line, a
//! header row, the data rows and a blank separator line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{Terminator, WriterBuilder};
use tracing::info;

use crate::analytics::{DailyBookings, DailyCount, DashboardStats, TimeRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSection {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvSection {
    pub fn new(title: &str, header: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// Whole amounts print without a fractional part.
fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn daily_count_section(title: &str, series: &[DailyCount]) -> CsvSection {
    let mut section = CsvSection::new(title, &["date", "count"]);
    section.rows = series
        .iter()
        .map(|point| vec![point.date.to_string(), point.count.to_string()])
        .collect();
    section
}

pub fn booking_section(series: &[DailyBookings]) -> CsvSection {
    let mut section = CsvSection::new("bookings", &["date", "bookings", "revenue"]);
    section.rows = series
        .iter()
        .map(|point| {
            vec![
                point.date.to_string(),
                point.bookings.to_string(),
                format_amount(point.revenue),
            ]
        })
        .collect();
    section
}

pub fn revenue_section(series: &[DailyBookings]) -> CsvSection {
    let mut section = CsvSection::new("revenue", &["date", "revenue"]);
    section.rows = series
        .iter()
        .map(|point| vec![point.date.to_string(), format_amount(point.revenue)])
        .collect();
    section
}

pub fn dashboard_sections(stats: &DashboardStats) -> Vec<CsvSection> {
    vec![
        daily_count_section("users", &stats.user_growth),
        booking_section(&stats.booking_trends),
        revenue_section(&stats.booking_trends),
    ]
}

pub fn render_sections(sections: &[CsvSection]) -> Result<String> {
    let mut out = Vec::new();
    for section in sections {
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer
            .write_record([section.title.as_str()])
            .context("failed to write section title")?;
        writer
            .write_record(&section.header)
            .context("failed to write section header")?;
        for row in &section.rows {
            writer.write_record(row).context("failed to write csv row")?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| err.into_error())
            .context("failed to flush csv section")?;
        out.extend_from_slice(&bytes);
        out.push(b'\n');
    }
    String::from_utf8(out).context("csv output was not valid UTF-8")
}

pub fn export_file_name(range: TimeRange) -> String {
    format!("dashboard_stats_{}.csv", range.slug())
}

/// Write the dashboard series to `dir`, creating it if needed, and return the
/// written path.
pub fn export_dashboard(stats: &DashboardStats, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let path = dir.join(export_file_name(stats.range));
    let body = render_sections(&dashboard_sections(stats))?;
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), "dashboard exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn count_series_renders_header_then_rows() {
        let series = [DailyCount {
            date: day(1),
            count: 3,
        }];
        let text = render_sections(&[daily_count_section("users", &series)]).unwrap();

        assert!(text.contains("date,count\n2024-01-01,3"));
        assert_eq!(text, "users\ndate,count\n2024-01-01,3\n\n");
    }

    #[test]
    fn revenue_keeps_cents_and_drops_whole_fractions() {
        let series = [
            DailyBookings {
                date: day(1),
                bookings: 2,
                revenue: 40.0,
            },
            DailyBookings {
                date: day(2),
                bookings: 1,
                revenue: 12.5,
            },
        ];
        let text =
            render_sections(&[booking_section(&series), revenue_section(&series)]).unwrap();
        assert_eq!(
            text,
            "bookings\ndate,bookings,revenue\n2024-01-01,2,40\n2024-01-02,1,12.5\n\n\
             revenue\ndate,revenue\n2024-01-01,40\n2024-01-02,12.5\n\n"
        );
    }

    #[test]
    fn export_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let conn = crate::db::open_in_memory().unwrap();
        let stats = DashboardStats::load(&conn, TimeRange::Last7Days, day(10)).unwrap();

        let path = export_dashboard(&stats, &dir.path().join("exports")).unwrap();
        assert_eq!(path.file_name().unwrap(), "dashboard_stats_7days.csv");
        let body = fs::read_to_string(path).unwrap();
        assert!(body.starts_with("users\ndate,count\n2024-01-04,0\n"));
        assert_eq!(body.matches("\n\n").count(), 3);
    }
}
