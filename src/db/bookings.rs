use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use super::enum_column;
use super::experiences::fetch_experience;
use crate::error::{BackendError, ValidationError};
use crate::models::{Booking, BookingStatus, BookingSummary, ExperienceStatus};
use crate::realtime::{LiveRow, Table};

const BOOKING_COLUMNS: &str =
    "id, experience_id, user_id, participants, booking_date, status, total_price, created_at";

const SUMMARY_SELECT: &str = "SELECT b.id, b.experience_id, b.user_id, b.participants,
            b.booking_date, b.status, b.total_price, b.created_at,
            e.title, e.location, e.date, h.full_name, u.full_name
     FROM bookings b
     JOIN experiences e ON e.id = b.experience_id
     JOIN profiles h ON h.id = e.creator_id
     JOIN profiles u ON u.id = b.user_id";

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        experience_id: row.get(1)?,
        user_id: row.get(2)?,
        participants: row.get(3)?,
        booking_date: row.get(4)?,
        status: enum_column(row, 5)?,
        total_price: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<BookingSummary> {
    Ok(BookingSummary {
        booking: booking_from_row(row)?,
        experience_title: row.get(8)?,
        location: row.get(9)?,
        experience_date: row.get(10)?,
        host_name: row.get(11)?,
        user_name: row.get(12)?,
    })
}

/// Reserve seats on an approved experience. The capacity check, the booking
/// insert and the participant counter move together in one transaction.
pub fn create_booking(
    conn: &Connection,
    user_id: i64,
    experience_id: i64,
    participants: u32,
    booking_date: NaiveDate,
) -> Result<Booking> {
    if participants == 0 {
        return Err(ValidationError::new("participants", "At least one participant is required.").into());
    }

    let tx = conn
        .unchecked_transaction()
        .context("failed to start booking transaction")?;

    let experience = fetch_experience(&tx, experience_id)?
        .ok_or(BackendError::NotFound { entity: "Experience" })?;
    if experience.status != ExperienceStatus::Approved {
        return Err(BackendError::Conflict("This experience is not open for booking.".into()).into());
    }

    let remaining = experience.remaining_capacity();
    if participants > remaining {
        warn!(experience_id, participants, remaining, "booking over capacity");
        return Err(BackendError::CapacityExceeded { remaining }.into());
    }

    let total_price = experience.total_for(participants);
    tx.execute(
        "INSERT INTO bookings (experience_id, user_id, participants, booking_date, status,
                               total_price, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
        params![experience_id, user_id, participants, booking_date, total_price, Utc::now()],
    )
    .context("failed to insert booking")?;
    let id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE experiences SET current_participants = current_participants + ?1 WHERE id = ?2",
        params![participants, experience_id],
    )
    .context("failed to reserve seats")?;

    tx.commit().context("failed to commit booking")?;
    info!(booking_id = id, experience_id, user_id, participants, "booking created");
    require_booking(conn, id)
}

pub fn fetch_booking(conn: &Connection, id: i64) -> Result<Option<Booking>> {
    conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        [id],
        booking_from_row,
    )
    .optional()
    .context("failed to load booking")
}

/// Cancel a booking and hand its seats back to the experience.
pub fn cancel_booking(conn: &Connection, id: i64) -> Result<Booking> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to start cancellation transaction")?;

    let booking =
        fetch_booking(&tx, id)?.ok_or(BackendError::NotFound { entity: "Booking" })?;
    if booking.status == BookingStatus::Cancelled {
        return Err(BackendError::Conflict("This booking is already cancelled.".into()).into());
    }

    tx.execute(
        "UPDATE bookings SET status = 'cancelled' WHERE id = ?1",
        [id],
    )
    .context("failed to cancel booking")?;
    tx.execute(
        "UPDATE experiences
         SET current_participants = MAX(current_participants - ?1, 0)
         WHERE id = ?2",
        params![booking.participants, booking.experience_id],
    )
    .context("failed to release seats")?;

    tx.commit().context("failed to commit cancellation")?;
    info!(booking_id = id, "booking cancelled");
    require_booking(conn, id)
}

/// Admin status change. Cancelling goes through [`cancel_booking`] so seats
/// are released; a cancelled booking cannot be reopened.
pub fn set_booking_status(conn: &Connection, id: i64, status: BookingStatus) -> Result<Booking> {
    if status == BookingStatus::Cancelled {
        return cancel_booking(conn, id);
    }

    let current = require_booking(conn, id)?;
    if current.status == BookingStatus::Cancelled {
        return Err(BackendError::Conflict("Cancelled bookings cannot be reopened.".into()).into());
    }

    conn.execute(
        "UPDATE bookings SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )
    .context("failed to update booking status")?;
    info!(booking_id = id, %status, "booking status changed");
    require_booking(conn, id)
}

/// Every booking, newest first. Feeds the dashboard aggregates.
pub fn fetch_bookings(conn: &Connection) -> Result<Vec<Booking>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC, id DESC"
        ))
        .context("failed to prepare booking query")?;

    let bookings = stmt
        .query_map([], booking_from_row)
        .context("failed to load bookings")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect bookings")?;

    Ok(bookings)
}

/// A tourist's bookings, earliest booking date first.
pub fn fetch_user_bookings(conn: &Connection, user_id: i64) -> Result<Vec<BookingSummary>> {
    let mut stmt = conn
        .prepare(&format!(
            "{SUMMARY_SELECT} WHERE b.user_id = ?1 ORDER BY b.booking_date ASC, b.id ASC"
        ))
        .context("failed to prepare user booking query")?;

    let bookings = stmt
        .query_map([user_id], summary_from_row)
        .context("failed to load user bookings")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect user bookings")?;

    Ok(bookings)
}

pub fn fetch_recent_bookings(conn: &Connection, limit: u32) -> Result<Vec<BookingSummary>> {
    let mut stmt = conn
        .prepare(&format!(
            "{SUMMARY_SELECT} ORDER BY b.created_at DESC, b.id DESC LIMIT ?1"
        ))
        .context("failed to prepare recent booking query")?;

    let bookings = stmt
        .query_map([limit], summary_from_row)
        .context("failed to load recent bookings")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect recent bookings")?;

    Ok(bookings)
}

/// Every booking with its display fields, newest first. `None` keeps every
/// status.
pub fn fetch_booking_summaries(
    conn: &Connection,
    status: Option<BookingStatus>,
) -> Result<Vec<BookingSummary>> {
    let mut stmt = conn
        .prepare(&format!(
            "{SUMMARY_SELECT} WHERE ?1 IS NULL OR b.status = ?1
             ORDER BY b.created_at DESC, b.id DESC"
        ))
        .context("failed to prepare booking summary query")?;

    let bookings = stmt
        .query_map([status.map(BookingStatus::as_str)], summary_from_row)
        .context("failed to load booking summaries")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect booking summaries")?;

    Ok(bookings)
}

pub fn fetch_booking_summary(conn: &Connection, id: i64) -> Result<Option<BookingSummary>> {
    conn.query_row(&format!("{SUMMARY_SELECT} WHERE b.id = ?1"), [id], summary_from_row)
        .optional()
        .context("failed to load booking summary")
}

/// Count-only query; `None` counts every booking.
pub fn count_bookings(conn: &Connection, status: Option<BookingStatus>) -> Result<u64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM bookings WHERE ?1 IS NULL OR status = ?1",
            [status.map(BookingStatus::as_str)],
            |row| row.get(0),
        )
        .context("failed to count bookings")?;
    Ok(count.unsigned_abs())
}

fn require_booking(conn: &Connection, id: i64) -> Result<Booking> {
    fetch_booking(conn, id)?.ok_or_else(|| BackendError::NotFound { entity: "Booking" }.into())
}

impl LiveRow for BookingSummary {
    const TABLE: Table = Table::Bookings;

    fn row_id(&self) -> i64 {
        self.booking.id
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Self>> {
        fetch_booking_summary(conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_experience, create_profile, fetch_experience, open_in_memory,
        set_experience_status,
    };
    use crate::error::{classify, ErrorClass};
    use crate::models::{NewExperience, NewProfile, Role, Sustainability};

    struct Fixture {
        conn: Connection,
        tourist: i64,
        experience: i64,
    }

    fn fixture(max_participants: u32) -> Fixture {
        let conn = open_in_memory().unwrap();
        let mut ids = Vec::new();
        for (name, email, role) in [
            ("Ravi Host", "ravi@example.com", Role::Host),
            ("Ana Tourist", "ana@example.com", Role::Tourist),
        ] {
            let profile = create_profile(
                &conn,
                &NewProfile {
                    full_name: name.into(),
                    email: email.into(),
                    role,
                    phone: None,
                    location: None,
                    is_local: role == Role::Host,
                },
            )
            .unwrap();
            ids.push(profile.id);
        }

        let experience = create_experience(
            &conn,
            ids[0],
            &NewExperience {
                title: "Toddy shop lunch".into(),
                description: String::new(),
                location: "Kumily".into(),
                category: "food".into(),
                price: 12.5,
                duration_hours: 2.0,
                date: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
                max_participants,
                sustainability: Sustainability::default(),
            },
        )
        .unwrap();
        set_experience_status(&conn, experience.id, ExperienceStatus::Approved).unwrap();

        Fixture {
            conn,
            tourist: ids[1],
            experience: experience.id,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    #[test]
    fn booking_reserves_seats_and_prices_the_group() {
        let f = fixture(4);
        let booking = create_booking(&f.conn, f.tourist, f.experience, 3, today()).unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_price, 37.5);
        let experience = fetch_experience(&f.conn, f.experience).unwrap().unwrap();
        assert_eq!(experience.current_participants, 3);
    }

    #[test]
    fn overbooking_reports_remaining_capacity() {
        let f = fixture(4);
        create_booking(&f.conn, f.tourist, f.experience, 3, today()).unwrap();

        let err = create_booking(&f.conn, f.tourist, f.experience, 2, today()).unwrap_err();
        assert_eq!(
            classify(&err),
            ErrorClass::Backend(BackendError::CapacityExceeded { remaining: 1 })
        );
        assert_eq!(count_bookings(&f.conn, None).unwrap(), 1);
    }

    #[test]
    fn zero_participants_is_a_validation_error() {
        let f = fixture(4);
        let err = create_booking(&f.conn, f.tourist, f.experience, 0, today()).unwrap_err();
        assert!(matches!(classify(&err), ErrorClass::Validation(v) if v.field == "participants"));
    }

    #[test]
    fn pending_experiences_cannot_be_booked() {
        let f = fixture(4);
        set_experience_status(&f.conn, f.experience, ExperienceStatus::Pending).unwrap();
        let err = create_booking(&f.conn, f.tourist, f.experience, 1, today()).unwrap_err();
        assert!(matches!(
            classify(&err),
            ErrorClass::Backend(BackendError::Conflict(_))
        ));
    }

    #[test]
    fn cancelling_releases_seats_once() {
        let f = fixture(4);
        let booking = create_booking(&f.conn, f.tourist, f.experience, 2, today()).unwrap();

        let cancelled = cancel_booking(&f.conn, booking.id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let experience = fetch_experience(&f.conn, f.experience).unwrap().unwrap();
        assert_eq!(experience.current_participants, 0);

        assert!(cancel_booking(&f.conn, booking.id).is_err());
        assert!(set_booking_status(&f.conn, booking.id, BookingStatus::Confirmed).is_err());
    }

    #[test]
    fn summaries_join_host_and_user_names() {
        let f = fixture(10);
        let booking = create_booking(&f.conn, f.tourist, f.experience, 1, today()).unwrap();
        set_booking_status(&f.conn, booking.id, BookingStatus::Confirmed).unwrap();

        let mine = fetch_user_bookings(&f.conn, f.tourist).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].host_name, "Ravi Host");
        assert_eq!(mine[0].user_name, "Ana Tourist");
        assert_eq!(mine[0].booking.status, BookingStatus::Confirmed);

        assert_eq!(fetch_recent_bookings(&f.conn, 5).unwrap().len(), 1);
        assert_eq!(fetch_booking_summaries(&f.conn, None).unwrap().len(), 1);
        assert!(fetch_booking_summaries(&f.conn, Some(BookingStatus::Pending))
            .unwrap()
            .is_empty());
        assert_eq!(count_bookings(&f.conn, Some(BookingStatus::Confirmed)).unwrap(), 1);
        assert!(fetch_user_bookings(&f.conn, 999).unwrap().is_empty());
    }
}
