//! Persistence module split across logical submodules. Every function wraps
//! one query or one short transaction and returns typed rows, leaving state
//! management to the callers.

mod bookings;
mod connection;
mod experiences;
mod products;
mod profiles;
mod seed;

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Error as SqlError, ErrorCode, Row};

use crate::models::ParseEnumError;

pub use bookings::{
    cancel_booking, count_bookings, create_booking, fetch_booking, fetch_booking_summaries,
    fetch_booking_summary, fetch_bookings, fetch_recent_bookings, fetch_user_bookings, set_booking_status,
};
pub use connection::{ensure_schema, open_in_memory, open_store};
pub use experiences::{
    count_experiences, create_experience, delete_experience, fetch_experience, fetch_experiences,
    fetch_itinerary_candidates, set_experience_images, set_experience_status, ExperienceOrder,
    ExperienceQuery,
};
pub use products::{create_product, fetch_product, fetch_products};
pub use profiles::{
    count_profiles, create_profile, fetch_profile, fetch_profiles, find_profile_by_email,
    set_profile_role, set_profile_status, update_profile,
};
pub use seed::seed_demo_data;

/// Read a text column into one of the string-backed domain enums.
fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| SqlError::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// True when SQLite rejected the statement on a UNIQUE/CHECK/FK constraint.
fn is_constraint_violation(err: &SqlError) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    )
}
