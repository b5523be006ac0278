use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{enum_column, is_constraint_violation};
use crate::error::BackendError;
use crate::models::{AccountStatus, NewProfile, Profile, ProfileUpdate, Role};
use crate::realtime::{LiveRow, Table};

const PROFILE_COLUMNS: &str = "id, full_name, email, role, phone, location, bio, avatar_url,
     is_local, status, created_at, updated_at";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        role: enum_column(row, 3)?,
        phone: row.get(4)?,
        location: row.get(5)?,
        bio: row.get(6)?,
        avatar_url: row.get(7)?,
        is_local: row.get(8)?,
        status: enum_column(row, 9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Every profile, newest first. Backs the admin user list and the dashboard.
pub fn fetch_profiles(conn: &Connection) -> Result<Vec<Profile>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC, id DESC"
        ))
        .context("failed to prepare profile query")?;

    let profiles = stmt
        .query_map([], profile_from_row)
        .context("failed to load profiles")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect profiles")?;

    Ok(profiles)
}

pub fn fetch_profile(conn: &Connection, id: i64) -> Result<Option<Profile>> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
        [id],
        profile_from_row,
    )
    .optional()
    .context("failed to load profile")
}

/// Case-insensitive lookup used by sign-in and the duplicate-email check.
pub fn find_profile_by_email(conn: &Connection, email: &str) -> Result<Option<Profile>> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1 COLLATE NOCASE"),
        [email.trim()],
        profile_from_row,
    )
    .optional()
    .context("failed to look up profile by email")
}

/// Register a profile. A second account for the same email is a conflict.
pub fn create_profile(conn: &Connection, profile: &NewProfile) -> Result<Profile> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO profiles (full_name, email, role, phone, location, is_local, status,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?7)",
        params![
            profile.full_name,
            profile.email.trim(),
            profile.role.as_str(),
            profile.phone,
            profile.location,
            profile.is_local,
            now,
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            BackendError::Conflict("An account with this email already exists.".into()).into()
        } else {
            anyhow::Error::from(err)
        }
    })
    .context("failed to insert profile")?;

    let id = conn.last_insert_rowid();
    info!(profile_id = id, role = %profile.role, "profile created");
    require_profile(conn, id)
}

/// Save the owner-editable fields. The avatar is left alone unless a new URL
/// is supplied.
pub fn update_profile(conn: &Connection, id: i64, update: &ProfileUpdate) -> Result<Profile> {
    let updated = conn
        .execute(
            "UPDATE profiles
             SET full_name = ?1, phone = ?2, location = ?3, bio = ?4,
                 avatar_url = COALESCE(?5, avatar_url), updated_at = ?6
             WHERE id = ?7",
            params![
                update.full_name,
                update.phone,
                update.location,
                update.bio,
                update.avatar_url,
                Utc::now(),
                id,
            ],
        )
        .context("failed to update profile")?;

    if updated == 0 {
        return Err(BackendError::NotFound { entity: "Profile" }.into());
    }
    require_profile(conn, id)
}

pub fn set_profile_status(conn: &Connection, id: i64, status: AccountStatus) -> Result<Profile> {
    let updated = conn
        .execute(
            "UPDATE profiles SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now(), id],
        )
        .context("failed to update profile status")?;

    if updated == 0 {
        return Err(BackendError::NotFound { entity: "Profile" }.into());
    }
    info!(profile_id = id, %status, "profile status changed");
    require_profile(conn, id)
}

pub fn set_profile_role(conn: &Connection, id: i64, role: Role) -> Result<Profile> {
    let updated = conn
        .execute(
            "UPDATE profiles SET role = ?1, updated_at = ?2 WHERE id = ?3",
            params![role.as_str(), Utc::now(), id],
        )
        .context("failed to update profile role")?;

    if updated == 0 {
        return Err(BackendError::NotFound { entity: "Profile" }.into());
    }
    info!(profile_id = id, %role, "profile role changed");
    require_profile(conn, id)
}

/// Count-only query; `None` counts every profile.
pub fn count_profiles(conn: &Connection, status: Option<AccountStatus>) -> Result<u64> {
    let count: i64 = match status {
        Some(status) => conn.query_row(
            "SELECT COUNT(*) FROM profiles WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        ),
        None => conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0)),
    }
    .context("failed to count profiles")?;
    Ok(count.unsigned_abs())
}

fn require_profile(conn: &Connection, id: i64) -> Result<Profile> {
    fetch_profile(conn, id)?.ok_or_else(|| BackendError::NotFound { entity: "Profile" }.into())
}

impl LiveRow for Profile {
    const TABLE: Table = Table::Profiles;

    fn row_id(&self) -> i64 {
        self.id
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Self>> {
        fetch_profile(conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::error::{classify, ErrorClass};

    fn tourist(email: &str) -> NewProfile {
        NewProfile {
            full_name: "Lakshmi Nair".into(),
            email: email.into(),
            role: Role::Tourist,
            phone: Some("+919876543210".into()),
            location: Some("Kochi".into()),
            is_local: false,
        }
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let conn = open_in_memory().unwrap();
        create_profile(&conn, &tourist("lakshmi@example.com")).unwrap();

        let err = create_profile(&conn, &tourist("LAKSHMI@example.com")).unwrap_err();
        assert!(matches!(
            classify(&err),
            ErrorClass::Backend(BackendError::Conflict(_))
        ));
    }

    #[test]
    fn update_keeps_avatar_when_none_supplied() {
        let conn = open_in_memory().unwrap();
        let created = create_profile(&conn, &tourist("l@example.com")).unwrap();
        conn.execute(
            "UPDATE profiles SET avatar_url = 'file:///a.png' WHERE id = ?1",
            [created.id],
        )
        .unwrap();

        let saved = update_profile(
            &conn,
            created.id,
            &ProfileUpdate {
                full_name: "Lakshmi N.".into(),
                phone: None,
                location: Some("Munnar".into()),
                bio: Some("Tea lover".into()),
                avatar_url: None,
            },
        )
        .unwrap();

        assert_eq!(saved.full_name, "Lakshmi N.");
        assert_eq!(saved.avatar_url.as_deref(), Some("file:///a.png"));
        assert_eq!(saved.phone, None);
    }

    #[test]
    fn status_and_role_changes_are_counted() {
        let conn = open_in_memory().unwrap();
        let a = create_profile(&conn, &tourist("a@example.com")).unwrap();
        create_profile(&conn, &tourist("b@example.com")).unwrap();

        set_profile_status(&conn, a.id, AccountStatus::Suspended).unwrap();
        let promoted = set_profile_role(&conn, a.id, Role::Host).unwrap();

        assert_eq!(promoted.role, Role::Host);
        assert_eq!(count_profiles(&conn, None).unwrap(), 2);
        assert_eq!(count_profiles(&conn, Some(AccountStatus::Active)).unwrap(), 1);
        assert!(find_profile_by_email(&conn, " B@EXAMPLE.COM ")
            .unwrap()
            .is_some());
    }

    #[test]
    fn missing_profile_is_not_found() {
        let conn = open_in_memory().unwrap();
        let err = set_profile_role(&conn, 42, Role::Admin).unwrap_err();
        assert_eq!(
            classify(&err),
            ErrorClass::Backend(BackendError::NotFound { entity: "Profile" })
        );
    }
}
