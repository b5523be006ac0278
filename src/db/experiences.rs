use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Error as SqlError, OptionalExtension, Row};
use tracing::{info, warn};

use super::enum_column;
use crate::error::BackendError;
use crate::models::{Experience, ExperienceStatus, NewExperience, Sustainability};
use crate::realtime::{LiveRow, Table};

const EXPERIENCE_COLUMNS: &str = "id, title, description, location, category, price,
     duration_hours, date, max_participants, current_participants, status, creator_id, images,
     sustainability_rating, is_cultural, is_certified_sustainable, carbon_estimate, local_spend,
     created_at";

fn experience_from_row(row: &Row<'_>) -> rusqlite::Result<Experience> {
    let images_raw: String = row.get(12)?;
    let images: Vec<String> = serde_json::from_str(&images_raw)
        .map_err(|err| SqlError::FromSqlConversionFailure(12, Type::Text, Box::new(err)))?;

    Ok(Experience {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        category: row.get(4)?,
        price: row.get(5)?,
        duration_hours: row.get(6)?,
        date: row.get(7)?,
        max_participants: row.get(8)?,
        current_participants: row.get(9)?,
        status: enum_column(row, 10)?,
        creator_id: row.get(11)?,
        images,
        sustainability: Sustainability {
            rating: row.get(13)?,
            is_cultural: row.get(14)?,
            is_certified_sustainable: row.get(15)?,
            carbon_estimate: row.get(16)?,
            local_spend: row.get(17)?,
        },
        created_at: row.get(18)?,
    })
}

/// Ordering applied to experience listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExperienceOrder {
    /// Soonest activity first; what tourists browse.
    #[default]
    DateAscending,
    /// Most recently submitted first; what moderators review.
    NewestFirst,
}

/// Server-side narrowing for experience listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperienceQuery {
    pub status: Option<ExperienceStatus>,
    pub creator_id: Option<i64>,
    pub order: ExperienceOrder,
}

impl ExperienceQuery {
    /// What non-admin consumers may see and book.
    pub fn bookable() -> Self {
        Self {
            status: Some(ExperienceStatus::Approved),
            ..Self::default()
        }
    }
}

pub fn fetch_experiences(conn: &Connection, query: &ExperienceQuery) -> Result<Vec<Experience>> {
    let order = match query.order {
        ExperienceOrder::DateAscending => "date ASC, id ASC",
        ExperienceOrder::NewestFirst => "created_at DESC, id DESC",
    };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experiences
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR creator_id = ?2)
             ORDER BY {order}"
        ))
        .context("failed to prepare experience query")?;

    let experiences = stmt
        .query_map(
            params![query.status.map(ExperienceStatus::as_str), query.creator_id],
            experience_from_row,
        )
        .context("failed to load experiences")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect experiences")?;

    Ok(experiences)
}

pub fn fetch_experience(conn: &Connection, id: i64) -> Result<Option<Experience>> {
    conn.query_row(
        &format!("SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE id = ?1"),
        [id],
        experience_from_row,
    )
    .optional()
    .context("failed to load experience")
}

/// Approved experiences in one of `categories` that fit a group of
/// `group_size` and cost at most `max_price` per person. Rows come back in
/// insertion order, which is the order the itinerary planner scans them.
pub fn fetch_itinerary_candidates(
    conn: &Connection,
    categories: &[String],
    group_size: u32,
    max_price: f64,
) -> Result<Vec<Experience>> {
    if categories.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (0..categories.len())
        .map(|idx| format!("?{}", idx + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {EXPERIENCE_COLUMNS} FROM experiences
         WHERE status = 'approved'
           AND max_participants >= ?1
           AND price <= ?2
           AND category IN ({placeholders})
         ORDER BY id"
    );

    let mut values: Vec<rusqlite::types::Value> = vec![
        i64::from(group_size).into(),
        max_price.into(),
    ];
    values.extend(categories.iter().cloned().map(Into::into));

    let mut stmt = conn
        .prepare(&sql)
        .context("failed to prepare itinerary candidate query")?;
    let experiences = stmt
        .query_map(params_from_iter(values), experience_from_row)
        .context("failed to load itinerary candidates")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect itinerary candidates")?;

    Ok(experiences)
}

/// Insert a host's draft. New listings always start pending until an admin
/// reviews them.
pub fn create_experience(
    conn: &Connection,
    creator_id: i64,
    draft: &NewExperience,
) -> Result<Experience> {
    conn.execute(
        "INSERT INTO experiences (title, description, location, category, price, duration_hours,
                                  date, max_participants, current_participants, status,
                                  creator_id, images, sustainability_rating, is_cultural,
                                  is_certified_sustainable, carbon_estimate, local_spend,
                                  created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 'pending', ?9, '[]', ?10, ?11, ?12, ?13,
                 ?14, ?15)",
        params![
            draft.title,
            draft.description,
            draft.location,
            draft.category,
            draft.price,
            draft.duration_hours,
            draft.date,
            draft.max_participants,
            creator_id,
            draft.sustainability.rating,
            draft.sustainability.is_cultural,
            draft.sustainability.is_certified_sustainable,
            draft.sustainability.carbon_estimate,
            draft.sustainability.local_spend,
            Utc::now(),
        ],
    )
    .context("failed to insert experience")?;

    let id = conn.last_insert_rowid();
    info!(experience_id = id, creator_id, "experience drafted");
    require_experience(conn, id)
}

/// Replace the image list with the given public URLs.
pub fn set_experience_images(conn: &Connection, id: i64, images: &[String]) -> Result<Experience> {
    let encoded = serde_json::to_string(images).context("failed to encode image list")?;
    let updated = conn
        .execute(
            "UPDATE experiences SET images = ?1 WHERE id = ?2",
            params![encoded, id],
        )
        .context("failed to update experience images")?;

    if updated == 0 {
        return Err(BackendError::NotFound { entity: "Experience" }.into());
    }
    require_experience(conn, id)
}

/// Moderation decision. Only admins reach this through the UI.
pub fn set_experience_status(
    conn: &Connection,
    id: i64,
    status: ExperienceStatus,
) -> Result<Experience> {
    let updated = conn
        .execute(
            "UPDATE experiences SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )
        .context("failed to update experience status")?;

    if updated == 0 {
        return Err(BackendError::NotFound { entity: "Experience" }.into());
    }
    info!(experience_id = id, %status, "experience status changed");
    require_experience(conn, id)
}

/// Remove a listing. Bookings cascade with it.
pub fn delete_experience(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM experiences WHERE id = ?1", [id])
        .context("failed to delete experience")?;

    if deleted == 0 {
        warn!(experience_id = id, "delete of missing experience");
        Err(BackendError::NotFound { entity: "Experience" }.into())
    } else {
        Ok(())
    }
}

/// Count-only query; `None` counts every experience.
pub fn count_experiences(conn: &Connection, status: Option<ExperienceStatus>) -> Result<u64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM experiences WHERE ?1 IS NULL OR status = ?1",
            [status.map(ExperienceStatus::as_str)],
            |row| row.get(0),
        )
        .context("failed to count experiences")?;
    Ok(count.unsigned_abs())
}

fn require_experience(conn: &Connection, id: i64) -> Result<Experience> {
    fetch_experience(conn, id)?
        .ok_or_else(|| BackendError::NotFound { entity: "Experience" }.into())
}

impl LiveRow for Experience {
    const TABLE: Table = Table::Experiences;

    fn row_id(&self) -> i64 {
        self.id
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Self>> {
        fetch_experience(conn, id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::{create_profile, open_in_memory};
    use crate::models::{NewProfile, Role};

    fn host(conn: &Connection) -> i64 {
        create_profile(
            conn,
            &NewProfile {
                full_name: "Ravi".into(),
                email: "ravi@example.com".into(),
                role: Role::Host,
                phone: None,
                location: None,
                is_local: true,
            },
        )
        .unwrap()
        .id
    }

    fn draft(title: &str, category: &str, price: f64, max: u32) -> NewExperience {
        NewExperience {
            title: title.into(),
            description: String::new(),
            location: "Fort Kochi".into(),
            category: category.into(),
            price,
            duration_hours: 2.0,
            date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            max_participants: max,
            sustainability: Sustainability::default(),
        }
    }

    #[test]
    fn drafts_start_pending_and_hidden_from_bookable_listing() {
        let conn = open_in_memory().unwrap();
        let creator = host(&conn);
        let created = create_experience(&conn, creator, &draft("Spice walk", "food", 20.0, 8))
            .unwrap();
        assert_eq!(created.status, ExperienceStatus::Pending);
        assert!(created.images.is_empty());

        assert!(fetch_experiences(&conn, &ExperienceQuery::bookable())
            .unwrap()
            .is_empty());

        set_experience_status(&conn, created.id, ExperienceStatus::Approved).unwrap();
        assert_eq!(
            fetch_experiences(&conn, &ExperienceQuery::bookable())
                .unwrap()
                .len(),
            1
        );
        assert_eq!(count_experiences(&conn, Some(ExperienceStatus::Pending)).unwrap(), 0);
        assert_eq!(count_experiences(&conn, None).unwrap(), 1);
    }

    #[test]
    fn images_round_trip_as_json() {
        let conn = open_in_memory().unwrap();
        let creator = host(&conn);
        let created = create_experience(&conn, creator, &draft("Kathakali", "culture", 15.0, 20))
            .unwrap();
        let urls = vec!["file:///a.jpg".to_string(), "file:///b.jpg".to_string()];

        let saved = set_experience_images(&conn, created.id, &urls).unwrap();
        assert_eq!(saved.images, urls);
    }

    #[test]
    fn candidate_query_applies_every_prefilter() {
        let conn = open_in_memory().unwrap();
        let creator = host(&conn);
        let mut ids = Vec::new();
        for (title, category, price, max) in [
            ("Cheap food", "food", 10.0, 10),
            ("Pricey food", "food", 500.0, 10),
            ("Tiny tour", "tour", 10.0, 1),
            ("Nature walk", "nature", 10.0, 10),
            ("Big tour", "tour", 20.0, 12),
        ] {
            let exp = create_experience(&conn, creator, &draft(title, category, price, max))
                .unwrap();
            set_experience_status(&conn, exp.id, ExperienceStatus::Approved).unwrap();
            ids.push(exp.id);
        }
        create_experience(&conn, creator, &draft("Pending food", "food", 5.0, 10)).unwrap();

        let categories = vec!["food".to_string(), "tour".to_string()];
        let found = fetch_itinerary_candidates(&conn, &categories, 2, 100.0).unwrap();
        let titles: Vec<_> = found.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Cheap food", "Big tour"]);

        assert!(fetch_itinerary_candidates(&conn, &[], 2, 100.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn deleting_missing_experience_is_not_found() {
        let conn = open_in_memory().unwrap();
        assert!(delete_experience(&conn, 9).is_err());
    }
}
