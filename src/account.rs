//! Registration and profile editing.

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::db::{create_profile, find_profile_by_email, update_profile};
use crate::error::BackendError;
use crate::models::{NewProfile, Profile, ProfileUpdate};
use crate::storage::{object_file_name, MediaStore, AVATARS_BUCKET};
use crate::validation::{validate_new_profile, validate_profile_update};

/// Register a new profile. `actor` is the signed-in user creating it, if any;
/// only an admin may create another admin.
pub fn sign_up(
    conn: &Connection,
    profile: &NewProfile,
    actor: Option<&Profile>,
) -> Result<Profile> {
    validate_new_profile(profile, actor.is_some_and(Profile::is_admin))?;
    if find_profile_by_email(conn, &profile.email)?.is_some() {
        return Err(
            BackendError::Conflict("An account with this email already exists.".into()).into(),
        );
    }

    let mut profile = profile.clone();
    profile.full_name = profile.full_name.trim().to_string();
    profile.email = profile.email.trim().to_string();
    profile.phone = profile
        .phone
        .map(|phone| phone.trim().to_string())
        .filter(|phone| !phone.is_empty());
    create_profile(conn, &profile)
}

/// Save the owner's edits. A new avatar file is uploaded first, overwriting
/// any earlier one, and its URL stored with the rest of the fields.
pub fn save_profile(
    conn: &Connection,
    media: &dyn MediaStore,
    profile: &Profile,
    update: &ProfileUpdate,
    avatar: Option<&Path>,
) -> Result<Profile> {
    validate_profile_update(update)?;

    let mut update = update.clone();
    if let Some(source) = avatar {
        let object = format!("{}/{}", profile.id, object_file_name(source));
        update.avatar_url = Some(media.upload(AVATARS_BUCKET, &object, source, true)?);
    }

    let saved = update_profile(conn, profile.id, &update)?;
    info!(profile_id = saved.id, avatar = avatar.is_some(), "profile saved");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::db::open_in_memory;
    use crate::error::{classify, ErrorClass};
    use crate::models::Role;
    use crate::storage::LocalMediaStore;

    fn new_profile(email: &str, role: Role) -> NewProfile {
        NewProfile {
            full_name: "  Nila  ".into(),
            email: format!(" {email} "),
            role,
            phone: Some("".into()),
            location: Some("Madurai".into()),
            is_local: true,
        }
    }

    #[test]
    fn sign_up_trims_and_rejects_duplicates() {
        let conn = open_in_memory().unwrap();
        let created = sign_up(&conn, &new_profile("nila@example.com", Role::Host), None).unwrap();
        assert_eq!(created.full_name, "Nila");
        assert_eq!(created.email, "nila@example.com");
        assert_eq!(created.phone, None);

        let err =
            sign_up(&conn, &new_profile("NILA@example.com", Role::Tourist), None).unwrap_err();
        assert!(matches!(
            classify(&err),
            ErrorClass::Backend(BackendError::Conflict(_))
        ));
    }

    #[test]
    fn only_admins_create_admins() {
        let conn = open_in_memory().unwrap();
        let err = sign_up(&conn, &new_profile("a@example.com", Role::Admin), None).unwrap_err();
        assert!(matches!(classify(&err), ErrorClass::Validation(v) if v.field == "role"));

        let mut admin =
            sign_up(&conn, &new_profile("root@example.com", Role::Tourist), None).unwrap();
        admin.role = Role::Admin;
        assert!(sign_up(&conn, &new_profile("b@example.com", Role::Admin), Some(&admin)).is_ok());
    }

    #[test]
    fn avatar_upload_is_stored_with_profile() {
        let conn = open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let media = LocalMediaStore::new(dir.path().join("media"));
        let profile = sign_up(&conn, &new_profile("n@example.com", Role::Tourist), None).unwrap();
        let avatar = dir.path().join("me.png");
        fs::write(&avatar, b"png").unwrap();

        let update = ProfileUpdate {
            full_name: "Nila R".into(),
            phone: Some("+914522345678".into()),
            location: None,
            bio: Some("Temple towns".into()),
            avatar_url: None,
        };
        let saved = save_profile(&conn, &media, &profile, &update, Some(avatar.as_path())).unwrap();
        let url = saved.avatar_url.clone().unwrap();
        assert!(url.ends_with(&format!("avatars/{}/me.png", profile.id)));

        let again = save_profile(&conn, &media, &saved, &update, Some(avatar.as_path())).unwrap();
        assert_eq!(again.avatar_url, Some(url));

        let bad = ProfileUpdate {
            phone: Some("0123".into()),
            ..update
        };
        assert!(save_profile(&conn, &media, &saved, &bad, None).is_err());
    }
}
