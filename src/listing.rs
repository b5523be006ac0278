//! Publishing a host's experience: insert the row, upload its images, then
//! patch the row with their URLs. If a later step fails the earlier ones are
//! undone so no half-published listing is left behind.

use std::path::PathBuf;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{create_experience, delete_experience, set_experience_images};
use crate::error::BackendError;
use crate::models::{Experience, NewExperience, Profile, Role};
use crate::storage::{object_file_name, MediaStore, EXPERIENCE_IMAGES_BUCKET};
use crate::validation::validate_new_experience;

pub fn publish_experience(
    conn: &Connection,
    media: &dyn MediaStore,
    host: &Profile,
    draft: &NewExperience,
    images: &[PathBuf],
) -> Result<Experience> {
    if host.role == Role::Tourist {
        return Err(
            BackendError::PermissionDenied("Only hosts can publish experiences.".into()).into(),
        );
    }
    validate_new_experience(draft)?;
    let experience = create_experience(conn, host.id, draft)?;

    let mut uploaded: Vec<String> = Vec::new();
    let result = upload_and_attach(conn, media, experience.id, images, &mut uploaded);

    match result {
        Ok(experience) => {
            info!(experience_id = experience.id, images = uploaded.len(), "experience published");
            Ok(experience)
        }
        Err(err) => {
            warn!(experience_id = experience.id, error = %err, "publishing failed, rolling back");
            if let Err(cleanup) = media.remove(EXPERIENCE_IMAGES_BUCKET, &uploaded) {
                warn!(error = %cleanup, "failed to remove uploaded images");
            }
            if let Err(cleanup) = delete_experience(conn, experience.id) {
                warn!(error = %cleanup, "failed to delete unpublished experience");
            }
            Err(err)
        }
    }
}

fn upload_and_attach(
    conn: &Connection,
    media: &dyn MediaStore,
    experience_id: i64,
    images: &[PathBuf],
    uploaded: &mut Vec<String>,
) -> Result<Experience> {
    let mut urls = Vec::with_capacity(images.len());
    for (idx, source) in images.iter().enumerate() {
        let object = format!("{experience_id}/{idx}-{}", object_file_name(source));
        let url = media.upload(EXPERIENCE_IMAGES_BUCKET, &object, source, false)?;
        uploaded.push(object);
        urls.push(url);
    }
    set_experience_images(conn, experience_id, &urls)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    use anyhow::anyhow;
    use chrono::NaiveDate;

    use super::*;
    use crate::db::{count_experiences, create_profile, fetch_experience, open_in_memory};
    use crate::models::{ExperienceStatus, NewProfile, Sustainability};
    use crate::storage::LocalMediaStore;

    /// Accepts a fixed number of uploads, then fails.
    struct FlakyStore {
        accept: usize,
        uploaded: RefCell<Vec<String>>,
        removed: RefCell<Vec<String>>,
    }

    impl MediaStore for FlakyStore {
        fn upload(
            &self,
            _bucket: &str,
            object: &str,
            _source: &Path,
            _upsert: bool,
        ) -> Result<String> {
            let mut uploaded = self.uploaded.borrow_mut();
            if uploaded.len() >= self.accept {
                return Err(anyhow!("storage unavailable"));
            }
            uploaded.push(object.to_string());
            Ok(format!("memory://{object}"))
        }

        fn remove(&self, _bucket: &str, objects: &[String]) -> Result<()> {
            self.removed.borrow_mut().extend(objects.iter().cloned());
            Ok(())
        }
    }

    fn setup() -> (Connection, Profile) {
        let conn = open_in_memory().unwrap();
        let host = create_profile(
            &conn,
            &NewProfile {
                full_name: "Devi".into(),
                email: "devi@example.com".into(),
                role: Role::Host,
                phone: None,
                location: Some("Wayanad".into()),
                is_local: true,
            },
        )
        .unwrap();
        (conn, host)
    }

    fn draft() -> NewExperience {
        NewExperience {
            title: "Coffee estate walk".into(),
            description: "Walk the estate with the grower".into(),
            location: "Wayanad".into(),
            category: "nature".into(),
            price: 18.0,
            duration_hours: 3.0,
            date: NaiveDate::from_ymd_opt(2024, 11, 2).unwrap(),
            max_participants: 8,
            sustainability: Sustainability::default(),
        }
    }

    #[test]
    fn images_are_uploaded_and_attached() {
        let (conn, host) = setup();
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("estate.jpg");
        fs::write(&photo, b"img").unwrap();
        let media = LocalMediaStore::new(dir.path().join("media"));

        let published = publish_experience(&conn, &media, &host, &draft(), &[photo]).unwrap();

        assert_eq!(published.status, ExperienceStatus::Pending);
        assert_eq!(published.images.len(), 1);
        assert!(published.images[0].ends_with(&format!("{}/0-estate.jpg", published.id)));
    }

    #[test]
    fn failed_upload_removes_earlier_uploads_and_the_row() {
        let (conn, host) = setup();
        let media = FlakyStore {
            accept: 1,
            uploaded: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
        };
        let images = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];

        let err = publish_experience(&conn, &media, &host, &draft(), &images).unwrap_err();

        assert_eq!(err.to_string(), "storage unavailable");
        assert_eq!(*media.removed.borrow(), *media.uploaded.borrow());
        assert_eq!(media.removed.borrow().len(), 1);
        assert_eq!(count_experiences(&conn, None).unwrap(), 0);
        assert!(fetch_experience(&conn, 1).unwrap().is_none());
    }

    #[test]
    fn invalid_draft_touches_nothing() {
        let (conn, host) = setup();
        let media = FlakyStore {
            accept: 0,
            uploaded: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
        };
        let mut bad = draft();
        bad.title.clear();

        assert!(publish_experience(&conn, &media, &host, &bad, &[]).is_err());
        assert_eq!(count_experiences(&conn, None).unwrap(), 0);
        assert!(media.removed.borrow().is_empty());
    }
}
