//! Object storage for listing images and avatars. The app only needs upload,
//! remove and a public URL, so [`MediaStore`] is kept that small; the local
//! implementation files objects under one directory per bucket.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::{BackendError, ValidationError};

pub const EXPERIENCE_IMAGES_BUCKET: &str = "experience-images";
pub const AVATARS_BUCKET: &str = "avatars";

pub trait MediaStore {
    /// Copy `source` into `bucket/object` and return its public URL. Without
    /// `upsert`, an existing object is a conflict.
    fn upload(&self, bucket: &str, object: &str, source: &Path, upsert: bool) -> Result<String>;

    /// Delete objects; missing ones are ignored.
    fn remove(&self, bucket: &str, objects: &[String]) -> Result<()>;
}

/// Reject names that would escape the bucket directory.
fn checked_object_path(object: &str) -> Result<&Path, ValidationError> {
    let path = Path::new(object);
    let safe = !object.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(ValidationError::new("file", format!("Invalid object name '{object}'.")))
    }
}

/// File name of `source` reduced to characters safe in an object key.
pub fn object_file_name(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, object: &str) -> Result<PathBuf> {
        let bucket = checked_object_path(bucket)?;
        let object = checked_object_path(object)?;
        Ok(self.root.join(bucket).join(object))
    }
}

impl MediaStore for LocalMediaStore {
    fn upload(&self, bucket: &str, object: &str, source: &Path, upsert: bool) -> Result<String> {
        let dest = self.object_path(bucket, object)?;
        if !source.is_file() {
            return Err(ValidationError::new(
                "file",
                format!("{} is not a readable file.", source.display()),
            )
            .into());
        }
        if dest.exists() && !upsert {
            return Err(BackendError::Conflict(format!(
                "An object named '{object}' already exists."
            ))
            .into());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create bucket directory {}", parent.display()))?;
        }
        fs::copy(source, &dest)
            .with_context(|| format!("failed to upload {}", source.display()))?;

        let absolute = fs::canonicalize(&dest).context("failed to resolve uploaded object")?;
        debug!(bucket, object, "object uploaded");
        Ok(format!("file://{}", absolute.display()))
    }

    fn remove(&self, bucket: &str, objects: &[String]) -> Result<()> {
        for object in objects {
            let path = self.object_path(bucket, object)?;
            match fs::remove_file(&path) {
                Ok(()) => debug!(bucket, object = %object, "object removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    warn!(bucket, object = %object, "object already gone")
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to remove {}", path.display()))
                }
            }
        }
        Ok(())
    }
}
