//! The signed-in identity. The app owns one [`Session`] and hands it to
//! whatever needs to know who is acting. The last signed-in email is kept in
//! a small file so the next launch starts signed in.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{fetch_profile, find_profile_by_email};
use crate::error::BackendError;
use crate::models::{AccountStatus, Booking, Profile, Role};

#[derive(Debug)]
pub struct Session {
    session_file: PathBuf,
    user: Option<Profile>,
}

impl Session {
    /// A signed-out session persisting to `session_file`.
    pub fn new(session_file: impl Into<PathBuf>) -> Self {
        Self {
            session_file: session_file.into(),
            user: None,
        }
    }

    /// Resume whoever signed in last. A stale or suspended account leaves the
    /// session signed out.
    pub fn restore(conn: &Connection, session_file: impl Into<PathBuf>) -> Result<Self> {
        let mut session = Self::new(session_file);
        let email = match fs::read_to_string(&session.session_file) {
            Ok(email) => email.trim().to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(session),
            Err(err) => return Err(err).context("failed to read session file"),
        };
        if email.is_empty() {
            return Ok(session);
        }

        match find_profile_by_email(conn, &email)? {
            Some(profile) if profile.status == AccountStatus::Active => {
                info!(profile_id = profile.id, "session restored");
                session.user = Some(profile);
            }
            _ => {
                warn!("stored session no longer valid");
                session.forget()?;
            }
        }
        Ok(session)
    }

    pub fn user(&self) -> Option<&Profile> {
        self.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn sign_in(&mut self, conn: &Connection, email: &str) -> Result<&Profile> {
        let profile = find_profile_by_email(conn, email)?
            .ok_or(BackendError::NotFound { entity: "Account" })?;
        if profile.status == AccountStatus::Suspended {
            warn!(profile_id = profile.id, "suspended account tried to sign in");
            return Err(
                BackendError::PermissionDenied("This account has been suspended.".into()).into(),
            );
        }

        self.remember(&profile.email)?;
        info!(profile_id = profile.id, role = %profile.role, "signed in");
        Ok(&*self.user.insert(profile))
    }

    pub fn sign_out(&mut self) -> Result<()> {
        if let Some(profile) = self.user.take() {
            info!(profile_id = profile.id, "signed out");
        }
        self.forget()
    }

    /// Reload the signed-in profile, dropping the session if the account was
    /// removed or suspended in the meantime.
    pub fn refresh(&mut self, conn: &Connection) -> Result<()> {
        let Some(id) = self.user.as_ref().map(|p| p.id) else {
            return Ok(());
        };
        match fetch_profile(conn, id)? {
            Some(profile) if profile.status == AccountStatus::Active => {
                self.user = Some(profile);
                Ok(())
            }
            _ => self.sign_out(),
        }
    }

    /// Swap in a freshly saved copy of the current user's profile.
    pub fn update_user(&mut self, profile: Profile) {
        if self.user.as_ref().is_some_and(|u| u.id == profile.id) {
            self.user = Some(profile);
        }
    }

    pub fn require_user(&self) -> Result<&Profile, BackendError> {
        self.user
            .as_ref()
            .ok_or_else(|| BackendError::PermissionDenied("Please sign in first.".into()))
    }

    pub fn require_host(&self) -> Result<&Profile, BackendError> {
        let user = self.require_user()?;
        match user.role {
            Role::Host | Role::Admin => Ok(user),
            Role::Tourist => Err(BackendError::PermissionDenied(
                "Only hosts can create experiences.".into(),
            )),
        }
    }

    pub fn require_admin(&self) -> Result<&Profile, BackendError> {
        let user = self.require_user()?;
        if user.is_admin() {
            Ok(user)
        } else {
            Err(BackendError::PermissionDenied(
                "Access denied. Admin privileges required.".into(),
            ))
        }
    }

    /// Owners may cancel their own bookings; admins may cancel any.
    pub fn authorize_cancel(&self, booking: &Booking) -> Result<&Profile, BackendError> {
        let user = self.require_user()?;
        if user.is_admin() || user.id == booking.user_id {
            Ok(user)
        } else {
            Err(BackendError::PermissionDenied(
                "You can only cancel your own bookings.".into(),
            ))
        }
    }

    fn remember(&self, email: &str) -> Result<()> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent).context("failed to create session directory")?;
        }
        fs::write(&self.session_file, email).context("failed to write session file")
    }

    fn forget(&self) -> Result<()> {
        match fs::remove_file(&self.session_file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("failed to clear session file"),
        }
    }
}
