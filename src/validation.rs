//! Form checks that run before anything reaches the store.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;
use crate::models::{NewExperience, NewProfile, ProfileUpdate, Role, CATEGORIES};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("Invalid email regex")
});

/// E.164-style: optional plus, no leading zero, 2 to 15 digits.
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("Invalid phone regex"));

pub fn required(field: &'static str, label: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field, format!("{label} is required.")))
    } else {
        Ok(())
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    required("email", "Email", email)?;
    if EMAIL_REGEX.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("email", "Invalid email format."))
    }
}

/// Spaces, dashes and parentheses are ignored.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let compact: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if PHONE_REGEX.is_match(&compact) {
        Ok(())
    } else {
        Err(ValidationError::new("phone", "Invalid phone number format."))
    }
}

fn validate_optional_phone(phone: Option<&str>) -> Result<(), ValidationError> {
    match phone.map(str::trim) {
        Some(phone) if !phone.is_empty() => validate_phone(phone),
        _ => Ok(()),
    }
}

/// Sign-up checks. Only an admin may hand out the admin role.
pub fn validate_new_profile(profile: &NewProfile, actor_is_admin: bool) -> Result<(), ValidationError> {
    required("full_name", "Full name", &profile.full_name)?;
    validate_email(&profile.email)?;
    validate_optional_phone(profile.phone.as_deref())?;
    if profile.role == Role::Admin && !actor_is_admin {
        return Err(ValidationError::new("role", "Choose either tourist or host."));
    }
    Ok(())
}

pub fn validate_profile_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    required("full_name", "Full name", &update.full_name)?;
    validate_optional_phone(update.phone.as_deref())
}

pub fn validate_new_experience(draft: &NewExperience) -> Result<(), ValidationError> {
    required("title", "Title", &draft.title)?;
    required("description", "Description", &draft.description)?;
    required("location", "Location", &draft.location)?;
    if !CATEGORIES.contains(&draft.category.as_str()) {
        return Err(ValidationError::new(
            "category",
            format!("Category must be one of: {}.", CATEGORIES.join(", ")),
        ));
    }
    if !draft.price.is_finite() || draft.price < 0.0 {
        return Err(ValidationError::new("price", "Price must be zero or more."));
    }
    if !draft.duration_hours.is_finite() || draft.duration_hours <= 0.0 {
        return Err(ValidationError::new("duration", "Duration must be greater than zero."));
    }
    if draft.max_participants == 0 {
        return Err(ValidationError::new(
            "max_participants",
            "Allow at least one participant.",
        ));
    }
    let rating = draft.sustainability.rating;
    if !(0.0..=5.0).contains(&rating) {
        return Err(ValidationError::new("rating", "Rating must be between 0 and 5."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::Sustainability;

    #[test]
    fn email_shapes() {
        assert!(validate_email("asha@example.in").is_ok());
        assert!(validate_email(" asha@example.in ").is_ok());
        for bad in ["", "asha", "asha@", "asha@example", "a b@example.com"] {
            assert_eq!(validate_email(bad).unwrap_err().field, "email", "{bad}");
        }
    }

    #[test]
    fn phone_shapes() {
        for good in ["+919876543210", "9876543210", "+1 (415) 555-0100"] {
            assert!(validate_phone(good).is_ok(), "{good}");
        }
        for bad in ["0123456", "+", "12345678901234567", "phone"] {
            assert!(validate_phone(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn sign_up_rules() {
        let mut profile = NewProfile {
            full_name: "Asha".into(),
            email: "asha@example.in".into(),
            role: Role::Host,
            phone: Some("  ".into()),
            location: None,
            is_local: true,
        };
        assert!(validate_new_profile(&profile, false).is_ok());

        profile.role = Role::Admin;
        assert_eq!(validate_new_profile(&profile, false).unwrap_err().field, "role");
        assert!(validate_new_profile(&profile, true).is_ok());

        profile.full_name = "   ".into();
        assert_eq!(validate_new_profile(&profile, true).unwrap_err().field, "full_name");
    }

    #[test]
    fn experience_rules() {
        let mut draft = NewExperience {
            title: "Kayak".into(),
            description: "Mangrove paddle".into(),
            location: "Kannur".into(),
            category: "adventure".into(),
            price: 30.0,
            duration_hours: 2.5,
            date: NaiveDate::from_ymd_opt(2024, 9, 9).unwrap(),
            max_participants: 4,
            sustainability: Sustainability::default(),
        };
        assert!(validate_new_experience(&draft).is_ok());

        draft.category = "Adventure!".into();
        assert_eq!(validate_new_experience(&draft).unwrap_err().field, "category");
        draft.category = "adventure".into();
        draft.duration_hours = 0.0;
        assert_eq!(validate_new_experience(&draft).unwrap_err().field, "duration");
    }
}
