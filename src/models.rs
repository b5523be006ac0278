//! Domain models that mirror the SQLite schema and get passed throughout the
//! TUI. There is exactly one definition per stored entity so every screen reads
//! and writes the same row shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Raised when a text column holds a value outside the enum it maps to.
#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Account role. Hosts may publish experiences, admins moderate everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Tourist,
    Host,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Tourist, Role::Host, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Tourist => "tourist",
            Role::Host => "host",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tourist" => Ok(Role::Tourist),
            "host" => Ok(Role::Host),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            other => Err(ParseEnumError {
                kind: "account status",
                value: other.to_string(),
            }),
        }
    }
}

/// Moderation state of an experience listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExperienceStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExperienceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceStatus::Pending => "pending",
            ExperienceStatus::Approved => "approved",
            ExperienceStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ExperienceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExperienceStatus::Pending),
            "approved" => Ok(ExperienceStatus::Approved),
            "rejected" => Ok(ExperienceStatus::Rejected),
            other => Err(ParseEnumError {
                kind: "experience status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(ParseEnumError {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

/// A user account as stored in the `profiles` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    /// Hosts flagged as living in the region they host in.
    pub is_local: bool,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Sustainability metadata attached to an experience listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sustainability {
    /// Host-reported rating on a 0-5 scale.
    pub rating: f64,
    pub is_cultural: bool,
    pub is_certified_sustainable: bool,
    /// Estimated kilograms of CO2 per booking.
    pub carbon_estimate: f64,
    /// Estimated spend with local vendors per booking.
    pub local_spend: f64,
}

/// A bookable activity.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    /// Price per participant.
    pub price: f64,
    pub duration_hours: f64,
    pub date: NaiveDate,
    pub max_participants: u32,
    pub current_participants: u32,
    pub status: ExperienceStatus,
    pub creator_id: i64,
    pub images: Vec<String>,
    pub sustainability: Sustainability,
    pub created_at: DateTime<Utc>,
}

impl Experience {
    /// Seats still open. Never negative even if the counters drifted.
    pub fn remaining_capacity(&self) -> u32 {
        self.max_participants
            .saturating_sub(self.current_participants)
    }

    pub fn total_for(&self, participants: u32) -> f64 {
        self.price * f64::from(participants)
    }
}

/// A marketplace listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub stock: u32,
    pub artisan_id: i64,
    pub artisan_name: String,
    pub rating: f64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub experience_id: i64,
    pub user_id: i64,
    pub participants: u32,
    pub booking_date: NaiveDate,
    pub status: BookingStatus,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
}

/// A booking joined with the fields the booking lists display.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingSummary {
    pub booking: Booking,
    pub experience_title: String,
    pub location: String,
    pub experience_date: NaiveDate,
    pub host_name: String,
    pub user_name: String,
}

/// Fields supplied when registering a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProfile {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub is_local: bool,
}

/// Editable profile fields. `avatar_url` is only overwritten when `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// Fields supplied by a host when drafting a new experience.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExperience {
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub price: f64,
    pub duration_hours: f64,
    pub date: NaiveDate,
    pub max_participants: u32,
    pub sustainability: Sustainability,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub stock: u32,
    pub artisan_id: i64,
    pub artisan_name: String,
    pub image_url: Option<String>,
}

/// Categories offered by the itinerary planner and the experience form.
pub const CATEGORIES: [&str; 6] = ["food", "adventure", "culture", "nature", "workshop", "tour"];
