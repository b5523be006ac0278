//! Greedy day-by-day itinerary planner. Candidates are packed into each day
//! in their fetched order under an hours ceiling and a running budget.

use anyhow::Result;
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::fetch_itinerary_candidates;
use crate::error::ValidationError;
use crate::models::Experience;

/// Hours of activities that fit into one day.
pub const MAX_DAY_HOURS: f64 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ItineraryRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub budget: f64,
    pub group_size: u32,
    pub categories: Vec<String>,
}

impl ItineraryRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end < self.start {
            return Err(ValidationError::new("end_date", "End date must not be before the start date."));
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(ValidationError::new("budget", "Budget must be zero or more."));
        }
        if self.group_size == 0 {
            return Err(ValidationError::new("group_size", "Group size must be at least 1."));
        }
        if self.categories.is_empty() {
            return Err(ValidationError::new("categories", "Pick at least one category."));
        }
        Ok(())
    }

    /// Whole days between start and end.
    pub fn trip_days(&self) -> u64 {
        u64::try_from((self.end - self.start).num_days()).unwrap_or(0)
    }

    /// Highest per-person price that could ever be afforded.
    pub fn max_price_per_person(&self) -> f64 {
        self.budget / f64::from(self.group_size.max(1))
    }
}

/// What to do when a day cannot fit any activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyDayPolicy {
    /// End the itinerary at the first empty day.
    #[default]
    Stop,
    /// Leave the day out and keep planning the following days.
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub activities: Vec<Experience>,
    pub total_cost: f64,
    pub total_duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItineraryOutcome {
    /// Nothing matched the request; no days were planned.
    NoCandidates,
    Planned(Vec<DayPlan>),
}

/// Pack one day greedily. Returns `None` when nothing fits.
fn plan_day(
    date: NaiveDate,
    candidates: &[Experience],
    group_size: u32,
    remaining: f64,
) -> Option<DayPlan> {
    let group = f64::from(group_size);
    let mut day = DayPlan {
        date,
        activities: Vec::new(),
        total_cost: 0.0,
        total_duration: 0.0,
    };

    for candidate in candidates
        .iter()
        .filter(|c| c.price * group <= remaining)
    {
        let cost = candidate.price * group;
        if day.total_duration + candidate.duration_hours <= MAX_DAY_HOURS
            && day.total_cost + cost <= remaining
        {
            day.total_duration += candidate.duration_hours;
            day.total_cost += cost;
            day.activities.push(candidate.clone());
        }
    }

    (!day.activities.is_empty()).then_some(day)
}

/// Lay candidates out over the trip. The same experience may appear on
/// several days.
pub fn plan_days(
    request: &ItineraryRequest,
    candidates: &[Experience],
    policy: EmptyDayPolicy,
) -> Vec<DayPlan> {
    let mut remaining = request.budget;
    let mut days = Vec::new();

    for offset in 0..request.trip_days() {
        let Some(date) = request.start.checked_add_days(Days::new(offset)) else {
            break;
        };
        match plan_day(date, candidates, request.group_size, remaining) {
            Some(day) => {
                remaining -= day.total_cost;
                days.push(day);
            }
            None if policy == EmptyDayPolicy::Skip => continue,
            None => {
                debug!(%date, "no activity fits, ending itinerary");
                break;
            }
        }
    }

    days
}

/// Validate and plan against an already-fetched candidate pool.
pub fn plan_itinerary(
    request: &ItineraryRequest,
    candidates: &[Experience],
    policy: EmptyDayPolicy,
) -> Result<ItineraryOutcome, ValidationError> {
    request.validate()?;
    if candidates.is_empty() {
        return Ok(ItineraryOutcome::NoCandidates);
    }
    Ok(ItineraryOutcome::Planned(plan_days(request, candidates, policy)))
}

/// Fetch matching approved experiences and plan the trip.
pub fn generate_itinerary(
    conn: &Connection,
    request: &ItineraryRequest,
    policy: EmptyDayPolicy,
) -> Result<ItineraryOutcome> {
    request.validate()?;
    let candidates = fetch_itinerary_candidates(
        conn,
        &request.categories,
        request.group_size,
        request.max_price_per_person(),
    )?;

    let outcome = plan_itinerary(request, &candidates, policy)?;
    match &outcome {
        ItineraryOutcome::NoCandidates => info!("no experiences match itinerary request"),
        ItineraryOutcome::Planned(days) => {
            info!(candidates = candidates.len(), days = days.len(), "itinerary generated")
        }
    }
    Ok(outcome)
}
