//! Dashboard aggregates: counts, sums and dense per-day trend series computed
//! over collections loaded from the store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::Result;
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use tracing::debug;

use crate::db::{
    count_bookings, count_experiences, count_profiles, fetch_bookings, fetch_experiences,
    fetch_profiles, fetch_recent_bookings, ExperienceQuery,
};
use crate::models::{
    AccountStatus, Booking, BookingStatus, BookingSummary, Experience, ExperienceStatus, Profile,
    Role,
};

/// First day covered by the "all time" range.
const EPOCH: (i32, u32, u32) = (2020, 1, 1);

/// Reporting window picker on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeRange {
    Last7Days,
    #[default]
    Last30Days,
    Last90Days,
    AllTime,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        TimeRange::Last7Days,
        TimeRange::Last30Days,
        TimeRange::Last90Days,
        TimeRange::AllTime,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeRange::Last7Days => "Last 7 Days",
            TimeRange::Last30Days => "Last 30 Days",
            TimeRange::Last90Days => "Last 90 Days",
            TimeRange::AllTime => "All Time",
        }
    }

    /// Short form used in export file names.
    pub fn slug(self) -> &'static str {
        match self {
            TimeRange::Last7Days => "7days",
            TimeRange::Last30Days => "30days",
            TimeRange::Last90Days => "90days",
            TimeRange::AllTime => "all",
        }
    }

    pub fn next(self) -> Self {
        match self {
            TimeRange::Last7Days => TimeRange::Last30Days,
            TimeRange::Last30Days => TimeRange::Last90Days,
            TimeRange::Last90Days => TimeRange::AllTime,
            TimeRange::AllTime => TimeRange::Last7Days,
        }
    }

    /// The half-open window ending after `today`.
    pub fn window(self, today: NaiveDate) -> DateWindow {
        let end = today.checked_add_days(Days::new(1)).unwrap_or(today);
        let epoch = NaiveDate::from_ymd_opt(EPOCH.0, EPOCH.1, EPOCH.2).unwrap_or(NaiveDate::MIN);
        let start = match self {
            TimeRange::Last7Days => end.checked_sub_days(Days::new(7)),
            TimeRange::Last30Days => end.checked_sub_days(Days::new(30)),
            TimeRange::Last90Days => end.checked_sub_days(Days::new(90)),
            TimeRange::AllTime => Some(epoch.min(end)),
        };
        DateWindow::new(start.unwrap_or(end), end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Calendar days in `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// An inverted window is clamped to empty.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }

    pub fn len(&self) -> usize {
        usize::try_from((self.end - self.start).num_days()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day < end)
    }

    fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if self.contains(date) {
            usize::try_from((date - self.start).num_days()).ok()
        } else {
            None
        }
    }
}

/// Dense per-day series: one entry for every day of `window`, each folded
/// from the records dated that day. Records outside the window are ignored.
pub fn bucket_by_day<R, V, K, F>(
    window: DateWindow,
    records: &[R],
    date_of: K,
    mut fold: F,
) -> Vec<(NaiveDate, V)>
where
    V: Default,
    K: Fn(&R) -> NaiveDate,
    F: FnMut(&mut V, &R),
{
    let mut buckets: Vec<(NaiveDate, V)> =
        window.days().map(|day| (day, V::default())).collect();
    for record in records {
        if let Some(idx) = window.index_of(date_of(record)) {
            fold(&mut buckets[idx].1, record);
        }
    }
    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyBookings {
    pub date: NaiveDate,
    pub bookings: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySustainability {
    pub date: NaiveDate,
    pub local_spending: f64,
    pub carbon: f64,
}

/// Count records per day.
pub fn daily_counts<R>(
    window: DateWindow,
    records: &[R],
    date_of: impl Fn(&R) -> NaiveDate,
) -> Vec<DailyCount> {
    bucket_by_day(window, records, date_of, |count: &mut u64, _| *count += 1)
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

/// Confirmed bookings and their revenue per booking date.
pub fn booking_trends(window: DateWindow, bookings: &[Booking]) -> Vec<DailyBookings> {
    bucket_by_day(
        window,
        bookings,
        |b| b.booking_date,
        |acc: &mut (u64, f64), booking| {
            if booking.status == BookingStatus::Confirmed {
                acc.0 += 1;
                acc.1 += booking.total_price;
            }
        },
    )
    .into_iter()
    .map(|(date, (bookings, revenue))| DailyBookings {
        date,
        bookings,
        revenue,
    })
    .collect()
}

/// Local spend and carbon of confirmed bookings per booking date.
pub fn sustainability_trends(
    window: DateWindow,
    confirmed: &[(&Booking, &Experience)],
) -> Vec<DailySustainability> {
    bucket_by_day(
        window,
        confirmed,
        |(booking, _)| booking.booking_date,
        |acc: &mut (f64, f64), (_, experience)| {
            acc.0 += experience.sustainability.local_spend;
            acc.1 += experience.sustainability.carbon_estimate;
        },
    )
    .into_iter()
    .map(|(date, (local_spending, carbon))| DailySustainability {
        date,
        local_spending,
        carbon,
    })
    .collect()
}

/// Group-by count keyed by `key`.
pub fn count_by<R, K: Ord>(records: &[R], key: impl Fn(&R) -> K) -> BTreeMap<K, u64> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(key(record)).or_insert(0) += 1;
    }
    counts
}

/// Highest counts first, ties broken by key, truncated to `n`.
pub fn top_n<K: Ord + Clone>(counts: &BTreeMap<K, u64>, n: usize) -> Vec<(K, u64)> {
    let mut entries: Vec<(K, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

/// `part` as a percentage of `total`; zero when there is nothing to divide.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn average(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0u64), |(sum, n), value| (sum + value, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingStatusTally {
    pub confirmed: u64,
    pub pending: u64,
    pub cancelled: u64,
}

impl BookingStatusTally {
    pub fn from_bookings(bookings: &[Booking]) -> Self {
        let counts = count_by(bookings, |b| b.status);
        let get = |status: BookingStatus| counts.get(&status).copied().unwrap_or(0);
        Self {
            confirmed: get(BookingStatus::Confirmed),
            pending: get(BookingStatus::Pending),
            cancelled: get(BookingStatus::Cancelled),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SustainabilityMetrics {
    pub local_host_percentage: f64,
    pub average_group_size: f64,
    pub carbon_footprint: f64,
    pub local_economic_impact: f64,
    pub cultural_count: u64,
    pub certified_count: u64,
}

impl SustainabilityMetrics {
    pub fn compute(profiles: &[Profile], confirmed: &[(&Booking, &Experience)]) -> Self {
        let hosts: Vec<&Profile> = profiles.iter().filter(|p| p.role == Role::Host).collect();
        let local_hosts = hosts.iter().filter(|p| p.is_local).count();

        Self {
            local_host_percentage: percentage(local_hosts as u64, hosts.len() as u64),
            average_group_size: average(
                confirmed
                    .iter()
                    .map(|(booking, _)| f64::from(booking.participants)),
            ),
            carbon_footprint: confirmed
                .iter()
                .map(|(_, e)| e.sustainability.carbon_estimate)
                .sum(),
            local_economic_impact: confirmed
                .iter()
                .map(|(_, e)| e.sustainability.local_spend)
                .sum(),
            cultural_count: confirmed
                .iter()
                .filter(|(_, e)| e.sustainability.is_cultural)
                .count() as u64,
            certified_count: confirmed
                .iter()
                .filter(|(_, e)| e.sustainability.is_certified_sustainable)
                .count() as u64,
        }
    }
}

/// Everything the admin dashboard shows for one time range.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub range: TimeRange,
    pub total_users: u64,
    pub active_users: u64,
    pub total_experiences: u64,
    pub pending_experiences: u64,
    pub total_bookings: u64,
    pub total_revenue: f64,
    pub bookings_by_status: BookingStatusTally,
    pub popular_locations: Vec<(String, u64)>,
    pub recent_bookings: Vec<BookingSummary>,
    pub user_growth: Vec<DailyCount>,
    pub booking_trends: Vec<DailyBookings>,
    pub sustainability: SustainabilityMetrics,
    pub sustainability_trends: Vec<DailySustainability>,
}

impl DashboardStats {
    /// Aggregate already-fetched collections. Headline counts are taken from
    /// the collections themselves.
    pub fn compute(
        range: TimeRange,
        today: NaiveDate,
        profiles: &[Profile],
        experiences: &[Experience],
        bookings: &[Booking],
        recent_bookings: Vec<BookingSummary>,
    ) -> Self {
        let window = range.window(today);
        let by_id: HashMap<i64, &Experience> = experiences.iter().map(|e| (e.id, e)).collect();
        let confirmed: Vec<(&Booking, &Experience)> = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .filter_map(|b| by_id.get(&b.experience_id).map(|e| (b, *e)))
            .collect();

        let locations = count_by(experiences, |e| e.location.clone());

        Self {
            range,
            total_users: profiles.len() as u64,
            active_users: profiles
                .iter()
                .filter(|p| p.status == AccountStatus::Active)
                .count() as u64,
            total_experiences: experiences.len() as u64,
            pending_experiences: experiences
                .iter()
                .filter(|e| e.status == ExperienceStatus::Pending)
                .count() as u64,
            total_bookings: bookings.len() as u64,
            total_revenue: bookings
                .iter()
                .filter(|b| b.status == BookingStatus::Confirmed)
                .map(|b| b.total_price)
                .sum(),
            bookings_by_status: BookingStatusTally::from_bookings(bookings),
            popular_locations: top_n(&locations, 5),
            recent_bookings,
            user_growth: daily_counts(window, profiles, |p| p.created_at.date_naive()),
            booking_trends: booking_trends(window, bookings),
            sustainability: SustainabilityMetrics::compute(profiles, &confirmed),
            sustainability_trends: sustainability_trends(window, &confirmed),
        }
    }

    /// Fetch what the dashboard needs and aggregate it. The headline totals
    /// come from count-only queries.
    pub fn load(conn: &Connection, range: TimeRange, today: NaiveDate) -> Result<Self> {
        let profiles = fetch_profiles(conn)?;
        let experiences = fetch_experiences(conn, &ExperienceQuery::default())?;
        let bookings = fetch_bookings(conn)?;
        let recent = fetch_recent_bookings(conn, 5)?;

        let mut stats = Self::compute(range, today, &profiles, &experiences, &bookings, recent);
        stats.total_users = count_profiles(conn, None)?;
        stats.active_users = count_profiles(conn, Some(AccountStatus::Active))?;
        stats.total_experiences = count_experiences(conn, None)?;
        stats.pending_experiences = count_experiences(conn, Some(ExperienceStatus::Pending))?;
        stats.total_bookings = count_bookings(conn, None)?;

        debug!(range = range.slug(), days = stats.user_growth.len(), "dashboard stats loaded");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::models::Sustainability;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn booking(id: i64, date: NaiveDate, status: BookingStatus, total: f64) -> Booking {
        Booking {
            id,
            experience_id: 1,
            user_id: 1,
            participants: 2,
            booking_date: date,
            status,
            total_price: total,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn experience(id: i64, location: &str) -> Experience {
        Experience {
            id,
            title: "Walk".into(),
            description: String::new(),
            location: location.into(),
            category: "tour".into(),
            price: 10.0,
            duration_hours: 1.0,
            date: day(2024, 1, 1),
            max_participants: 10,
            current_participants: 0,
            status: ExperienceStatus::Approved,
            creator_id: 1,
            images: Vec::new(),
            sustainability: Sustainability {
                rating: 4.0,
                is_cultural: true,
                is_certified_sustainable: false,
                carbon_estimate: 1.5,
                local_spend: 20.0,
            },
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn ranges_end_after_today() {
        let today = day(2024, 3, 10);
        let week = TimeRange::Last7Days.window(today);
        assert_eq!(week.start, day(2024, 3, 4));
        assert_eq!(week.end, day(2024, 3, 11));
        assert_eq!(week.len(), 7);
        assert!(week.contains(today));

        let all = TimeRange::AllTime.window(today);
        assert_eq!(all.start, day(2020, 1, 1));
        assert_eq!(TimeRange::AllTime.next(), TimeRange::Last7Days);
    }

    #[test]
    fn booking_trends_only_count_confirmed() {
        let window = DateWindow::new(day(2024, 1, 1), day(2024, 1, 4));
        let bookings = vec![
            booking(1, day(2024, 1, 1), BookingStatus::Confirmed, 30.0),
            booking(2, day(2024, 1, 1), BookingStatus::Pending, 99.0),
            booking(3, day(2024, 1, 3), BookingStatus::Confirmed, 12.5),
            booking(4, day(2024, 1, 4), BookingStatus::Confirmed, 5.0),
        ];
        let trends = booking_trends(window, &bookings);
        assert_eq!(trends.len(), 3);
        assert_eq!((trends[0].bookings, trends[0].revenue), (1, 30.0));
        assert_eq!(trends[1].bookings, 0);
        assert_eq!((trends[2].bookings, trends[2].revenue), (1, 12.5));
    }

    #[test]
    fn top_locations_break_ties_by_name() {
        let experiences = vec![
            experience(1, "Munnar"),
            experience(2, "Kochi"),
            experience(3, "Munnar"),
            experience(4, "Alleppey"),
        ];
        let counts = count_by(&experiences, |e| e.location.clone());
        assert_eq!(
            top_n(&counts, 2),
            vec![("Munnar".to_string(), 2), ("Alleppey".to_string(), 1)]
        );
    }

    #[test]
    fn ratios_guard_against_empty_input() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(average(Vec::new()), 0.0);
        assert_eq!(average([2.0, 4.0]), 3.0);
    }

    #[test]
    fn dashboard_aggregates_confirmed_bookings() {
        let today = day(2024, 1, 10);
        let experiences = vec![experience(1, "Kochi")];
        let bookings = vec![
            booking(1, day(2024, 1, 9), BookingStatus::Confirmed, 40.0),
            booking(2, day(2024, 1, 9), BookingStatus::Cancelled, 10.0),
        ];
        let stats = DashboardStats::compute(
            TimeRange::Last7Days,
            today,
            &[],
            &experiences,
            &bookings,
            Vec::new(),
        );

        assert_eq!(stats.total_revenue, 40.0);
        assert_eq!(stats.bookings_by_status.cancelled, 1);
        assert_eq!(stats.sustainability.cultural_count, 1);
        assert_eq!(stats.sustainability.average_group_size, 2.0);
        assert_eq!(stats.sustainability.local_host_percentage, 0.0);
        let spent: f64 = stats
            .sustainability_trends
            .iter()
            .map(|d| d.local_spending)
            .sum();
        assert_eq!(spent, 20.0);
        assert_eq!(stats.user_growth.len(), 7);
    }

    #[test]
    fn dashboard_loads_from_seeded_store() {
        let conn = crate::db::open_in_memory().unwrap();
        let today = day(2024, 2, 1);
        crate::db::seed_demo_data(&conn, today).unwrap();

        let stats = DashboardStats::load(&conn, TimeRange::Last30Days, today).unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.pending_experiences, 1);
        assert_eq!(stats.total_bookings, 4);
        assert_eq!(stats.recent_bookings.len(), 4);
        assert_eq!(stats.booking_trends.len(), 30);
        assert_eq!(stats.sustainability.local_host_percentage, 100.0);
    }

    proptest! {
        #[test]
        fn buckets_cover_window_and_count_in_window_records(
            start_offset in 0u64..60,
            span in 0u64..45,
            offsets in proptest::collection::vec(0u64..120, 0..80),
        ) {
            let base = day(2024, 1, 1);
            let start = base + Days::new(start_offset);
            let end = start + Days::new(span);
            let window = DateWindow::new(start, end);
            let dates: Vec<NaiveDate> = offsets.iter().map(|o| base + Days::new(*o)).collect();

            let series = daily_counts(window, &dates, |d| *d);

            prop_assert_eq!(series.len() as u64, span);
            for (idx, bucket) in series.iter().enumerate() {
                prop_assert_eq!(bucket.date, start + Days::new(idx as u64));
            }
            let in_window = dates.iter().filter(|d| start <= **d && **d < end).count() as u64;
            let total: u64 = series.iter().map(|b| b.count).sum();
            prop_assert_eq!(total, in_window);
        }
    }
}
