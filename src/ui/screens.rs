use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::analytics::{DashboardStats, TimeRange};
use crate::catalog::{
    artisans, product_categories, BookingTab, ExperienceFilter, ProductFilter, ProductSort,
    UserFilter,
};
use crate::db::{
    fetch_booking_summaries, fetch_experiences, fetch_products, fetch_profiles,
    fetch_user_bookings, ExperienceOrder, ExperienceQuery,
};
use crate::itinerary::{ItineraryOutcome, ItineraryRequest};
use crate::models::{
    AccountStatus, BookingStatus, BookingSummary, Experience, ExperienceStatus, Product, Profile,
    Role,
};
use crate::realtime::{RowChange, Subscription};

/// Price bands the marketplace cycles through, as (min, max).
const PRICE_BANDS: [(f64, Option<f64>); 5] = [
    (0.0, None),
    (0.0, Some(25.0)),
    (25.0, Some(50.0)),
    (50.0, Some(100.0)),
    (100.0, None),
];

/// Highlighted row of a list, kept inside the list as it grows and shrinks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selection {
    pub(crate) index: usize,
}

impl Selection {
    pub(crate) fn move_by(&mut self, offset: isize, len: usize) {
        if len == 0 {
            self.index = 0;
            return;
        }
        let target = (self.index as isize + offset).clamp(0, len as isize - 1);
        self.index = target as usize;
    }

    pub(crate) fn first(&mut self) {
        self.index = 0;
    }

    pub(crate) fn last(&mut self, len: usize) {
        self.index = len.saturating_sub(1);
    }

    pub(crate) fn clamp(&mut self, len: usize) {
        if self.index >= len {
            self.index = len.saturating_sub(1);
        }
    }
}

/// Step through `None`, each option, then back to `None`.
pub(crate) fn cycle_option<T: Clone + PartialEq>(current: &Option<T>, options: &[T]) -> Option<T> {
    match current {
        None => options.first().cloned(),
        Some(value) => options
            .iter()
            .position(|option| option == value)
            .and_then(|idx| options.get(idx + 1))
            .cloned(),
    }
}

/// Approved experiences open for booking.
pub(crate) struct ExperiencesScreen {
    pub(crate) experiences: Vec<Experience>,
    pub(crate) filter: ExperienceFilter,
    pub(crate) selection: Selection,
    subscription: Subscription<Experience>,
}

impl ExperiencesScreen {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        Ok(Self {
            experiences: fetch_experiences(conn, &ExperienceQuery::bookable())?,
            filter: ExperienceFilter::default(),
            selection: Selection::default(),
            subscription: Subscription::filtered(|e: &Experience| {
                e.status == ExperienceStatus::Approved
            }),
        })
    }

    pub(crate) fn visible(&self) -> Vec<&Experience> {
        self.filter.apply(&self.experiences)
    }

    pub(crate) fn current(&self) -> Option<&Experience> {
        self.visible().get(self.selection.index).copied()
    }

    pub(crate) fn apply_changes(&mut self, conn: &Connection, changes: &[RowChange]) -> Result<usize> {
        let applied = self
            .subscription
            .apply_all(conn, changes, &mut self.experiences)?;
        self.experiences
            .sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        self.selection.clamp(self.visible().len());
        Ok(applied)
    }
}

/// Artisan products with in-memory filters and sort.
pub(crate) struct MarketplaceScreen {
    pub(crate) products: Vec<Product>,
    pub(crate) filter: ProductFilter,
    pub(crate) sort: ProductSort,
    pub(crate) selection: Selection,
    subscription: Subscription<Product>,
}

impl MarketplaceScreen {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        Ok(Self::new(fetch_products(conn)?))
    }

    fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            filter: ProductFilter::default(),
            sort: ProductSort::default(),
            selection: Selection::default(),
            subscription: Subscription::all(),
        }
    }

    pub(crate) fn visible(&self) -> Vec<&Product> {
        let mut products = self.filter.apply(&self.products);
        self.sort.sort(&mut products);
        products
    }

    pub(crate) fn current(&self) -> Option<&Product> {
        self.visible().get(self.selection.index).copied()
    }

    pub(crate) fn cycle_category(&mut self) {
        self.filter.category = cycle_option(&self.filter.category, &product_categories(&self.products));
        self.selection.first();
    }

    pub(crate) fn cycle_artisan(&mut self) {
        self.filter.artisan = cycle_option(&self.filter.artisan, &artisans(&self.products));
        self.selection.first();
    }

    pub(crate) fn cycle_price_band(&mut self) {
        let current = PRICE_BANDS
            .iter()
            .position(|(min, max)| *min == self.filter.min_price && *max == self.filter.max_price)
            .unwrap_or(0);
        let (min, max) = PRICE_BANDS[(current + 1) % PRICE_BANDS.len()];
        self.filter.min_price = min;
        self.filter.max_price = max;
        self.selection.first();
    }

    pub(crate) fn cycle_sort(&mut self) {
        self.sort = self.sort.next();
    }

    pub(crate) fn clear_filters(&mut self) {
        self.filter = ProductFilter::default();
        self.selection.first();
    }

    pub(crate) fn price_label(&self) -> String {
        match (self.filter.min_price, self.filter.max_price) {
            (min, None) if min <= 0.0 => "any price".to_string(),
            (min, None) => format!("${min:.0}+"),
            (min, Some(max)) => format!("${min:.0}-${max:.0}"),
        }
    }

    pub(crate) fn apply_changes(&mut self, conn: &Connection, changes: &[RowChange]) -> Result<usize> {
        let applied = self
            .subscription
            .apply_all(conn, changes, &mut self.products)?;
        self.selection.clamp(self.visible().len());
        Ok(applied)
    }
}

/// The signed-in tourist's bookings, split into upcoming and past.
pub(crate) struct BookingsScreen {
    pub(crate) bookings: Vec<BookingSummary>,
    pub(crate) tab: BookingTab,
    pub(crate) selection: Selection,
    subscription: Subscription<BookingSummary>,
}

impl BookingsScreen {
    pub(crate) fn load(conn: &Connection, user_id: i64) -> Result<Self> {
        Ok(Self {
            bookings: fetch_user_bookings(conn, user_id)?,
            tab: BookingTab::default(),
            selection: Selection::default(),
            subscription: Subscription::filtered(move |b: &BookingSummary| {
                b.booking.user_id == user_id
            }),
        })
    }

    pub(crate) fn visible(&self, today: NaiveDate) -> Vec<&BookingSummary> {
        self.tab.apply(&self.bookings, today)
    }

    pub(crate) fn current(&self, today: NaiveDate) -> Option<&BookingSummary> {
        self.visible(today).get(self.selection.index).copied()
    }

    pub(crate) fn toggle_tab(&mut self) {
        self.tab = self.tab.toggle();
        self.selection.first();
    }

    pub(crate) fn apply_changes(
        &mut self,
        conn: &Connection,
        changes: &[RowChange],
        today: NaiveDate,
    ) -> Result<usize> {
        let applied = self
            .subscription
            .apply_all(conn, changes, &mut self.bookings)?;
        self.bookings.sort_by(|a, b| {
            a.booking
                .booking_date
                .cmp(&b.booking.booking_date)
                .then(a.booking.id.cmp(&b.booking.id))
        });
        self.selection.clamp(self.visible(today).len());
        Ok(applied)
    }
}

/// Moderation queue over every experience.
pub(crate) struct ManageExperiencesScreen {
    pub(crate) experiences: Vec<Experience>,
    pub(crate) filter: ExperienceFilter,
    pub(crate) selection: Selection,
    subscription: Subscription<Experience>,
}

impl ManageExperiencesScreen {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        let query = ExperienceQuery {
            order: ExperienceOrder::NewestFirst,
            ..ExperienceQuery::default()
        };
        Ok(Self {
            experiences: fetch_experiences(conn, &query)?,
            filter: ExperienceFilter {
                status: Some(ExperienceStatus::Pending),
                query: String::new(),
            },
            selection: Selection::default(),
            subscription: Subscription::all(),
        })
    }

    pub(crate) fn visible(&self) -> Vec<&Experience> {
        self.filter.apply(&self.experiences)
    }

    pub(crate) fn current(&self) -> Option<&Experience> {
        self.visible().get(self.selection.index).copied()
    }

    pub(crate) fn cycle_status(&mut self) {
        self.filter.status = cycle_option(
            &self.filter.status,
            &[
                ExperienceStatus::Pending,
                ExperienceStatus::Approved,
                ExperienceStatus::Rejected,
            ],
        );
        self.selection.first();
    }

    pub(crate) fn apply_changes(&mut self, conn: &Connection, changes: &[RowChange]) -> Result<usize> {
        let applied = self
            .subscription
            .apply_all(conn, changes, &mut self.experiences)?;
        self.experiences
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.selection.clamp(self.visible().len());
        Ok(applied)
    }
}

/// Every profile, for role and suspension changes.
pub(crate) struct ManageUsersScreen {
    pub(crate) profiles: Vec<Profile>,
    pub(crate) filter: UserFilter,
    pub(crate) selection: Selection,
    subscription: Subscription<Profile>,
}

impl ManageUsersScreen {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        Ok(Self {
            profiles: fetch_profiles(conn)?,
            filter: UserFilter::default(),
            selection: Selection::default(),
            subscription: Subscription::all(),
        })
    }

    pub(crate) fn visible(&self) -> Vec<&Profile> {
        self.filter.apply(&self.profiles)
    }

    pub(crate) fn current(&self) -> Option<&Profile> {
        self.visible().get(self.selection.index).copied()
    }

    pub(crate) fn cycle_role(&mut self) {
        self.filter.role = cycle_option(&self.filter.role, &Role::ALL);
        self.selection.first();
    }

    pub(crate) fn cycle_status(&mut self) {
        self.filter.status = cycle_option(
            &self.filter.status,
            &[AccountStatus::Active, AccountStatus::Suspended],
        );
        self.selection.first();
    }

    pub(crate) fn apply_changes(&mut self, conn: &Connection, changes: &[RowChange]) -> Result<usize> {
        let applied = self
            .subscription
            .apply_all(conn, changes, &mut self.profiles)?;
        self.selection.clamp(self.visible().len());
        Ok(applied)
    }
}

/// Every booking, for admins to confirm or cancel.
pub(crate) struct ManageBookingsScreen {
    pub(crate) bookings: Vec<BookingSummary>,
    pub(crate) status: Option<BookingStatus>,
    pub(crate) selection: Selection,
    subscription: Subscription<BookingSummary>,
}

impl ManageBookingsScreen {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        Ok(Self {
            bookings: fetch_booking_summaries(conn, None)?,
            status: None,
            selection: Selection::default(),
            subscription: Subscription::all(),
        })
    }

    pub(crate) fn visible(&self) -> Vec<&BookingSummary> {
        self.bookings
            .iter()
            .filter(|b| self.status.map_or(true, |status| b.booking.status == status))
            .collect()
    }

    pub(crate) fn current(&self) -> Option<&BookingSummary> {
        self.visible().get(self.selection.index).copied()
    }

    pub(crate) fn cycle_status(&mut self) {
        self.status = cycle_option(
            &self.status,
            &[
                BookingStatus::Pending,
                BookingStatus::Confirmed,
                BookingStatus::Cancelled,
            ],
        );
        self.selection.first();
    }

    pub(crate) fn apply_changes(&mut self, conn: &Connection, changes: &[RowChange]) -> Result<usize> {
        let applied = self
            .subscription
            .apply_all(conn, changes, &mut self.bookings)?;
        self.bookings.sort_by(|a, b| {
            b.booking
                .created_at
                .cmp(&a.booking.created_at)
                .then(b.booking.id.cmp(&a.booking.id))
        });
        self.selection.clamp(self.visible().len());
        Ok(applied)
    }
}

pub(crate) struct DashboardScreen {
    pub(crate) stats: DashboardStats,
    pub(crate) scroll: u16,
}

impl DashboardScreen {
    pub(crate) fn load(conn: &Connection, range: TimeRange, today: NaiveDate) -> Result<Self> {
        Ok(Self {
            stats: DashboardStats::load(conn, range, today)?,
            scroll: 0,
        })
    }

    pub(crate) fn reload(&mut self, conn: &Connection, today: NaiveDate) -> Result<()> {
        self.stats = DashboardStats::load(conn, self.stats.range, today)?;
        Ok(())
    }

    pub(crate) fn next_range(&mut self, conn: &Connection, today: NaiveDate) -> Result<()> {
        self.stats = DashboardStats::load(conn, self.stats.range.next(), today)?;
        self.scroll = 0;
        Ok(())
    }
}

/// A generated plan. Nothing here is persisted.
pub(crate) struct ItineraryScreen {
    pub(crate) request: ItineraryRequest,
    pub(crate) outcome: ItineraryOutcome,
    pub(crate) scroll: u16,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::db::{create_experience, create_profile, open_in_memory, set_experience_status};
    use crate::models::{NewExperience, NewProfile, Sustainability};
    use crate::realtime::ChangeFeed;

    fn product(id: i64, category: &str, artisan: &str, price: f64) -> Product {
        Product {
            id,
            title: format!("Item {id}"),
            description: String::new(),
            category: category.to_string(),
            price,
            stock: 1,
            artisan_id: 1,
            artisan_name: artisan.to_string(),
            rating: 4.0,
            image_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut selection = Selection::default();
        selection.move_by(-3, 4);
        assert_eq!(selection.index, 0);
        selection.move_by(10, 4);
        assert_eq!(selection.index, 3);
        selection.clamp(2);
        assert_eq!(selection.index, 1);
        selection.clamp(0);
        assert_eq!(selection.index, 0);
    }

    #[test]
    fn option_cycle_returns_to_none() {
        let options = ["a".to_string(), "b".to_string()];
        let first = cycle_option(&None, &options);
        assert_eq!(first.as_deref(), Some("a"));
        let second = cycle_option(&first, &options);
        assert_eq!(second.as_deref(), Some("b"));
        assert_eq!(cycle_option(&second, &options), None);
    }

    #[test]
    fn marketplace_filters_then_sorts() {
        let mut screen = MarketplaceScreen::new(vec![
            product(1, "pottery", "Lakshmi", 30.0),
            product(2, "textiles", "Arun", 15.0),
            product(3, "pottery", "Arun", 45.0),
        ]);

        screen.cycle_category();
        assert_eq!(screen.filter.category.as_deref(), Some("pottery"));
        let ids: Vec<i64> = screen.visible().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1]);

        screen.cycle_sort();
        let ids: Vec<i64> = screen.visible().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(screen.current().map(|p| p.id), Some(1));

        screen.cycle_price_band();
        assert_eq!(screen.price_label(), "$0-$25");
        assert!(screen.visible().is_empty());

        screen.clear_filters();
        assert_eq!(screen.visible().len(), 3);
        assert_eq!(screen.price_label(), "any price");
    }

    #[test]
    fn approvals_appear_on_the_browse_screen() {
        let conn = open_in_memory().unwrap();
        let host = create_profile(
            &conn,
            &NewProfile {
                full_name: "Meena".into(),
                email: "meena@example.com".into(),
                role: Role::Host,
                phone: None,
                location: None,
                is_local: true,
            },
        )
        .unwrap();
        let mut screen = ExperiencesScreen::load(&conn).unwrap();
        let mut feed = ChangeFeed::subscribe(&conn).unwrap();

        let experience = create_experience(
            &conn,
            host.id,
            &NewExperience {
                title: "Spice garden walk".into(),
                description: "Cardamom and pepper".into(),
                location: "Thekkady".into(),
                category: "nature".into(),
                price: 10.0,
                duration_hours: 2.0,
                date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
                max_participants: 5,
                sustainability: Sustainability::default(),
            },
        )
        .unwrap();
        screen
            .apply_changes(&conn, &feed.poll(&conn).unwrap())
            .unwrap();
        assert!(screen.experiences.is_empty());

        set_experience_status(&conn, experience.id, ExperienceStatus::Approved).unwrap();
        screen
            .apply_changes(&conn, &feed.poll(&conn).unwrap())
            .unwrap();
        assert_eq!(screen.current().map(|e| e.id), Some(experience.id));

        set_experience_status(&conn, experience.id, ExperienceStatus::Rejected).unwrap();
        screen
            .apply_changes(&conn, &feed.poll(&conn).unwrap())
            .unwrap();
        assert!(screen.current().is_none());
    }
}
