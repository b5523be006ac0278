//! In-memory filtering and sorting over collections already fetched from the
//! store. Everything here is pure: the same input and criteria always give
//! the same output.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::models::{AccountStatus, BookingSummary, Experience, ExperienceStatus, Product, Profile, Role};

fn contains_folded(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn normalized_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Marketplace filter. Every populated criterion must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub artisan: Option<String>,
    pub min_price: f64,
    /// `None` leaves the upper bound open.
    pub max_price: Option<f64>,
    pub query: String,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = &self.category {
            if &product.category != category {
                return false;
            }
        }
        if let Some(artisan) = &self.artisan {
            if &product.artisan_name != artisan {
                return false;
            }
        }
        if product.price < self.min_price {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }

        match normalized_query(&self.query) {
            Some(needle) => {
                contains_folded(&product.title, &needle)
                    || contains_folded(&product.description, &needle)
                    || contains_folded(&product.artisan_name, &needle)
            }
            None => true,
        }
    }

    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        products.iter().filter(|product| self.matches(product)).collect()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Sort orders offered on the marketplace screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    TitleAsc,
    TitleDesc,
}

impl ProductSort {
    pub fn label(self) -> &'static str {
        match self {
            ProductSort::Newest => "Newest",
            ProductSort::PriceAsc => "Price: low to high",
            ProductSort::PriceDesc => "Price: high to low",
            ProductSort::TitleAsc => "Name: A-Z",
            ProductSort::TitleDesc => "Name: Z-A",
        }
    }

    /// Cycle used by the sort hotkey.
    pub fn next(self) -> Self {
        match self {
            ProductSort::Newest => ProductSort::PriceAsc,
            ProductSort::PriceAsc => ProductSort::PriceDesc,
            ProductSort::PriceDesc => ProductSort::TitleAsc,
            ProductSort::TitleAsc => ProductSort::TitleDesc,
            ProductSort::TitleDesc => ProductSort::Newest,
        }
    }

    fn compare(self, a: &Product, b: &Product) -> Ordering {
        match self {
            ProductSort::Newest => b.created_at.cmp(&a.created_at),
            ProductSort::PriceAsc => a.price.total_cmp(&b.price),
            ProductSort::PriceDesc => b.price.total_cmp(&a.price),
            ProductSort::TitleAsc => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            ProductSort::TitleDesc => b.title.to_lowercase().cmp(&a.title.to_lowercase()),
        }
    }

    /// Stable sort, so ties keep their fetched order.
    pub fn sort(self, products: &mut [&Product]) {
        products.sort_by(|a, b| self.compare(a, b));
    }
}

/// Distinct product categories for the filter picker, alphabetical.
pub fn product_categories(products: &[Product]) -> Vec<String> {
    products
        .iter()
        .map(|p| p.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct artisan display names, alphabetical.
pub fn artisans(products: &[Product]) -> Vec<String> {
    products
        .iter()
        .map(|p| p.artisan_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Moderation filter for the admin experience list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperienceFilter {
    pub status: Option<ExperienceStatus>,
    pub query: String,
}

impl ExperienceFilter {
    pub fn matches(&self, experience: &Experience) -> bool {
        if self.status.is_some_and(|status| experience.status != status) {
            return false;
        }
        match normalized_query(&self.query) {
            Some(needle) => {
                contains_folded(&experience.title, &needle)
                    || contains_folded(&experience.location, &needle)
                    || contains_folded(&experience.description, &needle)
            }
            None => true,
        }
    }

    pub fn apply<'a>(&self, experiences: &'a [Experience]) -> Vec<&'a Experience> {
        experiences.iter().filter(|e| self.matches(e)).collect()
    }
}

/// Admin user list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub query: String,
}

impl UserFilter {
    pub fn matches(&self, profile: &Profile) -> bool {
        if self.role.is_some_and(|role| profile.role != role) {
            return false;
        }
        if self.status.is_some_and(|status| profile.status != status) {
            return false;
        }
        match normalized_query(&self.query) {
            Some(needle) => {
                contains_folded(&profile.full_name, &needle)
                    || contains_folded(&profile.email, &needle)
            }
            None => true,
        }
    }

    pub fn apply<'a>(&self, profiles: &'a [Profile]) -> Vec<&'a Profile> {
        profiles.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Tabs on the "my bookings" screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookingTab {
    #[default]
    Upcoming,
    Past,
}

impl BookingTab {
    pub fn toggle(self) -> Self {
        match self {
            BookingTab::Upcoming => BookingTab::Past,
            BookingTab::Past => BookingTab::Upcoming,
        }
    }

    /// Bookings whose experience falls today or later are upcoming.
    pub fn includes(self, booking: &BookingSummary, today: NaiveDate) -> bool {
        match self {
            BookingTab::Upcoming => booking.experience_date >= today,
            BookingTab::Past => booking.experience_date < today,
        }
    }

    pub fn apply<'a>(self, bookings: &'a [BookingSummary], today: NaiveDate) -> Vec<&'a BookingSummary> {
        bookings.iter().filter(|b| self.includes(b, today)).collect()
    }
}
