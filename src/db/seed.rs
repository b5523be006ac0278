use anyhow::Result;
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use tracing::info;

use super::bookings::{create_booking, set_booking_status};
use super::experiences::{create_experience, set_experience_images, set_experience_status};
use super::products::create_product;
use super::profiles::{count_profiles, create_profile};
use crate::models::{
    BookingStatus, ExperienceStatus, NewExperience, NewProduct, NewProfile, Role, Sustainability,
};

struct SeedExperience {
    title: &'static str,
    description: &'static str,
    location: &'static str,
    category: &'static str,
    price: f64,
    duration_hours: f64,
    days_ahead: u64,
    max_participants: u32,
    status: ExperienceStatus,
    image: &'static str,
    sustainability: (f64, bool, bool, f64, f64),
}

const EXPERIENCES: [SeedExperience; 5] = [
    SeedExperience {
        title: "Traditional Pottery Workshop",
        description: "Shape clay on a kick wheel with a family of potters.",
        location: "Kyoto Cultural Center",
        category: "workshop",
        price: 75.0,
        duration_hours: 3.0,
        days_ahead: 7,
        max_participants: 8,
        status: ExperienceStatus::Approved,
        image: "https://images.unsplash.com/photo-1565193298357-c816cf5c1d52",
        sustainability: (4.5, true, true, 2.0, 60.0),
    },
    SeedExperience {
        title: "Mount Fuji Sunrise Hike",
        description: "Reach the summit for sunrise with a local mountain guide.",
        location: "Mount Fuji",
        category: "adventure",
        price: 120.0,
        duration_hours: 8.0,
        days_ahead: 10,
        max_participants: 12,
        status: ExperienceStatus::Approved,
        image: "https://images.unsplash.com/photo-1490806843957-31f4c9a91c65",
        sustainability: (4.0, false, true, 8.5, 90.0),
    },
    SeedExperience {
        title: "Tea Ceremony Experience",
        description: "A guided tea ceremony in a century-old tea house.",
        location: "Traditional Tea House, Tokyo",
        category: "culture",
        price: 60.0,
        duration_hours: 1.5,
        days_ahead: 3,
        max_participants: 6,
        status: ExperienceStatus::Approved,
        image: "https://images.unsplash.com/photo-1576091160399-112ba8d25d1d",
        sustainability: (5.0, true, false, 0.5, 45.0),
    },
    SeedExperience {
        title: "Bamboo Forest Walk",
        description: "Early morning walk through Arashiyama before the crowds.",
        location: "Arashiyama",
        category: "nature",
        price: 25.0,
        duration_hours: 2.0,
        days_ahead: 5,
        max_participants: 15,
        status: ExperienceStatus::Approved,
        image: "https://images.unsplash.com/photo-1528360983277-13d401cdc186",
        sustainability: (4.8, false, true, 0.2, 20.0),
    },
    SeedExperience {
        title: "Sushi Making Class",
        description: "Learn to make sushi with a chef near the old fish market.",
        location: "Tsukiji Market Area",
        category: "food",
        price: 90.0,
        duration_hours: 2.5,
        days_ahead: 14,
        max_participants: 10,
        status: ExperienceStatus::Pending,
        image: "https://images.unsplash.com/photo-1579871494447-9811cf80d66c",
        sustainability: (3.5, true, false, 3.0, 70.0),
    },
];

const PRODUCTS: [(&str, &str, &str, f64, u32); 4] = [
    (
        "Handcrafted Ceramic Tea Set",
        "Tea set thrown and glazed using traditional techniques.",
        "Ceramics",
        120.0,
        5,
    ),
    (
        "Traditional Kimono",
        "Handmade kimono with classic patterns.",
        "Clothing",
        300.0,
        3,
    ),
    (
        "Bamboo Tea Whisk",
        "Hand-carved whisk for matcha preparation.",
        "Tea Ceremony",
        45.0,
        10,
    ),
    (
        "Handwoven Bamboo Basket",
        "Basket suited to flower arrangement.",
        "Home Decor",
        85.0,
        4,
    ),
];

fn demo_profile(full_name: &str, email: &str, role: Role, location: &str) -> NewProfile {
    NewProfile {
        full_name: full_name.to_string(),
        email: email.to_string(),
        role,
        phone: None,
        location: Some(location.to_string()),
        is_local: role == Role::Host,
    }
}

/// Populate an empty store with demo accounts, listings and bookings so a
/// fresh install has something to browse. Returns `false` when profiles
/// already exist and nothing was written.
pub fn seed_demo_data(conn: &Connection, today: NaiveDate) -> Result<bool> {
    if count_profiles(conn, None)? > 0 {
        return Ok(false);
    }

    let admin = create_profile(
        conn,
        &demo_profile("Admin", "admin@thanilocal.test", Role::Admin, "Tokyo"),
    )?;
    let host = create_profile(
        conn,
        &demo_profile("Tanaka Yuki", "host@thanilocal.test", Role::Host, "Kyoto"),
    )?;
    let tourist = create_profile(
        conn,
        &demo_profile("Alex Traveller", "tourist@thanilocal.test", Role::Tourist, "Lisbon"),
    )?;

    let mut approved = Vec::new();
    for seed in &EXPERIENCES {
        let (rating, is_cultural, is_certified_sustainable, carbon_estimate, local_spend) =
            seed.sustainability;
        let date = today
            .checked_add_days(Days::new(seed.days_ahead))
            .unwrap_or(today);
        let experience = create_experience(
            conn,
            host.id,
            &NewExperience {
                title: seed.title.to_string(),
                description: seed.description.to_string(),
                location: seed.location.to_string(),
                category: seed.category.to_string(),
                price: seed.price,
                duration_hours: seed.duration_hours,
                date,
                max_participants: seed.max_participants,
                sustainability: Sustainability {
                    rating,
                    is_cultural,
                    is_certified_sustainable,
                    carbon_estimate,
                    local_spend,
                },
            },
        )?;
        set_experience_images(conn, experience.id, &[seed.image.to_string()])?;
        if seed.status != ExperienceStatus::Pending {
            set_experience_status(conn, experience.id, seed.status)?;
            approved.push(experience.id);
        }
    }

    for (title, description, category, price, stock) in PRODUCTS {
        create_product(
            conn,
            &NewProduct {
                title: title.to_string(),
                description: description.to_string(),
                category: category.to_string(),
                price,
                stock,
                artisan_id: host.id,
                artisan_name: host.full_name.clone(),
                image_url: None,
            },
        )?;
    }

    for (idx, experience_id) in approved.iter().enumerate() {
        let participants = u32::try_from(idx % 3 + 1).unwrap_or(1);
        let booking = create_booking(conn, tourist.id, *experience_id, participants, today)?;
        if idx % 2 == 0 {
            set_booking_status(conn, booking.id, BookingStatus::Confirmed)?;
        }
    }

    info!(admin_id = admin.id, host_id = host.id, "demo data seeded");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_bookings, count_experiences, fetch_products, open_in_memory};

    #[test]
    fn seeds_once_into_an_empty_store() {
        let conn = open_in_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert!(seed_demo_data(&conn, today).unwrap());
        assert!(!seed_demo_data(&conn, today).unwrap());

        assert_eq!(count_profiles(&conn, None).unwrap(), 3);
        assert_eq!(count_experiences(&conn, Some(ExperienceStatus::Pending)).unwrap(), 1);
        assert_eq!(fetch_products(&conn).unwrap().len(), 4);
        assert_eq!(count_bookings(&conn, None).unwrap(), 4);
        assert_eq!(count_bookings(&conn, Some(BookingStatus::Confirmed)).unwrap(), 2);
    }
}
