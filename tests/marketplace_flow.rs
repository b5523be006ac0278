use std::fs;

use chrono::{Days, Utc};
use thanilocal::account::sign_up;
use thanilocal::analytics::{DashboardStats, TimeRange};
use thanilocal::db::{
    cancel_booking, create_booking, create_profile, fetch_experience, fetch_user_bookings,
    open_in_memory, set_booking_status, set_experience_status,
};
use thanilocal::export::export_dashboard;
use thanilocal::listing::publish_experience;
use thanilocal::models::{
    BookingStatus, Experience, ExperienceStatus, NewExperience, NewProfile, Role, Sustainability,
};
use thanilocal::realtime::Subscription;
use thanilocal::storage::LocalMediaStore;
use thanilocal::{classify, BackendError, ChangeFeed, ErrorClass, Session};

fn new_profile(name: &str, email: &str, role: Role) -> NewProfile {
    NewProfile {
        full_name: name.to_string(),
        email: email.to_string(),
        role,
        phone: None,
        location: Some("Chiang Mai".to_string()),
        is_local: role == Role::Host,
    }
}

#[test]
fn host_listing_is_moderated_booked_cancelled_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let media = LocalMediaStore::new(dir.path().join("media"));
    let conn = open_in_memory().unwrap();
    let today = Utc::now().date_naive();

    // Self sign-up cannot claim the admin role.
    let err = sign_up(&conn, &new_profile("Mallory", "mallory@example.com", Role::Admin), None)
        .unwrap_err();
    assert!(matches!(classify(&err), ErrorClass::Validation(v) if v.field == "role"));

    let admin = create_profile(&conn, &new_profile("Ploy", "ploy@example.com", Role::Admin)).unwrap();
    let host = sign_up(&conn, &new_profile("Somchai", "somchai@example.com", Role::Host), None).unwrap();
    let tourist = sign_up(&conn, &new_profile("Ines", "ines@example.com", Role::Tourist), None).unwrap();

    let err = sign_up(&conn, &new_profile("Ines again", "ines@example.com", Role::Tourist), None)
        .unwrap_err();
    assert!(matches!(classify(&err), ErrorClass::Backend(BackendError::Conflict(_))));

    let mut feed = ChangeFeed::subscribe(&conn).unwrap();
    let bookable = Subscription::<Experience>::filtered(|e| e.status == ExperienceStatus::Approved);
    let mut browse: Vec<Experience> = Vec::new();

    let photo = dir.path().join("lantern night.jpg");
    fs::write(&photo, b"jpeg bytes").unwrap();
    let draft = NewExperience {
        title: "Lantern Making".to_string(),
        description: "Fold and paint a khom loi with a local artisan.".to_string(),
        location: "Chiang Mai".to_string(),
        category: "workshop".to_string(),
        price: 25.0,
        duration_hours: 2.0,
        date: today.checked_add_days(Days::new(4)).unwrap(),
        max_participants: 3,
        sustainability: Sustainability {
            rating: 4.5,
            is_cultural: true,
            is_certified_sustainable: true,
            carbon_estimate: 1.5,
            local_spend: 20.0,
        },
    };

    let err = publish_experience(&conn, &media, &tourist, &draft, &[]).unwrap_err();
    assert!(matches!(
        classify(&err),
        ErrorClass::Backend(BackendError::PermissionDenied(_))
    ));

    let listing = publish_experience(&conn, &media, &host, &draft, &[photo]).unwrap();
    assert_eq!(listing.status, ExperienceStatus::Pending);
    assert_eq!(listing.images.len(), 1);
    assert!(listing.images[0].starts_with("file://"));

    // Pending listings are invisible to browsers and closed for booking.
    bookable.apply_all(&conn, &feed.poll(&conn).unwrap(), &mut browse).unwrap();
    assert!(browse.is_empty());
    let err = create_booking(&conn, tourist.id, listing.id, 1, today).unwrap_err();
    assert!(matches!(classify(&err), ErrorClass::Backend(BackendError::Conflict(_))));

    set_experience_status(&conn, listing.id, ExperienceStatus::Approved).unwrap();
    bookable.apply_all(&conn, &feed.poll(&conn).unwrap(), &mut browse).unwrap();
    assert_eq!(browse.len(), 1);
    assert_eq!(browse[0].id, listing.id);

    let mut session = Session::new(dir.path().join("session"));
    session.sign_in(&conn, &tourist.email).unwrap();

    let booking = create_booking(&conn, tourist.id, listing.id, 2, today).unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.total_price, 50.0);

    let err = create_booking(&conn, tourist.id, listing.id, 2, today).unwrap_err();
    assert_eq!(
        classify(&err),
        ErrorClass::Backend(BackendError::CapacityExceeded { remaining: 1 })
    );

    let mut host_session = Session::new(dir.path().join("host-session"));
    host_session.sign_in(&conn, &host.email).unwrap();
    assert!(host_session.authorize_cancel(&booking).is_err());
    assert!(session.authorize_cancel(&booking).is_ok());

    let cancelled = cancel_booking(&conn, booking.id).unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    let reopened = fetch_experience(&conn, listing.id).unwrap().unwrap();
    assert_eq!(reopened.current_participants, 0);
    let err = cancel_booking(&conn, booking.id).unwrap_err();
    assert!(matches!(classify(&err), ErrorClass::Backend(BackendError::Conflict(_))));

    let rebooked = create_booking(&conn, tourist.id, listing.id, 3, today).unwrap();
    set_booking_status(&conn, rebooked.id, BookingStatus::Confirmed).unwrap();
    let mine = fetch_user_bookings(&conn, tourist.id).unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|b| b.host_name == "Somchai"));

    let stats = DashboardStats::load(&conn, TimeRange::Last7Days, today).unwrap();
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.total_bookings, 2);
    assert_eq!(stats.total_revenue, 75.0);
    assert_eq!(stats.bookings_by_status.confirmed, 1);
    assert_eq!(stats.bookings_by_status.cancelled, 1);
    assert_eq!(stats.user_growth.len(), 7);
    assert_eq!(stats.user_growth.iter().map(|d| d.count).sum::<u64>(), 3);
    assert_eq!(stats.sustainability.cultural_count, 1);

    let path = export_dashboard(&stats, &dir.path().join("exports")).unwrap();
    assert_eq!(path.file_name().unwrap(), "dashboard_stats_7days.csv");
    let csv = fs::read_to_string(&path).unwrap();
    assert!(csv.contains("date,count"));
    assert!(csv.contains(&format!("{today},3")));
    assert_ne!(admin.id, host.id);
}
