//! Core library surface for ThaniLocal, a terminal marketplace for local
//! experiences and artisan goods backed by an embedded SQLite store.
//!
//! The binary only wires configuration, logging and the store together before
//! handing over to [`run_app`]; everything else lives in these modules so the
//! integration tests can drive the same operations.
pub mod account;
pub mod analytics;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod itinerary;
pub mod listing;
pub mod logging;
pub mod models;
pub mod realtime;
pub mod session;
pub mod storage;
pub mod ui;
pub mod validation;

/// Store bootstrap used by `main.rs`.
pub use db::{open_store, seed_demo_data};

pub use config::Config;
pub use error::{classify, BackendError, ErrorClass, ValidationError};
pub use logging::init_logging;
pub use realtime::ChangeFeed;
pub use session::Session;

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
