//! Ratatui front-end. `app` owns the state machine, `screens` the per-screen
//! data with its live subscriptions, `forms` the modal inputs, and `terminal`
//! the crossterm event loop.

mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
