//! Binary entry point: resolve configuration, start logging, open and seed the
//! store, restore the remembered session, then drive the Ratatui event loop
//! until the user exits.
use chrono::Utc;
use tracing::{error, info};

use thanilocal::realtime::JOURNAL_RETENTION_HOURS;
use thanilocal::{
    init_logging, open_store, run_app, seed_demo_data, App, ChangeFeed, Config, Session,
};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging(&config)?;
    info!(db = %config.db_path.display(), "starting thanilocal");

    let conn = open_store(&config.db_path)?;
    if seed_demo_data(&conn, Utc::now().date_naive())? {
        info!("empty store seeded with demo data");
    }
    let pruned = ChangeFeed::prune(&conn, JOURNAL_RETENTION_HOURS)?;
    info!(pruned, "change journal pruned");

    let session = Session::restore(&conn, &config.session_file)?;
    let mut app = App::new(conn, config, session)?;
    let result = run_app(&mut app);
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "terminal ui exited with an error");
    }
    result
}
