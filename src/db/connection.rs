use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::debug;

use crate::realtime::Table;

/// Open (creating if needed) the store at `path`, run lazy migrations and
/// return a live connection.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }

    let conn = Connection::open(path).context("failed to open SQLite database")?;
    ensure_schema(&conn)?;
    debug!(path = %path.display(), "store opened");
    Ok(conn)
}

/// Private in-memory store with the full schema. Used by tests and demos.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Create tables and change-journal triggers if they are missing. Foreign keys
/// are switched on so cascades behave the same in tests and production.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign keys")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            role TEXT NOT NULL DEFAULT 'tourist',
            phone TEXT,
            location TEXT,
            bio TEXT,
            avatar_url TEXT,
            is_local INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create profiles table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS experiences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL,
            category TEXT NOT NULL,
            price REAL NOT NULL CHECK (price >= 0),
            duration_hours REAL NOT NULL CHECK (duration_hours > 0),
            date TEXT NOT NULL,
            max_participants INTEGER NOT NULL CHECK (max_participants > 0),
            current_participants INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            creator_id INTEGER NOT NULL REFERENCES profiles(id),
            images TEXT NOT NULL DEFAULT '[]',
            sustainability_rating REAL NOT NULL DEFAULT 0,
            is_cultural INTEGER NOT NULL DEFAULT 0,
            is_certified_sustainable INTEGER NOT NULL DEFAULT 0,
            carbon_estimate REAL NOT NULL DEFAULT 0,
            local_spend REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK (current_participants <= max_participants)
        )",
        [],
    )
    .context("failed to create experiences table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            price REAL NOT NULL CHECK (price >= 0),
            stock INTEGER NOT NULL DEFAULT 0,
            artisan_id INTEGER NOT NULL REFERENCES profiles(id),
            artisan_name TEXT NOT NULL,
            rating REAL NOT NULL DEFAULT 0,
            image_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create products table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            experience_id INTEGER NOT NULL REFERENCES experiences(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES profiles(id),
            participants INTEGER NOT NULL CHECK (participants > 0),
            booking_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            total_price REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create bookings table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS change_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            op TEXT NOT NULL,
            row_id INTEGER NOT NULL,
            changed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("failed to create change_log table")?;

    for table in Table::ALL {
        conn.execute_batch(&change_triggers(table.as_str()))
            .with_context(|| format!("failed to create change triggers for {table}"))?;
    }

    Ok(())
}

/// One trigger per write kind so every committed row change lands in the
/// journal that `realtime::ChangeFeed` polls.
fn change_triggers(table: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS {table}_log_insert AFTER INSERT ON {table}
         BEGIN
             INSERT INTO change_log (table_name, op, row_id) VALUES ('{table}', 'INSERT', NEW.id);
         END;
         CREATE TRIGGER IF NOT EXISTS {table}_log_update AFTER UPDATE ON {table}
         BEGIN
             INSERT INTO change_log (table_name, op, row_id) VALUES ('{table}', 'UPDATE', NEW.id);
         END;
         CREATE TRIGGER IF NOT EXISTS {table}_log_delete AFTER DELETE ON {table}
         BEGIN
             INSERT INTO change_log (table_name, op, row_id) VALUES ('{table}', 'DELETE', OLD.id);
         END;"
    )
}
