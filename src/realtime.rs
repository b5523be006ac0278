//! Row-level change notifications. Triggers in the store append every insert,
//! update and delete to `change_log`; a [`ChangeFeed`] polls that journal and a
//! [`Subscription`] turns raw changes for one table into typed events that
//! [`reconcile`] folds into an in-memory collection.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::{debug, trace, warn};

use crate::models::ParseEnumError;

/// Hours of journal history kept for feeds that fall behind.
pub const JOURNAL_RETENTION_HOURS: u32 = 24;

/// Tables that publish change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Experiences,
    Products,
    Bookings,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Profiles,
        Table::Experiences,
        Table::Products,
        Table::Bookings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Experiences => "experiences",
            Table::Products => "products",
            Table::Bookings => "bookings",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "table",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl FromStr for ChangeKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(ParseEnumError {
                kind: "change kind",
                value: other.to_string(),
            }),
        }
    }
}

/// One journal entry: which row of which table changed and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowChange {
    pub seq: i64,
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: i64,
}

/// A change resolved against the current row contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Insert(T),
    Update(T),
    Delete { id: i64 },
}

/// Rows that can be refetched by id when a change notification arrives.
pub trait LiveRow: Sized {
    const TABLE: Table;

    fn row_id(&self) -> i64;

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Self>>;
}

/// Cursor over the change journal. Each feed only sees entries written after
/// it was created.
#[derive(Debug)]
pub struct ChangeFeed {
    last_seq: i64,
}

impl ChangeFeed {
    /// Start listening from the current end of the journal.
    pub fn subscribe(conn: &Connection) -> Result<Self> {
        let last_seq: i64 = conn
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM change_log", [], |row| {
                row.get(0)
            })
            .context("failed to read change journal head")?;
        debug!(last_seq, "change feed subscribed");
        Ok(Self { last_seq })
    }

    /// Return every journal entry written since the previous poll, oldest
    /// first, and advance the cursor past them.
    pub fn poll(&mut self, conn: &Connection) -> Result<Vec<RowChange>> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT seq, table_name, op, row_id FROM change_log
                 WHERE seq > ?1
                 ORDER BY seq",
            )
            .context("failed to prepare change journal query")?;

        let raw = stmt
            .query_map([self.last_seq], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .context("failed to read change journal")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to collect change journal")?;

        let mut changes = Vec::with_capacity(raw.len());
        for (seq, table, op, row_id) in raw {
            self.last_seq = seq;
            match (table.parse::<Table>(), op.parse::<ChangeKind>()) {
                (Ok(table), Ok(kind)) => changes.push(RowChange {
                    seq,
                    table,
                    kind,
                    row_id,
                }),
                _ => trace!(seq, %table, %op, "skipping unrecognised journal entry"),
            }
        }

        Ok(changes)
    }

    /// Drop journal entries older than `keep_hours`. Feeds in other processes
    /// that lag further behind than that lose those notifications.
    pub fn prune(conn: &Connection, keep_hours: u32) -> Result<usize> {
        let removed = conn
            .execute(
                "DELETE FROM change_log WHERE changed_at < datetime('now', ?1)",
                params![format!("-{keep_hours} hours")],
            )
            .context("failed to prune change journal")?;
        Ok(removed)
    }
}

type RowFilter<T> = Box<dyn Fn(&T) -> bool>;

/// Interest in one table, optionally narrowed by a row predicate applied after
/// the changed row is fetched.
pub struct Subscription<T: LiveRow> {
    filter: Option<RowFilter<T>>,
}

impl<T: LiveRow> Default for Subscription<T> {
    fn default() -> Self {
        Self { filter: None }
    }
}

impl<T: LiveRow> Subscription<T> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered<F>(filter: F) -> Self
    where
        F: Fn(&T) -> bool + 'static,
    {
        Self {
            filter: Some(Box::new(filter)),
        }
    }

    fn admits(&self, row: &T) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(row))
    }

    /// Turn a journal entry into a typed event. Entries for other tables and
    /// inserts outside the filter yield `None`. Updates that move a row out of
    /// the filter, and changes to rows that no longer exist, become deletes.
    pub fn resolve(&self, conn: &Connection, change: &RowChange) -> Result<Option<ChangeEvent<T>>> {
        if change.table != T::TABLE {
            return Ok(None);
        }

        if change.kind == ChangeKind::Delete {
            return Ok(Some(ChangeEvent::Delete { id: change.row_id }));
        }

        let row = match T::fetch(conn, change.row_id)? {
            Some(row) => row,
            None => return Ok(Some(ChangeEvent::Delete { id: change.row_id })),
        };

        let event = match (change.kind, self.admits(&row)) {
            (ChangeKind::Insert, true) => Some(ChangeEvent::Insert(row)),
            (ChangeKind::Insert, false) => None,
            (_, true) => Some(ChangeEvent::Update(row)),
            (_, false) => Some(ChangeEvent::Delete { id: change.row_id }),
        };
        Ok(event)
    }

    /// Resolve a batch of journal entries and fold them into `items`. Returns
    /// how many events were applied.
    ///
    /// A change that cannot be resolved does not hold back the rest of the
    /// batch: every other change is still applied, then the first failure is
    /// returned. The failed row catches up on its next journal entry.
    pub fn apply_all(
        &self,
        conn: &Connection,
        changes: &[RowChange],
        items: &mut Vec<T>,
    ) -> Result<usize> {
        let mut applied = 0;
        let mut failures = Vec::new();
        for change in changes {
            match self.resolve(conn, change) {
                Ok(Some(event)) => {
                    reconcile(items, event);
                    applied += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        seq = change.seq,
                        table = %change.table,
                        row_id = change.row_id,
                        error = %format!("{err:#}"),
                        "change could not be resolved"
                    );
                    failures.push(err);
                }
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(applied),
            Some(first) => Err(first.context(format!(
                "{failed} of {} changes could not be applied",
                changes.len()
            ))),
        }
    }
}

/// Fold one event into a collection keyed by row id. Inserts of an existing id
/// replace it, updates of a missing id append it, deletes of a missing id are
/// ignored, so redelivery of the same event is harmless.
pub fn reconcile<T: LiveRow>(items: &mut Vec<T>, event: ChangeEvent<T>) {
    match event {
        ChangeEvent::Insert(row) | ChangeEvent::Update(row) => {
            let id = row.row_id();
            match items.iter_mut().find(|item| item.row_id() == id) {
                Some(existing) => *existing = row,
                None => items.push(row),
            }
        }
        ChangeEvent::Delete { id } => items.retain(|item| item.row_id() != id),
    }
}
