//! SQLite-based link storage

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{
    ChangeListener, ChangeNotifier, LinkFilter, LinkOrder, LinkStore, StoreChange, UpsertOutcome,
};
use crate::models::{Link, LinkId};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sha TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL UNIQUE,
                timestamp TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                dirty INTEGER NOT NULL DEFAULT 0,
                -- a tombstone stays dirty until the deletion is propagated
                CHECK (deleted = 0 OR dirty = 1)
            );
            "#,
        ),
    ])
}

const SELECT_COLUMNS: &str = "SELECT id, sha, url, timestamp, deleted, dirty FROM links";

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: Some(LinkId(row.get(0)?)),
        sha: row.get(1)?,
        url: row.get(2)?,
        timestamp: row.get(3)?,
        deleted: row.get(4)?,
        dirty: row.get(5)?,
    })
}

fn filter_clause(filter: LinkFilter) -> &'static str {
    match filter {
        LinkFilter::All => "",
        LinkFilter::Live => " WHERE deleted = 0",
        LinkFilter::Dirty => " WHERE dirty = 1",
    }
}

/// SQLite implementation of LinkStore
///
/// One connection behind a mutex; each mutation runs in its own
/// transaction.
pub struct SqliteLinkStore {
    conn: Mutex<Connection>,
    notifier: ChangeNotifier,
}

impl SqliteLinkStore {
    /// Open or create a database at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        info!("Opened link database at {:?}", db_path.as_ref());
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        // Readers don't block on a sync write
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
            notifier: ChangeNotifier::new(),
        })
    }
}

impl LinkStore for SqliteLinkStore {
    fn get(&self, id: LinkId) -> Result<Option<Link>> {
        let conn = self.conn.lock();
        let link = conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?"), [id.0], row_to_link)
            .optional()?;
        Ok(link)
    }

    fn get_by_sha(&self, sha: &str) -> Result<Option<Link>> {
        let conn = self.conn.lock();
        let link = conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE sha = ?"), [sha], row_to_link)
            .optional()?;
        Ok(link)
    }

    fn get_by_url(&self, url: &str) -> Result<Option<Link>> {
        let conn = self.conn.lock();
        let link = conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE url = ?"), [url], row_to_link)
            .optional()?;
        Ok(link)
    }

    fn list(&self, filter: LinkFilter, order: LinkOrder) -> Result<Vec<Link>> {
        let direction = match order {
            LinkOrder::IdAscending => "ASC",
            LinkOrder::IdDescending => "DESC",
        };
        let sql = format!(
            "{SELECT_COLUMNS}{} ORDER BY id {direction}",
            filter_clause(filter)
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let links = stmt
            .query_map([], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    fn count(&self, filter: LinkFilter) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM links{}", filter_clause(filter)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert(&self, link: Link) -> Result<UpsertOutcome> {
        link.validate()?;

        let outcome = {
            let conn = self.conn.lock();
            let changed = conn.execute(
                "INSERT OR IGNORE INTO links (sha, url, timestamp, deleted, dirty)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![link.sha, link.url, link.timestamp, link.deleted, link.dirty],
            )?;
            if changed == 0 {
                UpsertOutcome::Ignored
            } else {
                UpsertOutcome::Inserted(LinkId(conn.last_insert_rowid()))
            }
        };

        if let UpsertOutcome::Inserted(id) = outcome {
            self.notifier.notify(&StoreChange::Upserted { id, sha: link.sha });
        }
        Ok(outcome)
    }

    fn upsert(&self, link: Link) -> Result<UpsertOutcome> {
        link.validate()?;

        let outcome = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row("SELECT id FROM links WHERE sha = ?", [&link.sha], |row| {
                    row.get(0)
                })
                .optional()?;

            // OR IGNORE skips the row on a url collision with another record
            let outcome = match existing {
                Some(id) => {
                    let changed = tx.execute(
                        "UPDATE OR IGNORE links
                         SET url = ?1, timestamp = COALESCE(?2, timestamp), deleted = ?3, dirty = ?4
                         WHERE id = ?5",
                        params![link.url, link.timestamp, link.deleted, link.dirty, id],
                    )?;
                    if changed == 0 {
                        UpsertOutcome::Ignored
                    } else {
                        UpsertOutcome::Updated(LinkId(id))
                    }
                }
                None => {
                    let changed = tx.execute(
                        "INSERT OR IGNORE INTO links (sha, url, timestamp, deleted, dirty)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![link.sha, link.url, link.timestamp, link.deleted, link.dirty],
                    )?;
                    if changed == 0 {
                        UpsertOutcome::Ignored
                    } else {
                        UpsertOutcome::Inserted(LinkId(tx.last_insert_rowid()))
                    }
                }
            };

            tx.commit()?;
            outcome
        };

        match outcome {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => {
                self.notifier.notify(&StoreChange::Upserted { id, sha: link.sha });
            }
            UpsertOutcome::Ignored => {
                debug!("Ignored upsert of {} ({}): url or sha taken", link.sha, link.url);
            }
        }
        Ok(outcome)
    }

    fn clear_dirty(&self, uploaded: &Link, timestamp: Option<String>) -> Result<bool> {
        let id: Option<i64> = {
            let conn = self.conn.lock();
            conn.query_row(
                "UPDATE links SET dirty = 0, timestamp = COALESCE(?1, timestamp)
                 WHERE sha = ?2 AND url = ?3 AND deleted = 0 AND dirty = 1
                 RETURNING id",
                params![timestamp, uploaded.sha, uploaded.url],
                |row| row.get(0),
            )
            .optional()?
        };

        match id {
            Some(id) => {
                self.notifier.notify(&StoreChange::Upserted {
                    id: LinkId(id),
                    sha: uploaded.sha.clone(),
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_by_sha(&self, sha: &str) -> Result<bool> {
        let removed = {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM links WHERE sha = ?", [sha])? > 0
        };

        if removed {
            self.notifier.notify(&StoreChange::Deleted { sha: sha.to_string() });
        }
        Ok(removed)
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.notifier.subscribe(listener);
    }

    fn clear(&self) -> Result<()> {
        {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM links", [])?;
        }
        self.notifier.notify(&StoreChange::Cleared);
        Ok(())
    }
}
