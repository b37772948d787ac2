use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use showcase_common::{Error, Result};
use tracing::{debug, info};

use crate::catalog::{self, STATE_DELETED};
use crate::migrations::{self, SetupReport};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent storage for showcase associations, positions and admins,
/// sharing the portal's database.
pub struct ShowcaseStore {
    conn: Mutex<Connection>,
    opened: SetupReport,
}

/// A showcase ↔ package link, optionally scoped to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub package_id: String,
    pub showcase_id: String,
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowcasePosition {
    pub showcase_id: String,
    pub position: i64,
}

impl ShowcaseStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        info!("opening showcase store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::from_connection(conn)
    }

    /// In-memory store with the portal tables already installed.
    pub fn in_memory_with_portal() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        catalog::install_portal_schema(&conn)?;
        Self::from_connection(conn)
    }

    /// Wrap an open connection, set pragmas and run the bootstrap.
    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let opened = migrations::setup(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            opened,
        })
    }

    /// What the bootstrap did when this store was opened.
    pub fn opening_report(&self) -> &SetupReport {
        &self.opened
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("showcase store lock poisoned".into()))
    }

    /// Re-run the schema bootstrap, e.g. after the portal created its tables.
    pub fn setup(&self) -> Result<SetupReport> {
        let mut conn = self.connection()?;
        migrations::setup(&mut conn)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        migrations::table_exists(&conn, name)
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        migrations::column_names(&conn, table)
    }

    pub fn applied_migrations(&self) -> Result<Vec<migrations::AppliedMigration>> {
        let conn = self.connection()?;
        migrations::applied_migrations(&conn)
    }

    // -- associations --

    pub fn association_exists(&self, package_id: &str, showcase_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT count(*) > 0 FROM showcase_package_association
             WHERE package_id = ?1 AND showcase_id = ?2",
            params![package_id, showcase_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to check association: {e}")))
    }

    pub fn get_association(
        &self,
        package_id: &str,
        showcase_id: &str,
    ) -> Result<Option<Association>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT package_id, showcase_id, organization_id FROM showcase_package_association
             WHERE package_id = ?1 AND showcase_id = ?2",
            params![package_id, showcase_id],
            |row| {
                Ok(Association {
                    package_id: row.get(0)?,
                    showcase_id: row.get(1)?,
                    organization_id: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load association: {e}")))
    }

    pub fn create_association(&self, association: &Association) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO showcase_package_association (package_id, showcase_id, organization_id)
             VALUES (?1, ?2, ?3)",
            params![
                association.package_id,
                association.showcase_id,
                association.organization_id
            ],
        )
        .map_err(|e| Error::Database(format!("failed to create association: {e}")))?;
        debug!(
            "associated package {} with showcase {}",
            association.package_id, association.showcase_id
        );
        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn delete_association(&self, package_id: &str, showcase_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute(
                "DELETE FROM showcase_package_association
                 WHERE package_id = ?1 AND showcase_id = ?2",
                params![package_id, showcase_id],
            )
            .map_err(|e| Error::Database(format!("failed to delete association: {e}")))?;
        Ok(removed > 0)
    }

    /// Package ids associated with a showcase, in association order.
    pub fn package_ids_for_showcase(&self, showcase_id: &str) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT package_id FROM showcase_package_association
             WHERE showcase_id = ?1 ORDER BY rowid",
            showcase_id,
        )
    }

    pub fn showcase_ids_for_package(&self, package_id: &str) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT showcase_id FROM showcase_package_association
             WHERE package_id = ?1 ORDER BY rowid",
            package_id,
        )
    }

    /// Distinct showcase ids with at least one association in the organization.
    pub fn showcase_ids_for_organization(&self, organization_id: &str) -> Result<Vec<String>> {
        self.query_ids(
            "SELECT showcase_id FROM showcase_package_association
             WHERE organization_id = ?1
             GROUP BY showcase_id ORDER BY MIN(rowid)",
            organization_id,
        )
    }

    // -- admins --

    pub fn showcase_admin_ids(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT user_id FROM showcase_admin ORDER BY rowid")
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query showcase admins: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read showcase admin row: {e}")))
    }

    pub fn is_user_showcase_admin(&self, user_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT count(*) > 0 FROM showcase_admin WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to check showcase admin: {e}")))
    }

    pub fn add_showcase_admin(&self, user_id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO showcase_admin (user_id) VALUES (?1)",
            params![user_id],
        )
        .map_err(|e| Error::Database(format!("failed to add showcase admin: {e}")))?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn remove_showcase_admin(&self, user_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute(
                "DELETE FROM showcase_admin WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(|e| Error::Database(format!("failed to remove showcase admin: {e}")))?;
        Ok(removed > 0)
    }

    // -- positions --

    /// Showcase ids in display order.
    pub fn showcase_positions(&self) -> Result<Vec<String>> {
        Ok(self
            .position_entries()?
            .into_iter()
            .map(|p| p.showcase_id)
            .collect())
    }

    pub fn position_entries(&self) -> Result<Vec<ShowcasePosition>> {
        let conn = self.connection()?;
        read_positions(&conn)
    }

    /// Put a showcase after every positioned one. Keeps an existing position.
    pub fn append_showcase_position(&self, showcase_id: &str) -> Result<i64> {
        let conn = self.connection()?;
        append_position(&conn, showcase_id)
    }

    pub fn remove_showcase_position(&self, showcase_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute(
                "DELETE FROM showcase_position WHERE showcase_id = ?1",
                params![showcase_id],
            )
            .map_err(|e| Error::Database(format!("failed to remove showcase position: {e}")))?;
        Ok(removed > 0)
    }

    /// Drop a showcase's associations and position and mark it deleted, all
    /// in one transaction. Returns how many associations were removed.
    pub fn delete_showcase(&self, showcase_id: &str) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let removed = tx
            .execute(
                "DELETE FROM showcase_package_association WHERE showcase_id = ?1",
                params![showcase_id],
            )
            .map_err(|e| Error::Database(format!("failed to delete showcase associations: {e}")))?;
        tx.execute(
            "DELETE FROM showcase_position WHERE showcase_id = ?1",
            params![showcase_id],
        )
        .map_err(|e| Error::Database(format!("failed to remove showcase position: {e}")))?;
        let marked = tx
            .execute(
                "UPDATE package SET state = ?2, metadata_modified = ?3 WHERE id = ?1",
                params![showcase_id, STATE_DELETED, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Database(format!("failed to mark showcase deleted: {e}")))?;
        if marked == 0 {
            return Err(Error::NotFound(format!("Showcase {showcase_id}")));
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit showcase delete: {e}")))?;
        Ok(removed)
    }

    /// Rewrite positions so `ordered` comes first, followed by every other
    /// positioned showcase in its previous relative order. Returns the new order.
    pub fn reorder_showcases(&self, ordered: &[String]) -> Result<Vec<String>> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let previous = read_positions(&tx)?;
        let mut order: Vec<String> = Vec::with_capacity(previous.len() + ordered.len());
        for id in ordered
            .iter()
            .chain(previous.iter().map(|p| &p.showcase_id))
        {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }

        tx.execute("DELETE FROM showcase_position", [])
            .map_err(|e| Error::Database(format!("failed to clear showcase positions: {e}")))?;
        {
            let mut insert = tx
                .prepare("INSERT INTO showcase_position (showcase_id, position) VALUES (?1, ?2)")
                .map_err(|e| Error::Database(format!("failed to prepare position insert: {e}")))?;
            for (position, id) in order.iter().enumerate() {
                insert
                    .execute(params![id, position as i64])
                    .map_err(|e| Error::Database(format!("failed to write showcase position: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit reorder: {e}")))?;
        info!("reordered {} showcases", order.len());
        Ok(order)
    }

    fn query_ids(&self, sql: &str, key: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query associations: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read association row: {e}")))
    }
}

pub(crate) fn append_position(conn: &Connection, showcase_id: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO showcase_position (showcase_id, position)
         SELECT ?1, COALESCE(MAX(position), -1) + 1 FROM showcase_position
         WHERE NOT EXISTS (SELECT 1 FROM showcase_position WHERE showcase_id = ?1)",
        params![showcase_id],
    )
    .map_err(|e| Error::Database(format!("failed to append showcase position: {e}")))?;
    conn.query_row(
        "SELECT position FROM showcase_position WHERE showcase_id = ?1",
        params![showcase_id],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to read showcase position: {e}")))
}

fn read_positions(conn: &Connection) -> Result<Vec<ShowcasePosition>> {
    let mut stmt = conn
        .prepare("SELECT showcase_id, position FROM showcase_position ORDER BY position, showcase_id")
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ShowcasePosition {
                showcase_id: row.get(0)?,
                position: row.get(1)?,
            })
        })
        .map_err(|e| Error::Database(format!("failed to query showcase positions: {e}")))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read showcase position row: {e}")))
}
