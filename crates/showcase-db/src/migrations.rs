//! Lazy, self-healing schema bootstrap.
//!
//! The showcase tables hang off host tables (`package`, `group`, `user`) that
//! may not exist yet when the process starts, and a live database may have been
//! created by any earlier release. `setup` therefore inspects the schema that is
//! actually there and only applies what is missing. Every applied step is noted
//! in the `showcase_migrations` ledger.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior, params};
use serde::Serialize;
use showcase_common::{Error, Result};
use tracing::{debug, info, warn};

pub const ASSOCIATION_TABLE: &str = "showcase_package_association";
pub const POSITION_TABLE: &str = "showcase_position";
pub const ADMIN_TABLE: &str = "showcase_admin";
pub const LEDGER_TABLE: &str = "showcase_migrations";

/// A schema step, tracked by version in the `showcase_migrations` table.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const CREATE_ASSOCIATION: Migration = Migration {
    version: 1,
    name: "create_showcase_package_association",
    sql: "CREATE TABLE IF NOT EXISTS showcase_package_association (
            package_id TEXT NOT NULL
                REFERENCES package(id) ON DELETE CASCADE ON UPDATE CASCADE,
            showcase_id TEXT NOT NULL
                REFERENCES package(id) ON DELETE CASCADE ON UPDATE CASCADE,
            organization_id TEXT
                REFERENCES \"group\"(id) ON DELETE CASCADE ON UPDATE CASCADE,
            PRIMARY KEY (package_id, showcase_id)
        );
        CREATE INDEX IF NOT EXISTS idx_showcase_association_showcase
            ON showcase_package_association(showcase_id);
        CREATE INDEX IF NOT EXISTS idx_showcase_association_organization
            ON showcase_package_association(organization_id);",
};

pub const ADD_ORGANIZATION_ID: Migration = Migration {
    version: 2,
    name: "add_association_organization_id",
    sql: "ALTER TABLE showcase_package_association
            ADD COLUMN organization_id TEXT
            REFERENCES \"group\"(id) ON DELETE CASCADE ON UPDATE CASCADE;
        CREATE INDEX IF NOT EXISTS idx_showcase_association_organization
            ON showcase_package_association(organization_id);",
};

pub const CREATE_POSITION: Migration = Migration {
    version: 3,
    name: "create_showcase_position",
    sql: "CREATE TABLE IF NOT EXISTS showcase_position (
            showcase_id TEXT PRIMARY KEY NOT NULL
                REFERENCES package(id) ON DELETE CASCADE ON UPDATE CASCADE,
            position INTEGER NOT NULL
        );",
};

pub const CREATE_ADMIN: Migration = Migration {
    version: 4,
    name: "create_showcase_admin",
    sql: "CREATE TABLE IF NOT EXISTS showcase_admin (
            user_id TEXT PRIMARY KEY NOT NULL
                REFERENCES \"user\"(id) ON DELETE CASCADE ON UPDATE CASCADE
        );",
};

pub const MIGRATIONS: &[Migration] = &[
    CREATE_ASSOCIATION,
    ADD_ORGANIZATION_ID,
    CREATE_POSITION,
    CREATE_ADMIN,
];

const LEDGER_SQL: &str = "CREATE TABLE IF NOT EXISTS showcase_migrations (
        version INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        applied_at TEXT NOT NULL
    );";

// Only owners whose organization row exists, so enforced foreign keys hold.
const BACKFILL_ORGANIZATION_SQL: &str = "UPDATE showcase_package_association
    SET organization_id = (
        SELECT p.owner_org FROM package p
        JOIN \"group\" g ON g.id = p.owner_org
        WHERE p.id = showcase_package_association.package_id
    )
    WHERE organization_id IS NULL";

/// What a bootstrap run found for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    /// The host table it depends on does not exist yet.
    #[default]
    Deferred,
    Created,
    Existing,
}

/// Outcome of a single `setup` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupReport {
    pub association: TableState,
    pub position: TableState,
    pub admin: TableState,
    pub migrated_v2: bool,
    pub positions_seeded: usize,
}

impl SetupReport {
    /// Whether this run altered the schema or data.
    pub fn changed(&self) -> bool {
        self.association == TableState::Created
            || self.position == TableState::Created
            || self.admin == TableState::Created
            || self.migrated_v2
            || self.positions_seeded > 0
    }
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
    pub applied_at: String,
}

/// Bring the showcase tables up to date with whatever host tables exist.
///
/// Runs in one IMMEDIATE transaction: concurrent callers queue on the write
/// lock and the later one sees the earlier one's schema.
pub fn setup(conn: &mut Connection) -> Result<SetupReport> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::Database(format!("failed to begin bootstrap transaction: {e}")))?;

    tx.execute_batch(LEDGER_SQL)
        .map_err(|e| Error::Database(format!("failed to create migration ledger: {e}")))?;

    let mut report = SetupReport::default();

    if table_exists(&tx, "package")? {
        if !table_exists(&tx, ASSOCIATION_TABLE)? {
            apply(&tx, &CREATE_ASSOCIATION)?;
            // The fresh table already carries organization_id.
            record(&tx, &ADD_ORGANIZATION_ID)?;
            report.association = TableState::Created;
            debug!("ShowcasePackageAssociation table created");
        } else {
            debug!("ShowcasePackageAssociation table already exists");
            report.association = TableState::Existing;
            record(&tx, &CREATE_ASSOCIATION)?;
            report.migrated_v2 = migrate_v2(&tx)?;
        }

        if !table_exists(&tx, POSITION_TABLE)? {
            apply(&tx, &CREATE_POSITION)?;
            report.position = TableState::Created;
            debug!("ShowcasePosition table created");
        } else {
            debug!("ShowcasePosition table already exists");
            report.position = TableState::Existing;
            record(&tx, &CREATE_POSITION)?;
        }

        if position_count(&tx)? == 0 {
            report.positions_seeded = seed_positions(&tx)?;
        }
    } else {
        debug!("ShowcasePackageAssociation and ShowcasePosition table creation deferred");
    }

    if table_exists(&tx, "user")? {
        if !table_exists(&tx, ADMIN_TABLE)? {
            apply(&tx, &CREATE_ADMIN)?;
            report.admin = TableState::Created;
            debug!("ShowcaseAdmin table created");
        } else {
            debug!("ShowcaseAdmin table already exists");
            report.admin = TableState::Existing;
            record(&tx, &CREATE_ADMIN)?;
        }
    } else {
        debug!("ShowcaseAdmin table creation deferred");
    }

    tx.commit()
        .map_err(|e| Error::Database(format!("failed to commit bootstrap: {e}")))?;

    if report.changed() {
        info!(?report, "showcase schema bootstrapped");
    }
    Ok(report)
}

/// Add `organization_id` to a v1 association table and backfill it from each
/// package's owner organization.
///
/// Returns `false` without touching anything when the column already exists.
/// Meant to run inside the caller's transaction.
pub fn migrate_v2(conn: &Connection) -> Result<bool> {
    let columns = column_names(conn, ASSOCIATION_TABLE)?;
    if columns.iter().any(|c| c == "organization_id") {
        return Ok(false);
    }

    debug!("migrating ShowcasePackageAssociation table to v2");
    apply(conn, &ADD_ORGANIZATION_ID)?;

    if table_exists(conn, "group")? {
        let updated = conn
            .execute(BACKFILL_ORGANIZATION_SQL, [])
            .map_err(|e| Error::Database(format!("failed to backfill organization_id: {e}")))?;
        debug!("backfilled organization_id on {updated} associations");
    } else {
        warn!("group table missing, organization_id left empty on existing associations");
    }

    info!("ShowcasePackageAssociation table migrated to v2");
    Ok(true)
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    conn.query_row(
        "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to inspect table {name}: {e}")))
}

/// Column names of `table` in declaration order, empty when it does not exist.
pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(|e| Error::Database(format!("failed to prepare column query: {e}")))?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Database(format!("failed to inspect columns of {table}: {e}")))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read column row: {e}")))
}

pub fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    if !table_exists(conn, LEDGER_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare("SELECT version, name, applied_at FROM showcase_migrations ORDER BY version")
        .map_err(|e| Error::Database(format!("failed to prepare ledger query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                name: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })
        .map_err(|e| Error::Database(format!("failed to query ledger: {e}")))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read ledger row: {e}")))
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute_batch(migration.sql).map_err(|e| {
        Error::Database(format!(
            "migration {} ({}) failed: {e}",
            migration.version, migration.name
        ))
    })?;
    record(conn, migration)
}

fn record(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO showcase_migrations (version, name, applied_at)
         VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, Utc::now().to_rfc3339()],
    )
    .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
    Ok(())
}

fn position_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM showcase_position", [], |row| {
        row.get(0)
    })
    .map_err(|e| Error::Database(format!("failed to count showcase positions: {e}")))
}

/// Give every active showcase a position, oldest first.
fn seed_positions(conn: &Connection) -> Result<usize> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM package WHERE type = 'showcase' AND state = 'active'
             ORDER BY metadata_created, id",
        )
        .map_err(|e| Error::Database(format!("failed to prepare showcase query: {e}")))?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Database(format!("failed to query showcases: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read showcase row: {e}")))?;

    if ids.is_empty() {
        return Ok(0);
    }

    debug!("inserting default showcase position values");
    let mut insert = conn
        .prepare("INSERT INTO showcase_position (showcase_id, position) VALUES (?1, ?2)")
        .map_err(|e| Error::Database(format!("failed to prepare position insert: {e}")))?;
    for (position, id) in ids.iter().enumerate() {
        insert
            .execute(params![id, position as i64])
            .map_err(|e| Error::Database(format!("failed to insert showcase position: {e}")))?;
    }

    info!("default showcase position values inserted ({})", ids.len());
    Ok(ids.len())
}
