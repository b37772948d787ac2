//! Access to the portal's own tables: packages, organizations and users.
//!
//! The portal owns this schema; `install_portal_schema` only exists so a
//! standalone database (and the test suite) has something to hang the showcase
//! tables off.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use showcase_common::{Error, Result};
use tracing::debug;

use crate::migrations::SetupReport;
use crate::store::{self, ShowcaseStore};

pub const DATASET_TYPE: &str = "dataset";
pub const SHOWCASE_TYPE: &str = "showcase";

pub const STATE_ACTIVE: &str = "active";
pub const STATE_DELETED: &str = "deleted";

const PORTAL_SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS \"user\" (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        state TEXT NOT NULL DEFAULT 'active',
        sysadmin INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS \"group\" (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        title TEXT,
        is_organization INTEGER NOT NULL DEFAULT 1,
        state TEXT NOT NULL DEFAULT 'active'
    );

    CREATE TABLE IF NOT EXISTS package (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL DEFAULT '',
        type TEXT NOT NULL DEFAULT 'dataset',
        state TEXT NOT NULL DEFAULT 'active',
        private INTEGER NOT NULL DEFAULT 0,
        owner_org TEXT,
        author TEXT,
        author_email TEXT,
        notes TEXT,
        url TEXT,
        creator_user_id TEXT,
        metadata_created TEXT NOT NULL,
        metadata_modified TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_package_type ON package(type, state);

    CREATE TABLE IF NOT EXISTS package_extra (
        package_id TEXT NOT NULL REFERENCES package(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (package_id, key)
    );

    CREATE TABLE IF NOT EXISTS package_tag (
        package_id TEXT NOT NULL REFERENCES package(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        PRIMARY KEY (package_id, name)
    );";

const PACKAGE_COLUMNS: &str = "id, name, title, type, state, private, owner_org, author, \
    author_email, notes, url, creator_user_id, metadata_created, metadata_modified";

/// Create the minimal portal tables if they are missing.
pub fn install_portal_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(PORTAL_SCHEMA_SQL)
        .map_err(|e| Error::Database(format!("failed to install portal schema: {e}")))?;
    debug!("portal schema installed");
    Ok(())
}

/// A package as the portal's `package_show` would return it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub state: String,
    pub private: bool,
    pub owner_org: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    pub creator_user_id: Option<String>,
    pub metadata_created: DateTime<Utc>,
    pub metadata_modified: DateTime<Utc>,
    pub extras: Vec<PackageExtra>,
    pub tags: Vec<PackageTag>,
    pub num_tags: usize,
}

impl PackageRecord {
    /// A blank active package of the given type, timestamped now.
    pub fn new(id: impl Into<String>, name: impl Into<String>, package_type: &str) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            title: name.clone(),
            name,
            package_type: package_type.to_string(),
            state: STATE_ACTIVE.to_string(),
            private: false,
            owner_org: None,
            author: None,
            author_email: None,
            notes: None,
            url: None,
            creator_user_id: None,
            metadata_created: now,
            metadata_modified: now,
            extras: Vec::new(),
            tags: Vec::new(),
            num_tags: 0,
        }
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Insert or replace an extra.
    pub fn set_extra(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.extras.iter_mut().find(|e| e.key == key) {
            Some(extra) => extra.value = value,
            None => self.extras.push(PackageExtra {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn remove_extra(&mut self, key: &str) -> Option<String> {
        let idx = self.extras.iter().position(|e| e.key == key)?;
        Some(self.extras.remove(idx).value)
    }

    pub fn is_active(&self) -> bool {
        self.state == STATE_ACTIVE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageExtra {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTag {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub state: String,
    pub sysadmin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub is_organization: bool,
    pub state: String,
}

impl ShowcaseStore {
    /// Install the portal tables, then bootstrap the showcase tables on top.
    pub fn install_portal_schema(&self) -> Result<SetupReport> {
        {
            let conn = self.connection()?;
            install_portal_schema(&conn)?;
        }
        self.setup()
    }

    pub fn insert_package(&self, package: &PackageRecord) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        insert_package_row(&tx, package)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit package insert: {e}")))?;
        Ok(())
    }

    /// Insert a showcase package and its display position in one transaction.
    /// Returns the position it was given.
    pub fn insert_showcase(&self, package: &PackageRecord) -> Result<i64> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        insert_package_row(&tx, package)?;
        let position = store::append_position(&tx, &package.id)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit showcase insert: {e}")))?;
        Ok(position)
    }

    /// Replace every stored field of an existing package, bumping
    /// `metadata_modified`.
    pub fn update_package(&self, package: &PackageRecord) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        let changed = tx
            .execute(
                "UPDATE package SET name = ?2, title = ?3, type = ?4, state = ?5, private = ?6,
                    owner_org = ?7, author = ?8, author_email = ?9, notes = ?10, url = ?11,
                    metadata_modified = ?12
                 WHERE id = ?1",
                params![
                    package.id,
                    package.name,
                    package.title,
                    package.package_type,
                    package.state,
                    package.private,
                    package.owner_org,
                    package.author,
                    package.author_email,
                    package.notes,
                    package.url,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to update package: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("package {}", package.id)));
        }

        tx.execute(
            "DELETE FROM package_extra WHERE package_id = ?1",
            params![package.id],
        )
        .map_err(|e| Error::Database(format!("failed to clear package extras: {e}")))?;
        tx.execute(
            "DELETE FROM package_tag WHERE package_id = ?1",
            params![package.id],
        )
        .map_err(|e| Error::Database(format!("failed to clear package tags: {e}")))?;
        write_extras_and_tags(&tx, package)?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit package update: {e}")))?;
        Ok(())
    }

    pub fn get_package(&self, id: &str) -> Result<Option<PackageRecord>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {PACKAGE_COLUMNS} FROM package WHERE id = ?1");
        let package = conn
            .query_row(&sql, params![id], package_from_row)
            .optional()
            .map_err(|e| Error::Database(format!("failed to load package: {e}")))?;
        package.map(|p| load_extras_and_tags(&conn, p)).transpose()
    }

    /// Look a package up by id, falling back to its name.
    pub fn find_package(&self, name_or_id: &str) -> Result<Option<PackageRecord>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS} FROM package WHERE id = ?1 OR name = ?1
             ORDER BY (id = ?1) DESC LIMIT 1"
        );
        let package = conn
            .query_row(&sql, params![name_or_id], package_from_row)
            .optional()
            .map_err(|e| Error::Database(format!("failed to find package: {e}")))?;
        package.map(|p| load_extras_and_tags(&conn, p)).transpose()
    }

    pub fn set_package_state(&self, id: &str, state: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE package SET state = ?2, metadata_modified = ?3 WHERE id = ?1",
            params![id, state, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("failed to set package state: {e}")))?;
        Ok(())
    }

    /// Hard-delete a package. Foreign keys take its showcase rows with it.
    pub fn purge_package(&self, id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute("DELETE FROM package WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(format!("failed to purge package: {e}")))?;
        Ok(removed > 0)
    }

    pub fn list_packages_by_type(
        &self,
        package_type: &str,
        state: &str,
    ) -> Result<Vec<PackageRecord>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS} FROM package WHERE type = ?1 AND state = ?2 ORDER BY name"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![package_type, state], package_from_row)
            .map_err(|e| Error::Database(format!("failed to query packages: {e}")))?;

        let mut packages = Vec::new();
        for row in rows {
            let package =
                row.map_err(|e| Error::Database(format!("failed to read package row: {e}")))?;
            packages.push(load_extras_and_tags(&conn, package)?);
        }
        Ok(packages)
    }

    pub fn package_name_taken(&self, name: &str, except_id: Option<&str>) -> Result<bool> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT count(*) > 0 FROM package WHERE name = ?1 AND (?2 IS NULL OR id != ?2)",
            params![name, except_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to check package name: {e}")))
    }

    pub fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO \"user\" (id, name, state, sysadmin) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.name, user.state, user.sysadmin],
        )
        .map_err(|e| Error::Database(format!("failed to insert user: {e}")))?;
        Ok(())
    }

    pub fn find_user(&self, name_or_id: &str) -> Result<Option<UserRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, name, state, sysadmin FROM \"user\" WHERE id = ?1 OR name = ?1
             ORDER BY (id = ?1) DESC LIMIT 1",
            params![name_or_id],
            user_from_row,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to find user: {e}")))
    }

    /// Active users among `ids`, ordered by name.
    pub fn active_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT id, name, state, sysadmin FROM \"user\" WHERE id = ?1 AND state = 'active'")
            .map_err(|e| Error::Database(format!("failed to prepare user query: {e}")))?;

        let mut users = Vec::new();
        for id in ids {
            let user = stmt
                .query_row(params![id], user_from_row)
                .optional()
                .map_err(|e| Error::Database(format!("failed to load user: {e}")))?;
            users.extend(user);
        }
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    pub fn insert_group(&self, group: &GroupRecord) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO \"group\" (id, name, title, is_organization, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group.id,
                group.name,
                group.title,
                group.is_organization,
                group.state
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert group: {e}")))?;
        Ok(())
    }

    pub fn find_group(&self, name_or_id: &str) -> Result<Option<GroupRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, name, title, is_organization, state FROM \"group\"
             WHERE id = ?1 OR name = ?1
             ORDER BY (id = ?1) DESC LIMIT 1",
            params![name_or_id],
            |row| {
                Ok(GroupRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    title: row.get(2)?,
                    is_organization: row.get(3)?,
                    state: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to find group: {e}")))
    }
}

fn package_from_row(row: &Row<'_>) -> rusqlite::Result<PackageRecord> {
    Ok(PackageRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        package_type: row.get(3)?,
        state: row.get(4)?,
        private: row.get(5)?,
        owner_org: row.get(6)?,
        author: row.get(7)?,
        author_email: row.get(8)?,
        notes: row.get(9)?,
        url: row.get(10)?,
        creator_user_id: row.get(11)?,
        metadata_created: parse_datetime(row.get::<_, String>(12)?),
        metadata_modified: parse_datetime(row.get::<_, String>(13)?),
        extras: Vec::new(),
        tags: Vec::new(),
        num_tags: 0,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        state: row.get(2)?,
        sysadmin: row.get(3)?,
    })
}

fn load_extras_and_tags(conn: &Connection, mut package: PackageRecord) -> Result<PackageRecord> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM package_extra WHERE package_id = ?1 ORDER BY key")
        .map_err(|e| Error::Database(format!("failed to prepare extras query: {e}")))?;
    package.extras = stmt
        .query_map(params![package.id], |row| {
            Ok(PackageExtra {
                key: row.get(0)?,
                value: row.get(1)?,
            })
        })
        .map_err(|e| Error::Database(format!("failed to query extras: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read extra row: {e}")))?;

    let mut stmt = conn
        .prepare("SELECT name FROM package_tag WHERE package_id = ?1 ORDER BY name")
        .map_err(|e| Error::Database(format!("failed to prepare tags query: {e}")))?;
    package.tags = stmt
        .query_map(params![package.id], |row| Ok(PackageTag { name: row.get(0)? }))
        .map_err(|e| Error::Database(format!("failed to query tags: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read tag row: {e}")))?;
    package.num_tags = package.tags.len();

    Ok(package)
}

fn insert_package_row(conn: &Connection, package: &PackageRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO package (id, name, title, type, state, private, owner_org, author,
            author_email, notes, url, creator_user_id, metadata_created, metadata_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            package.id,
            package.name,
            package.title,
            package.package_type,
            package.state,
            package.private,
            package.owner_org,
            package.author,
            package.author_email,
            package.notes,
            package.url,
            package.creator_user_id,
            package.metadata_created.to_rfc3339(),
            package.metadata_modified.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::Database(format!("failed to insert package: {e}")))?;
    write_extras_and_tags(conn, package)
}

fn write_extras_and_tags(conn: &Connection, package: &PackageRecord) -> Result<()> {
    for extra in &package.extras {
        conn.execute(
            "INSERT OR REPLACE INTO package_extra (package_id, key, value) VALUES (?1, ?2, ?3)",
            params![package.id, extra.key, extra.value],
        )
        .map_err(|e| Error::Database(format!("failed to write package extra: {e}")))?;
    }
    for tag in &package.tags {
        conn.execute(
            "INSERT OR IGNORE INTO package_tag (package_id, name) VALUES (?1, ?2)",
            params![package.id, tag.name],
        )
        .map_err(|e| Error::Database(format!("failed to write package tag: {e}")))?;
    }
    Ok(())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str, state: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            name: name.to_string(),
            state: state.to_string(),
            sysadmin: false,
        }
    }

    #[test]
    fn insert_and_find_package_by_id_or_name() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        let mut pkg = PackageRecord::new("pkg-1", "rainfall", DATASET_TYPE);
        pkg.set_extra("source", "met office");
        pkg.tags.push(PackageTag {
            name: "weather".into(),
        });
        store.insert_package(&pkg).unwrap();

        let by_id = store.find_package("pkg-1").unwrap().unwrap();
        let by_name = store.find_package("rainfall").unwrap().unwrap();
        assert_eq!(by_id.id, by_name.id);
        assert_eq!(by_id.extra("source"), Some("met office"));
        assert_eq!(by_id.num_tags, 1);
        assert!(store.find_package("nope").unwrap().is_none());
    }

    #[test]
    fn id_match_wins_over_name_match() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        store
            .insert_package(&PackageRecord::new("alpha", "beta", DATASET_TYPE))
            .unwrap();
        store
            .insert_package(&PackageRecord::new("beta", "gamma", DATASET_TYPE))
            .unwrap();

        assert_eq!(store.find_package("beta").unwrap().unwrap().id, "beta");
    }

    #[test]
    fn update_replaces_extras_and_tags() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        let mut pkg = PackageRecord::new("pkg-1", "rainfall", DATASET_TYPE);
        pkg.set_extra("a", "1");
        pkg.tags.push(PackageTag { name: "old".into() });
        store.insert_package(&pkg).unwrap();

        pkg.extras.clear();
        pkg.set_extra("b", "2");
        pkg.tags = vec![PackageTag { name: "new".into() }];
        pkg.title = "Rainfall".into();
        store.update_package(&pkg).unwrap();

        let loaded = store.get_package("pkg-1").unwrap().unwrap();
        assert_eq!(loaded.title, "Rainfall");
        assert_eq!(loaded.extra("a"), None);
        assert_eq!(loaded.extra("b"), Some("2"));
        assert_eq!(loaded.tags, vec![PackageTag { name: "new".into() }]);
    }

    #[test]
    fn update_of_missing_package_is_not_found() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        let err = store
            .update_package(&PackageRecord::new("ghost", "ghost", DATASET_TYPE))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn name_taken_ignores_the_package_itself() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        store
            .insert_package(&PackageRecord::new("pkg-1", "rainfall", DATASET_TYPE))
            .unwrap();

        assert!(store.package_name_taken("rainfall", None).unwrap());
        assert!(!store.package_name_taken("rainfall", Some("pkg-1")).unwrap());
        assert!(!store.package_name_taken("snowfall", None).unwrap());
    }

    #[test]
    fn list_by_type_filters_state() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        store
            .insert_package(&PackageRecord::new("s1", "zeta", SHOWCASE_TYPE))
            .unwrap();
        store
            .insert_package(&PackageRecord::new("s2", "alpha", SHOWCASE_TYPE))
            .unwrap();
        store
            .insert_package(&PackageRecord::new("d1", "data", DATASET_TYPE))
            .unwrap();
        store.set_package_state("s1", STATE_DELETED).unwrap();

        let active = store
            .list_packages_by_type(SHOWCASE_TYPE, STATE_ACTIVE)
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "alpha");
    }

    #[test]
    fn active_users_skip_deleted_and_unknown() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        store.insert_user(&user("u1", "zoe", STATE_ACTIVE)).unwrap();
        store.insert_user(&user("u2", "adam", STATE_ACTIVE)).unwrap();
        store.insert_user(&user("u3", "gone", STATE_DELETED)).unwrap();

        let ids = vec!["u1".into(), "u2".into(), "u3".into(), "u4".into()];
        let names: Vec<String> = store
            .active_users_by_ids(&ids)
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["adam", "zoe"]);
    }

    #[test]
    fn find_group_by_name() {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();
        store
            .insert_group(&GroupRecord {
                id: "org-1".into(),
                name: "met-office".into(),
                title: Some("Met Office".into()),
                is_organization: true,
                state: STATE_ACTIVE.into(),
            })
            .unwrap();

        let group = store.find_group("met-office").unwrap().unwrap();
        assert_eq!(group.id, "org-1");
        assert!(group.is_organization);
    }

    #[test]
    fn extras_helpers_replace_and_remove() {
        let mut pkg = PackageRecord::new("p", "p", SHOWCASE_TYPE);
        pkg.set_extra("image_url", "a.png");
        pkg.set_extra("image_url", "b.png");
        assert_eq!(pkg.extras.len(), 1);
        assert_eq!(pkg.remove_extra("image_url").as_deref(), Some("b.png"));
        assert!(pkg.remove_extra("image_url").is_none());
    }
}
