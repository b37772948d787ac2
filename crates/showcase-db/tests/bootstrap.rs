use std::sync::{Arc, Barrier};
use std::thread;

use rusqlite::Connection;
use showcase_db::catalog::install_portal_schema;
use showcase_db::migrations::{self, TableState};
use showcase_db::{PackageRecord, SHOWCASE_TYPE, ShowcaseStore};
use tempfile::TempDir;

/// A portal database as an early release left it: association table without
/// `organization_id`, no position or admin tables.
fn legacy_database(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("portal.db");
    let conn = Connection::open(&path).unwrap();
    install_portal_schema(&conn).unwrap();
    conn.execute_batch(
        "INSERT INTO \"group\" (id, name) VALUES ('org-1', 'org-one');
         INSERT INTO package (id, name, title, type, owner_org, metadata_created, metadata_modified)
            VALUES ('ds-1', 'rainfall', 'Rainfall', 'dataset', 'org-1',
                    '2023-01-01T00:00:00+00:00', '2023-01-01T00:00:00+00:00');
         INSERT INTO package (id, name, title, type, metadata_created, metadata_modified)
            VALUES ('sc-2', 'second', 'Second', 'showcase',
                    '2023-02-01T00:00:00+00:00', '2023-02-01T00:00:00+00:00');
         INSERT INTO package (id, name, title, type, metadata_created, metadata_modified)
            VALUES ('sc-1', 'first', 'First', 'showcase',
                    '2023-01-15T00:00:00+00:00', '2023-01-15T00:00:00+00:00');
         CREATE TABLE showcase_package_association (
            package_id TEXT NOT NULL REFERENCES package(id) ON DELETE CASCADE,
            showcase_id TEXT NOT NULL REFERENCES package(id) ON DELETE CASCADE,
            PRIMARY KEY (package_id, showcase_id)
         );
         INSERT INTO showcase_package_association VALUES ('ds-1', 'sc-1');",
    )
    .unwrap();
    path
}

#[test]
fn legacy_database_is_brought_up_to_date_on_open() {
    let dir = TempDir::new().unwrap();
    let path = legacy_database(&dir);

    let store = ShowcaseStore::open(&path).unwrap();

    assert_eq!(
        store.column_names("showcase_package_association").unwrap(),
        vec!["package_id", "showcase_id", "organization_id"]
    );
    let association = store.get_association("ds-1", "sc-1").unwrap().unwrap();
    assert_eq!(association.organization_id.as_deref(), Some("org-1"));
    assert_eq!(store.showcase_positions().unwrap(), vec!["sc-1", "sc-2"]);
    assert!(store.table_exists("showcase_admin").unwrap());

    let versions: Vec<u32> = store
        .applied_migrations()
        .unwrap()
        .iter()
        .map(|m| m.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
}

#[test]
fn reopening_does_not_reseed_or_remigrate() {
    let dir = TempDir::new().unwrap();
    let path = legacy_database(&dir);

    drop(ShowcaseStore::open(&path).unwrap());
    let store = ShowcaseStore::open(&path).unwrap();
    let report = store.setup().unwrap();

    assert!(!report.changed());
    assert_eq!(report.association, TableState::Existing);
    assert_eq!(store.position_entries().unwrap().len(), 2);
}

#[test]
fn reseeds_when_positions_were_emptied() {
    let dir = TempDir::new().unwrap();
    let path = legacy_database(&dir);
    let store = ShowcaseStore::open(&path).unwrap();

    store.remove_showcase_position("sc-1").unwrap();
    store.remove_showcase_position("sc-2").unwrap();
    let report = store.setup().unwrap();

    assert_eq!(report.positions_seeded, 2);
    assert_eq!(store.showcase_positions().unwrap(), vec!["sc-1", "sc-2"]);
}

#[test]
fn deleted_showcases_stay_out_of_the_order_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = legacy_database(&dir);

    {
        let store = ShowcaseStore::open(&path).unwrap();
        store.delete_showcase("sc-1").unwrap();
        store.delete_showcase("sc-2").unwrap();
        assert!(store.position_entries().unwrap().is_empty());
    }

    let store = ShowcaseStore::open(&path).unwrap();
    assert_eq!(store.opening_report().positions_seeded, 0);
    assert!(store.position_entries().unwrap().is_empty());
}

#[test]
fn showcase_created_later_is_not_seeded_twice() {
    let dir = TempDir::new().unwrap();
    let path = legacy_database(&dir);
    let store = ShowcaseStore::open(&path).unwrap();

    store
        .insert_package(&PackageRecord::new("sc-3", "third", SHOWCASE_TYPE))
        .unwrap();
    store.append_showcase_position("sc-3").unwrap();
    store.setup().unwrap();

    assert_eq!(
        store.showcase_positions().unwrap(),
        vec!["sc-1", "sc-2", "sc-3"]
    );
}

#[test]
fn concurrent_bootstraps_both_succeed() {
    let dir = TempDir::new().unwrap();
    let path = legacy_database(&dir);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = Connection::open(&path).unwrap();
                conn.busy_timeout(std::time::Duration::from_secs(10))
                    .unwrap();
                conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
                barrier.wait();
                migrations::setup(&mut conn).unwrap()
            })
        })
        .collect();

    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(reports.iter().filter(|r| r.migrated_v2).count(), 1);
    assert_eq!(
        reports.iter().map(|r| r.positions_seeded).sum::<usize>(),
        2
    );

    let store = ShowcaseStore::open(&path).unwrap();
    assert_eq!(store.position_entries().unwrap().len(), 2);
}
