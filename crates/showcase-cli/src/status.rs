use std::path::Path;

use anyhow::Result;
use showcase_db::migrations::{ADMIN_TABLE, ASSOCIATION_TABLE, POSITION_TABLE};
use showcase_db::{SHOWCASE_TYPE, STATE_ACTIVE, ShowcaseStore};

const TABLES: &[&str] = &[ASSOCIATION_TABLE, POSITION_TABLE, ADMIN_TABLE];

/// Print a boxed summary of the showcase tables in the store.
pub fn print_status(db_path: &Path, store: &ShowcaseStore) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let db_display = match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => db_path.to_string_lossy().replace(&home, "~"),
        _ => db_path.to_string_lossy().to_string(),
    };

    let mut rows: Vec<(String, String)> = vec![("Database".into(), db_display)];

    for table in TABLES {
        let state = if store.table_exists(table)? {
            store.column_names(table)?.join(", ")
        } else {
            "missing".to_string()
        };
        rows.push(((*table).to_string(), state));
    }

    let applied = store.applied_migrations()?;
    let migrations = if applied.is_empty() {
        "none".to_string()
    } else {
        applied
            .iter()
            .map(|m| m.version.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    rows.push(("Migrations".into(), migrations));

    if store.table_exists("package")? {
        let showcases = store.list_packages_by_type(SHOWCASE_TYPE, STATE_ACTIVE)?.len();
        rows.push(("Showcases".into(), format!("{showcases} active")));
    }
    if store.table_exists(POSITION_TABLE)? {
        let positioned = store.position_entries()?.len();
        rows.push(("Positions".into(), positioned.to_string()));
    }
    if store.table_exists(ADMIN_TABLE)? {
        let admins = store.showcase_admin_ids()?.len();
        rows.push(("Admins".into(), admins.to_string()));
    }

    let left_w = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0) + 2;
    let right_w = rows
        .iter()
        .map(|(_, r)| r.chars().count())
        .max()
        .unwrap_or(0)
        .max(20)
        + 1;
    let width = left_w + right_w + 5; // "│ " + " " + "│" + "│"

    let title = format!("Showcase v{version}");
    let title_dashes = width.saturating_sub(title.len() + 7);
    println!("╭─── {title} {}╮", "─".repeat(title_dashes));
    for (label, value) in &rows {
        println!("│ {label:<left_w$}│ {value:<right_w$}│");
    }
    println!("╰{}╯", "─".repeat(width - 2));
    Ok(())
}
