use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

/// Version written by this build. Documents carrying any other version are
/// rejected on open.
pub const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE items (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    parent      INTEGER NOT NULL DEFAULT 0,
    previous    INTEGER NOT NULL DEFAULT 0,
    text        TEXT NOT NULL,
    fields      TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX items_chain_idx
    ON items (parent, previous);

CREATE TABLE history (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id            INTEGER NOT NULL,
    item                INTEGER NOT NULL,
    kind                TEXT NOT NULL CHECK (kind IN ('insert', 'update', 'move', 'delete', 'other')),
    description         TEXT NOT NULL,
    forward_op          TEXT NOT NULL,
    forward_payload     TEXT NOT NULL,
    backward_op         TEXT NOT NULL,
    backward_payload    TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'done' CHECK (status IN ('done', 'undone')),
    created_at          TEXT NOT NULL
);

CREATE INDEX history_group_idx
    ON history (group_id);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(SCHEMA_VERSION, MIGRATION_V1_SQL)];

const REQUIRED_TABLES: &[&str] = &["schema_migrations", "items", "history"];

/// Create every relation on an empty connection. Idempotent.
pub fn install(conn: &mut Connection) -> rusqlite::Result<()> {
    ensure_migration_table(conn)?;
    apply_pending_migrations(conn)
}

/// Structural validation of a loaded document. The error message becomes the
/// `NotValid` reason.
pub fn validate(conn: &Connection) -> Result<()> {
    for table in REQUIRED_TABLES {
        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .context("failed to inspect sqlite_master")?;
        if exists == 0 {
            bail!("missing `{table}` relation");
        }
    }

    let version = current_schema_version(conn).context("failed to read schema version")?;
    if version != SCHEMA_VERSION {
        bail!("schema version {version} is not supported (expected {SCHEMA_VERSION})");
    }
    Ok(())
}

pub fn schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    current_schema_version(conn)
}

/// Names of all user tables, used by collaborators inspecting a store.
pub fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    let names = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn ensure_migration_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
}

fn current_schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
}

fn apply_pending_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )?;
        tx.commit()?;
        current_version = *version;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    #[test]
    fn install_creates_relations_and_records_version() {
        let mut conn = Connection::open_in_memory().expect("memory db should open");
        install(&mut conn).expect("schema should install");

        validate(&conn).expect("fresh schema should validate");
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(table_names(&conn).unwrap(), vec!["history", "items", "schema_migrations"]);
    }

    #[test]
    fn installing_twice_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        install(&mut conn).unwrap();
        install(&mut conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn validate_rejects_foreign_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY);").unwrap();

        let err = validate(&conn).unwrap_err();
        assert!(err.to_string().contains("schema_migrations"));
    }

    #[test]
    fn validate_rejects_future_schema_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        install(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [SCHEMA_VERSION + 1],
        )
        .unwrap();

        let err = validate(&conn).unwrap_err();
        assert!(err.to_string().contains("not supported"), "unexpected error: {err}");
    }
}
