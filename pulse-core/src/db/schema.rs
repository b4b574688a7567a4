//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: decisions and reviews
    r#"
    CREATE TABLE IF NOT EXISTS decisions (
        decision_id      TEXT PRIMARY KEY,
        conversation_id  TEXT NOT NULL,
        decided_at       DATETIME NOT NULL,
        action           TEXT NOT NULL,

        -- Denormalized for filtering and analytics
        category         TEXT,
        confidence       REAL,
        origin_prompt    TEXT,

        -- Full record
        record           JSON NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_decisions_conversation ON decisions(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_decisions_action ON decisions(action);
    CREATE INDEX IF NOT EXISTS idx_decisions_category ON decisions(category);
    CREATE INDEX IF NOT EXISTS idx_decisions_decided_at ON decisions(decided_at);

    CREATE TABLE IF NOT EXISTS reviews (
        review_id        TEXT PRIMARY KEY,
        decision_id      TEXT NOT NULL REFERENCES decisions(decision_id),
        disposition      TEXT NOT NULL,
        edited_text      TEXT,
        reviewer         TEXT,
        notes            TEXT,
        reviewed_at      DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_reviews_decision ON reviews(decision_id);
    "#,
    // Version 2: append-only enforcement
    r#"
    CREATE TRIGGER IF NOT EXISTS decisions_no_update
    BEFORE UPDATE ON decisions
    BEGIN
        SELECT RAISE(ABORT, 'decisions are immutable');
    END;

    CREATE TRIGGER IF NOT EXISTS decisions_no_delete
    BEFORE DELETE ON decisions
    BEGIN
        SELECT RAISE(ABORT, 'decisions are immutable');
    END;

    CREATE TRIGGER IF NOT EXISTS reviews_no_update
    BEFORE UPDATE ON reviews
    BEGIN
        SELECT RAISE(ABORT, 'reviews are append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS reviews_no_delete
    BEFORE DELETE ON reviews
    BEGIN
        SELECT RAISE(ABORT, 'reviews are append-only');
    END;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["decisions", "reviews"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_decisions_reject_update() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO decisions (decision_id, conversation_id, decided_at, action, record)
             VALUES ('d-1', 'c-1', '2025-01-01T00:00:00+00:00', 'skip_unsafe', '{}')",
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE decisions SET action = 'auto_send' WHERE decision_id = 'd-1'", [])
            .is_err());
        assert!(conn
            .execute("DELETE FROM decisions WHERE decision_id = 'd-1'", [])
            .is_err());
    }
}
