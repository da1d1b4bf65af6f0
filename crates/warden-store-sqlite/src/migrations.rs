// crates/warden-store-sqlite/src/migrations.rs
// ============================================================================
// Module: Migration Ladder Driver
// Description: Applies embedded schema_vNN.sql files in strict order.
// Purpose: Bring any database to the current schema exactly once per step.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Migrations are embedded `schema_vNN.sql` files applied in ascending order.
//! Each file runs inside one transaction together with its `schema_version`
//! bookkeeping row, so a partially applied step rolls back as a unit. All
//! DDL uses `IF NOT EXISTS`, which keeps every step idempotent. A fresh
//! database replays the whole ladder; there is no compacted genesis schema.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::params;

use crate::store::SqliteStoreError;
use crate::store::classify_db_error;

// ============================================================================
// SECTION: Ladder
// ============================================================================

/// The migration ladder, ascending. Index + 1 is the schema version.
const MIGRATIONS: [&str; 8] = [
    include_str!("../migrations/schema_v01.sql"),
    include_str!("../migrations/schema_v02.sql"),
    include_str!("../migrations/schema_v03.sql"),
    include_str!("../migrations/schema_v04.sql"),
    include_str!("../migrations/schema_v05.sql"),
    include_str!("../migrations/schema_v06.sql"),
    include_str!("../migrations/schema_v07.sql"),
    include_str!("../migrations/schema_v08.sql"),
];

/// Current schema version produced by a full ladder replay.
pub const CURRENT_SCHEMA_VERSION: i64 = 8;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_length_matches_current_version() {
        assert_eq!(i64::try_from(MIGRATIONS.len()), Ok(CURRENT_SCHEMA_VERSION));
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Applies every pending migration in ascending order.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Migration`] when a step fails or the recorded
/// ladder state is ahead of this binary.
pub fn apply_migrations(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY CHECK (version >= 1),
                applied_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|err| SqliteStoreError::Migration(err.to_string()))?;
    let applied = current_version(connection)?;
    if applied > CURRENT_SCHEMA_VERSION {
        return Err(SqliteStoreError::Migration(format!(
            "database schema version {applied} is ahead of supported {CURRENT_SCHEMA_VERSION}"
        )));
    }
    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let version = i64::try_from(index)
            .map_err(|_| SqliteStoreError::Migration("ladder index overflow".to_string()))?
            .saturating_add(1);
        if version <= applied {
            continue;
        }
        apply_step(connection, version, sql)?;
    }
    Ok(())
}

/// Returns the highest applied schema version (0 when none).
pub fn current_version(connection: &Connection) -> Result<i64, SqliteStoreError> {
    connection
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Migration(err.to_string()))
}

/// Applies one ladder step inside a single transaction.
fn apply_step(connection: &mut Connection, version: i64, sql: &str) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| classify_db_error(&err))?;
    tx.execute_batch(sql).map_err(|err| {
        SqliteStoreError::Migration(format!("schema_v{version:02} failed: {err}"))
    })?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    tx.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .map_err(|err| SqliteStoreError::Migration(format!("schema_v{version:02} bookkeeping: {err}")))?;
    tx.commit()
        .map_err(|err| SqliteStoreError::Migration(format!("schema_v{version:02} commit: {err}")))?;
    Ok(())
}
