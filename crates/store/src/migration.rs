//! Additive schema migrations, applied idempotently at open (spec §4.4).
//!
//! Each migration is a plain SQL statement set guarded by `user_version`.
//! New columns are always nullable/defaulted so existing rows survive.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("sqlite error applying migration to v{target}: {source}")]
    Sqlite {
        target: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("no migration step starts at schema version {0}; chain is not contiguous")]
    NonContiguous(u32),
}

/// One migration step: `source_version` must match the database's current
/// `user_version` for `statements` to run, after which the version becomes
/// `target_version`.
struct Migration {
    source_version: u32,
    target_version: u32,
    statements: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        source_version: 0,
        target_version: 1,
        statements: r#"
            CREATE TABLE discs (
                fingerprint TEXT PRIMARY KEY,
                title TEXT,
                year INTEGER,
                external_id TEXT,
                medium TEXT NOT NULL,
                scan_snapshot TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                scanned_at INTEGER
            );
            CREATE TABLE tracks (
                id TEXT PRIMARY KEY,
                disc_fingerprint TEXT NOT NULL REFERENCES discs(fingerprint),
                track_number INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                resolution TEXT,
                chapters INTEGER NOT NULL DEFAULT 0,
                audio_streams TEXT NOT NULL DEFAULT '[]',
                subtitle_streams TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'discovered',
                segment_map TEXT NOT NULL DEFAULT '[]',
                ripped_path TEXT,
                transcoded_path TEXT,
                inserted_path TEXT
            );
            CREATE INDEX idx_tracks_disc ON tracks(disc_fingerprint);
        "#,
    },
    Migration {
        source_version: 1,
        target_version: 2,
        // Reprocessing flags, dropped from the distilled spec's initial
        // schema sketch but named explicitly in §4.4 "Migrations".
        statements: r#"
            ALTER TABLE discs ADD COLUMN needs_reprocessing INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE discs ADD COLUMN reprocessing_type TEXT;
            ALTER TABLE discs ADD COLUMN reprocessing_notes TEXT;
        "#,
    },
    Migration {
        source_version: 2,
        target_version: 3,
        // Classification metadata and pipeline-stage bookkeeping columns.
        statements: r#"
            ALTER TABLE tracks ADD COLUMN classification TEXT;
            ALTER TABLE tracks ADD COLUMN classification_confidence TEXT;
            ALTER TABLE tracks ADD COLUMN classification_score REAL;
            ALTER TABLE tracks ADD COLUMN is_alternate_main INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE tracks ADD COLUMN preset_name TEXT;
            ALTER TABLE tracks ADD COLUMN output_filename TEXT;
            ALTER TABLE tracks ADD COLUMN makemkv_name TEXT;
        "#,
    },
    Migration {
        source_version: 3,
        target_version: 4,
        // MakeMKV's own main-feature hint, consumed by the classifier's
        // tier-1 rule ahead of weighted scoring.
        statements: r#"
            ALTER TABLE tracks ADD COLUMN is_main_feature_playlist INTEGER NOT NULL DEFAULT 0;
        "#,
    },
];

pub const CURRENT_VERSION: u32 = 4;

/// Apply every migration needed to bring `conn` up to [`CURRENT_VERSION`].
/// Safe to call on every open: a database already at the current version
/// runs zero statements.
pub fn migrate(conn: &Connection) -> Result<(), MigrationError> {
    let mut version: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| MigrationError::Sqlite {
            target: CURRENT_VERSION,
            source: e,
        })?;

    while version < CURRENT_VERSION {
        let step = MIGRATIONS
            .iter()
            .find(|m| m.source_version == version)
            .ok_or(MigrationError::NonContiguous(version))?;

        conn.execute_batch(step.statements)
            .map_err(|e| MigrationError::Sqlite {
                target: step.target_version,
                source: e,
            })?;
        conn.pragma_update(None, "user_version", step.target_version)
            .map_err(|e| MigrationError::Sqlite {
                target: step.target_version,
                source: e,
            })?;

        version = step.target_version;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_fresh_database_to_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let version: u32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn migrating_twice_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: u32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn new_columns_exist_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO discs (fingerprint, medium, created_at) VALUES ('fp', 'dvd', 0)",
            [],
        )
        .unwrap();
        let needs: i64 = conn
            .query_row(
                "SELECT needs_reprocessing FROM discs WHERE fingerprint = 'fp'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(needs, 0);
    }
}
