//! Database schema definitions.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Name of the single table managed by this crate.
pub const WORD_TABLE: &str = "word_table";

/// The complete SQL schema for the word database.
pub const SCHEMA_SQL: &str = r"
    -- One text column acting as natural primary key.
    CREATE TABLE IF NOT EXISTS word_table (
        word TEXT PRIMARY KEY NOT NULL CHECK(length(word) > 0)
    );
";

/// Outcome of opening a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    /// The schema was applied to an empty database.
    Created,
    /// The database already carried the current schema.
    Existing,
}

/// Apply the schema and connection pragmas.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<OpenKind> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    conn.execute_batch(SCHEMA_SQL)?;

    apply_connection_pragmas(conn)?;
    // Mark schema as applied so future opens report `Existing`.
    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    if version == 0 {
        Ok(OpenKind::Created)
    } else {
        Ok(OpenKind::Existing)
    }
}

/// Pragmas the writer connection needs.
///
/// # Errors
///
/// Returns an error if a pragma cannot be set.
fn apply_connection_pragmas(conn: &Connection) -> Result<()> {
    // WAL lets the reader connection run alongside the writer.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // NORMAL synchronous is safe with WAL: committed data survives OS crash
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}
