//! Named selections of package ids, persisted in SQLite.

use anyhow::{Context, Result, bail};
use log::debug;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::Path;

const CURRENT_SCHEMA_VERSION: i32 = 1;

pub struct ProfileStore {
    conn: Connection,
}

fn normalize_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Profile name must not be empty");
    }
    Ok(name)
}

impl ProfileStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening profile database {}", path.display()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("opening in-memory database")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn).context("initializing profile database schema")?;
        Ok(ProfileStore { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL,
                updated TEXT NOT NULL,
                PRIMARY KEY (version)
            )",
            (),
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if version < CURRENT_SCHEMA_VERSION {
            debug!("Migrating profile database from schema version {version}");
            conn.execute(
                "CREATE TABLE IF NOT EXISTS profiles (
                    name TEXT PRIMARY KEY,
                    selections TEXT
                )",
                (),
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, updated) VALUES (?1, datetime('now'))",
                [CURRENT_SCHEMA_VERSION],
            )?;
        }
        Ok(())
    }

    /// Create or replace the profile `name`.
    pub fn save<S: AsRef<str>>(&self, name: &str, package_ids: &[S]) -> Result<()> {
        let name = normalize_name(name)?;
        let ids: Vec<&str> = package_ids.iter().map(AsRef::as_ref).collect();
        let selections = serde_json::to_string(&ids).context("serializing profile selections")?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO profiles (name, selections) VALUES (?1, ?2)",
                (name, selections),
            )
            .with_context(|| format!("saving profile '{name}'"))?;
        debug!("Saved profile '{}' with {} packages", name, ids.len());
        Ok(())
    }

    /// Ids of `name` in saved order; empty for an unknown profile.
    pub fn load(&self, name: &str) -> Result<Vec<String>> {
        let name = normalize_name(name)?;
        let selections: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT selections FROM profiles WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("loading profile '{name}'"))?;
        match selections.flatten() {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("parsing selections of profile '{name}'")),
            None => Ok(Vec::new()),
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let name = normalize_name(name)?;
        let found = self
            .conn
            .query_row("SELECT 1 FROM profiles WHERE name = ?1", [name], |row| {
                row.get::<_, i32>(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM profiles ORDER BY name")?;
        let names = stmt.query_map([], |row| row.get(0))?;
        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    /// True if a profile was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let name = normalize_name(name)?;
        let removed = self
            .conn
            .execute("DELETE FROM profiles WHERE name = ?1", [name])
            .with_context(|| format!("deleting profile '{name}'"))?;
        Ok(removed > 0)
    }
}
