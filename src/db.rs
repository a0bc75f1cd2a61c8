use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::NotificationHistoryEntry;
use crate::utils;

/// Setting keys shared by the pipeline, bot and scheduler.
pub mod keys {
    pub const ARTISTS_LIST_URL: &str = "artists_list_url";
    pub const ARTISTS_LIST_CACHED: &str = "artists_list_cached";
    pub const LOCATION: &str = "location";
    pub const CHECK_TIME_LOCAL: &str = "check_time_local";
    pub const TIMEZONE: &str = "timezone";
    pub const NOTIFICATION_CHAT_ID: &str = "notification_chat_id";
    pub const AUTHORIZED_USER_ID: &str = "authorized_user_id";
    pub const ONBOARDING_STEP: &str = "onboarding_step";
    pub const LAST_RUN_AT: &str = "last_run_at";
    pub const LAST_RUN_STATUS: &str = "last_run_status";
    pub const LAST_RUN_SUMMARY_JSON: &str = "last_run_summary_json";
}

pub const DEFAULT_LOCATION: &str = "NL";
pub const DEFAULT_CHECK_TIME: &str = "09:00";
pub const DEFAULT_TIMEZONE: &str = "Europe/Amsterdam";

fn default_for(key: &str) -> &'static str {
    match key {
        keys::LOCATION => DEFAULT_LOCATION,
        keys::CHECK_TIME_LOCAL => DEFAULT_CHECK_TIME,
        keys::TIMEZONE => DEFAULT_TIMEZONE,
        _ => "",
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS settings(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS notification_history(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                artist TEXT NOT NULL,
                venue TEXT NOT NULL,
                date_normalized TEXT NOT NULL,
                event_title TEXT,
                event_url TEXT,
                source TEXT,
                first_seen_at TEXT NOT NULL,
                notified_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_notification_history_dedup
                ON notification_history(artist, venue, date_normalized);",
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    /// Stored value, else the built-in default for the key (empty when none).
    pub fn get_setting_or_default(&self, key: &str) -> rusqlite::Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default_for(key).to_string()))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn history_exists(
        &self,
        artist: &str,
        venue: &str,
        date_normalized: &str,
    ) -> rusqlite::Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM notification_history
                 WHERE artist = ?1 AND venue = ?2 AND date_normalized = ?3",
                params![artist, venue, date_normalized],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Returns false when the key was already present; the unique index decides.
    pub fn insert_history(
        &self,
        artist: &str,
        venue: &str,
        date_normalized: &str,
        event_title: &str,
        event_url: &str,
        source: &str,
    ) -> rusqlite::Result<bool> {
        let now = now_rfc3339();
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO notification_history
               (artist, venue, date_normalized, event_title, event_url, source, first_seen_at, notified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![artist, venue, date_normalized, event_title, event_url, source, now],
        )?;
        Ok(changed == 1)
    }

    pub fn clear_history(&self) -> rusqlite::Result<usize> {
        self.conn().execute("DELETE FROM notification_history", [])
    }

    pub fn history_count(&self) -> rusqlite::Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM notification_history", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    pub fn list_history(&self) -> rusqlite::Result<Vec<NotificationHistoryEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT artist, venue, date_normalized, event_title, event_url, source,
                    first_seen_at, notified_at
             FROM notification_history ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(NotificationHistoryEntry {
                artist: row.get(0)?,
                venue: row.get(1)?,
                date_normalized: row.get(2)?,
                event_title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                event_url: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                source: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                first_seen_at: row.get(6)?,
                notified_at: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_and_defaults() {
        let store = Store::open_in_memory().expect("store");
        assert_eq!(store.get_setting(keys::ARTISTS_LIST_URL).unwrap(), None);
        assert_eq!(
            store.get_setting_or_default(keys::CHECK_TIME_LOCAL).unwrap(),
            "09:00"
        );
        assert_eq!(
            store.get_setting_or_default(keys::TIMEZONE).unwrap(),
            "Europe/Amsterdam"
        );
        assert_eq!(
            store.get_setting_or_default(keys::ARTISTS_LIST_URL).unwrap(),
            ""
        );

        store.set_setting(keys::CHECK_TIME_LOCAL, "07:30").unwrap();
        store.set_setting(keys::CHECK_TIME_LOCAL, "08:15").unwrap();
        assert_eq!(
            store.get_setting_or_default(keys::CHECK_TIME_LOCAL).unwrap(),
            "08:15"
        );
    }

    #[test]
    fn duplicate_history_key_collapses_to_one_row() {
        let store = Store::open_in_memory().expect("store");
        let first = store
            .insert_history("Burna Boy", "Paradiso", "2026-03-01", "Burna Boy live", "u1", "paradiso")
            .unwrap();
        let second = store
            .insert_history("Burna Boy", "Paradiso", "2026-03-01", "Other title", "u2", "melkweg")
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(store.history_count().unwrap(), 1);

        let rows = store.list_history().unwrap();
        assert_eq!(rows[0].event_title, "Burna Boy live");
        assert_eq!(rows[0].first_seen_at, rows[0].notified_at);
    }

    #[test]
    fn history_exists_matches_exact_key_only() {
        let store = Store::open_in_memory().expect("store");
        store
            .insert_history("Burna Boy", "Paradiso", "2026-03-01", "t", "u", "paradiso")
            .unwrap();
        assert!(store.history_exists("Burna Boy", "Paradiso", "2026-03-01").unwrap());
        assert!(!store.history_exists("burna boy", "Paradiso", "2026-03-01").unwrap());
        assert!(!store.history_exists("Burna Boy", "Paradiso", "TBA").unwrap());
    }

    #[test]
    fn clear_history_reports_deleted_rows() {
        let store = Store::open_in_memory().expect("store");
        store.insert_history("A", "V", "TBA", "t", "u", "s").unwrap();
        store.insert_history("B", "V", "TBA", "t", "u", "s").unwrap();
        assert_eq!(store.clear_history().unwrap(), 2);
        assert_eq!(store.history_count().unwrap(), 0);
        assert!(!store.history_exists("A", "V", "TBA").unwrap());
    }

    #[test]
    fn file_store_persists_between_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("bot.sqlite");
        {
            let store = Store::open(&path).expect("open");
            store.set_setting(keys::LOCATION, "NL").unwrap();
            store.insert_history("A", "V", "TBA", "t", "u", "s").unwrap();
        }
        let reopened = Store::open(&path).expect("reopen");
        assert_eq!(reopened.get_setting(keys::LOCATION).unwrap().as_deref(), Some("NL"));
        assert!(reopened.history_exists("A", "V", "TBA").unwrap());
    }
}
