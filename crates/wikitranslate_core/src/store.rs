use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

pub const KEY_PREFIX: &str = "wikitranslate";

const STORE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// String key/value storage shared by the link cache and the revision ledger.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }
}

pub fn namespaced_key(parts: &[&str]) -> String {
    let mut key = KEY_PREFIX.to_string();
    for part in parts {
        key.push('_');
        key.push_str(part);
    }
    key
}

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let parent = db_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("store path has no parent: {}", db_path.display()))?;
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create store parent directory {}", parent.display())
        })?;

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .context("failed to set sqlite busy timeout")?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL journal mode")?;
        connection
            .execute_batch(STORE_SCHEMA_SQL)
            .context("failed to initialize store schema")?;
        Ok(Self { connection })
    }
}

impl KeyValueStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read store key {key}"))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("failed to write store key {key}"))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.connection
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .with_context(|| format!("failed to delete store key {key}"))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{KeyValueStore, MemoryStore, SqliteStore, namespaced_key};

    #[test]
    fn namespaced_key_joins_parts() {
        assert_eq!(
            namespaced_key(&["link", "Old Name", "status"]),
            "wikitranslate_link_Old Name_status"
        );
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("nested").join("store.db");

        {
            let store = SqliteStore::open(&db_path).expect("open");
            assert_eq!(store.get_item("missing").expect("get"), None);
            store.set_item("key", "first").expect("set");
            store.set_item("key", "second").expect("overwrite");
            store.set_item("gone", "x").expect("set");
            store.remove_item("gone").expect("remove");
            store.remove_item("never-set").expect("remove missing");
        }

        let reopened = SqliteStore::open(&db_path).expect("reopen");
        assert_eq!(
            reopened.get_item("key").expect("get"),
            Some("second".to_string())
        );
        assert_eq!(reopened.get_item("gone").expect("get"), None);
    }

    #[test]
    fn memory_store_works_through_reference() {
        let store = MemoryStore::new();
        let by_ref: &dyn KeyValueStore = &store;
        by_ref.set_item("a", "1").expect("set");
        assert_eq!(store.len(), 1);
        assert_eq!((&store).get_item("a").expect("get"), Some("1".to_string()));
        by_ref.remove_item("a").expect("remove");
        assert!(store.is_empty());
    }
}
