//! In-memory record store and tree helpers shared by the test modules

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use serde_json::json;

use migrate_core::api::Result as StoreResult;
use migrate_core::{MigrationRecord, RemoteStore, Row, StoreError, StoredRecord};

/// How the store answers inserts
#[derive(Debug, Clone)]
pub enum InsertBehavior {
    Accept,
    /// Accept but return no row
    NoData,
    /// Fail with a server error
    Fail,
    /// Fail only for these titles
    FailTitles(HashSet<String>),
}

/// How the store answers listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListBehavior {
    Serve,
    Unauthorized,
    Unavailable,
}

pub struct MemoryStore {
    pub inserted: Mutex<Vec<MigrationRecord>>,
    pub insert_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub rows: Mutex<Vec<Row>>,
    pub insert_behavior: InsertBehavior,
    pub list_behavior: ListBehavior,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_behavior(InsertBehavior::Accept)
    }

    pub fn with_behavior(insert_behavior: InsertBehavior) -> Self {
        Self {
            inserted: Mutex::new(Vec::new()),
            insert_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            rows: Mutex::new(Vec::new()),
            insert_behavior,
            list_behavior: ListBehavior::Serve,
        }
    }

    pub fn listing(mut self, list_behavior: ListBehavior) -> Self {
        self.list_behavior = list_behavior;
        self
    }

    /// Seed `count` unrelated remote rows
    pub fn with_rows(self, count: usize) -> Self {
        {
            let mut rows = self.rows.lock().unwrap();
            for _ in 0..count {
                let id = rows.len() + 1;
                rows.push(row(json!({
                    "id": id,
                    "title": format!("remote-{}", id),
                    "updated_at": 0,
                    "content": "",
                })));
            }
        }
        self
    }

    pub fn add_row(&self, title: &str, updated_at: i64, content: &str) {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() + 1;
        rows.push(row(json!({"id": id, "title": title, "updated_at": updated_at, "content": content})));
    }

    pub fn titles(&self) -> Vec<String> {
        self.inserted.lock().unwrap().iter().map(|r| r.title.clone()).collect()
    }

    pub fn insert_count(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn insert(&self, _table: &str, record: &MigrationRecord) -> StoreResult<Option<StoredRecord>> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let fail = match &self.insert_behavior {
            InsertBehavior::Accept => false,
            InsertBehavior::NoData => return Ok(None),
            InsertBehavior::Fail => true,
            InsertBehavior::FailTitles(titles) => titles.contains(&record.title),
        };
        if fail {
            return Err(StoreError::Server {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(record.clone());
        let stored = serde_json::from_value(json!({
            "id": inserted.len(),
            "title": record.title,
        }))?;
        Ok(Some(stored))
    }

    async fn list(&self, _table: &str, _fields: &str, offset: usize, limit: usize) -> StoreResult<Vec<Row>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        match self.list_behavior {
            ListBehavior::Serve => {
                let rows = self.rows.lock().unwrap();
                Ok(rows.iter().skip(offset).take(limit).cloned().collect())
            }
            ListBehavior::Unauthorized => Err(StoreError::Authentication("Invalid API key".to_string())),
            ListBehavior::Unavailable => Err(StoreError::Server {
                status: 500,
                message: "boom".to_string(),
            }),
        }
    }
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// Write `files` (relative path, contents) under `root`
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
}

/// Write `count` numbered text files `f000.txt`, `f001.txt`, ...
pub fn write_numbered(root: &Path, count: usize) {
    for i in 0..count {
        std::fs::write(root.join(format!("f{:03}.txt", i)), format!("file {}", i)).unwrap();
    }
}
