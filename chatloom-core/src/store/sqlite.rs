//! SQLite-backed metadata store
//!
//! Threads, thread items, and attachment records are persisted as JSON
//! documents with indexed identity/ordering columns. All public operations
//! are async; the actual rusqlite work runs on the blocking thread pool so
//! database I/O never stalls the async runtime.
//!
//! ## Concurrency
//!
//! A single `Connection` behind `Arc<Mutex<_>>` serializes statements. Every
//! multi-statement operation (append with position assignment, listing with
//! cursor resolution) runs inside one transaction within one blocking
//! closure, so position uniqueness and `updated_at` freshness hold under
//! concurrent callers.

use crate::error::{Error, Result};
use crate::types::{Attachment, Page, SortOrder, Thread, ThreadItem};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task;

fn utc_now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Durable store for threads, thread items, and attachment records.
pub struct MetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataStore {
    /// Open or create a database at the given path and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let conn = task::spawn_blocking(move || -> Result<Connection> {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let conn = Connection::open(&path)?;

            // Enable foreign keys and WAL mode for better concurrency
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;

            super::schema::run_migrations(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        super::schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking thread pool.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Runtime(format!("blocking task failed: {}", e)))?
    }

    // ============================================
    // Thread operations
    // ============================================

    /// Insert or update a thread by id.
    ///
    /// `created_at` comes from the thread itself; `updated_at` is always
    /// refreshed to now. Idempotent on id.
    pub async fn save_thread(&self, thread: &Thread) -> Result<()> {
        let id = thread.id.clone();
        let data = serde_json::to_string(thread)?;
        let created_at = thread.created_at.to_rfc3339();

        self.run_blocking(move |conn| {
            conn.execute(
                r#"
                INSERT INTO threads (id, data, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at
                "#,
                params![id, data, created_at, utc_now_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    /// Load a thread by id.
    pub async fn load_thread(&self, thread_id: &str) -> Result<Thread> {
        let id = thread_id.to_string();
        self.run_blocking(move |conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM threads WHERE id = ?1", [&id], |r| {
                    r.get(0)
                })
                .optional()?;
            match data {
                Some(data) => Ok(serde_json::from_str(&data)?),
                None => Err(Error::ThreadNotFound(id)),
            }
        })
        .await
    }

    /// Delete a thread by id; items cascade via the foreign key.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let id = thread_id.to_string();
        self.run_blocking(move |conn| {
            let changes = conn.execute("DELETE FROM threads WHERE id = ?1", [&id])?;
            if changes == 0 {
                return Err(Error::ThreadNotFound(id));
            }
            Ok(())
        })
        .await
    }

    /// List threads ordered by `(updated_at, id)` with keyset pagination.
    pub async fn list_threads(
        &self,
        limit: usize,
        after: Option<&str>,
        order: SortOrder,
    ) -> Result<Page<Thread>> {
        let after = after.map(str::to_string);
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;

            let anchor = match &after {
                Some(after_id) => tx
                    .query_row(
                        "SELECT updated_at FROM threads WHERE id = ?1",
                        [after_id],
                        |r| r.get::<_, String>(0),
                    )
                    .optional()?
                    .map(|updated_at| Anchor {
                        key: AnchorKey::Text(updated_at),
                        id: after_id.clone(),
                    }),
                None => None,
            };

            let raw = keyset_page(&tx, "threads", None, "updated_at", order, anchor, limit)?;
            tx.commit()?;

            let data = raw
                .data
                .iter()
                .map(|row| serde_json::from_str(row).map_err(Error::from))
                .collect::<Result<Vec<Thread>>>()?;

            Ok(Page {
                data,
                has_more: raw.has_more,
                after: raw.after,
            })
        })
        .await
    }

    // ============================================
    // Thread item operations
    // ============================================

    /// Append an item to a thread.
    ///
    /// Assigns the next per-thread position, inserts the item, and refreshes
    /// the parent thread's `updated_at`, all in one transaction.
    pub async fn add_item(&self, thread_id: &str, item: &ThreadItem) -> Result<()> {
        if item.id.is_empty() {
            return Err(Error::InvalidArgument(
                "thread items must have an id to be added".to_string(),
            ));
        }

        let thread_id = thread_id.to_string();
        let item_id = item.id.clone();
        let data = serde_json::to_string(item)?;
        let created_at = item.created_at.to_rfc3339();

        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;

            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM thread_items WHERE thread_id = ?1",
                [&thread_id],
                |r| r.get(0),
            )?;
            tx.execute(
                "INSERT INTO thread_items (id, thread_id, data, created_at, position) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![item_id, thread_id, data, created_at, position],
            )?;
            tx.execute(
                "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
                params![utc_now_rfc3339(), thread_id],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Update an item in place by `(thread_id, id)`; position is untouched.
    pub async fn save_item(&self, thread_id: &str, item: &ThreadItem) -> Result<()> {
        if item.id.is_empty() {
            return Err(Error::InvalidArgument(
                "thread items must have an id to be saved".to_string(),
            ));
        }

        let thread_id = thread_id.to_string();
        let item_id = item.id.clone();
        let data = serde_json::to_string(item)?;

        self.run_blocking(move |conn| {
            let changes = conn.execute(
                "UPDATE thread_items SET data = ?1 WHERE thread_id = ?2 AND id = ?3",
                params![data, thread_id, item_id],
            )?;
            if changes == 0 {
                return Err(Error::ItemNotFound { thread_id, item_id });
            }
            Ok(())
        })
        .await
    }

    /// Load an item by `(thread_id, id)`.
    pub async fn load_item(&self, thread_id: &str, item_id: &str) -> Result<ThreadItem> {
        let thread_id = thread_id.to_string();
        let item_id = item_id.to_string();
        self.run_blocking(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM thread_items WHERE thread_id = ?1 AND id = ?2",
                    params![thread_id, item_id],
                    |r| r.get(0),
                )
                .optional()?;
            match data {
                Some(data) => Ok(serde_json::from_str(&data)?),
                None => Err(Error::ItemNotFound { thread_id, item_id }),
            }
        })
        .await
    }

    /// Delete an item by `(thread_id, id)`.
    pub async fn delete_item(&self, thread_id: &str, item_id: &str) -> Result<()> {
        let thread_id = thread_id.to_string();
        let item_id = item_id.to_string();
        self.run_blocking(move |conn| {
            let changes = conn.execute(
                "DELETE FROM thread_items WHERE thread_id = ?1 AND id = ?2",
                params![thread_id, item_id],
            )?;
            if changes == 0 {
                return Err(Error::ItemNotFound { thread_id, item_id });
            }
            Ok(())
        })
        .await
    }

    /// List a thread's items ordered by `(position, id)` with keyset pagination.
    pub async fn list_items(
        &self,
        thread_id: &str,
        limit: usize,
        after: Option<&str>,
        order: SortOrder,
    ) -> Result<Page<ThreadItem>> {
        let thread_id = thread_id.to_string();
        let after = after.map(str::to_string);
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;

            let anchor = match &after {
                Some(after_id) => tx
                    .query_row(
                        "SELECT position FROM thread_items WHERE thread_id = ?1 AND id = ?2",
                        params![thread_id, after_id],
                        |r| r.get::<_, i64>(0),
                    )
                    .optional()?
                    .map(|position| Anchor {
                        key: AnchorKey::Int(position),
                        id: after_id.clone(),
                    }),
                None => None,
            };

            let raw = keyset_page(
                &tx,
                "thread_items",
                Some(("thread_id", &thread_id)),
                "position",
                order,
                anchor,
                limit,
            )?;
            tx.commit()?;

            let data = raw
                .data
                .iter()
                .map(|row| serde_json::from_str(row).map_err(Error::from))
                .collect::<Result<Vec<ThreadItem>>>()?;

            Ok(Page {
                data,
                has_more: raw.has_more,
                after: raw.after,
            })
        })
        .await
    }

    // ============================================
    // Attachment record operations
    // ============================================

    /// Insert or update an attachment record by id.
    pub async fn save_attachment_record(&self, attachment: &Attachment) -> Result<()> {
        let id = attachment.id().to_string();
        let data = serde_json::to_string(attachment)?;

        self.run_blocking(move |conn| {
            let now = utc_now_rfc3339();
            conn.execute(
                r#"
                INSERT INTO attachments (id, data, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at
                "#,
                params![id, data, now, now],
            )?;
            Ok(())
        })
        .await
    }

    /// Load an attachment record by id.
    pub async fn load_attachment_record(&self, attachment_id: &str) -> Result<Attachment> {
        let id = attachment_id.to_string();
        self.run_blocking(move |conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM attachments WHERE id = ?1", [&id], |r| {
                    r.get(0)
                })
                .optional()?;
            match data {
                Some(data) => Ok(serde_json::from_str(&data)?),
                None => Err(Error::AttachmentNotFound(id)),
            }
        })
        .await
    }

    /// Delete an attachment record by id.
    pub async fn delete_attachment_record(&self, attachment_id: &str) -> Result<()> {
        let id = attachment_id.to_string();
        self.run_blocking(move |conn| {
            let changes = conn.execute("DELETE FROM attachments WHERE id = ?1", [&id])?;
            if changes == 0 {
                return Err(Error::AttachmentNotFound(id));
            }
            Ok(())
        })
        .await
    }
}

// ============================================
// Keyset pagination
// ============================================

/// Resolved cursor: the order-key value and id of the last-seen row.
struct Anchor {
    key: AnchorKey,
    id: String,
}

/// Order-key value types across the two listings
enum AnchorKey {
    /// `updated_at` timestamps (RFC 3339 text sorts chronologically)
    Text(String),
    /// `position` counters
    Int(i64),
}

/// SQL bind parameter for the dynamically assembled page query
enum SqlParam {
    Text(String),
    Int(i64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => s.to_sql(),
            SqlParam::Int(i) => i.to_sql(),
        }
    }
}

struct RawPage {
    /// Serialized `data` documents, page order
    data: Vec<String>,
    has_more: bool,
    after: Option<String>,
}

/// Fetch one page of `(id, data)` rows past the anchor.
///
/// The predicate `(order_col <cmp> v) OR (order_col = v AND id <cmp> after)`
/// makes the ordering total even when rows tie on the order key; `limit + 1`
/// rows are fetched and the extra row only signals `has_more`. A missing
/// anchor (cursor pointing at a since-deleted row) is passed in as `None` and
/// the page silently restarts from the top.
fn keyset_page(
    conn: &Connection,
    table: &str,
    scope: Option<(&str, &str)>,
    order_col: &str,
    order: SortOrder,
    anchor: Option<Anchor>,
    limit: usize,
) -> Result<RawPage> {
    let mut clauses: Vec<String> = Vec::new();
    let mut bind: Vec<SqlParam> = Vec::new();

    if let Some((col, value)) = scope {
        clauses.push(format!("{} = ?", col));
        bind.push(SqlParam::Text(value.to_string()));
    }

    if let Some(anchor) = anchor {
        let cmp = order.comparator();
        clauses.push(format!(
            "(({col} {cmp} ?) OR ({col} = ? AND id {cmp} ?))",
            col = order_col,
            cmp = cmp
        ));
        match anchor.key {
            AnchorKey::Text(v) => {
                bind.push(SqlParam::Text(v.clone()));
                bind.push(SqlParam::Text(v));
            }
            AnchorKey::Int(v) => {
                bind.push(SqlParam::Int(v));
                bind.push(SqlParam::Int(v));
            }
        }
        bind.push(SqlParam::Text(anchor.id));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let dir = order.as_sql();
    let sql = format!(
        "SELECT id, data FROM {table}{where_clause} \
         ORDER BY {order_col} {dir}, id {dir} LIMIT ?",
        table = table,
        where_clause = where_clause,
        order_col = order_col,
        dir = dir,
    );
    bind.push(SqlParam::Int(limit as i64 + 1));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let has_more = rows.len() > limit;
    let page: Vec<(String, String)> = rows.into_iter().take(limit).collect();
    let after = if has_more || !page.is_empty() {
        page.last().map(|(id, _)| id.clone())
    } else {
        None
    };

    Ok(RawPage {
        data: page.into_iter().map(|(_, data)| data).collect(),
        has_more,
        after,
    })
}
