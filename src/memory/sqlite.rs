//! SQLite 拒赔模式存储
//!
//! 每个键一行，两个集合以 JSON 数组存储。record 在 IMMEDIATE 事务中完成读-改-写：
//! 同一数据库文件上的并发写者由 SQLite 写锁串行化；提交失败时事务随 drop 回滚。

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::memory::pattern::{
    MemoryError, PatternKey, PatternQuery, PatternRecord, PatternStore, Suggestion,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS denial_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    insurer TEXT NOT NULL,
    denial_code TEXT NOT NULL,
    procedure TEXT NOT NULL,
    code_identifier TEXT NOT NULL,
    occurrence_count INTEGER NOT NULL,
    missing_docs TEXT NOT NULL DEFAULT '[]',
    resolved_by TEXT NOT NULL DEFAULT '[]',
    last_seen TEXT NOT NULL,
    UNIQUE (insurer, denial_code, procedure)
);
CREATE INDEX IF NOT EXISTS idx_denial_patterns_lookup
    ON denial_patterns (insurer, denial_code);
"#;

const SELECT_COLUMNS: &str = "insurer, denial_code, procedure, code_identifier, occurrence_count, \
     missing_docs, resolved_by, last_seen";

/// 未解析 JSON 集合的原始行
struct RawRow {
    key: PatternKey,
    code_identifier: String,
    occurrence_count: i64,
    missing_docs: String,
    resolved_by: String,
    last_seen: DateTime<Utc>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: PatternKey {
                insurer: row.get(0)?,
                denial_code: row.get(1)?,
                procedure: row.get(2)?,
            },
            code_identifier: row.get(3)?,
            occurrence_count: row.get(4)?,
            missing_docs: row.get(5)?,
            resolved_by: row.get(6)?,
            last_seen: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<PatternRecord, MemoryError> {
        let missing_docs: BTreeSet<String> = serde_json::from_str(&self.missing_docs)?;
        let resolved_by: BTreeSet<String> = serde_json::from_str(&self.resolved_by)?;
        Ok(PatternRecord {
            key: self.key,
            code_identifier: self.code_identifier,
            occurrence_count: self.occurrence_count.max(0) as u64,
            missing_docs,
            resolved_by,
            last_seen: self.last_seen,
        })
    }
}

/// SQLite 模式存储
pub struct SqlitePatternStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePatternStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MemoryError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MemoryError> {
        self.conn
            .lock()
            .map_err(|e| MemoryError::Lock(e.to_string()))
    }

    fn load(conn: &Connection, key: &PatternKey) -> Result<Option<PatternRecord>, MemoryError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM denial_patterns \
             WHERE insurer = ?1 AND denial_code = ?2 AND procedure = ?3"
        );
        conn.query_row(
            &sql,
            params![key.insurer, key.denial_code, key.procedure],
            RawRow::from_row,
        )
        .optional()?
        .map(RawRow::into_record)
        .transpose()
    }

    /// 记录总数（调试/导出用）
    pub fn count(&self) -> Result<i64, MemoryError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM denial_patterns", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl PatternStore for SqlitePatternStore {
    fn record(
        &self,
        key: &PatternKey,
        code_identifier: Option<&str>,
        missing_docs: &[String],
        resolved_by: &[String],
    ) -> Result<PatternRecord, MemoryError> {
        let now = Utc::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let record = match Self::load(&tx, key)? {
            Some(mut existing) => {
                existing.absorb(code_identifier, missing_docs, resolved_by, now);
                tx.execute(
                    "UPDATE denial_patterns \
                     SET code_identifier = ?4, occurrence_count = ?5, missing_docs = ?6, \
                         resolved_by = ?7, last_seen = ?8 \
                     WHERE insurer = ?1 AND denial_code = ?2 AND procedure = ?3",
                    params![
                        key.insurer,
                        key.denial_code,
                        key.procedure,
                        existing.code_identifier,
                        existing.occurrence_count as i64,
                        serde_json::to_string(&existing.missing_docs)?,
                        serde_json::to_string(&existing.resolved_by)?,
                        existing.last_seen,
                    ],
                )?;
                tracing::info!(
                    "Updated denial pattern {:?}. Count: {}",
                    key,
                    existing.occurrence_count
                );
                existing
            }
            None => {
                let created =
                    PatternRecord::first(key.clone(), code_identifier, missing_docs, resolved_by, now);
                tx.execute(
                    "INSERT INTO denial_patterns \
                     (insurer, denial_code, procedure, code_identifier, occurrence_count, \
                      missing_docs, resolved_by, last_seen) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        key.insurer,
                        key.denial_code,
                        key.procedure,
                        created.code_identifier,
                        created.occurrence_count as i64,
                        serde_json::to_string(&created.missing_docs)?,
                        serde_json::to_string(&created.resolved_by)?,
                        created.last_seen,
                    ],
                )?;
                tracing::info!("Created new denial pattern {:?}", key);
                created
            }
        };

        if let Err(e) = tx.commit() {
            tracing::error!("Failed to commit denial pattern: {}", e);
            return Err(e.into());
        }
        Ok(record)
    }

    fn suggest(&self, query: &PatternQuery, threshold: u64) -> Result<Suggestion, MemoryError> {
        let conn = self.lock()?;
        let order = "ORDER BY occurrence_count DESC, last_seen DESC LIMIT 1";
        let row = match &query.procedure {
            Some(procedure) => conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM denial_patterns \
                         WHERE insurer = ?1 AND denial_code = ?2 AND procedure = ?3 {order}"
                    ),
                    params![query.insurer, query.denial_code, procedure],
                    RawRow::from_row,
                )
                .optional()?,
            None => conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM denial_patterns \
                         WHERE insurer = ?1 AND denial_code = ?2 {order}"
                    ),
                    params![query.insurer, query.denial_code],
                    RawRow::from_row,
                )
                .optional()?,
        };

        let record = row.map(RawRow::into_record).transpose()?;
        Ok(Suggestion::from_candidates(record.iter(), threshold))
    }

    fn get(&self, key: &PatternKey) -> Result<Option<PatternRecord>, MemoryError> {
        let conn = self.lock()?;
        Self::load(&conn, key)
    }
}
