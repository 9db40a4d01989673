//! 拒赔模式记忆：跨运行累积 (保险公司, 拒赔码, 项目) 的出现次数、缺失材料与解决方式
//!
//! - record：首次出现时创建（count=1），之后 count+1，两个集合取并集（只增不减），刷新 last_seen
//! - suggest：出现次数达到阈值才返回提示，避免单次巧合误导后续申诉
//!
//! 键的每个组成部分缺失时替换为 [`UNKNOWN`]，保证部分数据也能稳定命中同一条记录。
//! record 是「读-改-写」，并发写同一键时依赖存储层事务（见 [`SqlitePatternStore`](crate::memory::SqlitePatternStore)）；
//! 本模块不做 CAS 或乐观锁。

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 键字段缺失时的占位值
pub const UNKNOWN: &str = "Unknown";

/// 默认建议阈值
pub const DEFAULT_SUGGESTION_THRESHOLD: u64 = 3;

fn or_unknown(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// 记忆层错误
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 模式复合键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternKey {
    pub insurer: String,
    pub denial_code: String,
    pub procedure: String,
}

impl PatternKey {
    pub fn new(insurer: Option<&str>, denial_code: Option<&str>, procedure: Option<&str>) -> Self {
        Self {
            insurer: or_unknown(insurer),
            denial_code: or_unknown(denial_code),
            procedure: or_unknown(procedure),
        }
    }
}

/// 一条已学习的拒赔模式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub key: PatternKey,
    /// CPT 等编码，仅作参考，不参与匹配
    pub code_identifier: String,
    pub occurrence_count: u64,
    pub missing_docs: BTreeSet<String>,
    pub resolved_by: BTreeSet<String>,
    pub last_seen: DateTime<Utc>,
}

impl PatternRecord {
    /// 首次出现
    pub fn first(
        key: PatternKey,
        code_identifier: Option<&str>,
        missing_docs: &[String],
        resolved_by: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            code_identifier: or_unknown(code_identifier),
            occurrence_count: 1,
            missing_docs: missing_docs.iter().cloned().collect(),
            resolved_by: resolved_by.iter().cloned().collect(),
            last_seen: now,
        }
    }

    /// 再次出现：计数 +1、集合并集、刷新时间；编码只在新值已知时覆盖
    pub fn absorb(
        &mut self,
        code_identifier: Option<&str>,
        missing_docs: &[String],
        resolved_by: &[String],
        now: DateTime<Utc>,
    ) {
        self.occurrence_count += 1;
        self.missing_docs.extend(missing_docs.iter().cloned());
        self.resolved_by.extend(resolved_by.iter().cloned());
        let code = or_unknown(code_identifier);
        if code != UNKNOWN {
            self.code_identifier = code;
        }
        self.last_seen = now;
    }

    pub fn to_hint(&self) -> PatternHint {
        let suggested_solution: Vec<String> = self.resolved_by.iter().cloned().collect();
        let message = format!(
            "This denial pattern has occurred {} times. The most successful fix was: {}",
            self.occurrence_count,
            suggested_solution.join(", ")
        );
        PatternHint {
            occurrence_count: self.occurrence_count,
            suggested_solution,
            common_missing_docs: self.missing_docs.iter().cloned().collect(),
            message,
        }
    }
}

/// 查询条件：保险公司 + 拒赔码必填，项目可选（给出时进一步收窄）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternQuery {
    pub insurer: String,
    pub denial_code: String,
    pub procedure: Option<String>,
}

impl PatternQuery {
    pub fn new(insurer: Option<&str>, denial_code: Option<&str>, procedure: Option<&str>) -> Self {
        Self {
            insurer: or_unknown(insurer),
            denial_code: or_unknown(denial_code),
            procedure: procedure
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }

    pub fn matches(&self, key: &PatternKey) -> bool {
        key.insurer == self.insurer
            && key.denial_code == self.denial_code
            && self.procedure.as_ref().map_or(true, |p| &key.procedure == p)
    }
}

/// 注入到下一次运行的历史经验
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternHint {
    pub occurrence_count: u64,
    pub suggested_solution: Vec<String>,
    pub common_missing_docs: Vec<String>,
    pub message: String,
}

/// suggest 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    Found(PatternHint),
    NotFound,
}

impl Suggestion {
    pub fn is_found(&self) -> bool {
        matches!(self, Suggestion::Found(_))
    }

    pub fn into_hint(self) -> Option<PatternHint> {
        match self {
            Suggestion::Found(hint) => Some(hint),
            Suggestion::NotFound => None,
        }
    }

    /// 在若干候选记录中选出最常见（次数相同取最近）的一条，按阈值判定
    pub fn from_candidates<'a>(
        candidates: impl IntoIterator<Item = &'a PatternRecord>,
        threshold: u64,
    ) -> Self {
        candidates
            .into_iter()
            .max_by(|a, b| {
                a.occurrence_count
                    .cmp(&b.occurrence_count)
                    .then(a.last_seen.cmp(&b.last_seen))
            })
            .filter(|r| r.occurrence_count >= threshold)
            .map(|r| Suggestion::Found(r.to_hint()))
            .unwrap_or(Suggestion::NotFound)
    }
}

/// 对外的扁平结构：`{found, occurrence_count?, common_missing_docs?, suggested_solution?, message?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionPayload {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_missing_docs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_solution: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Suggestion> for SuggestionPayload {
    fn from(s: &Suggestion) -> Self {
        match s {
            Suggestion::Found(hint) => Self {
                found: true,
                occurrence_count: Some(hint.occurrence_count),
                common_missing_docs: Some(hint.common_missing_docs.clone()),
                suggested_solution: Some(hint.suggested_solution.clone()),
                message: Some(hint.message.clone()),
            },
            Suggestion::NotFound => Self {
                found: false,
                occurrence_count: None,
                common_missing_docs: None,
                suggested_solution: None,
                message: None,
            },
        }
    }
}

/// 模式存储 trait：SQLite 持久化或内存实现
pub trait PatternStore: Send + Sync {
    /// 记录一次出现，返回更新后的记录
    fn record(
        &self,
        key: &PatternKey,
        code_identifier: Option<&str>,
        missing_docs: &[String],
        resolved_by: &[String],
    ) -> Result<PatternRecord, MemoryError>;

    /// 达到阈值时返回提示
    fn suggest(&self, query: &PatternQuery, threshold: u64) -> Result<Suggestion, MemoryError>;

    /// 按完整键读取原始记录
    fn get(&self, key: &PatternKey) -> Result<Option<PatternRecord>, MemoryError>;
}

/// 内存实现：测试与离线运行用，进程退出即丢失
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    records: Mutex<HashMap<PatternKey, PatternRecord>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<PatternKey, PatternRecord>>, MemoryError> {
        self.records
            .lock()
            .map_err(|e| MemoryError::Lock(e.to_string()))
    }
}

impl PatternStore for InMemoryPatternStore {
    fn record(
        &self,
        key: &PatternKey,
        code_identifier: Option<&str>,
        missing_docs: &[String],
        resolved_by: &[String],
    ) -> Result<PatternRecord, MemoryError> {
        let now = Utc::now();
        let mut records = self.lock()?;
        let record = records
            .entry(key.clone())
            .and_modify(|r| r.absorb(code_identifier, missing_docs, resolved_by, now))
            .or_insert_with(|| {
                PatternRecord::first(key.clone(), code_identifier, missing_docs, resolved_by, now)
            });
        tracing::debug!(
            "Pattern {:?} now seen {} times",
            record.key,
            record.occurrence_count
        );
        Ok(record.clone())
    }

    fn suggest(&self, query: &PatternQuery, threshold: u64) -> Result<Suggestion, MemoryError> {
        let records = self.lock()?;
        Ok(Suggestion::from_candidates(
            records.values().filter(|r| query.matches(&r.key)),
            threshold,
        ))
    }

    fn get(&self, key: &PatternKey) -> Result<Option<PatternRecord>, MemoryError> {
        Ok(self.lock()?.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_substitutes_unknown() {
        let key = PatternKey::new(None, Some(""), Some("  MRI "));
        assert_eq!(key.insurer, UNKNOWN);
        assert_eq!(key.denial_code, UNKNOWN);
        assert_eq!(key.procedure, "MRI");
    }

    #[test]
    fn test_record_unions_in_any_order() {
        let orders: [[&[&str]; 3]; 3] = [
            [&["A"], &["B"], &["A"]],
            [&["B"], &["A"], &["A"]],
            [&["A"], &["A"], &["B"]],
        ];
        for order in orders {
            let store = InMemoryPatternStore::new();
            let key = PatternKey::new(Some("Acme"), Some("CO-50"), Some("MRI"));
            for missing in order {
                store.record(&key, None, &docs(missing), &[]).unwrap();
            }
            let record = store.get(&key).unwrap().unwrap();
            assert_eq!(record.occurrence_count, 3);
            assert_eq!(record.missing_docs, set(&["A", "B"]));
            assert!(record.resolved_by.is_empty());
        }
    }

    #[test]
    fn test_suggest_respects_threshold() {
        let store = InMemoryPatternStore::new();
        let key = PatternKey::new(Some("Acme"), Some("CO-50"), Some("MRI Lumbar"));
        let query = PatternQuery::new(Some("Acme"), Some("CO-50"), Some("MRI Lumbar"));

        for _ in 0..2 {
            store
                .record(&key, Some("72148"), &docs(&["PT Notes"]), &docs(&["Added Neuro Exam"]))
                .unwrap();
        }
        assert_eq!(store.suggest(&query, 3).unwrap(), Suggestion::NotFound);

        store.record(&key, None, &docs(&["X-Ray"]), &[]).unwrap();
        match store.suggest(&query, 3).unwrap() {
            Suggestion::Found(hint) => {
                assert_eq!(hint.occurrence_count, 3);
                assert_eq!(hint.common_missing_docs, docs(&["PT Notes", "X-Ray"]));
                assert_eq!(hint.suggested_solution, docs(&["Added Neuro Exam"]));
                assert!(hint.message.contains("3 times"));
            }
            Suggestion::NotFound => panic!("expected a suggestion"),
        }
        assert_eq!(store.get(&key).unwrap().unwrap().code_identifier, "72148");
    }

    #[test]
    fn test_suggest_without_procedure_matches_any_procedure() {
        let store = InMemoryPatternStore::new();
        let mri = PatternKey::new(Some("Acme"), Some("CO-50"), Some("MRI"));
        let ct = PatternKey::new(Some("Acme"), Some("CO-50"), Some("CT"));
        for _ in 0..3 {
            store.record(&mri, None, &[], &docs(&["Neuro Exam"])).unwrap();
        }
        store.record(&ct, None, &[], &[]).unwrap();

        let broad = PatternQuery::new(Some("Acme"), Some("CO-50"), None);
        assert!(store.suggest(&broad, 3).unwrap().is_found());

        let narrow = PatternQuery::new(Some("Acme"), Some("CO-50"), Some("CT"));
        assert!(!store.suggest(&narrow, 3).unwrap().is_found());
    }

    #[test]
    fn test_payload_shape() {
        let payload = SuggestionPayload::from(&Suggestion::NotFound);
        assert_eq!(serde_json::to_value(&payload).unwrap(), serde_json::json!({"found": false}));
    }
}
