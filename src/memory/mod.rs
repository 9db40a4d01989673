//! 记忆层：跨运行的拒赔模式记忆（SQLite 持久化 / 内存实现）

pub mod pattern;
pub mod sqlite;

pub use pattern::{
    InMemoryPatternStore, MemoryError, PatternHint, PatternKey, PatternQuery, PatternRecord,
    PatternStore, Suggestion, SuggestionPayload, DEFAULT_SUGGESTION_THRESHOLD, UNKNOWN,
};
pub use sqlite::SqlitePatternStore;
