//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `APPEAL__*` 覆盖（双下划线表示嵌套，如 `APPEAL__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::memory::DEFAULT_SUGGESTION_THRESHOLD;
use crate::workflow::MAX_ITERATIONS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub workflow: WorkflowSection,
    pub memory: MemorySection,
}

/// [app] 段：应用名、数据目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 数据目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / groq / mock；没有可用的 API Key 时退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 未设置时按后端取默认模型（OpenAI: gpt-4o-mini，Groq: llama-3.3-70b-versatile）
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次推理调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [workflow] 段：修订-审核循环上限（大于 3 时按 3 处理）
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> u32 {
    MAX_ITERATIONS
}

/// [memory] 段：拒赔模式记忆
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// 同一模式出现多少次后才给出建议
    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: u64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            database_path: default_database_path(),
            suggestion_threshold: default_suggestion_threshold(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/patterns.db")
}

fn default_suggestion_threshold() -> u64 {
    DEFAULT_SUGGESTION_THRESHOLD
}

/// 从 config 目录加载配置，环境变量 APPEAL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 APPEAL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("APPEAL")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.workflow.max_iterations, 3);
        assert!(cfg.memory.enabled);
        assert_eq!(cfg.memory.database_path, PathBuf::from("data/patterns.db"));
        assert_eq!(cfg.memory.suggestion_threshold, 3);
        assert_eq!(cfg.llm.timeouts.request, 60);
    }

    #[test]
    fn test_load_from_file_overrides_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nprovider = \"mock\"\n\n[memory]\nenabled = false\nsuggestion_threshold = 5"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert!(!cfg.memory.enabled);
        assert_eq!(cfg.memory.suggestion_threshold, 5);
        assert_eq!(cfg.workflow.max_iterations, 3);
    }
}
