//! 专家节点共用的推理调用：拼 prompt、限时调用、从回复中提取 JSON
//!
//! 输出格式说明由 schemars 从目标类型生成，减少 LLM 输出格式错误。

use std::sync::Arc;
use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::llm::{LlmClient, Message};

/// 目标类型的 JSON Schema，拼入 prompt 作为格式说明
pub fn format_instructions<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 把任意可序列化的值渲染成 prompt 片段；缺失时给出占位说明
pub fn render<T: Serialize>(value: Option<&T>, missing: &str) -> String {
    value
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .unwrap_or_else(|| missing.to_string())
}

/// 从 LLM 回复中截取 JSON（```json ... ``` 代码块或首个 `{` 到末个 `}`）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 限时调用推理服务，返回原始文本
pub async fn ask_text(
    llm: &Arc<dyn LlmClient>,
    system: &str,
    user: String,
    timeout: Duration,
) -> Result<String, String> {
    let messages = vec![Message::system(system), Message::user(user)];
    match tokio::time::timeout(timeout, llm.complete(&messages)).await {
        Ok(result) => result,
        Err(_) => Err(format!("LLM call timed out after {}s", timeout.as_secs())),
    }
}

/// 限时调用并把回复解析为 `T`
pub async fn ask_json<T: DeserializeOwned>(
    llm: &Arc<dyn LlmClient>,
    system: &str,
    user: String,
    timeout: Duration,
) -> Result<T, String> {
    let output = ask_text(llm, system, user, timeout).await?;
    let json = extract_json(&output).ok_or_else(|| format!("no JSON object in output: {}", output))?;
    serde_json::from_str(json).map_err(|e| format!("JSON parse error: {}: {}", e, json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::AuditResult;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_extract_json_from_fenced_block() {
        let out = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json(out), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_from_prose() {
        assert_eq!(extract_json("result: {\"a\": {\"b\": 2}} done"), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_format_instructions_mentions_fields() {
        let schema = format_instructions::<AuditResult>();
        assert!(schema.contains("weaknesses"));
        assert!(schema.contains("risk_score"));
    }

    #[tokio::test]
    async fn test_ask_json_reports_parse_errors() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::repeating("I refuse"));
        let err = ask_json::<AuditResult>(&llm, "sys", "user".into(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.contains("no JSON object"));
    }
}
