//! Groq（OpenAI 兼容格式）
//!
//! 默认端点 https://api.groq.com/openai/v1，默认模型 llama-3.3-70b-versatile。

use crate::llm::OpenAiClient;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_REASONING_MODEL: &str = "llama-3.3-70b-versatile";

/// 创建 Groq 客户端
///
/// - API Key：`GROQ_API_KEY`，其次 `OPENAI_API_KEY`
/// - 模型：参数 > `GROQ_MODEL` 环境变量 > 默认推理模型
/// - 端点：参数 > 默认 Groq 端点
pub fn create_groq_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("GROQ_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();
    let model = model
        .map(String::from)
        .or_else(|| std::env::var("GROQ_MODEL").ok())
        .unwrap_or_else(|| GROQ_REASONING_MODEL.to_string());

    OpenAiClient::new(
        Some(base_url.unwrap_or(GROQ_BASE_URL)),
        &model,
        api_key.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_model_wins() {
        let client = create_groq_client(Some("llama-3.1-8b-instant"), None);
        assert_eq!(client.model(), "llama-3.1-8b-instant");
    }
}
