//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预设回复；脚本用完后一直返回 fallback。默认 fallback 为 `{}`，
//! 各专家节点会把它解析成空结果，整条流程可在本地跑通。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 脚本化 Mock 客户端
#[derive(Debug)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    /// 每次调用时拼接后的 prompt，便于断言节点看到了什么
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::repeating("{}")
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次都返回同一回复
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(response.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 依次返回给定回复，用完后重复最后一条
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script: VecDeque<Result<String, String>> =
            responses.into_iter().map(|r| Ok(r.into())).collect();
        let fallback = script.pop_back().unwrap_or_else(|| Ok("{}".to_string()));
        script.push_back(fallback.clone());
        Self {
            script: Mutex::new(script),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都失败（模拟网络错误、限流等）
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Err(error.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt);
        }

        let next = self
            .script
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_then_repeat_last() {
        let llm = MockLlmClient::with_responses(["a", "b"]);
        let msgs = [Message::user("hi")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "a");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "b");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "b");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_client() {
        let llm = MockLlmClient::failing("rate limited");
        let err = llm.complete(&[Message::user("x")]).await.unwrap_err();
        assert_eq!(err, "rate limited");
        assert_eq!(llm.prompts(), vec!["x".to_string()]);
    }
}
