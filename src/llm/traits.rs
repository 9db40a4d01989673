//! 推理服务抽象
//!
//! 每个专家节点在构造时注入自己的 LlmClient（OpenAI 兼容端点 / Mock），便于测试时替换为确定性桩。

use async_trait::async_trait;

use crate::llm::Message;

/// 累计 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCount {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenCount {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 本客户端至今的累计用量；不统计的实现返回 0
    fn token_usage(&self) -> TokenCount {
        TokenCount::default()
    }
}
