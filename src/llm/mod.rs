//! LLM 层：推理服务抽象与实现（OpenAI 兼容 / Groq / Mock）

pub mod groq;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use groq::{create_groq_client, GROQ_BASE_URL, GROQ_REASONING_MODEL};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, TokenCount};
