//! Appealflow - 医疗保险拒赔申诉的多专家工作流引擎
//!
//! 模块划分：
//! - **agents**: 领域专家节点（保单、医疗、法律、结果模拟、申诉撰写、审核）
//! - **case**: 案件输入文档、专家输出类型与案件状态
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 申诉图组装、运行编排、顶层错误
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Groq / Mock）
//! - **memory**: 跨运行的拒赔模式记忆（SQLite / 内存）
//! - **observability**: 日志初始化
//! - **workflow**: 通用工作流图、构建器、条件路由与执行引擎

pub mod agents;
pub mod case;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod workflow;

pub use crate::core::{AppealError, AppealOrchestrator, WorkflowHandle};
pub use crate::workflow::{FinalState, TerminationReason};
