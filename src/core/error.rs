//! 申诉流程的顶层错误类型
//!
//! 节点内部的推理失败不会出现在这里（已降级为中性补丁）；记忆层失败只记日志，
//! 因此调用方能看到的只有图配置/输入错误、取消与任务异常。

use thiserror::Error;

use crate::workflow::WorkflowError;

#[derive(Error, Debug)]
pub enum AppealError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Workflow task failed: {0}")]
    Join(String),
}
