//! 能力节点：`CaseState → StatePatch` 的纯变换
//!
//! 节点自己负责捕获外部调用的错误并返回 [`NodeOutcome::Degraded`]（中性补丁 + 原因），
//! 引擎据此记录降级而不中断运行。只有「缺少必需输入」才以 [`NodeError`] 终止整次运行。

use async_trait::async_trait;
use thiserror::Error;

use crate::case::{CaseState, StateField, StatePatch};

/// 节点执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// 正常产出
    Success(StatePatch),
    /// 外部协作者失败，返回中性补丁
    Degraded(StatePatch, String),
}

impl NodeOutcome {
    pub fn patch(&self) -> &StatePatch {
        match self {
            NodeOutcome::Success(patch) | NodeOutcome::Degraded(patch, _) => patch,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, NodeOutcome::Degraded(..))
    }

    pub fn into_parts(self) -> (StatePatch, Option<String>) {
        match self {
            NodeOutcome::Success(patch) => (patch, None),
            NodeOutcome::Degraded(patch, reason) => (patch, Some(reason)),
        }
    }
}

/// 无法用中性补丁替代的失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),
}

/// 能力节点 trait：每个领域专家一个实现
#[async_trait]
pub trait CapabilityNode: Send + Sync {
    /// 本节点允许写入的字段；补丁触及其他字段时引擎拒绝合并
    fn owns(&self) -> &'static [StateField];

    /// 读取当前状态，返回只含自有字段的补丁
    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError>;
}

/// 由同步闭包构造的节点（测试与简单变换用）
pub struct FnNode<F> {
    owns: &'static [StateField],
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&CaseState) -> Result<NodeOutcome, NodeError> + Send + Sync,
{
    pub fn new(owns: &'static [StateField], f: F) -> Self {
        Self { owns, f }
    }
}

#[async_trait]
impl<F> CapabilityNode for FnNode<F>
where
    F: Fn(&CaseState) -> Result<NodeOutcome, NodeError> + Send + Sync,
{
    fn owns(&self) -> &'static [StateField] {
        self.owns
    }

    async fn run(&self, state: &CaseState) -> Result<NodeOutcome, NodeError> {
        (self.f)(state)
    }
}
