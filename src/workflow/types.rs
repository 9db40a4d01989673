//! 工作流类型定义
//!
//! 节点、边、条件路由结果、运行轨迹与最终状态

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::case::{CaseState, StateField};

pub type NodeId = String;

/// 顺序依赖边：`from` 完成后 `to` 才可能执行
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

/// 条件边的去向
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Node(NodeId),
    /// 终止标记
    End,
}

impl Target {
    pub fn node(id: impl Into<NodeId>) -> Self {
        Target::Node(id.into())
    }
}

/// 运行为何结束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// 质量门没有遗留问题
    Approved,
    /// 达到迭代上限，按现状接受（可能仍有未解决的弱点）
    IterationLimit,
    /// 没有可执行节点，图自然结束
    Completed,
    /// 质量门本身降级（推理失败或回复无法解析），没有真实判定
    GateUnavailable,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Approved => f.write_str("approved"),
            TerminationReason::IterationLimit => f.write_str("iteration_limit"),
            TerminationReason::Completed => f.write_str("completed"),
            TerminationReason::GateUnavailable => f.write_str("gate_unavailable"),
        }
    }
}

/// 条件路由的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Terminate(TerminationReason),
    Retry,
}

/// 判定的种类，作为条件边分支表的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Terminate,
    Retry,
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Terminate(_) => DecisionKind::Terminate,
            Decision::Retry => DecisionKind::Retry,
        }
    }

    /// 该判定把运行带到 End 时记录的原因
    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            Decision::Terminate(reason) => *reason,
            Decision::Retry => TerminationReason::Completed,
        }
    }
}

/// 单个节点执行记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub node: NodeId,
    /// 降级原因；正常执行时为 None
    pub degraded: Option<String>,
    /// 执行后的迭代计数
    pub iteration: u32,
}

/// 一次运行的执行轨迹
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTrace {
    pub steps: Vec<StepRecord>,
}

impl RunTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 按执行顺序的节点名
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node.as_str()).collect()
    }

    pub fn executions_of(&self, node: &str) -> usize {
        self.steps.iter().filter(|s| s.node == node).count()
    }

    /// (节点, 降级原因)
    pub fn degraded(&self) -> Vec<(&str, &str)> {
        self.steps
            .iter()
            .filter_map(|s| s.degraded.as_deref().map(|r| (s.node.as_str(), r)))
            .collect()
    }
}

/// 图终止后的只读结果
#[derive(Debug, Clone, Serialize)]
pub struct FinalState {
    state: CaseState,
    termination: TerminationReason,
    trace: RunTrace,
}

impl FinalState {
    pub(crate) fn new(state: CaseState, termination: TerminationReason, trace: RunTrace) -> Self {
        Self {
            state,
            termination,
            trace,
        }
    }

    pub fn state(&self) -> &CaseState {
        &self.state
    }

    pub fn appeal_draft(&self) -> Option<&str> {
        self.state.appeal_draft()
    }

    pub fn risk_score(&self) -> u8 {
        self.state.risk_score()
    }

    pub fn iteration_count(&self) -> u32 {
        self.state.iteration_count()
    }

    /// 质量门遗留的弱点；正常通过时为空
    pub fn weaknesses(&self) -> &[String] {
        self.state.audit_feedback()
    }

    pub fn termination_reason(&self) -> TerminationReason {
        self.termination
    }

    pub fn trace(&self) -> &RunTrace {
        &self.trace
    }

    pub fn into_state(self) -> CaseState {
        self.state
    }
}

/// 工作流错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),
    #[error("Node registered twice: {0}")]
    DuplicateNode(NodeId),
    #[error("Entry node not set")]
    EntryNotSet,
    #[error("Node {0} already has a conditional edge")]
    DuplicateConditional(NodeId),
    #[error("Conditional edge from {from} has no branch for {kind:?}")]
    MissingBranch { from: NodeId, kind: DecisionKind },
    #[error("Node {node} wrote field {field} it does not own")]
    ForeignWrite { node: NodeId, field: StateField },
    #[error("Node {node} is missing required input: {reason}")]
    MissingInput { node: NodeId, reason: String },
    #[error("Iteration node {node} invoked after reaching the limit of {limit}")]
    IterationLimitExceeded { node: NodeId, limit: u32 },
    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),
    #[error("Invalid workflow configuration: {0}")]
    InvalidConfiguration(String),
}
