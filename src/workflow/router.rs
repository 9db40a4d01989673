//! 条件路由：质量门之后决定结束还是回到修订节点
//!
//! 无遗留弱点 → 结束（Approved）；达到迭代上限 → 结束（IterationLimit，按现状接受）；否则 → 重试。
//! 两种结束原因分别记录，调用方可以区分「审核通过」与「次数耗尽」。

use crate::case::CaseState;
use crate::workflow::types::{Decision, TerminationReason};

/// 修订-审核循环的最大轮数
pub const MAX_ITERATIONS: u32 = 3;

/// 质量门路由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGateRouter {
    max_iterations: u32,
}

impl Default for QualityGateRouter {
    fn default() -> Self {
        Self::new(MAX_ITERATIONS)
    }
}

impl QualityGateRouter {
    /// 上限会被限制在 1..=MAX_ITERATIONS
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations: max_iterations.clamp(1, MAX_ITERATIONS),
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn decide(&self, state: &CaseState) -> Decision {
        let feedback = state.audit_feedback();
        let iteration = state.iteration_count();

        if feedback.is_empty() {
            tracing::info!("Audit passed. Finalizing appeal.");
            return Decision::Terminate(TerminationReason::Approved);
        }
        if iteration >= self.max_iterations {
            tracing::warn!(
                "Max iterations reached with {} unresolved issues. Accepting output.",
                feedback.len()
            );
            return Decision::Terminate(TerminationReason::IterationLimit);
        }
        tracing::info!(
            "Audit failed with {} issues. Retrying... (Iteration {})",
            feedback.len(),
            iteration
        );
        Decision::Retry
    }
}
