//! 工作流引擎
//!
//! 单任务内按依赖顺序逐个执行节点：
//! - 扇出：前驱完成后，按边的声明顺序依次调度所有后继（不并发）
//! - 汇合：节点的所有顺序前驱都在本轮产出补丁后才执行
//! - 条件边：源节点执行后由路由选择回跳目标或 End；到达 End 立即停止，之后不再修改状态。
//!   源节点本次降级时，结束原因记为 GateUnavailable
//!
//! 节点补丁按字段合并；补丁触及非自有字段时整次运行失败（属于图配置错误）。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::case::CaseState;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::node::NodeError;
use crate::workflow::types::*;

/// 工作流引擎
pub struct WorkflowEngine {
    graph: Arc<WorkflowGraph>,
    max_steps: usize,
}

impl WorkflowEngine {
    /// 步数上限默认为 节点数 × (迭代上限 + 1)，足够覆盖合法的回跳
    pub fn new(graph: Arc<WorkflowGraph>) -> Self {
        let max_steps = graph.node_count() * (graph.max_iterations() as usize + 1);
        Self { graph, max_steps }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// 从入口节点执行到终止，返回合并后的最终状态
    pub async fn run(&self, initial: CaseState) -> Result<FinalState, WorkflowError> {
        let graph = &self.graph;
        let mut state = initial;
        let mut trace = RunTrace::default();
        let mut queue: VecDeque<NodeId> = VecDeque::from([graph.entry().to_string()]);
        // 汇合点 -> 本轮已完成的前驱
        let mut arrivals: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        let mut termination = TerminationReason::Completed;

        tracing::info!(
            "Starting workflow '{}' for session {}",
            graph.name(),
            state.session_id()
        );

        while let Some(node_id) = queue.pop_front() {
            if trace.len() >= self.max_steps {
                return Err(WorkflowError::StepLimitExceeded(self.max_steps));
            }
            let node = graph
                .node(&node_id)
                .ok_or_else(|| WorkflowError::UnknownNode(node_id.clone()))?;

            let counts_iteration = graph.iteration_node() == Some(node_id.as_str());
            if counts_iteration && state.iteration_count() >= graph.max_iterations() {
                return Err(WorkflowError::IterationLimitExceeded {
                    node: node_id,
                    limit: graph.max_iterations(),
                });
            }

            tracing::debug!("Running node {}", node_id);
            let outcome = node.run(&state).await.map_err(|e| match e {
                NodeError::MissingInput(reason) => WorkflowError::MissingInput {
                    node: node_id.clone(),
                    reason,
                },
            })?;
            let (patch, degraded) = outcome.into_parts();

            let owned = node.owns();
            if let Some(field) = patch.fields().into_iter().find(|f| !owned.contains(f)) {
                return Err(WorkflowError::ForeignWrite {
                    node: node_id,
                    field,
                });
            }
            state.apply(patch);
            if counts_iteration {
                state.advance_iteration();
            }

            let ran_degraded = degraded.is_some();
            match &degraded {
                Some(reason) => tracing::warn!("Node {} degraded: {}", node_id, reason),
                None => tracing::info!("Node completed: {}", node_id),
            }
            trace.steps.push(StepRecord {
                node: node_id.clone(),
                degraded,
                iteration: state.iteration_count(),
            });

            for succ in graph.successors(&node_id) {
                let needed = graph.predecessors(succ);
                let arrived = arrivals.entry(succ.to_string()).or_default();
                arrived.insert(node_id.clone());
                if needed.iter().all(|p| arrived.contains(*p)) {
                    arrivals.remove(succ);
                    queue.push_back(succ.to_string());
                }
            }

            if let Some(cond) = graph.conditional_from(&node_id) {
                let decision = cond.decide(&state);
                match cond.target(decision.kind()) {
                    Some(Target::End) => {
                        // 降级的质量门给不出真实判定，不能当作通过
                        termination = if ran_degraded {
                            TerminationReason::GateUnavailable
                        } else {
                            decision.termination_reason()
                        };
                        break;
                    }
                    Some(Target::Node(next)) => queue.push_back(next.clone()),
                    None => {
                        return Err(WorkflowError::MissingBranch {
                            from: node_id,
                            kind: decision.kind(),
                        })
                    }
                }
            }
        }

        tracing::info!(
            "Workflow '{}' finished: {} after {} steps, {} iterations",
            graph.name(),
            termination,
            trace.len(),
            state.iteration_count()
        );
        Ok(FinalState::new(state, termination, trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{
        CaseDocuments, LegalAnalysis, PolicyRules, SimulationResult, StateField, StatePatch,
    };
    use crate::workflow::node::{FnNode, NodeOutcome};
    use crate::workflow::router::QualityGateRouter;
    use crate::workflow::WorkflowBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn initial() -> CaseState {
        CaseState::new("test", CaseDocuments::default(), PolicyRules::default())
    }

    fn ok(patch: StatePatch) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::Success(patch))
    }

    /// 修订节点写草稿，审核节点按 feedback_per_pass 依次给出弱点
    fn loop_graph(feedback_per_pass: Vec<Vec<String>>) -> WorkflowGraph {
        let pass = Arc::new(AtomicUsize::new(0));
        let router = QualityGateRouter::default();
        WorkflowBuilder::new("Loop")
            .register(
                "revise",
                FnNode::new(&[StateField::AppealDraft], |s: &CaseState| {
                    ok(StatePatch::new().draft(format!("draft v{}", s.iteration_count() + 1)))
                }),
            )
            .register(
                "audit",
                FnNode::new(&[StateField::AuditFeedback, StateField::RiskScore], move |_: &CaseState| {
                    let i = pass.fetch_add(1, Ordering::SeqCst);
                    let fb = feedback_per_pass
                        .get(i)
                        .or(feedback_per_pass.last())
                        .cloned()
                        .unwrap_or_default();
                    ok(StatePatch::new().feedback(fb).risk(40))
                }),
            )
            .entry("revise")
            .edge("revise", "audit")
            .iteration_node("revise")
            .conditional_edge(
                "audit",
                move |s: &CaseState| router.decide(s),
                [
                    (DecisionKind::Terminate, Target::End),
                    (DecisionKind::Retry, Target::node("revise")),
                ],
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_clean_first_audit_stops_after_one_iteration() {
        let engine = WorkflowEngine::new(Arc::new(loop_graph(vec![vec![]])));
        let result = engine.run(initial()).await.unwrap();

        assert_eq!(result.iteration_count(), 1);
        assert_eq!(result.termination_reason(), TerminationReason::Approved);
        assert_eq!(result.trace().order(), vec!["revise", "audit"]);
        assert_eq!(result.appeal_draft(), Some("draft v1"));
    }

    #[tokio::test]
    async fn test_persistent_feedback_hits_hard_stop() {
        let engine = WorkflowEngine::new(Arc::new(loop_graph(vec![vec!["weak".into()]])));
        let result = engine.run(initial()).await.unwrap();

        assert_eq!(result.iteration_count(), 3);
        assert_eq!(result.termination_reason(), TerminationReason::IterationLimit);
        assert_eq!(result.weaknesses(), ["weak".to_string()]);
        assert_eq!(
            result.trace().order(),
            vec!["revise", "audit", "revise", "audit", "revise", "audit"]
        );
        assert_eq!(result.appeal_draft(), Some("draft v3"));
    }

    #[tokio::test]
    async fn test_feedback_resolved_on_second_pass() {
        let engine = WorkflowEngine::new(Arc::new(loop_graph(vec![
            vec!["no citation".into()],
            vec![],
        ])));
        let result = engine.run(initial()).await.unwrap();

        assert_eq!(result.iteration_count(), 2);
        assert_eq!(result.termination_reason(), TerminationReason::Approved);
        assert!(result.weaknesses().is_empty());
    }

    #[tokio::test]
    async fn test_fan_in_waits_for_all_branches() {
        let graph = WorkflowBuilder::new("Join")
            .register("start", FnNode::new(&[], |_: &CaseState| ok(StatePatch::new())))
            .register(
                "legal",
                FnNode::new(&[StateField::LegalAnalysis], |_: &CaseState| {
                    ok(StatePatch::new().legal(LegalAnalysis::default()))
                }),
            )
            .register(
                "sim",
                FnNode::new(&[StateField::SimulationResult], |_: &CaseState| {
                    ok(StatePatch::new().simulation(SimulationResult::default()))
                }),
            )
            .register(
                "join",
                FnNode::new(&[StateField::AppealDraft], |s: &CaseState| {
                    if s.legal_analysis().is_none() || s.simulation_result().is_none() {
                        return Err(NodeError::MissingInput("branch output".into()));
                    }
                    ok(StatePatch::new().draft("joined"))
                }),
            )
            .entry("start")
            .edge("start", "legal")
            .edge("start", "sim")
            .edge("legal", "join")
            .edge("sim", "join")
            .build()
            .unwrap();

        let result = WorkflowEngine::new(Arc::new(graph)).run(initial()).await.unwrap();
        assert_eq!(result.trace().order(), vec!["start", "legal", "sim", "join"]);
        assert_eq!(result.trace().executions_of("join"), 1);
        assert_eq!(result.termination_reason(), TerminationReason::Completed);
        assert_eq!(result.appeal_draft(), Some("joined"));
    }

    #[tokio::test]
    async fn test_foreign_write_is_rejected() {
        let graph = WorkflowBuilder::new("Foreign")
            .register(
                "rogue",
                FnNode::new(&[StateField::PolicyAnalysis], |_: &CaseState| {
                    ok(StatePatch::new().draft("not mine"))
                }),
            )
            .entry("rogue")
            .build()
            .unwrap();

        let err = WorkflowEngine::new(Arc::new(graph)).run(initial()).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::ForeignWrite {
                node: "rogue".into(),
                field: StateField::AppealDraft
            }
        );
    }

    #[tokio::test]
    async fn test_degraded_node_does_not_abort() {
        let graph = WorkflowBuilder::new("Degraded")
            .register(
                "flaky",
                FnNode::new(&[StateField::LegalAnalysis], |_: &CaseState| {
                    Ok(NodeOutcome::Degraded(
                        StatePatch::new().legal(LegalAnalysis::default()),
                        "timeout".into(),
                    ))
                }),
            )
            .register("after", FnNode::new(&[], |_: &CaseState| ok(StatePatch::new())))
            .entry("flaky")
            .edge("flaky", "after")
            .build()
            .unwrap();

        let result = WorkflowEngine::new(Arc::new(graph)).run(initial()).await.unwrap();
        assert_eq!(result.trace().order(), vec!["flaky", "after"]);
        assert_eq!(result.trace().degraded(), vec![("flaky", "timeout")]);
        assert_eq!(result.state().legal_analysis(), Some(&LegalAnalysis::default()));
    }

    #[tokio::test]
    async fn test_degraded_gate_is_not_reported_as_approval() {
        let graph = WorkflowBuilder::new("Gate")
            .register(
                "revise",
                FnNode::new(&[StateField::AppealDraft], |_: &CaseState| {
                    ok(StatePatch::new().draft("draft"))
                }),
            )
            .register(
                "audit",
                FnNode::new(&[StateField::AuditFeedback, StateField::RiskScore], |_: &CaseState| {
                    Ok(NodeOutcome::Degraded(
                        StatePatch::new().feedback(Vec::new()).risk(0),
                        "503".into(),
                    ))
                }),
            )
            .entry("revise")
            .edge("revise", "audit")
            .iteration_node("revise")
            .conditional_edge(
                "audit",
                |s: &CaseState| QualityGateRouter::default().decide(s),
                [
                    (DecisionKind::Terminate, Target::End),
                    (DecisionKind::Retry, Target::node("revise")),
                ],
            )
            .build()
            .unwrap();

        let result = WorkflowEngine::new(Arc::new(graph)).run(initial()).await.unwrap();
        assert_eq!(result.termination_reason(), TerminationReason::GateUnavailable);
        assert_eq!(result.iteration_count(), 1);
        assert_eq!(result.trace().degraded(), vec![("audit", "503")]);
    }

    #[tokio::test]
    async fn test_missing_input_fails_the_run() {
        let graph = WorkflowBuilder::new("Missing")
            .register(
                "audit",
                FnNode::new(&[], |_: &CaseState| {
                    Err(NodeError::MissingInput("no draft to audit".into()))
                }),
            )
            .entry("audit")
            .build()
            .unwrap();

        let err = WorkflowEngine::new(Arc::new(graph)).run(initial()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingInput { node, .. } if node == "audit"));
    }

    #[tokio::test]
    async fn test_unbounded_cycle_hits_step_limit() {
        let graph = WorkflowBuilder::new("Spin")
            .register("a", FnNode::new(&[], |_: &CaseState| ok(StatePatch::new())))
            .entry("a")
            .conditional_edge(
                "a",
                |_: &CaseState| Decision::Retry,
                [
                    (DecisionKind::Terminate, Target::End),
                    (DecisionKind::Retry, Target::node("a")),
                ],
            )
            .build()
            .unwrap();

        let err = WorkflowEngine::new(Arc::new(graph))
            .with_max_steps(5)
            .run(initial())
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::StepLimitExceeded(5));
    }
}
