//! 申诉编排器：组装专家图、查询/写回拒赔模式记忆、驱动一次完整运行
//!
//! 流程：提取模式键 → 查询历史建议（可选）→ 运行工作流 → 写回本次学到的模式。
//! 记忆层的任何失败只记 warn，不影响本次运行的结果。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{
    AppealExperts, AUDITOR_NODE, LEGAL_NODE, MEDICAL_NODE, NEGOTIATOR_NODE, POLICY_NODE,
    SIMULATOR_NODE,
};
use crate::case::{CaseDocuments, CaseState, DenialKeyParts, PolicyRules};
use crate::config::AppConfig;
use crate::core::error::AppealError;
use crate::llm::{create_groq_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{
    PatternHint, PatternKey, PatternQuery, PatternStore, DEFAULT_SUGGESTION_THRESHOLD,
};
use crate::workflow::{
    DecisionKind, FinalState, QualityGateRouter, Target, WorkflowBuilder, WorkflowEngine,
    WorkflowError, WorkflowGraph,
};

/// 医疗分析给出关键证据时记录的解决方式
pub const CLINICAL_JUSTIFICATION: &str = "Clinical Justification";

/// 申诉图：policy → medical → {legal, simulator} → negotiator → auditor ⇒ {End | negotiator}
pub fn build_appeal_graph(
    experts: &AppealExperts,
    max_iterations: u32,
) -> Result<WorkflowGraph, WorkflowError> {
    let router = QualityGateRouter::new(max_iterations);
    WorkflowBuilder::new("appeal")
        .register_arc(POLICY_NODE, experts.policy.clone())
        .register_arc(MEDICAL_NODE, experts.medical.clone())
        .register_arc(LEGAL_NODE, experts.legal.clone())
        .register_arc(SIMULATOR_NODE, experts.simulator.clone())
        .register_arc(NEGOTIATOR_NODE, experts.negotiator.clone())
        .register_arc(AUDITOR_NODE, experts.auditor.clone())
        .entry(POLICY_NODE)
        .edge(POLICY_NODE, MEDICAL_NODE)
        .edge(MEDICAL_NODE, LEGAL_NODE)
        .edge(MEDICAL_NODE, SIMULATOR_NODE)
        .edge(LEGAL_NODE, NEGOTIATOR_NODE)
        .edge(SIMULATOR_NODE, NEGOTIATOR_NODE)
        .edge(NEGOTIATOR_NODE, AUDITOR_NODE)
        .conditional_edge(
            AUDITOR_NODE,
            move |state: &CaseState| router.decide(state),
            [
                (DecisionKind::Terminate, Target::End),
                (DecisionKind::Retry, Target::node(NEGOTIATOR_NODE)),
            ],
        )
        .iteration_node(NEGOTIATOR_NODE)
        .max_iterations(router.max_iterations())
        .build()
}

/// 未配置模型时 OpenAI 后端使用的模型
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// 由配置与可用的 API Key 决定的推理后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    /// 模型与端点为空时用 Groq 默认值
    Groq {
        model: Option<String>,
        base_url: Option<String>,
    },
    OpenAi {
        model: String,
        base_url: Option<String>,
    },
    Mock,
}

impl LlmBackend {
    pub fn select(cfg: &AppConfig, has_openai_key: bool, has_groq_key: bool) -> Self {
        let provider = cfg.llm.provider.to_lowercase();
        let base_url = cfg.llm.base_url.clone();
        match provider.as_str() {
            "groq" if has_groq_key || has_openai_key => LlmBackend::Groq {
                model: cfg.llm.model.clone(),
                base_url,
            },
            "openai" if has_openai_key => LlmBackend::OpenAi {
                model: cfg
                    .llm
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url,
            },
            _ => LlmBackend::Mock,
        }
    }

    pub fn into_client(self) -> Arc<dyn LlmClient> {
        match self {
            LlmBackend::Groq { model, base_url } => {
                let client = create_groq_client(model.as_deref(), base_url.as_deref());
                tracing::info!("Using Groq LLM ({})", client.model());
                Arc::new(client)
            }
            LlmBackend::OpenAi { model, base_url } => {
                tracing::info!("Using OpenAI LLM ({})", model);
                Arc::new(OpenAiClient::new(base_url.as_deref(), &model, None))
            }
            LlmBackend::Mock => {
                tracing::warn!("No API key set or provider unsupported, using Mock LLM");
                Arc::new(MockLlmClient::new())
            }
        }
    }
}

/// 根据配置与环境变量选择推理后端（OpenAI 兼容 / Groq / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    LlmBackend::select(
        cfg,
        std::env::var("OPENAI_API_KEY").is_ok(),
        std::env::var("GROQ_API_KEY").is_ok(),
    )
    .into_client()
}

/// 申诉编排器
///
/// 图在构造时建好并共享；模式存储可选（关闭记忆时为 None）。
#[derive(Clone)]
pub struct AppealOrchestrator {
    engine: Arc<WorkflowEngine>,
    store: Option<Arc<dyn PatternStore>>,
    suggestion_threshold: u64,
}

impl AppealOrchestrator {
    pub fn new(experts: AppealExperts, max_iterations: u32) -> Result<Self, AppealError> {
        let graph = build_appeal_graph(&experts, max_iterations)?;
        Ok(Self {
            engine: Arc::new(WorkflowEngine::new(Arc::new(graph))),
            store: None,
            suggestion_threshold: DEFAULT_SUGGESTION_THRESHOLD,
        })
    }

    /// 所有专家共用同一推理客户端
    pub fn with_llm(
        llm: Arc<dyn LlmClient>,
        timeout: Duration,
        max_iterations: u32,
    ) -> Result<Self, AppealError> {
        Self::new(AppealExperts::with_llm(llm, timeout), max_iterations)
    }

    pub fn with_memory(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_suggestion_threshold(mut self, threshold: u64) -> Self {
        self.suggestion_threshold = threshold;
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        self.engine.graph()
    }

    /// 运行一次完整的申诉流程
    pub async fn run_workflow(
        &self,
        documents: CaseDocuments,
        rules: PolicyRules,
    ) -> Result<FinalState, AppealError> {
        let parts = documents.denial_key_parts();
        let past_pattern = self.lookup(&parts).await;

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!("Starting appeal workflow (session {})", session_id);
        let initial = CaseState::new(session_id, documents, rules).with_past_pattern(past_pattern);

        let final_state = self.engine.run(initial).await?;
        self.learn(&parts, &final_state).await;
        Ok(final_state)
    }

    /// 在后台任务中运行，返回可取消的句柄
    pub fn spawn_workflow(&self, documents: CaseDocuments, rules: PolicyRules) -> WorkflowHandle {
        let token = CancellationToken::new();
        let child = token.child_token();
        let orchestrator = self.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {
                    tracing::warn!("Appeal workflow cancelled");
                    Err(AppealError::Cancelled)
                }
                result = orchestrator.run_workflow(documents, rules) => result,
            }
        });
        WorkflowHandle { token, task }
    }

    async fn lookup(&self, parts: &DenialKeyParts) -> Option<PatternHint> {
        let store = self.store.clone()?;
        let (insurer, denial_code) = match (&parts.insurer, &parts.denial_code) {
            (Some(i), Some(c)) => (i.clone(), c.clone()),
            _ => return None,
        };
        let query = PatternQuery::new(Some(&insurer), Some(&denial_code), parts.procedure.as_deref());
        let threshold = self.suggestion_threshold;

        match tokio::task::spawn_blocking(move || store.suggest(&query, threshold)).await {
            Ok(Ok(suggestion)) => {
                let hint = suggestion.into_hint();
                match &hint {
                    Some(h) => tracing::info!("Found past pattern: {}", h.message),
                    None => tracing::info!("No matching past patterns found"),
                }
                hint
            }
            Ok(Err(e)) => {
                tracing::warn!("Memory retrieval failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Memory retrieval task failed: {}", e);
                None
            }
        }
    }

    async fn learn(&self, parts: &DenialKeyParts, final_state: &FinalState) {
        let Some(store) = self.store.clone() else {
            return;
        };
        if parts.insurer.is_none() || parts.denial_code.is_none() {
            return;
        }

        let state = final_state.state();
        let missing_docs = state
            .policy_analysis()
            .map(|p| p.missing_documents())
            .unwrap_or_default();
        let resolved_by: Vec<String> = state
            .medical_analysis()
            .filter(|m| !m.key_evidence.is_empty())
            .map(|_| vec![CLINICAL_JUSTIFICATION.to_string()])
            .unwrap_or_default();

        let key = PatternKey::new(
            parts.insurer.as_deref(),
            parts.denial_code.as_deref(),
            parts.procedure.as_deref(),
        );
        let code = parts.cpt_code.clone();

        let result = tokio::task::spawn_blocking(move || {
            store.record(&key, code.as_deref(), &missing_docs, &resolved_by)
        })
        .await;
        match result {
            Ok(Ok(record)) => tracing::info!(
                "Pattern recorded/updated ({} occurrences)",
                record.occurrence_count
            ),
            Ok(Err(e)) => tracing::warn!("Memory store failed: {}", e),
            Err(e) => tracing::warn!("Memory store task failed: {}", e),
        }
    }
}

/// 后台运行的句柄：可取消，可等待结果
#[derive(Debug)]
pub struct WorkflowHandle {
    token: CancellationToken,
    task: JoinHandle<Result<FinalState, AppealError>>,
}

impl WorkflowHandle {
    /// 取消运行；已完成的运行不受影响
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn join(self) -> Result<FinalState, AppealError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(AppealError::Cancelled),
            Err(e) => Err(AppealError::Join(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appeal_graph_topology() {
        let experts = AppealExperts::with_llm(Arc::new(MockLlmClient::new()), Duration::from_secs(1));
        let graph = build_appeal_graph(&experts, 3).unwrap();

        assert_eq!(graph.entry(), POLICY_NODE);
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.successors(MEDICAL_NODE), vec![LEGAL_NODE, SIMULATOR_NODE]);
        assert_eq!(graph.predecessors(NEGOTIATOR_NODE).len(), 2);
        assert_eq!(graph.iteration_node(), Some(NEGOTIATOR_NODE));

        let cond = graph.conditional_from(AUDITOR_NODE).unwrap();
        assert_eq!(cond.target(DecisionKind::Terminate), Some(&Target::End));
        assert_eq!(
            cond.target(DecisionKind::Retry),
            Some(&Target::node(NEGOTIATOR_NODE))
        );
    }

    #[test]
    fn test_backend_honours_configured_model() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "groq".into();
        cfg.llm.model = Some("llama-3.1-8b-instant".into());
        cfg.llm.base_url = Some("http://groq.internal/v1".into());
        assert_eq!(
            LlmBackend::select(&cfg, false, true),
            LlmBackend::Groq {
                model: Some("llama-3.1-8b-instant".into()),
                base_url: Some("http://groq.internal/v1".into()),
            }
        );
        assert_eq!(LlmBackend::select(&cfg, false, false), LlmBackend::Mock);

        cfg.llm.provider = "openai".into();
        cfg.llm.model = None;
        assert_eq!(
            LlmBackend::select(&cfg, true, false),
            LlmBackend::OpenAi {
                model: DEFAULT_OPENAI_MODEL.into(),
                base_url: Some("http://groq.internal/v1".into()),
            }
        );
    }

    #[test]
    fn test_iteration_cap_is_clamped() {
        let experts = AppealExperts::with_llm(Arc::new(MockLlmClient::new()), Duration::from_secs(1));
        assert_eq!(build_appeal_graph(&experts, 10).unwrap().max_iterations(), 3);
        assert_eq!(build_appeal_graph(&experts, 0).unwrap().max_iterations(), 1);
    }
}
