//! 案件状态：在工作流图中流转的唯一记录
//!
//! - 输入（文档、保单规则、历史模式提示）只在构造时写入，之后只读
//! - 每个专家输出字段只归一个节点所有，节点通过 [`StatePatch`] 写回
//! - 迭代计数不在补丁中：由引擎在修订节点每次执行后 +1，只增不减

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::case::documents::{CaseDocuments, PolicyRules};
use crate::case::findings::{LegalAnalysis, MedicalAnalysis, PolicyAnalysis, SimulationResult};
use crate::memory::PatternHint;

/// 风险分上限
pub const MAX_RISK_SCORE: u8 = 100;

/// 节点可写的状态字段；用于声明归属与校验补丁
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    PolicyAnalysis,
    MedicalAnalysis,
    LegalAnalysis,
    SimulationResult,
    AppealDraft,
    AuditFeedback,
    RiskScore,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateField::PolicyAnalysis => "policy_analysis",
            StateField::MedicalAnalysis => "medical_analysis",
            StateField::LegalAnalysis => "legal_analysis",
            StateField::SimulationResult => "simulation_result",
            StateField::AppealDraft => "appeal_draft",
            StateField::AuditFeedback => "audit_feedback",
            StateField::RiskScore => "risk_score",
        };
        f.write_str(name)
    }
}

/// 节点返回的部分更新：`None` 表示不修改该字段
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub policy_analysis: Option<PolicyAnalysis>,
    pub medical_analysis: Option<MedicalAnalysis>,
    pub legal_analysis: Option<LegalAnalysis>,
    pub simulation_result: Option<SimulationResult>,
    pub appeal_draft: Option<String>,
    pub audit_feedback: Option<Vec<String>>,
    pub risk_score: Option<u8>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, analysis: PolicyAnalysis) -> Self {
        self.policy_analysis = Some(analysis);
        self
    }

    pub fn medical(mut self, analysis: MedicalAnalysis) -> Self {
        self.medical_analysis = Some(analysis);
        self
    }

    pub fn legal(mut self, analysis: LegalAnalysis) -> Self {
        self.legal_analysis = Some(analysis);
        self
    }

    pub fn simulation(mut self, result: SimulationResult) -> Self {
        self.simulation_result = Some(result);
        self
    }

    pub fn draft(mut self, text: impl Into<String>) -> Self {
        self.appeal_draft = Some(text.into());
        self
    }

    pub fn feedback(mut self, weaknesses: Vec<String>) -> Self {
        self.audit_feedback = Some(weaknesses);
        self
    }

    pub fn risk(mut self, score: u8) -> Self {
        self.risk_score = Some(score);
        self
    }

    /// 补丁实际触及的字段
    pub fn fields(&self) -> Vec<StateField> {
        let mut fields = Vec::new();
        if self.policy_analysis.is_some() {
            fields.push(StateField::PolicyAnalysis);
        }
        if self.medical_analysis.is_some() {
            fields.push(StateField::MedicalAnalysis);
        }
        if self.legal_analysis.is_some() {
            fields.push(StateField::LegalAnalysis);
        }
        if self.simulation_result.is_some() {
            fields.push(StateField::SimulationResult);
        }
        if self.appeal_draft.is_some() {
            fields.push(StateField::AppealDraft);
        }
        if self.audit_feedback.is_some() {
            fields.push(StateField::AuditFeedback);
        }
        if self.risk_score.is_some() {
            fields.push(StateField::RiskScore);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// 案件状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseState {
    session_id: String,
    documents: CaseDocuments,
    policy_rules: PolicyRules,
    past_pattern: Option<PatternHint>,

    policy_analysis: Option<PolicyAnalysis>,
    medical_analysis: Option<MedicalAnalysis>,
    legal_analysis: Option<LegalAnalysis>,
    simulation_result: Option<SimulationResult>,

    appeal_draft: Option<String>,
    audit_feedback: Vec<String>,
    risk_score: u8,
    iteration_count: u32,
}

impl CaseState {
    /// 初始状态：所有专家输出为空，迭代计数为 0
    pub fn new(
        session_id: impl Into<String>,
        documents: CaseDocuments,
        policy_rules: PolicyRules,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            documents,
            policy_rules,
            past_pattern: None,
            policy_analysis: None,
            medical_analysis: None,
            legal_analysis: None,
            simulation_result: None,
            appeal_draft: None,
            audit_feedback: Vec::new(),
            risk_score: 0,
            iteration_count: 0,
        }
    }

    /// 注入历史拒赔模式提示（仅在运行前由编排器设置）
    pub fn with_past_pattern(mut self, hint: Option<PatternHint>) -> Self {
        self.past_pattern = hint;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn documents(&self) -> &CaseDocuments {
        &self.documents
    }

    pub fn policy_rules(&self) -> &PolicyRules {
        &self.policy_rules
    }

    pub fn past_pattern(&self) -> Option<&PatternHint> {
        self.past_pattern.as_ref()
    }

    pub fn policy_analysis(&self) -> Option<&PolicyAnalysis> {
        self.policy_analysis.as_ref()
    }

    pub fn medical_analysis(&self) -> Option<&MedicalAnalysis> {
        self.medical_analysis.as_ref()
    }

    pub fn legal_analysis(&self) -> Option<&LegalAnalysis> {
        self.legal_analysis.as_ref()
    }

    pub fn simulation_result(&self) -> Option<&SimulationResult> {
        self.simulation_result.as_ref()
    }

    /// 当前申诉信草稿；空白文本视为没有草稿
    pub fn appeal_draft(&self) -> Option<&str> {
        self.appeal_draft
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }

    pub fn audit_feedback(&self) -> &[String] {
        &self.audit_feedback
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// 按字段合并补丁（字段级后写覆盖，未出现的字段保持不变）
    pub(crate) fn apply(&mut self, patch: StatePatch) {
        let StatePatch {
            policy_analysis,
            medical_analysis,
            legal_analysis,
            simulation_result,
            appeal_draft,
            audit_feedback,
            risk_score,
        } = patch;

        if let Some(v) = policy_analysis {
            self.policy_analysis = Some(v);
        }
        if let Some(v) = medical_analysis {
            self.medical_analysis = Some(v);
        }
        if let Some(v) = legal_analysis {
            self.legal_analysis = Some(v);
        }
        if let Some(v) = simulation_result {
            self.simulation_result = Some(v);
        }
        if let Some(v) = appeal_draft {
            self.appeal_draft = Some(v);
        }
        if let Some(v) = audit_feedback {
            self.audit_feedback = v;
        }
        if let Some(v) = risk_score {
            self.risk_score = v.min(MAX_RISK_SCORE);
        }
    }

    /// 修订节点执行一次后调用；只由引擎调用
    pub(crate) fn advance_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.iteration_count
    }
}
