//! 各专家节点的结构化输出
//!
//! 字段均带 `#[serde(default)]`：LLM 漏写字段时按空值解析；`Default` 即降级时的中性结果。
//! 所有类型派生 JsonSchema，用于拼入 prompt 作为输出格式说明。

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 百分比字段的宽松解析：接受整数、小数或数字字符串，四舍五入并限制在 0..=100。
/// 模型偶尔给出 `72.5` 或 `300`，不应因此丢掉整份结果。
fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().unwrap_or(0.0),
        Value::Null => 0.0,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a percentage, got {}",
                other
            )))
        }
    };
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

/// 单条保单合规发现
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PolicyFinding {
    /// 具体问题，如 "Missing Prior Auth"
    pub issue: String,
    /// VIOLATION / COMPLIANT / WARNING
    pub status: String,
    pub details: String,
}

/// 保单专家输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PolicyAnalysis {
    pub findings: Vec<PolicyFinding>,
    pub prior_auth_required: bool,
    pub policy_limit_issues: bool,
}

impl PolicyAnalysis {
    /// 问题描述中提到 "Missing" 的发现，视为缺失材料
    pub fn missing_documents(&self) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| f.issue.contains("Missing"))
            .map(|f| f.issue.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClinicalPoint {
    /// 病历中的临床事实
    pub evidence: String,
    /// 该事实为何支持医疗必要性
    pub relevance: String,
}

/// 医疗专家输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MedicalAnalysis {
    pub medical_necessity_found: bool,
    pub clinical_justification: String,
    pub key_evidence: Vec<ClinicalPoint>,
    pub guideline_alignment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LegalArgument {
    pub title: String,
    pub argument_text: String,
    /// 保单条款或判例
    pub citation: String,
}

/// 法律专家输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LegalAnalysis {
    /// 相关法规，如 ERISA、ACA
    pub statutory_basis: String,
    pub arguments: Vec<LegalArgument>,
    /// 保险公司的程序性错误（如错过期限）
    pub procedural_errors: Vec<String>,
}

/// 反事实场景："如果补充 X，批准概率变为 Y"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Scenario {
    pub description: String,
    #[serde(deserialize_with = "percent")]
    #[schemars(with = "u8")]
    pub estimated_probability: u8,
    pub reasoning: String,
}

/// 结果模拟专家输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SimulationResult {
    #[serde(deserialize_with = "percent")]
    #[schemars(with = "u8")]
    pub current_approval_probability: u8,
    pub missing_evidence: Vec<String>,
    pub scenarios: Vec<Scenario>,
}

/// 审核（质量门）输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AuditResult {
    /// 申诉信是否可直接发出
    pub is_sufficient: bool,
    /// 0-100，被拒概率（越低越好）
    #[serde(deserialize_with = "percent")]
    #[schemars(with = "u8")]
    pub risk_score: u8,
    /// 需要修正的弱点
    pub weaknesses: Vec<String>,
    /// 给撰写节点的修改说明
    pub feedback: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_documents_filters_by_issue() {
        let analysis = PolicyAnalysis {
            findings: vec![
                PolicyFinding {
                    issue: "Missing PT Notes".into(),
                    status: "VIOLATION".into(),
                    details: String::new(),
                },
                PolicyFinding {
                    issue: "Prior auth obtained".into(),
                    status: "COMPLIANT".into(),
                    details: String::new(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(analysis.missing_documents(), vec!["Missing PT Notes".to_string()]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let audit: AuditResult = serde_json::from_str(r#"{"risk_score": 40}"#).unwrap();
        assert_eq!(audit.risk_score, 40);
        assert!(audit.weaknesses.is_empty());
        assert!(!audit.is_sufficient);
    }

    #[test]
    fn test_out_of_range_risk_keeps_weaknesses() {
        let audit: AuditResult =
            serde_json::from_str(r#"{"risk_score": 300, "weaknesses": ["No labs"]}"#).unwrap();
        assert_eq!(audit.risk_score, 100);
        assert_eq!(audit.weaknesses, vec!["No labs".to_string()]);

        let audit: AuditResult = serde_json::from_str(r#"{"risk_score": 72.5}"#).unwrap();
        assert_eq!(audit.risk_score, 73);
        let audit: AuditResult = serde_json::from_str(r#"{"risk_score": -4}"#).unwrap();
        assert_eq!(audit.risk_score, 0);
    }

    #[test]
    fn test_probabilities_are_lenient() {
        let sim: SimulationResult = serde_json::from_str(
            r#"{"current_approval_probability": "45%",
                "scenarios": [{"description": "add MRI", "estimated_probability": 95.4}]}"#,
        )
        .unwrap();
        assert_eq!(sim.current_approval_probability, 45);
        assert_eq!(sim.scenarios[0].estimated_probability, 95);
        assert!(serde_json::from_str::<SimulationResult>(r#"{"current_approval_probability": [1]}"#).is_err());
    }
}
