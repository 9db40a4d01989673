//! 案件输入：文档抽取结果与保单规则
//!
//! 结构与上游抽取服务的输出一致：`{"denial": {"structured": {...}}, "bill": {...}, "doctor": {...}}`。
//! 未识别的字段保留在 `extra` 中，原样传给专家节点。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单份已抽取文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extracted<T> {
    pub structured: T,
}

/// 拒赔信中的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DenialLetter {
    pub insurer: Option<String>,
    pub denial_code: Option<String>,
    pub denial_reason: Option<String>,
    pub procedure: Option<String>,
    pub patient_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 医疗账单中的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalBill {
    pub patient_insurance: Option<String>,
    pub procedure_name: Option<String>,
    pub cpt_code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 一个案件的全部文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDocuments {
    #[serde(default)]
    pub denial: Option<Extracted<DenialLetter>>,
    #[serde(default)]
    pub bill: Option<Extracted<MedicalBill>>,
    /// 医生病历，结构因机构而异
    #[serde(default)]
    pub doctor: Option<Extracted<Value>>,
}

/// 从文档中解析出的拒赔模式键组成部分（均可能缺失）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenialKeyParts {
    pub insurer: Option<String>,
    pub denial_code: Option<String>,
    pub procedure: Option<String>,
    pub cpt_code: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl CaseDocuments {
    pub fn denial_letter(&self) -> Option<&DenialLetter> {
        self.denial.as_ref().map(|d| &d.structured)
    }

    pub fn bill(&self) -> Option<&MedicalBill> {
        self.bill.as_ref().map(|d| &d.structured)
    }

    pub fn clinical_notes(&self) -> Option<&Value> {
        self.doctor.as_ref().map(|d| &d.structured)
    }

    /// 保险公司优先取拒赔信，其次账单上的投保信息；项目同理，CPT 码只来自账单
    pub fn denial_key_parts(&self) -> DenialKeyParts {
        let denial = self.denial_letter();
        let bill = self.bill();
        DenialKeyParts {
            insurer: non_blank(denial.and_then(|d| d.insurer.as_ref()))
                .or_else(|| non_blank(bill.and_then(|b| b.patient_insurance.as_ref()))),
            denial_code: non_blank(denial.and_then(|d| d.denial_code.as_ref())),
            procedure: non_blank(denial.and_then(|d| d.procedure.as_ref()))
                .or_else(|| non_blank(bill.and_then(|b| b.procedure_name.as_ref()))),
            cpt_code: non_blank(bill.and_then(|b| b.cpt_code.as_ref())),
        }
    }
}

/// 适用的保单规则（格式由规则库决定，引擎不解析）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyRules(pub Value);

impl PolicyRules {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}
