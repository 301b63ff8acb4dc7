use serde::{Deserialize, Serialize};

use crate::core::Finding;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionEntry {
    pub id: usize,
    pub resource_kind: String,
    pub resource_name: String,
    pub error_text: String,
    pub step_text: String,
    pub full_details: String,
    pub is_custom: bool,
}

impl SolutionEntry {
    pub fn from_finding(id: usize, finding: &Finding, step_text: impl Into<String>) -> Self {
        Self {
            id,
            resource_kind: finding.resource_kind.clone(),
            resource_name: finding.resource_name.clone(),
            error_text: finding.error_text.clone(),
            step_text: step_text.into(),
            full_details: finding.details_text.clone(),
            is_custom: false,
        }
    }

    /// An operator-written step addressing the same issue as `key`.
    pub fn custom(id: usize, key: &GroupKey, text: impl Into<String>) -> Self {
        Self {
            id,
            resource_kind: key.resource_kind.clone(),
            resource_name: key.resource_name.clone(),
            error_text: key.error_text.clone(),
            step_text: text.into(),
            full_details: String::new(),
            is_custom: true,
        }
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            resource_kind: self.resource_kind.clone(),
            resource_name: self.resource_name.clone(),
            error_text: self.error_text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub resource_kind: String,
    pub resource_name: String,
    pub error_text: String,
}
