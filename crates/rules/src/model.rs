//! Automation rules as authored by a project owner.

use activities::{CategoryId, UserId};
use serde::{Deserialize, Serialize};

pub type RuleId = i64;

/// Event field a condition inspects, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionCode {
    StartDateGreaterThan,
    StartDateLessThan,
    ClientIdContains,
    CorrelationUriContains,
    ReferrerUrlContains,
    ProjectIdEquals,
    ContactStateEquals,
    ContactMailContains,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub code: ConditionCode,
    /// Raw operand as authored; parsed per code at evaluation time.
    pub operand: String,
}

impl RuleCondition {
    pub fn new(code: ConditionCode, operand: impl Into<String>) -> Self {
        Self { code, operand: operand.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "operand")]
pub enum RuleAction {
    Remove,
    Categorize(CategoryId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: RuleId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

fn default_enabled() -> bool {
    true
}

impl AutomationRule {
    pub fn new(id: RuleId, owner_id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            name: name.into(),
            enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn when(mut self, code: ConditionCode, operand: impl Into<String>) -> Self {
        self.conditions.push(RuleCondition::new(code, operand));
        self
    }

    pub fn then(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_deserializes_from_authored_json() {
        let rule: AutomationRule = serde_json::from_value(serde_json::json!({
            "id": 3,
            "ownerId": "owner-1",
            "name": "spam filter",
            "conditions": [{ "code": "ReferrerUrlContains", "operand": "spam" }],
            "actions": [{ "code": "Remove" }, { "code": "Categorize", "operand": 9 }]
        }))
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.conditions[0].code, ConditionCode::ReferrerUrlContains);
        assert_eq!(rule.actions, vec![RuleAction::Remove, RuleAction::Categorize(9)]);
    }
}
