//! `RuleEngine`: applies an owner's automation rules to one event.

use std::sync::Arc;

use activities::{CategoryId, Event};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::evaluator::rule_matches;
use crate::model::{AutomationRule, RuleAction, RuleId};
use crate::store::RuleStore;
use crate::RuleError;

/// What the matching rules did to the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub matched: Vec<RuleId>,
    pub removed: bool,
    /// Category after all actions ran.
    pub category_id: Option<CategoryId>,
}

pub struct RuleEngine {
    rules: Arc<dyn RuleStore>,
}

impl RuleEngine {
    pub fn new(rules: Arc<dyn RuleStore>) -> Self {
        Self { rules }
    }

    /// Load the owner's rules and apply them to `event` in place.
    #[instrument(skip(self, event), fields(event_id = ?event.id))]
    pub async fn evaluate(&self, event: &mut Event) -> Result<RuleOutcome, RuleError> {
        let owner = event
            .owner_id
            .clone()
            .ok_or(RuleError::MissingOwner { event_id: event.id })?;
        let rules = self.rules.rules_for_owner(&owner).await?;
        Ok(apply_rules(rules, event))
    }
}

/// Rules run in ascending id order. Once the event is removed, remaining
/// Categorize actions are skipped.
pub fn apply_rules(mut rules: Vec<AutomationRule>, event: &mut Event) -> RuleOutcome {
    rules.sort_by_key(|r| r.id);
    let mut outcome = RuleOutcome::default();

    for rule in rules.iter().filter(|r| r.enabled) {
        if !rule_matches(rule, event) {
            continue;
        }
        debug!(rule_id = rule.id, rule = %rule.name, "rule matched");
        outcome.matched.push(rule.id);

        for action in &rule.actions {
            match action {
                RuleAction::Remove => event.deleted = true,
                RuleAction::Categorize(category) if !event.deleted => {
                    event.category_id = Some(*category);
                }
                RuleAction::Categorize(_) => {}
            }
        }
    }

    outcome.removed = event.deleted;
    outcome.category_id = event.category_id;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionCode;
    use crate::store::InMemoryRuleStore;

    fn event() -> Event {
        Event {
            id: Some(10),
            owner_id: Some("owner-1".into()),
            project_id: Some(1),
            referrer_url: Some("https://spam.example.org".into()),
            ..Event::default()
        }
    }

    fn on_project(id: RuleId) -> AutomationRule {
        AutomationRule::new(id, "owner-1", format!("rule {id}"))
            .when(ConditionCode::ProjectIdEquals, "1")
    }

    #[test]
    fn remove_twice_is_a_no_op() {
        let rules = vec![
            on_project(1).then(RuleAction::Remove),
            on_project(2).then(RuleAction::Remove),
        ];
        let mut event = event();
        let outcome = apply_rules(rules.clone(), &mut event);
        assert!(outcome.removed);
        assert_eq!(outcome.matched, vec![1, 2]);

        let again = apply_rules(rules, &mut event);
        assert!(again.removed);
        assert_eq!(event, Event { deleted: true, ..self::event() });
    }

    #[test]
    fn last_categorize_wins_in_id_order() {
        // Declared out of order; evaluation sorts by id.
        let rules = vec![
            on_project(7).then(RuleAction::Categorize(70)),
            on_project(3).then(RuleAction::Categorize(30)),
        ];
        let mut event = event();
        let outcome = apply_rules(rules, &mut event);
        assert_eq!(outcome.matched, vec![3, 7]);
        assert_eq!(outcome.category_id, Some(70));
        assert_eq!(event.category_id, Some(70));
    }

    #[test]
    fn categorize_after_remove_is_skipped() {
        let rules = vec![on_project(1).then(RuleAction::Remove).then(RuleAction::Categorize(5))];
        let mut event = event();
        let outcome = apply_rules(rules, &mut event);
        assert!(outcome.removed);
        assert_eq!(outcome.category_id, None);
    }

    #[test]
    fn disabled_and_unmatched_rules_do_nothing() {
        let mut disabled = on_project(1).then(RuleAction::Remove);
        disabled.enabled = false;
        let unmatched = AutomationRule::new(2, "owner-1", "other project")
            .when(ConditionCode::ProjectIdEquals, "2")
            .then(RuleAction::Categorize(1));
        let mut event = event();
        let outcome = apply_rules(vec![disabled, unmatched], &mut event);
        assert_eq!(outcome, RuleOutcome::default());
    }

    #[test]
    fn rule_without_conditions_applies_to_every_event() {
        let catch_all = AutomationRule::new(3, "owner-1", "catch-all").then(RuleAction::Categorize(9));
        let mut event = event();
        let outcome = apply_rules(vec![catch_all], &mut event);
        assert_eq!(outcome.matched, vec![3]);
        assert_eq!(event.category_id, Some(9));
    }

    #[tokio::test]
    async fn evaluate_requires_an_owner() {
        let engine = RuleEngine::new(Arc::new(InMemoryRuleStore::default()));
        let mut event = Event { owner_id: None, ..event() };
        let err = engine.evaluate(&mut event).await.unwrap_err();
        assert!(matches!(err, RuleError::MissingOwner { event_id: Some(10) }));
    }

    #[tokio::test]
    async fn evaluate_uses_only_the_owners_rules() {
        let store = InMemoryRuleStore::new([
            on_project(1).then(RuleAction::Categorize(4)),
            AutomationRule { owner_id: "someone-else".into(), ..on_project(2).then(RuleAction::Remove) },
        ]);
        let engine = RuleEngine::new(Arc::new(store));
        let mut event = event();
        let outcome = engine.evaluate(&mut event).await.unwrap();
        assert_eq!(outcome.matched, vec![1]);
        assert!(!outcome.removed);
        assert_eq!(outcome.category_id, Some(4));
    }
}
