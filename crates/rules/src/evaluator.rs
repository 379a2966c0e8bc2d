//! Pure condition matching against a single event.
//!
//! Operands are strings as authored. One that fails to parse for its code
//! makes the condition false; it never aborts the evaluation.

use activities::{ContactState, Event, ProjectId};
use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{AutomationRule, ConditionCode, RuleCondition};

/// AND over all conditions; a rule without conditions matches every event.
pub fn rule_matches(rule: &AutomationRule, event: &Event) -> bool {
    rule.conditions.iter().all(|c| condition_matches(c, event))
}

pub fn condition_matches(condition: &RuleCondition, event: &Event) -> bool {
    let operand = condition.operand.as_str();
    match condition.code {
        ConditionCode::StartDateGreaterThan => {
            compare_start(event, operand, |start, bound| start > bound)
        }
        ConditionCode::StartDateLessThan => compare_start(event, operand, |start, bound| start < bound),
        ConditionCode::ClientIdContains => contains(event.client_id.as_deref(), operand),
        ConditionCode::CorrelationUriContains => contains(event.correlation_uri.as_deref(), operand),
        ConditionCode::ReferrerUrlContains => contains(event.referrer_url.as_deref(), operand),
        ConditionCode::ContactMailContains => contains(event.contact_mail.as_deref(), operand),
        ConditionCode::ProjectIdEquals => match operand.trim().parse::<ProjectId>() {
            Ok(id) => event.project_id == Some(id),
            Err(_) => false,
        },
        ConditionCode::ContactStateEquals => match operand.parse::<ContactState>() {
            Ok(state) => event.contact_state == state,
            Err(_) => false,
        },
    }
}

fn compare_start(
    event: &Event,
    operand: &str,
    cmp: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) -> bool {
    match (event.start_date, parse_date(operand)) {
        (Some(start), Some(bound)) => cmp(start, bound),
        _ => false,
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn contains(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|value| value.to_lowercase().contains(&needle.to_lowercase()))
}
