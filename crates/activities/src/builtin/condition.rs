//! Condition step: AND over the declared conditions.
//!
//! Evaluation runs in two phases. Phase 1 walks the conditions in order and
//! evaluates the cheap ones on the spot, stopping at the first one that
//! fails or cannot be parsed. Tag conditions only collect ids. Phase 2
//! resolves every collected tag with a single catalog query.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ConditionCode, ConditionConfig, ConditionClause, StepConfig};
use crate::traits::ensure_not_cancelled;
use crate::{
    ActionCatalog, Activity, ActivityError, ActivityResult, Clock, CollaboratorError,
    ExecutionContext, TagId,
};

/// Result of evaluating a condition list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionVerdict {
    pub passed: bool,
    /// Conditions examined in phase 1 before it finished or stopped.
    pub evaluated: usize,
    pub tag_query_issued: bool,
}

pub struct ConditionActivity {
    catalog: Arc<dyn ActionCatalog>,
    clock: Arc<dyn Clock>,
}

impl ConditionActivity {
    pub fn new(catalog: Arc<dyn ActionCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self { catalog, clock }
    }

    pub async fn evaluate(
        &self,
        ctx: &ExecutionContext,
        config: &ConditionConfig,
    ) -> Result<ConditionVerdict, CollaboratorError> {
        let now = self.clock.now();
        let mut include: BTreeSet<TagId> = BTreeSet::new();
        let mut exclude: BTreeSet<TagId> = BTreeSet::new();
        let mut evaluated = 0;

        for clause in &config.conditions {
            evaluated += 1;
            let holds = match phase_one(clause, ctx, now, &mut include, &mut exclude) {
                Some(holds) => holds,
                None => {
                    debug!("unparsable {:?} operand '{}'", clause.code, clause.value);
                    false
                }
            };
            if !holds {
                return Ok(ConditionVerdict { passed: false, evaluated, tag_query_issued: false });
            }
        }

        if include.is_empty() && exclude.is_empty() {
            return Ok(ConditionVerdict { passed: true, evaluated, tag_query_issued: false });
        }

        let contact_id = match ctx.contact_id() {
            Some(id) if !ctx.contact_deleted() => id,
            _ => return Ok(ConditionVerdict { passed: false, evaluated, tag_query_issued: false }),
        };

        let passed = self.catalog.has_business_tags(contact_id, &include, &exclude).await?;
        Ok(ConditionVerdict { passed, evaluated, tag_query_issued: true })
    }
}

/// `None` means the operand did not parse.
fn phase_one(
    clause: &ConditionClause,
    ctx: &ExecutionContext,
    now: DateTime<Utc>,
    include: &mut BTreeSet<TagId>,
    exclude: &mut BTreeSet<TagId>,
) -> Option<bool> {
    match clause.code {
        ConditionCode::DateGreaterThanOrEqualTo => parse_date(&clause.value).map(|d| now >= d),
        ConditionCode::DateLessThanOrEqualTo => parse_date(&clause.value).map(|d| now <= d),
        ConditionCode::Authenticated => {
            parse_bool(&clause.value).map(|expected| ctx.is_authenticated_at(now) == expected)
        }
        ConditionCode::ContactExists => {
            parse_bool(&clause.value).map(|expected| ctx.has_live_contact() == expected)
        }
        ConditionCode::ContactWithTag => {
            let id = clause.value.trim().parse::<TagId>().ok()?;
            include.insert(id);
            Some(true)
        }
        ConditionCode::ContactWithoutTag => {
            let id = clause.value.trim().parse::<TagId>().ok()?;
            exclude.insert(id);
            Some(true)
        }
    }
}

/// RFC 3339 timestamps, or plain dates taken as midnight UTC.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl Activity for ConditionActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        let config = match ctx.current_action.config() {
            Ok(StepConfig::Condition(config)) => config,
            Ok(_) => return Ok(ActivityResult::failed()),
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };

        let verdict = match self.evaluate(ctx, &config).await {
            Ok(v) => v,
            Err(e) => return super::rejected(e),
        };
        debug!(
            action_id = ctx.current_action.id,
            passed = verdict.passed,
            evaluated = verdict.evaluated,
            "condition evaluated"
        );

        Ok(if verdict.passed { ActivityResult::success() } else { ActivityResult::failed() })
    }
}
