//! Typed per-step configuration.
//!
//! Nodes carry their options as an untyped JSON document. [`StepConfig::parse`]
//! turns it into the variant matching the node's [`ActionType`], so an
//! activity never inspects raw JSON and a malformed document surfaces as a
//! [`ConfigError`] instead of a runtime cast failure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use crate::error::ConfigError;
use crate::model::{ActionType, TagId, TemplateId};

/// Configuration of one step, keyed by step type.
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
    Sequence,
    Control,
    Condition(ConditionConfig),
    Authenticate(AuthenticateConfig),
    Register,
    Unregister,
    SetTags(SetTagsConfig),
    SendMail(SendMailConfig),
    Redirect(RedirectConfig),
    Schedule(ScheduleConfig),
    Log(LogConfig),
}

impl StepConfig {
    pub fn parse(action_type: ActionType, options: &Value) -> Result<Self, ConfigError> {
        // Steps without required fields accept absent options.
        let options = match options {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let config = match action_type {
            ActionType::Sequence => Self::Sequence,
            ActionType::Control => Self::Control,
            ActionType::Register => Self::Register,
            ActionType::Unregister => Self::Unregister,
            ActionType::Condition => Self::Condition(from_value(action_type, options)?),
            ActionType::Authenticate => Self::Authenticate(from_value(action_type, options)?),
            ActionType::SetTags => Self::SetTags(from_value(action_type, options)?),
            ActionType::SendMail => Self::SendMail(from_value(action_type, options)?),
            ActionType::Redirect => {
                let config: RedirectConfig = from_value(action_type, options)?;
                if config.url.trim().is_empty() {
                    return Err(ConfigError::InvalidField {
                        action_type,
                        field: "url",
                        message: "must not be empty".into(),
                    });
                }
                Self::Redirect(config)
            }
            ActionType::Schedule => {
                let raw: RawScheduleConfig = from_value(action_type, options)?;
                let offset = parse_offset(&raw.offset_time).ok_or_else(|| {
                    ConfigError::InvalidField {
                        action_type,
                        field: "offsetTime",
                        message: format!("'{}' is not of the form [d.]hh:mm[:ss]", raw.offset_time),
                    }
                })?;
                Self::Schedule(ScheduleConfig { start_date: raw.start_date, offset })
            }
            ActionType::Log => Self::Log(from_value(action_type, options)?),
        };
        Ok(config)
    }
}

fn from_value<T: for<'de> Deserialize<'de>>(
    action_type: ActionType,
    options: Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(options).map_err(|source| ConfigError::Malformed { action_type, source })
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionConfig {
    #[serde(default)]
    pub conditions: Vec<ConditionClause>,
}

/// One declared condition. The operand stays textual until evaluation so an
/// unparsable operand stops evaluation at its position.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionClause {
    #[serde(rename = "type")]
    pub code: ConditionCode,
    #[serde(deserialize_with = "operand_as_string", default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ConditionCode {
    DateGreaterThanOrEqualTo,
    DateLessThanOrEqualTo,
    Authenticated,
    ContactExists,
    ContactWithTag,
    ContactWithoutTag,
}

fn operand_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Authenticate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateConfig {
    /// Overrides the engine-wide ticket lifetime.
    pub lifetime_seconds: Option<u32>,
}

// ---------------------------------------------------------------------------
// SetTags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SetTagsConfig {
    #[serde(default)]
    pub include: Vec<TagId>,
    #[serde(default)]
    pub exclude: Vec<TagId>,
}

// ---------------------------------------------------------------------------
// SendMail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailConfig {
    pub template_id: TemplateId,
}

// ---------------------------------------------------------------------------
// Redirect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedirectConfig {
    /// Target URL; `{token}` is replaced by the opaque redirect token.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScheduleConfig {
    start_date: Option<DateTime<Utc>>,
    offset_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Absolute start; `None` means "when the step runs".
    pub start_date: Option<DateTime<Utc>>,
    pub offset: Duration,
}

impl ScheduleConfig {
    /// Instant the deferred subtree should run, never earlier than `now`.
    /// `None` when the instant is past the representable range.
    pub fn target(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let target = self.start_date.unwrap_or(now).checked_add_signed(self.offset)?;
        Some(target.max(now))
    }
}

/// Parse `[d.]hh:mm[:ss]` into a duration.
fn parse_offset(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (days, clock) = match raw.split_once('.') {
        Some((d, rest)) => (d.parse::<i64>().ok()?, rest),
        None => (0, raw),
    };

    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() || days < 0 || !(0..24).contains(&hours) {
        return None;
    }
    if !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }

    Duration::try_days(days)?
        .checked_add(&Duration::try_hours(hours)?)?
        .checked_add(&Duration::try_minutes(minutes)?)?
        .checked_add(&Duration::try_seconds(seconds)?)
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogConfig {
    /// Log without contact identity.
    #[serde(default)]
    pub anonymous: bool,
    pub name: Option<String>,
}
