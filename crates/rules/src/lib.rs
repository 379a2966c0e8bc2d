//! `rules` crate: automation rules applied to freshly logged events.
//!
//! [`RuleEngine`] decides what a user's rules do to one event;
//! [`RuleApplyingEventLog`] is the `EventLog` that records events and runs
//! the engine once per created event.

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod event_log;
pub mod model;
pub mod store;

pub use engine::{apply_rules, RuleEngine, RuleOutcome};
pub use error::RuleError;
pub use event_log::RuleApplyingEventLog;
pub use model::{AutomationRule, ConditionCode, RuleAction, RuleCondition, RuleId};
pub use store::{EventStore, InMemoryEventStore, InMemoryRuleStore, RuleStore};
