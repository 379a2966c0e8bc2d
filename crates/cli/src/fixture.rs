//! JSON fixtures the CLI runs against in place of a hosting system.

use std::path::Path;
use std::sync::Arc;

use activities::memory::{CatalogFixture, InMemoryCatalog, TracingMailSender};
use activities::{JobScheduler, RandomIds, Services, SystemClock};
use anyhow::Context;
use rules::{AutomationRule, InMemoryEventStore, InMemoryRuleStore, RuleApplyingEventLog, RuleEngine};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixture {
    #[serde(flatten)]
    pub catalog: CatalogFixture,
    pub rules: Vec<AutomationRule>,
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read fixture {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid fixture {}", path.display()))
    }
}

/// Collaborators backed by the fixture, plus the stores for inspection.
pub struct Wiring {
    pub catalog: Arc<InMemoryCatalog>,
    pub events: Arc<InMemoryEventStore>,
    pub services: Services,
}

pub fn wire(
    fixture: Fixture,
    scheduler: Arc<dyn JobScheduler>,
    ticket_lifetime: chrono::Duration,
) -> Wiring {
    let catalog = Arc::new(InMemoryCatalog::from_fixture(fixture.catalog));
    let events = Arc::new(InMemoryEventStore::new());
    let engine = RuleEngine::new(Arc::new(InMemoryRuleStore::new(fixture.rules)));
    let services = Services {
        catalog: catalog.clone(),
        events: Arc::new(RuleApplyingEventLog::new(events.clone(), engine)),
        scheduler,
        mail: Arc::new(TracingMailSender),
        clock: Arc::new(SystemClock),
        ids: Arc::new(RandomIds),
        ticket_lifetime,
    };
    Wiring { catalog, events, services }
}
