//! Tests for the tree executor and the continuation job.
//!
//! Trees run against the built-in activities wired to the in-memory
//! collaborators from `activities::mock`; `MockActivity` stands in where a
//! test only cares about which nodes were visited.

use std::sync::{Arc, Mutex};

use activities::mock::{
    sample_contact, sample_project, sample_template, MockActivity, MockBehaviour, MockServices,
};
use activities::{
    ActionId, ActionNode, ActionType, Activity, ActivityError, ActivityResult, ActivityStatus,
    AuthTicket, CollaboratorError, Contact, ContactState, ContinuationRequest, ExecutionContext,
    Flow, Services,
};
use queue::{Job, JobHandler};
use rules::{
    AutomationRule, ConditionCode, InMemoryEventStore, InMemoryRuleStore, RuleAction,
    RuleApplyingEventLog, RuleEngine,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::{ActivityRegistry, ContinuationJob, EngineConfig, EngineError, TreeExecutor};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn node(id: ActionId, action_type: ActionType, options: Value) -> ActionNode {
    ActionNode::new(id, 1, action_type, format!("{action_type} {id}")).with_options(options)
}

fn sequence(id: ActionId, children: impl IntoIterator<Item = ActionNode>) -> ActionNode {
    node(id, ActionType::Sequence, Value::Null).with_children(children)
}

fn condition(id: ActionId, conditions: Value) -> ActionNode {
    node(id, ActionType::Condition, json!({ "conditions": conditions }))
}

fn log(id: ActionId) -> ActionNode {
    node(id, ActionType::Log, Value::Null)
}

fn executor(registry: ActivityRegistry) -> TreeExecutor {
    TreeExecutor::new(registry, EngineConfig::default())
}

fn builtin(mocks: &MockServices) -> ActivityRegistry {
    ActivityRegistry::builtin(&mocks.services())
}

/// A shared journal plus a registry where `types` are mocked into it.
fn journaled(
    mocks: &MockServices,
    types: &[ActionType],
) -> (ActivityRegistry, Arc<Mutex<Vec<ActionId>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = types.iter().fold(builtin(mocks), |r, t| {
        r.with(*t, Arc::new(MockActivity::succeeding(t.to_string()).sharing(calls.clone())))
    });
    (registry, calls)
}

fn visited(calls: &Arc<Mutex<Vec<ActionId>>>) -> Vec<ActionId> {
    calls.lock().unwrap().clone()
}

fn ctx_for(root: &ActionNode) -> ExecutionContext {
    ExecutionContext::new(sample_project(), root.id)
}

fn registered(mocks: &MockServices) -> Contact {
    mocks.catalog.add_contact(sample_contact())
}

async fn run(exec: &TreeExecutor, root: &ActionNode, ctx: &mut ExecutionContext) -> ActivityResult {
    exec.run_tree(root, ctx, &CancellationToken::new()).await.expect("run completes")
}

// ============================================================
// Traversal and pruning
// ============================================================

#[tokio::test]
async fn failed_condition_prunes_only_its_own_subtree() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::SendMail, ActionType::Log]);
    let root = sequence(1, [
        condition(2, json!([{ "type": "ContactExists", "value": "true" }])).with_children([log(3)]),
        node(4, ActionType::SendMail, json!({ "templateId": 1 })),
    ]);

    let result = run(&executor(registry), &root, &mut ctx_for(&root)).await;

    assert_eq!(visited(&calls), vec![4]);
    assert!(result.is_success());
}

#[tokio::test]
async fn execution_order_is_pre_order() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::Log, ActionType::Control]);
    let root = sequence(1, [
        node(2, ActionType::Control, Value::Null).with_children([log(3), log(4)]),
        log(5),
        node(6, ActionType::Control, Value::Null).with_children([log(7)]),
    ]);

    run(&executor(registry), &root, &mut ctx_for(&root)).await;

    assert_eq!(visited(&calls), vec![2, 3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn outcome_is_the_roots_result_only() {
    let mocks = MockServices::new();
    let registry = builtin(&mocks).with(
        ActionType::Log,
        Arc::new(MockActivity::new("log", MockBehaviour::Forbid)),
    );
    let root = sequence(1, [log(2)]);
    let result = run(&executor(registry.clone()), &root, &mut ctx_for(&root)).await;
    assert_eq!(result.status, ActivityStatus::Success);

    let forbidden_root = log(9);
    let result = run(&executor(registry), &forbidden_root, &mut ctx_for(&forbidden_root)).await;
    assert_eq!(result.status, ActivityStatus::Forbidden);
}

#[tokio::test]
async fn root_redirect_url_is_returned() {
    let mocks = MockServices::new();
    let root = node(1, ActionType::Redirect, json!({ "url": "https://landing.example.com/{token}" }))
        .with_children([log(2)]);
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));

    let result = run(&executor(builtin(&mocks)), &root, &mut ctx).await;

    assert!(result.is_success());
    assert!(result.return_url.unwrap().starts_with("https://landing.example.com/"));
    assert_eq!(mocks.events.events().len(), 1);
}

#[tokio::test]
async fn disabled_nodes_are_skipped_with_their_subtree() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::Log, ActionType::Control]);
    let mut disabled = node(2, ActionType::Control, Value::Null).with_children([log(3)]);
    disabled.enabled = false;
    let root = sequence(1, [disabled, log(4)]);
    let exec = executor(registry);

    run(&exec, &root, &mut ctx_for(&root)).await;
    assert_eq!(visited(&calls), vec![4]);

    let mut disabled_root = log(9);
    disabled_root.enabled = false;
    let result = run(&exec, &disabled_root, &mut ctx_for(&disabled_root)).await;
    assert_eq!(result.status, ActivityStatus::Failed);
    assert_eq!(visited(&calls), vec![4]);
}

#[tokio::test]
async fn unregistered_type_fails_that_node_only() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = ActivityRegistry::new()
        .with(ActionType::Sequence, Arc::new(MockActivity::succeeding("seq").sharing(calls.clone())))
        .with(ActionType::Log, Arc::new(MockActivity::succeeding("log").sharing(calls.clone())));
    let root = sequence(1, [
        node(2, ActionType::SendMail, json!({ "templateId": 1 })).with_children([log(3)]),
        log(4),
    ]);

    let result = run(&executor(registry), &root, &mut ctx_for(&root)).await;

    assert!(result.is_success());
    assert_eq!(visited(&calls), vec![1, 4]);
}

#[tokio::test]
async fn collaborator_fault_prunes_the_branch() {
    let mocks = MockServices::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let control = MockActivity::succeeding("control")
        .on(2, MockBehaviour::Error(CollaboratorError::Backend("catalog down".into())))
        .sharing(calls.clone());
    let registry = builtin(&mocks)
        .with(ActionType::Control, Arc::new(control))
        .with(ActionType::Log, Arc::new(MockActivity::succeeding("log").sharing(calls.clone())));
    let root = sequence(1, [
        node(2, ActionType::Control, Value::Null).with_children([log(3)]),
        node(4, ActionType::Control, Value::Null).with_children([log(5)]),
    ]);

    let result = run(&executor(registry), &root, &mut ctx_for(&root)).await;

    assert!(result.is_success());
    assert_eq!(visited(&calls), vec![2, 4, 5]);
}

#[tokio::test]
async fn failing_root_propagates_collaborator_detail() {
    let mocks = MockServices::new();
    let registry = builtin(&mocks).with(
        ActionType::Log,
        Arc::new(MockActivity::new("log", MockBehaviour::Error(CollaboratorError::Backend("disk full".into())))),
    );
    let root = log(1);
    let result = run(&executor(registry), &root, &mut ctx_for(&root)).await;
    assert_eq!(result.status, ActivityStatus::Failed);
    assert!(result.detail.unwrap().contains("disk full"));
}

#[tokio::test]
async fn nodes_below_max_depth_fail() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::Log, ActionType::Control]);
    let root = sequence(1, [
        node(2, ActionType::Control, Value::Null).with_children([log(3)]),
    ]);
    let exec = TreeExecutor::new(registry, EngineConfig { max_depth: 1, ..EngineConfig::default() });

    run(&exec, &root, &mut ctx_for(&root)).await;

    assert_eq!(visited(&calls), vec![2]);
}

// ============================================================
// Cancellation
// ============================================================

#[tokio::test]
async fn cancellation_aborts_the_rest_of_the_run() {
    let mocks = MockServices::new();
    let cancel = CancellationToken::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log_mock = MockActivity::succeeding("log")
        .on(2, MockBehaviour::CancelRun(cancel.clone()))
        .sharing(calls.clone());
    let registry = builtin(&mocks).with(ActionType::Log, Arc::new(log_mock));
    let root = sequence(1, [log(2), log(3)]);

    let err = executor(registry).run_tree(&root, &mut ctx_for(&root), &cancel).await.unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(visited(&calls), vec![2]);
}

#[tokio::test]
async fn already_cancelled_run_does_nothing() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::Log]);
    let root = sequence(1, [log(2)]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = executor(registry).run_tree(&root, &mut ctx_for(&root), &cancel).await.unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert!(visited(&calls).is_empty());
}

// ============================================================
// Context propagation
// ============================================================

#[tokio::test]
async fn ticket_issued_by_authenticate_is_seen_by_redirect() {
    let mocks = MockServices::new();
    let root = sequence(1, [
        node(2, ActionType::Authenticate, Value::Null),
        node(3, ActionType::Redirect, json!({ "url": "https://landing.example.com/" })),
    ]);
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));

    run(&executor(builtin(&mocks)), &root, &mut ctx).await;

    assert!(ctx.auth_ticket.is_some());
    assert!(ctx.is_authenticated_at(mocks.clock.now()));
}

#[tokio::test]
async fn contact_registered_earlier_receives_mail() {
    let mocks = MockServices::new();
    mocks.catalog.add_template(sample_template(5));
    let root = sequence(1, [
        node(2, ActionType::Register, Value::Null),
        node(3, ActionType::SendMail, json!({ "templateId": 5 })),
    ]);
    let mut ctx = ctx_for(&root).with_contact(sample_contact());

    run(&executor(builtin(&mocks)), &root, &mut ctx).await;

    assert_eq!(ctx.contact_state, ContactState::Added);
    assert_eq!(mocks.catalog.contact_count(), 1);
    let sent = mocks.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header.to.email, sample_contact().email);
}

#[tokio::test]
async fn unregistered_contact_cannot_be_mailed_afterwards() {
    let mocks = MockServices::new();
    mocks.catalog.add_template(sample_template(5));
    let root = sequence(1, [
        node(2, ActionType::Unregister, Value::Null),
        node(3, ActionType::SendMail, json!({ "templateId": 5 })),
    ]);
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));

    run(&executor(builtin(&mocks)), &root, &mut ctx).await;

    assert_eq!(ctx.contact_state, ContactState::Deleted);
    assert!(mocks.mail.sent().is_empty());
}

// ============================================================
// Condition evaluation through the executor
// ============================================================

#[tokio::test]
async fn failing_date_condition_short_circuits_tag_query() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::Log]);
    let future = (mocks.clock.now() + chrono::Duration::days(10)).to_rfc3339();
    let root = condition(1, json!([
        { "type": "DateGreaterThanOrEqualTo", "value": future },
        { "type": "ContactWithTag", "value": 7 }
    ]))
    .with_children([log(2)]);
    let contact = mocks.catalog.add_contact(sample_contact().with_tags([7]));
    let mut ctx = ctx_for(&root).with_contact(contact);

    let result = run(&executor(registry), &root, &mut ctx).await;

    assert_eq!(result.status, ActivityStatus::Failed);
    assert_eq!(mocks.catalog.tag_queries(), 0);
    assert!(visited(&calls).is_empty());
}

#[tokio::test]
async fn tag_conditions_are_batched_into_one_query() {
    let mocks = MockServices::new();
    let (registry, calls) = journaled(&mocks, &[ActionType::Log]);
    let root = condition(1, json!([
        { "type": "ContactWithTag", "value": 7 },
        { "type": "ContactWithTag", "value": 8 },
        { "type": "ContactWithoutTag", "value": 9 }
    ]))
    .with_children([log(2)]);
    let contact = mocks.catalog.add_contact(sample_contact().with_tags([7, 8]));
    let mut ctx = ctx_for(&root).with_contact(contact);

    let result = run(&executor(registry), &root, &mut ctx).await;

    assert!(result.is_success());
    assert_eq!(mocks.catalog.tag_queries(), 1);
    assert_eq!(visited(&calls), vec![2]);
}

// ============================================================
// Schedule and continuation
// ============================================================

fn scheduled_tree() -> ActionNode {
    sequence(1, [
        node(2, ActionType::Schedule, json!({ "offsetTime": "02:00" }))
            .with_children([log(3), log(4)]),
        log(5),
    ])
}

fn continuation(mocks: &MockServices, services: &Services) -> ContinuationJob {
    let exec = Arc::new(executor(ActivityRegistry::builtin(services)));
    ContinuationJob::new(mocks.catalog.clone(), exec)
}

#[tokio::test]
async fn schedule_never_descends_in_the_same_run() {
    let mocks = MockServices::new();
    let root = scheduled_tree();
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));

    let result = run(&executor(builtin(&mocks)), &root, &mut ctx).await;

    assert!(result.is_success());
    // Only the sibling after the Schedule node logged.
    let logged: Vec<_> = mocks.events.events().iter().map(|e| e.action_id).collect();
    assert_eq!(logged, vec![Some(5)]);

    let jobs = mocks.scheduler.jobs();
    assert_eq!(jobs.len(), 1);
    let (run_at, request) = &jobs[0];
    assert_eq!(*run_at, mocks.clock.now() + chrono::Duration::hours(2));
    assert_eq!(request.child_ids, vec![3, 4]);
    assert_eq!(request.snapshot.action_id, 2);
}

#[tokio::test]
async fn schedule_as_root_reports_failed_and_suspended() {
    let mocks = MockServices::new();
    let root = scheduled_tree().children.remove(0);
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));

    let result = run(&executor(builtin(&mocks)), &root, &mut ctx).await;

    assert_eq!(result.status, ActivityStatus::Failed);
    assert_eq!(result.flow, Flow::Suspend);
    assert!(mocks.events.events().is_empty());
}

#[tokio::test]
async fn continuation_runs_current_children_in_order_with_snapshot_context() {
    let mocks = MockServices::new();
    let root = scheduled_tree();
    mocks.catalog.put_action(root.clone());
    let contact = registered(&mocks);
    let mut ctx = ctx_for(&root).with_contact(contact.clone());
    ctx.contact_state = ContactState::Modified;

    let services = mocks.services();
    run(&executor(ActivityRegistry::builtin(&services)), &root, &mut ctx).await;
    let (_, request) = mocks.scheduler.jobs().remove(0);

    // Edit the tree after scheduling: the continuation must see the edit.
    let edited = node(2, ActionType::Schedule, json!({ "offsetTime": "02:00" }))
        .with_children([log(3), log(6), log(4)]);
    mocks.catalog.put_action(ActionNode { parent_id: Some(1), ..edited });

    continuation(&mocks, &services)
        .resume_schedule(request.snapshot, 2, &CancellationToken::new())
        .await
        .unwrap();

    let resumed: Vec<_> = mocks.events.events().into_iter().skip(1).collect();
    let ids: Vec<_> = resumed.iter().map(|e| e.action_id).collect();
    assert_eq!(ids, vec![Some(3), Some(6), Some(4)]);
    assert!(resumed.iter().all(|e| e.contact_id == contact.id));
    assert!(resumed.iter().all(|e| e.contact_state == ContactState::Modified));
}

#[tokio::test]
async fn continuation_without_live_definition_has_no_effect() {
    let mocks = MockServices::new();
    let root = scheduled_tree();
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));
    let snapshot = ctx.snapshot(2);
    let services = mocks.services();
    let job = continuation(&mocks, &services);
    let cancel = CancellationToken::new();

    // Action missing from the catalog.
    job.resume_schedule(snapshot.clone(), 2, &cancel).await.unwrap();

    // Action present but childless.
    mocks.catalog.put_action(node(2, ActionType::Schedule, json!({ "offsetTime": "01:00" })));
    job.resume_schedule(snapshot.clone(), 2, &cancel).await.unwrap();

    // Project gone.
    mocks.catalog.put_action(scheduled_tree());
    ctx.project.id = 42;
    job.resume_schedule(ctx.snapshot(2), 2, &cancel).await.unwrap();

    assert!(mocks.events.events().is_empty());
}

/// Records the context every node it runs for sees.
#[derive(Default)]
struct ContextRecorder {
    seen: Mutex<Vec<ExecutionContext>>,
}

#[async_trait::async_trait]
impl Activity for ContextRecorder {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        self.seen.lock().unwrap().push(ctx.clone());
        Ok(ActivityResult::success())
    }
}

fn assert_same_run_state(actual: &ExecutionContext, expected: &ExecutionContext) {
    assert_eq!(actual.project, expected.project);
    assert_eq!(actual.auth_ticket, expected.auth_ticket);
    assert_eq!(actual.anonymous_id, expected.anonymous_id);
    assert_eq!(actual.contact, expected.contact);
    assert_eq!(actual.contact_state, expected.contact_state);
    assert_eq!(actual.properties, expected.properties);
    assert_eq!(actual.event, expected.event);
}

#[tokio::test]
async fn snapshot_round_trip_yields_the_same_context() {
    let mocks = MockServices::new();
    let root = scheduled_tree();
    mocks.catalog.put_action(root.clone());
    let contact = registered(&mocks);
    let now = mocks.clock.now();

    let mut ctx = ctx_for(&root).with_contact(contact.clone());
    ctx.anonymous_id = Some(uuid::Uuid::from_u128(7));
    ctx.auth_ticket = Some(AuthTicket {
        contact_id: contact.id.unwrap(),
        anonymous_id: uuid::Uuid::from_u128(7),
        issued_at: now,
        expires_at: now + chrono::Duration::days(30),
    });
    ctx.contact_state = ContactState::Added;
    ctx.set_property("campaign", json!({ "code": "SPRING" }));
    ctx.event.correlation_uri = Some("req-1".into());

    let snapshot = ctx.snapshot(2);
    let wire = serde_json::to_string(&ContinuationRequest { snapshot: snapshot.clone(), child_ids: vec![3, 4] }).unwrap();
    let decoded: ContinuationRequest = serde_json::from_str(&wire).unwrap();
    assert_eq!(decoded.snapshot, snapshot);

    let rebuilt = ExecutionContext::from_snapshot(decoded.snapshot.clone(), sample_project());
    assert_eq!(rebuilt.root_action, 2);
    assert_same_run_state(&rebuilt, &ctx);

    // The resumed children run with exactly that state.
    let recorder = Arc::new(ContextRecorder::default());
    let registry = builtin(&mocks).with(ActionType::Log, recorder.clone());
    let job = ContinuationJob::new(mocks.catalog.clone(), Arc::new(executor(registry)));
    job.resume_schedule(decoded.snapshot, 2, &CancellationToken::new()).await.unwrap();

    let seen = recorder.seen.lock().unwrap().clone();
    let ids: Vec<_> = seen.iter().map(|c| c.current_action.id).collect();
    assert_eq!(ids, vec![3, 4]);
    for resumed in &seen {
        assert_eq!(resumed.root_action, 2);
        assert_same_run_state(resumed, &ctx);
    }
}

#[tokio::test]
async fn continuation_job_handles_queued_payload() {
    let mocks = MockServices::new();
    let root = scheduled_tree();
    mocks.catalog.put_action(root.clone());
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));
    let services = mocks.services();
    run(&executor(ActivityRegistry::builtin(&services)), &root, &mut ctx).await;

    let (run_at, request) = mocks.scheduler.jobs().remove(0);
    let queued = Job::continuation(&request, run_at, 2).unwrap();
    let handler = continuation(&mocks, &services);
    assert_eq!(handler.kind(), activities::CONTINUATION_JOB_KIND);

    handler.handle(&queued, &CancellationToken::new()).await.unwrap();

    let ids: Vec<_> = mocks.events.events().iter().map(|e| e.action_id).collect();
    assert_eq!(ids, vec![Some(5), Some(3), Some(4)]);
}

#[tokio::test]
async fn malformed_payload_is_a_handler_error() {
    let mocks = MockServices::new();
    let services = mocks.services();
    let job = Job::new(activities::CONTINUATION_JOB_KIND, json!({ "nope": true }), mocks.clock.now(), 2);
    assert!(continuation(&mocks, &services).handle(&job, &CancellationToken::new()).await.is_err());
}

// ============================================================
// Log feeding the rule engine
// ============================================================

#[tokio::test]
async fn logged_events_pass_through_owner_rules() {
    let mocks = MockServices::new();
    let store = Arc::new(InMemoryEventStore::new());
    let rules = InMemoryRuleStore::new([
        AutomationRule::new(1, "owner-1", "tag checkout visits")
            .when(ConditionCode::CorrelationUriContains, "/checkout")
            .then(RuleAction::Categorize(3)),
        AutomationRule::new(2, "owner-1", "drop internal traffic")
            .when(ConditionCode::ContactMailContains, "@internal.example")
            .then(RuleAction::Remove),
    ]);
    let services = Services {
        events: Arc::new(RuleApplyingEventLog::new(store.clone(), RuleEngine::new(Arc::new(rules)))),
        ..mocks.services()
    };
    let root = sequence(1, [log(2), log(3)]);
    let mut ctx = ctx_for(&root).with_contact(registered(&mocks));
    ctx.event.correlation_uri = Some("https://shop.example.com/checkout".into());

    run(&executor(ActivityRegistry::builtin(&services)), &root, &mut ctx).await;

    let stored = store.all();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|e| e.category_id == Some(3) && !e.deleted));
    assert_eq!(stored[1].parent_id, stored[0].id);

    let internal = mocks.catalog.add_contact(Contact::new(1, "qa@internal.example"));
    let mut ctx = ctx_for(&root).with_contact(internal);
    run(&executor(ActivityRegistry::builtin(&services)), &root, &mut ctx).await;
    assert_eq!(store.live().len(), 2);
}
