mod common;

use approval_engine::{ErrorKind, EscalationMonitor, NotificationKind, StaticDirectory};
use approval_types::*;
use chrono::{Duration, Utc};
use common::*;

fn escalating_workflow(rule: EscalationRule) -> WorkflowDefinition {
    workflow("Escalating")
        .with_step(StepDefinition::new("manager", "Manager review", 1, ApproverRule::role("manager")))
        .with_step(StepDefinition::new("cfo", "CFO", 2, ApproverRule::user("carl")))
        .with_escalation_rule(rule)
}

#[tokio::test]
async fn overdue_assignment_moves_to_escalation_target() {
    let h = harness();
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Manager,
    )))
    .await;
    let request = h.engine.submit_for_approval(invoice("inv-1", 500)).await.unwrap();
    let original = h.inbox_one("mia").await;

    let monitor = EscalationMonitor::new(h.engine.clone());
    let later = Utc::now() + Duration::hours(25);
    let escalated = monitor.sweep(later).await.unwrap();
    assert_eq!(escalated, vec![original.id.clone()]);

    let history = h
        .engine
        .list_assignments(&tenant(), &request.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, AssignmentStatus::Escalated);
    assert_eq!(history[0].escalated_to, Some(user("max")));
    assert_eq!(history[0].acted_by, Some(user("system")));
    assert!(history[0]
        .escalation_reason
        .as_deref()
        .is_some_and(|r| r.starts_with("overdue")));
    assert_eq!(history[1].user_id, user("max"));
    assert_eq!(history[1].step_id, original.step_id);
    assert_eq!(history[1].sequence, 1);
    assert!(history[1].is_pending());

    let stored = h.reload(&request).await;
    assert!(stored.is_pending());
    assert_eq!(stored.current_step, 1);
    assert_eq!(stored.completed_steps, 0);

    // the successor was assigned at sweep time, so nothing is overdue yet
    assert!(monitor.sweep(later).await.unwrap().is_empty());

    let notice = h
        .notifier
        .sent()
        .into_iter()
        .find(|n| n.kind == NotificationKind::Escalated)
        .unwrap();
    assert_eq!(notice.recipient, user("max"));
}

#[tokio::test]
async fn nothing_escalates_before_the_deadline() {
    let h = harness();
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Manager,
    )))
    .await;
    h.engine.submit_for_approval(invoice("inv-2", 500)).await.unwrap();

    let monitor = EscalationMonitor::new(h.engine.clone());
    assert!(monitor
        .sweep(Utc::now() + Duration::hours(23))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.inbox_len("mia").await, 1);
}

#[tokio::test]
async fn step_hours_override_rule_hours() {
    let h = harness();
    let mut definition = escalating_workflow(EscalationRule::new(
        "manager",
        72,
        EscalationTarget::Director,
    ));
    definition.steps[0].escalation_hours = Some(2);
    h.install(definition).await;
    h.engine.submit_for_approval(invoice("inv-3", 500)).await.unwrap();

    let monitor = EscalationMonitor::new(h.engine.clone()).with_batch_size(1);
    let escalated = monitor.sweep(Utc::now() + Duration::hours(3)).await.unwrap();
    assert_eq!(escalated.len(), 1);
    assert_eq!(h.inbox_len("dora").await, 1);
}

#[tokio::test]
async fn steps_without_a_rule_are_not_escalatable() {
    let h = harness();
    h.install(two_step_workflow()).await;
    let request = h.engine.submit_for_approval(invoice("inv-4", 500)).await.unwrap();
    let assignment = h.inbox_one("mia").await;

    let err = h.escalate(&request, &assignment).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    let monitor = EscalationMonitor::new(h.engine.clone());
    assert!(monitor
        .sweep(Utc::now() + Duration::days(365))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn ladder_climbs_then_exhausts_then_reassigns() {
    let h = harness();
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Manager,
    )))
    .await;
    let request = h.engine.submit_for_approval(invoice("inv-5", 500)).await.unwrap();

    for (from, to) in [("mia", "max"), ("max", "dora"), ("dora", "carl")] {
        let current = h.inbox_one(from).await;
        let after = h.escalate(&request, &current).await.unwrap();
        assert!(after.is_pending());
        assert_eq!(h.inbox_len(to).await, 1, "{} should hold the step", to);
    }

    let at_ceo = h.inbox_one("carl").await;
    assert_eq!(at_ceo.escalation_level, Some(EscalationTarget::Ceo));
    let exhausted = h.escalate(&request, &at_ceo).await.unwrap();
    assert_eq!(exhausted.status, RequestStatus::Escalated);
    assert_eq!(h.inbox_len("carl").await, 0);
    assert!(h.event_kinds(&request).await.contains(&EventKind::EscalationExhausted));

    let reassigned = h
        .engine
        .reassign_escalated(&tenant(), &request.id, user("fiona"), user("admin"))
        .await
        .unwrap();
    assert!(reassigned.is_pending());
    let fresh = h.inbox_one("fiona").await;
    assert_eq!(fresh.step_id, StepId::new("manager"));
    assert_eq!(fresh.sequence, 4);

    let after = h.approve_as("fiona", &request).await.unwrap();
    assert_eq!(after.current_step, 2);
    assert_eq!(h.inbox_len("carl").await, 1);
}

#[tokio::test]
async fn specific_user_escalation_has_one_tier() {
    let h = harness();
    h.install(escalating_workflow(EscalationRule::to_user(
        "manager",
        24,
        user("controller"),
    )))
    .await;
    let request = h.engine.submit_for_approval(invoice("inv-6", 500)).await.unwrap();

    let first = h.inbox_one("mia").await;
    h.escalate(&request, &first).await.unwrap();
    let second = h.inbox_one("controller").await;
    assert_eq!(second.escalation_level, Some(EscalationTarget::SpecificUser));

    let after = h.escalate(&request, &second).await.unwrap();
    assert_eq!(after.status, RequestStatus::Escalated);
}

#[tokio::test]
async fn escalation_to_the_current_assignee_exhausts_the_ladder() {
    let h = harness_with(directory().with_manager("mia", "mia"));
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Manager,
    )))
    .await;
    let request = h.engine.submit_for_approval(invoice("inv-7", 500)).await.unwrap();
    let assignment = h.inbox_one("mia").await;

    let after = h.escalate(&request, &assignment).await.unwrap();
    assert_eq!(after.status, RequestStatus::Escalated);
    assert_eq!(h.inbox_len("mia").await, 0);
}

#[tokio::test]
async fn unresolvable_escalation_target_commits_nothing() {
    let h = harness_with(
        StaticDirectory::new().with_role("acme", "manager", "mia"),
    );
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Director,
    )))
    .await;
    let request = h.engine.submit_for_approval(invoice("inv-8", 500)).await.unwrap();
    let assignment = h.inbox_one("mia").await;

    let err = h.escalate(&request, &assignment).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unresolvable);
    assert_eq!(h.reload(&request).await.version, request.version);
    assert_eq!(h.inbox_one("mia").await.id, assignment.id);

    // the monitor logs the failure and keeps going
    let monitor = EscalationMonitor::new(h.engine.clone());
    assert!(monitor
        .sweep(Utc::now() + Duration::hours(48))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn reassign_requires_an_escalated_request() {
    let h = harness();
    h.install(two_step_workflow()).await;
    let request = h.engine.submit_for_approval(invoice("inv-9", 500)).await.unwrap();

    let err = h
        .engine
        .reassign_escalated(&tenant(), &request.id, user("fiona"), user("admin"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn approval_before_the_sweep_wins() {
    let h = harness();
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Manager,
    )))
    .await;
    let request = h.engine.submit_for_approval(invoice("inv-10", 500)).await.unwrap();
    h.approve_as("mia", &request).await.unwrap();

    let monitor = EscalationMonitor::new(h.engine.clone());
    let overdue = monitor
        .find_overdue(Utc::now() + Duration::hours(25))
        .await
        .unwrap();
    assert!(overdue.is_empty());
    assert_eq!(h.inbox_len("max").await, 0);
}

#[tokio::test]
async fn unreadable_definition_does_not_stall_the_sweep() {
    use approval_storage::{ApprovalStore, RequestCreation};

    let h = harness();
    h.install(escalating_workflow(EscalationRule::new(
        "manager",
        24,
        EscalationTarget::Manager,
    )))
    .await;
    let healthy = h.engine.submit_for_approval(invoice("inv-11", 500)).await.unwrap();
    let healthy_assignment = h.inbox_one("mia").await;

    // a request pinned to a definition version that was never stored
    let mut orphan = healthy.clone();
    orphan.id = RequestId::generate();
    orphan.entity_id = EntityId::new("inv-orphan");
    orphan.workflow_version = 99;
    let mut stale = healthy_assignment.clone();
    stale.id = AssignmentId::generate();
    stale.request_id = orphan.id.clone();
    stale.user_id = user("nobody");
    stale.assigned_at = Utc::now() - Duration::hours(500);
    h.storage
        .create_request(RequestCreation {
            request: orphan.clone(),
            assignments: vec![stale.clone()],
            events: Vec::new(),
        })
        .await
        .unwrap();

    let monitor = EscalationMonitor::new(h.engine.clone());
    let escalated = monitor.sweep(Utc::now() + Duration::hours(25)).await.unwrap();
    assert_eq!(escalated, vec![healthy_assignment.id.clone()]);

    let orphan_history = h
        .engine
        .list_assignments(&tenant(), &orphan.id)
        .await
        .unwrap();
    assert_eq!(orphan_history.len(), 1);
    assert!(orphan_history[0].is_pending());
}
