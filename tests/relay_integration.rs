//! Relay integration tests
//!
//! End-to-end tests driving the relay controller with the in-memory queue
//! service and orchestrator. Covers call start, step resumption, the
//! rendezvous wait, informational events, routing failures and session
//! queue teardown.

use call_relay::orchestrator::memory::{Resolution, RunStatus, StepContext, StepScript, StepTrigger};
use call_relay::event::session_name;
use call_relay::{
    ActionResult, MemoryOrchestrator, MemoryQueueService, Orchestrator, QueueConfig,
    RelayController, RelayError, RoutingTable, StartOutcome, StartRequest, Teardown,
    WorkflowRoute,
};
use serde_json::{json, Value};
use std::sync::Arc;

const DID: &str = "+15551230000";
const CALLER: &str = "+15559990000";
const TXN: &str = "txn-1";
const SESSION: &str = "call_flow_txn-1";

struct Harness {
    controller: RelayController,
    queues: Arc<MemoryQueueService>,
    orch: Arc<MemoryOrchestrator>,
}

impl Harness {
    fn new(script: Option<StepScript>) -> Self {
        let queues = Arc::new(MemoryQueueService::new());
        let orch = Arc::new(match script {
            Some(script) => MemoryOrchestrator::with_steps(queues.clone(), script),
            None => MemoryOrchestrator::new(),
        });
        let controller = RelayController::new(
            RoutingTable::new(vec![
                WorkflowRoute::new(DID, "arn:flow:main"),
                WorkflowRoute::new("+15554440000", "arn:flow:other"),
            ]),
            QueueConfig {
                receive_wait_secs: 5,
                visibility_timeout_secs: 8,
                ..Default::default()
            },
            queues.clone(),
            orch.clone(),
        )
        .unwrap();
        Self {
            controller,
            queues,
            orch,
        }
    }

    async fn token(&self) -> String {
        self.orch.current_token(SESSION).await.unwrap()
    }
}

/// Speaks the step number; step 1 also echoes the trigger kind
fn speaking_flow() -> StepScript {
    Arc::new(|ctx: &StepContext<'_>| {
        let trigger = match ctx.trigger {
            StepTrigger::Start => "start".to_string(),
            StepTrigger::Success(payload) => payload["InvocationEventType"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        };
        Some(ActionResult::new(vec![json!({
            "Type": "Speak",
            "Parameters": {"Text": format!("step {} after {}", ctx.step, trigger)}
        })]))
    })
}

/// Only the start step produces actions
fn start_only_flow() -> StepScript {
    Arc::new(|ctx: &StepContext<'_>| {
        (ctx.step == 1).then(|| ActionResult::new(vec![json!({"Type": "Pause"})]))
    })
}

fn participant(tag: &str, status: &str) -> Value {
    json!({
        "CallId": format!("call-{}", tag),
        "ParticipantTag": tag,
        "To": DID,
        "From": CALLER,
        "Direction": "Inbound",
        "Status": status
    })
}

fn new_inbound() -> Value {
    json!({
        "SchemaVersion": "1.0",
        "Sequence": 1,
        "InvocationEventType": "NEW_INBOUND_CALL",
        "CallDetails": {
            "TransactionId": TXN,
            "AwsAccountId": "123456789012",
            "SipMediaApplicationId": "sma-1",
            "Participants": [participant("LEG-A", "Connected")]
        }
    })
}

/// A follow-up event carrying the session queue and current wait token
fn follow_up(event_type: &str, token: &str, participants: Vec<Value>) -> Value {
    json!({
        "SchemaVersion": "1.0",
        "InvocationEventType": event_type,
        "ActionData": {"Type": "Speak"},
        "CallDetails": {
            "TransactionId": TXN,
            "SipMediaApplicationId": "sma-1",
            "TransactionAttributes": {
                "QueueUrl": MemoryQueueService::queue_ref(SESSION).as_str(),
                "WaitToken": token
            },
            "Participants": participants
        }
    })
}

// ─── Call start ──────────────────────────────────────────────────

#[tokio::test]
async fn test_inbound_call_returns_first_actions() {
    let h = Harness::new(Some(speaking_flow()));

    let result = h.controller.handle(new_inbound()).await;

    assert_eq!(result.schema_version, "1.0");
    assert_eq!(result.actions.len(), 1);
    assert_eq!(result.actions[0]["Parameters"]["Text"], "step 1 after start");

    let run = h.orch.run(SESSION).await.unwrap();
    assert_eq!(run.template_id, "arn:flow:main");
    assert_eq!(run.input.transaction_id, TXN);
    assert_eq!(run.input.call_id, "call-LEG-A");
    assert_eq!(run.input.sip_media_application_id, "sma-1");
    assert_eq!(run.input.event, new_inbound());
}

#[tokio::test]
async fn test_run_name_matches_session_queue() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;

    let run = h.orch.run(SESSION).await.unwrap();
    assert_eq!(run.name, SESSION);
    assert_eq!(run.input.queue_url, MemoryQueueService::queue_ref(SESSION).as_str());
    assert!(h.queues.exists(SESSION).await);
}

#[tokio::test]
async fn test_queue_exists_before_run_starts() {
    // The start step deposits into the queue from inside `start`; a send
    // to a missing queue would fail the start and leave no actions.
    let h = Harness::new(Some(start_only_flow()));
    let report = h.controller.handle_with_report(new_inbound()).await;
    assert_eq!(report.outcome.unwrap().actions, vec![json!({"Type": "Pause"})]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_creates_nothing_new() {
    let h = Harness::new(Some(start_only_flow()));

    h.controller.handle(new_inbound()).await;
    let report = h.controller.handle_with_report(new_inbound()).await;

    // The redelivered start waits on the existing queue, which is empty
    assert!(matches!(
        report.outcome,
        Err(RelayError::NoActionAvailable { .. })
    ));
    assert_eq!(h.queues.stats().created, 1);
    assert_eq!(h.orch.run_count().await, 1);
    assert_eq!(h.orch.start_attempts().await, 2);
}

#[tokio::test]
async fn test_outbound_call_routes_by_calling_number() {
    let h = Harness::new(Some(speaking_flow()));
    let mut event = new_inbound();
    event["InvocationEventType"] = json!("NEW_OUTBOUND_CALL");
    event["CallDetails"]["Participants"][0]["From"] = json!("+15554440000");
    event["CallDetails"]["Participants"][0]["To"] = json!("+15557770000");

    let result = h.controller.handle(event).await;

    assert_eq!(result.actions.len(), 1);
    assert_eq!(h.orch.run(SESSION).await.unwrap().template_id, "arn:flow:other");
}

#[tokio::test]
async fn test_similar_transaction_ids_get_separate_sessions() {
    let h = Harness::new(Some(speaking_flow()));

    for txn in ["call.1", "call_1"] {
        let mut event = new_inbound();
        event["CallDetails"]["TransactionId"] = json!(txn);
        let result = h.controller.handle(event).await;
        assert_eq!(result.actions[0]["Parameters"]["Text"], "step 1 after start");
    }

    let first = session_name("call_flow_", "call.1");
    let second = session_name("call_flow_", "call_1");
    assert_ne!(first, second);
    assert!(h.queues.exists(&first).await);
    assert!(h.queues.exists(&second).await);
    assert_eq!(h.queues.stats().created, 2);
    assert_eq!(h.orch.run_count().await, 2);
}

// ─── Resumption and the rendezvous ───────────────────────────────

#[tokio::test]
async fn test_action_successful_round_trip() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let event = follow_up("ACTION_SUCCESSFUL", &token, vec![participant("LEG-A", "Connected")]);
    let result = h.controller.handle(event.clone()).await;

    assert_eq!(result.actions[0]["Parameters"]["Text"], "step 2 after ACTION_SUCCESSFUL");
    assert_eq!(
        h.orch.resolutions().await,
        vec![Resolution::Success {
            token,
            payload: event,
        }]
    );
}

#[tokio::test]
async fn test_deposited_actions_returned_verbatim() {
    let deposited = ActionResult::new(vec![
        json!({"Type": "PlayAudio", "Parameters": {"AudioSource": {"Key": "hello.wav"}}}),
        json!({"Type": "ReceiveDigits", "Parameters": {"InputDigitsRegex": "^\\d{4}$"}}),
    ]);
    let script_output = deposited.clone();
    let h = Harness::new(Some(Arc::new(move |_: &StepContext<'_>| {
        Some(script_output.clone())
    })));

    let result = h.controller.handle(new_inbound()).await;

    assert_eq!(result, deposited);
    // Consumed messages are acknowledged and never come back
    let queue = MemoryQueueService::queue_ref(SESSION);
    assert_eq!(h.queues.depth(&queue).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_event_type_resumes_with_success() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let result = h
        .controller
        .handle(follow_up("DIGITS_RECEIVED", &token, vec![participant("LEG-A", "Connected")]))
        .await;

    assert_eq!(result.actions[0]["Parameters"]["Text"], "step 2 after DIGITS_RECEIVED");
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_without_actions() {
    let h = Harness::new(Some(start_only_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let report = h
        .controller
        .handle_with_report(follow_up(
            "ACTION_SUCCESSFUL",
            &token,
            vec![participant("LEG-A", "Connected")],
        ))
        .await;

    assert!(matches!(
        report.outcome,
        Err(RelayError::NoActionAvailable { .. })
    ));
    assert_eq!(report.teardown, Teardown::NotApplicable);
    assert_eq!(report.into_response(), ActionResult::no_action());
    // The step was still resumed
    assert_eq!(h.orch.resolutions().await.len(), 1);
}

#[tokio::test]
async fn test_stale_token_returns_no_action() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;
    h.orch.expire_token(&token).await;

    let report = h
        .controller
        .handle_with_report(follow_up(
            "ACTION_SUCCESSFUL",
            &token,
            vec![participant("LEG-A", "Connected")],
        ))
        .await;

    assert!(matches!(report.outcome, Err(RelayError::StaleToken { .. })));
    assert_eq!(report.into_response(), ActionResult::no_action());
}

// ─── Failures and informational events ───────────────────────────

#[tokio::test]
async fn test_action_failed_resumes_with_failure_without_waiting() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let result = h
        .controller
        .handle(follow_up("ACTION_FAILED", &token, vec![participant("LEG-A", "Connected")]))
        .await;

    assert_eq!(result, ActionResult::no_action());
    assert_eq!(
        h.orch.resolutions().await,
        vec![Resolution::Failure {
            token,
            reason: "ACTION_FAILED".to_string(),
        }]
    );
    assert_eq!(
        h.orch.run(SESSION).await.unwrap().status,
        RunStatus::Failed {
            reason: "ACTION_FAILED".to_string()
        }
    );
}

#[tokio::test]
async fn test_invalid_lambda_response_reported_as_invalid_response() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    h.controller
        .handle(follow_up(
            "INVALID_LAMBDA_RESPONSE",
            &token,
            vec![participant("LEG-A", "Connected")],
        ))
        .await;

    assert_eq!(
        h.orch.resolutions().await,
        vec![Resolution::Failure {
            token,
            reason: "INVALID_RESPONSE".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_informational_events_never_reach_orchestrator() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let interrupted = follow_up("ACTION_INTERRUPTED", &token, vec![participant("LEG-A", "Connected")]);
    let failed_on_hung_up_leg =
        follow_up("ACTION_FAILED", &token, vec![participant("LEG-A", "Disconnected")]);

    for event in [interrupted, failed_on_hung_up_leg] {
        let result = h.controller.handle(event).await;
        assert_eq!(result, ActionResult::no_action());
    }

    assert!(h.orch.resolutions().await.is_empty());
    assert_eq!(h.orch.current_token(SESSION).await, Some(token));
}

// ─── Routing ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unrouted_number_has_no_side_effects() {
    let h = Harness::new(Some(speaking_flow()));
    let mut event = new_inbound();
    event["CallDetails"]["Participants"][0]["To"] = json!("+15550000000");

    let report = h.controller.handle_with_report(event).await;

    match report.outcome {
        Err(RelayError::RouteNotFound { number }) => assert_eq!(number, "+15550000000"),
        other => panic!("expected RouteNotFound, got {:?}", other),
    }
    assert_eq!(h.queues.stats().created, 0);
    assert_eq!(h.orch.start_attempts().await, 0);
}

// ─── Teardown ────────────────────────────────────────────────────

#[tokio::test]
async fn test_final_hangup_deletes_session_queue() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let report = h
        .controller
        .handle_with_report(follow_up("HANGUP", &token, vec![participant("LEG-A", "Disconnected")]))
        .await;

    assert_eq!(report.outcome.unwrap(), ActionResult::no_action());
    assert_eq!(
        report.teardown,
        Teardown::Deleted(MemoryQueueService::queue_ref(SESSION))
    );
    assert!(!h.queues.exists(SESSION).await);
    assert!(matches!(
        h.orch.resolutions().await.as_slice(),
        [Resolution::Failure { reason, .. }] if reason == "HANGUP"
    ));
}

#[tokio::test]
async fn test_hangup_with_stale_token_still_tears_down() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;
    h.orch.expire_token(&token).await;

    let report = h
        .controller
        .handle_with_report(follow_up("HANGUP", &token, vec![participant("LEG-A", "Disconnected")]))
        .await;

    assert!(matches!(report.outcome, Err(RelayError::StaleToken { .. })));
    assert!(matches!(report.teardown, Teardown::Deleted(_)));
    assert!(!h.queues.exists(SESSION).await);
}

#[tokio::test]
async fn test_hangup_without_queue_attribute_looks_up_session() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let mut event = follow_up("HANGUP", &token, vec![participant("LEG-A", "Disconnected")]);
    event["CallDetails"]["TransactionAttributes"]
        .as_object_mut()
        .unwrap()
        .remove("QueueUrl");

    let report = h.controller.handle_with_report(event).await;
    assert!(matches!(report.teardown, Teardown::Deleted(_)));
    assert!(!h.queues.exists(SESSION).await);
}

#[tokio::test]
async fn test_hangup_of_other_leg_keeps_queue() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;

    let report = h
        .controller
        .handle_with_report(follow_up(
            "HANGUP",
            &token,
            vec![
                participant("LEG-A", "Connected"),
                participant("LEG-B", "Disconnected"),
            ],
        ))
        .await;

    assert_eq!(report.teardown, Teardown::NotApplicable);
    assert!(h.queues.exists(SESSION).await);
    assert_eq!(h.queues.stats().deleted, 0);
}

#[tokio::test]
async fn test_repeated_final_hangup_deletes_once() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;
    let token = h.token().await;
    let hangup = follow_up("HANGUP", &token, vec![participant("LEG-A", "Disconnected")]);

    let first = h.controller.handle_with_report(hangup.clone()).await;
    let second = h.controller.handle_with_report(hangup).await;

    assert!(matches!(first.teardown, Teardown::Deleted(_)));
    assert_eq!(second.teardown, Teardown::NoQueue);
    assert_eq!(h.queues.stats().deleted, 1);
}

#[tokio::test]
async fn test_hangup_for_unknown_call_deletes_nothing() {
    let h = Harness::new(None);

    let mut event = follow_up("HANGUP", "tok-none", vec![participant("LEG-A", "Disconnected")]);
    event["CallDetails"]["TransactionAttributes"] = json!({"WaitToken": "tok-none"});

    let report = h.controller.handle_with_report(event).await;

    assert_eq!(report.teardown, Teardown::NoQueue);
    assert_eq!(h.queues.stats().created, 0);
    assert_eq!(h.queues.stats().deleted, 0);
}

#[tokio::test]
async fn test_malformed_event_touches_nothing() {
    let h = Harness::new(Some(speaking_flow()));

    for raw in [
        json!({}),
        json!({"InvocationEventType": "HANGUP", "CallDetails": {"TransactionId": TXN}}),
        json!({"InvocationEventType": 7}),
    ] {
        let report = h.controller.handle_with_report(raw).await;
        assert!(matches!(report.outcome, Err(RelayError::MalformedEvent(_))));
        assert_eq!(report.teardown, Teardown::NotApplicable);
    }
    assert_eq!(h.queues.stats().created, 0);
    assert_eq!(h.orch.start_attempts().await, 0);
}

#[tokio::test]
async fn test_bare_final_hangup_tears_down_despite_routing_failure() {
    let h = Harness::new(Some(speaking_flow()));
    h.controller.handle(new_inbound()).await;

    // No dialed number and no transaction attributes: routing fails, but
    // the call is over and its queue is found by session name.
    let report = h
        .controller
        .handle_with_report(json!({
            "InvocationEventType": "HANGUP",
            "CallDetails": {
                "TransactionId": TXN,
                "Participants": [{"ParticipantTag": "LEG-A", "Status": "Disconnected"}]
            }
        }))
        .await;

    assert!(matches!(report.outcome, Err(RelayError::RouteNotFound { .. })));
    assert_eq!(
        report.teardown,
        Teardown::Deleted(MemoryQueueService::queue_ref(SESSION))
    );
    assert_eq!(h.queues.stats().live, 0);
    assert!(h.orch.resolutions().await.is_empty());
}

/// Delegates to the memory orchestrator but crashes on failure resolution
struct CrashingOnFailure(Arc<MemoryOrchestrator>);

#[async_trait::async_trait]
impl Orchestrator for CrashingOnFailure {
    async fn start(&self, request: &StartRequest) -> call_relay::Result<StartOutcome> {
        self.0.start(request).await
    }

    async fn resolve_success(&self, token: &str, payload: &Value) -> call_relay::Result<()> {
        self.0.resolve_success(token, payload).await
    }

    async fn resolve_failure(&self, _token: &str, reason: &str) -> call_relay::Result<()> {
        panic!("orchestrator client crashed resolving {}", reason);
    }

    fn name(&self) -> &str {
        "crashing"
    }
}

#[tokio::test]
async fn test_panic_during_hangup_still_tears_down() {
    let queues = Arc::new(MemoryQueueService::new());
    let inner = Arc::new(MemoryOrchestrator::with_steps(queues.clone(), speaking_flow()));
    let controller = RelayController::new(
        RoutingTable::new(vec![WorkflowRoute::new(DID, "arn:flow:main")]),
        QueueConfig {
            receive_wait_secs: 5,
            visibility_timeout_secs: 8,
            ..Default::default()
        },
        queues.clone(),
        Arc::new(CrashingOnFailure(inner.clone())),
    )
    .unwrap();

    controller.handle(new_inbound()).await;
    let token = inner.current_token(SESSION).await.unwrap();

    let report = controller
        .handle_with_report(follow_up("HANGUP", &token, vec![participant("LEG-A", "Disconnected")]))
        .await;

    assert!(matches!(report.outcome, Err(RelayError::Internal(_))));
    assert_eq!(
        report.teardown,
        Teardown::Deleted(MemoryQueueService::queue_ref(SESSION))
    );
    assert!(!queues.exists(SESSION).await);

    // The controller keeps serving after the panic
    let mut next = new_inbound();
    next["CallDetails"]["TransactionId"] = json!("txn-2");
    let result = controller.handle(next).await;
    assert_eq!(result.actions.len(), 1);
}

// ─── Full call flow ──────────────────────────────────────────────

#[tokio::test]
async fn test_full_call_flow() {
    let h = Harness::new(Some(speaking_flow()));

    let first = h.controller.handle(new_inbound()).await;
    assert_eq!(first.actions[0]["Parameters"]["Text"], "step 1 after start");

    for step in 2..=4 {
        let token = h.token().await;
        let result = h
            .controller
            .handle(follow_up("ACTION_SUCCESSFUL", &token, vec![participant("LEG-A", "Connected")]))
            .await;
        assert_eq!(
            result.actions[0]["Parameters"]["Text"],
            format!("step {} after ACTION_SUCCESSFUL", step)
        );
    }

    let token = h.token().await;
    let last = h
        .controller
        .handle_with_report(follow_up("HANGUP", &token, vec![participant("LEG-A", "Disconnected")]))
        .await;
    assert_eq!(last.outcome.unwrap(), ActionResult::no_action());
    assert!(matches!(last.teardown, Teardown::Deleted(_)));

    let stats = h.queues.stats();
    assert_eq!((stats.created, stats.deleted, stats.live), (1, 1, 0));
    assert_eq!(h.orch.resolutions().await.len(), 4);
}

#[tokio::test]
async fn test_concurrent_calls_are_isolated() {
    let h = Harness::new(Some(speaking_flow()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let controller = h.controller.clone();
            let mut event = new_inbound();
            event["CallDetails"]["TransactionId"] = json!(format!("txn-{}", i));
            tokio::spawn(async move { controller.handle(event).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.actions[0]["Parameters"]["Text"], "step 1 after start");
    }
    assert_eq!(h.queues.stats().created, 8);
    assert_eq!(h.orch.run_count().await, 8);
}
