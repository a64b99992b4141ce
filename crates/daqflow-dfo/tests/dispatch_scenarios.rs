//! End-to-end dispatch scenarios over the in-memory transport.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use daqflow_core::{RunNumber, TriggerNumber};
use daqflow_dfo::config::{DfoConfig, TrbConnection};
use daqflow_dfo::counters::DfoCounters;
use daqflow_dfo::decision::{CompletionToken, TriggerDecision};
use daqflow_dfo::dispatcher::Dispatcher;
use daqflow_dfo::orchestrator::DataFlowOrchestrator;
use daqflow_dfo::registry::WorkerRegistry;
use daqflow_dfo::source::ChannelDecisionSource;
use daqflow_dfo::transport::memory::InMemoryTransport;
use daqflow_dfo::transport::Transport;

const TOKEN_CONNECTION: &str = "trb_tokens";

fn decision(trigger: u64, run: u32) -> TriggerDecision {
    TriggerDecision::new(TriggerNumber::new(trigger), RunNumber::new(run))
}

fn two_worker_config(capacity: usize) -> DfoConfig {
    DfoConfig::new(TOKEN_CONNECTION)
        .with_application(TrbConnection::with_capacity("trb-01", capacity))
        .with_application(TrbConnection::with_capacity("trb-02", capacity))
        .with_queue_timeout_ms(10)
        .with_send_retries(3)
}

struct Harness {
    dfo: DataFlowOrchestrator,
    transport: Arc<InMemoryTransport>,
    sender: mpsc::Sender<TriggerDecision>,
}

async fn start_run(config: DfoConfig, run: u32) -> Harness {
    let transport = Arc::new(InMemoryTransport::new());
    let (source, sender) = ChannelDecisionSource::with_capacity(64);

    let mut dfo = DataFlowOrchestrator::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(source),
    );
    dfo.conf(config).await.expect("conf");
    dfo.start(RunNumber::new(run)).await.expect("start");

    Harness {
        dfo,
        transport,
        sender,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

fn sent_triggers(transport: &InMemoryTransport, connection: &str) -> Vec<u64> {
    transport
        .sent_to(connection)
        .unwrap()
        .iter()
        .map(|payload| {
            TriggerDecision::from_json(std::str::from_utf8(payload).expect("utf8"))
                .expect("decision payload")
                .trigger_number
                .value()
        })
        .collect()
}

#[tokio::test]
async fn round_robin_fills_both_workers_until_busy() {
    // Two workers with busy = free = 2; four decisions saturate the pool.
    let mut harness = start_run(two_worker_config(2), 1).await;

    for trigger in 1..=4 {
        harness.sender.send(decision(trigger, 1)).await.expect("send");
    }

    let registry = Arc::clone(harness.dfo.registry().expect("registry"));
    wait_until(|| {
        registry.get("trb-01").unwrap().inflight_len() == 2
            && registry.get("trb-02").unwrap().inflight_len() == 2
    })
    .await;

    assert_eq!(sent_triggers(&harness.transport, "trb-01"), [1, 3]);
    assert_eq!(sent_triggers(&harness.transport, "trb-02"), [2, 4]);

    assert!(!registry.get("trb-01").unwrap().has_slot());
    assert!(!registry.get("trb-02").unwrap().has_slot());
    assert!(!registry.has_any_slot());

    harness.dfo.stop().await.expect("stop");
}

#[tokio::test]
async fn completion_token_reopens_a_saturated_worker() {
    let mut harness = start_run(two_worker_config(2), 1).await;

    for trigger in 1..=4 {
        harness.sender.send(decision(trigger, 1)).await.expect("send");
    }

    let registry = Arc::clone(harness.dfo.registry().expect("registry"));
    wait_until(|| !registry.has_any_slot()).await;

    harness
        .transport
        .deliver_token(
            TOKEN_CONNECTION,
            &CompletionToken::new(RunNumber::new(1), TriggerNumber::new(1), "trb-01"),
        )
        .expect("deliver token");

    let worker = registry.get("trb-01").unwrap();
    assert_eq!(worker.inflight_len(), 1);
    assert!(worker
        .get_assignment(TriggerNumber::new(3))
        .is_some());
    assert!(worker.has_slot());
    assert!(registry.has_any_slot());

    // The freed slot accepts the next decision.
    harness.sender.send(decision(5, 1)).await.expect("send");
    wait_until(|| worker.inflight_len() == 2).await;

    harness.dfo.stop().await.expect("stop");
}

#[tokio::test]
async fn exhausted_retries_quarantine_worker_and_reroute_decision() {
    let mut harness = start_run(two_worker_config(2), 1).await;
    harness.transport.fail_next_sends("trb-01", 3);

    harness.sender.send(decision(1, 1)).await.expect("send");

    let registry = Arc::clone(harness.dfo.registry().expect("registry"));
    wait_until(|| registry.get("trb-02").unwrap().inflight_len() == 1).await;

    let quarantined = registry.get("trb-01").unwrap();
    assert!(quarantined.is_in_error());
    assert!(!quarantined.has_slot());
    assert_eq!(quarantined.inflight_len(), 0);
    assert_eq!(harness.transport.sent_count("trb-01").unwrap(), 0);
    assert_eq!(sent_triggers(&harness.transport, "trb-02"), [1]);

    // The quarantined worker is skipped until a token arrives for it.
    harness.sender.send(decision(2, 1)).await.expect("send");
    wait_until(|| registry.get("trb-02").unwrap().inflight_len() == 2).await;
    assert_eq!(harness.transport.sent_count("trb-01").unwrap(), 0);

    harness
        .transport
        .deliver_token(
            TOKEN_CONNECTION,
            &CompletionToken::new(RunNumber::new(1), TriggerNumber::new(1), "trb-02"),
        )
        .expect("deliver token");
    assert!(quarantined.is_in_error(), "tokens for other workers do not lift quarantine");

    harness
        .transport
        .deliver_token(
            TOKEN_CONNECTION,
            &CompletionToken::new(RunNumber::new(1), TriggerNumber::new(7), "trb-01"),
        )
        .expect("deliver token");
    assert!(!quarantined.is_in_error());
    assert!(quarantined.has_slot());

    harness.dfo.stop().await.expect("stop");
}

#[tokio::test]
async fn foreign_run_token_is_counted_and_otherwise_ignored() {
    let mut harness = start_run(two_worker_config(2), 1).await;

    harness.sender.send(decision(1, 1)).await.expect("send");

    let registry = Arc::clone(harness.dfo.registry().expect("registry"));
    wait_until(|| registry.get("trb-01").unwrap().inflight_len() == 1).await;

    harness
        .transport
        .deliver_token(
            TOKEN_CONNECTION,
            &CompletionToken::new(RunNumber::new(99), TriggerNumber::new(1), "trb-01"),
        )
        .expect("deliver token");

    assert_eq!(registry.get("trb-01").unwrap().inflight_len(), 1);

    harness.dfo.stop().await.expect("stop");
    let snapshot = harness.dfo.telemetry();
    assert_eq!(snapshot.tokens_received, 1);
}

#[tokio::test]
async fn duplicate_token_is_tolerated() {
    let mut harness = start_run(two_worker_config(2), 1).await;

    harness.sender.send(decision(1, 1)).await.expect("send");
    let registry = Arc::clone(harness.dfo.registry().expect("registry"));
    wait_until(|| registry.get("trb-01").unwrap().inflight_len() == 1).await;

    let token = CompletionToken::new(RunNumber::new(1), TriggerNumber::new(1), "trb-01");
    harness
        .transport
        .deliver_token(TOKEN_CONNECTION, &token)
        .expect("first delivery");
    harness
        .transport
        .deliver_token(TOKEN_CONNECTION, &token)
        .expect("duplicate delivery");

    assert_eq!(registry.get("trb-01").unwrap().inflight_len(), 0);

    harness.dfo.stop().await.expect("stop");
    assert_eq!(harness.dfo.telemetry().tokens_received, 2);
}

#[tokio::test]
async fn every_trigger_is_sent_exactly_once() {
    let mut harness = start_run(two_worker_config(8), 1).await;

    for trigger in 1..=10 {
        harness.sender.send(decision(trigger, 1)).await.expect("send");
    }

    let transport = Arc::clone(&harness.transport);
    wait_until(|| transport.total_sent().unwrap() == 10).await;

    let mut all: Vec<u64> = sent_triggers(&harness.transport, "trb-01");
    all.extend(sent_triggers(&harness.transport, "trb-02"));
    all.sort_unstable();
    assert_eq!(all, (1..=10).collect::<Vec<_>>());

    harness.dfo.stop().await.expect("stop");
    let snapshot = harness.dfo.telemetry();
    assert_eq!(snapshot.decisions_received, 10);
    assert_eq!(snapshot.decisions_sent, 10);
}

#[tokio::test]
async fn shutdown_drain_sends_at_most_one_decision_per_free_slot() {
    // Run flag already cleared: the dispatcher goes straight to the
    // drain, which gives each remaining decision one selection and one
    // send attempt.
    let registry = Arc::new(
        WorkerRegistry::from_applications(&[
            TrbConnection::with_capacity("trb-01", 1),
            TrbConnection::with_capacity("trb-02", 1),
        ])
        .expect("registry"),
    );
    let transport = Arc::new(InMemoryTransport::new());
    let (source, sender) = ChannelDecisionSource::with_capacity(16);

    for trigger in 1..=5 {
        sender.send(decision(trigger, 1)).await.expect("send");
    }

    let config = DfoConfig::new(TOKEN_CONNECTION)
        .with_queue_timeout_ms(10)
        .with_send_retries(3);
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::new(source),
        Arc::clone(&transport) as Arc<dyn Transport>,
        &config,
        Arc::new(AtomicBool::new(false)),
        Arc::new(Notify::new()),
        Arc::new(DfoCounters::new()),
    );

    dispatcher.run().await;

    // One decision per worker; the rest were discarded.
    assert_eq!(transport.sent_count("trb-01").unwrap(), 1);
    assert_eq!(transport.sent_count("trb-02").unwrap(), 1);
    assert_eq!(registry.get("trb-01").unwrap().inflight_len(), 1);
    assert_eq!(registry.get("trb-02").unwrap().inflight_len(), 1);
}

#[tokio::test]
async fn drain_discards_decisions_whose_single_attempt_fails() {
    let registry = Arc::new(
        WorkerRegistry::from_applications(&[TrbConnection::with_capacity("trb-01", 4)])
            .expect("registry"),
    );
    let transport = Arc::new(InMemoryTransport::new());
    // With the run flag down the retry loop stops after one attempt,
    // so a single scripted failure per decision is enough to lose it.
    transport.fail_next_sends("trb-01", 2);
    let (source, sender) = ChannelDecisionSource::with_capacity(16);

    for trigger in 1..=3 {
        sender.send(decision(trigger, 1)).await.expect("send");
    }

    let config = DfoConfig::new(TOKEN_CONNECTION)
        .with_queue_timeout_ms(10)
        .with_send_retries(3);
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::new(source),
        Arc::clone(&transport) as Arc<dyn Transport>,
        &config,
        Arc::new(AtomicBool::new(false)),
        Arc::new(Notify::new()),
        Arc::new(DfoCounters::new()),
    );

    dispatcher.run().await;

    assert_eq!(sent_triggers(&transport, "trb-01"), [3]);
    assert_eq!(registry.get("trb-01").unwrap().inflight_len(), 1);
}
