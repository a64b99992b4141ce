//! Drives a short simulated run against the in-memory collaborators.
//!
//! Workers here are plain tasks that acknowledge every decision after a
//! small delay, so the full dispatch/token cycle can be watched locally:
//!
//! ```text
//! RUST_LOG=debug cargo run --example local_run
//! ```

use std::sync::Arc;
use std::time::Duration;

use daqflow_core::observability::{init_logging, LogFormat};
use daqflow_core::{RunNumber, TriggerNumber};
use daqflow_dfo::config::{DfoConfig, TrbConnection};
use daqflow_dfo::decision::{CompletionToken, TriggerDecision};
use daqflow_dfo::error::Result;
use daqflow_dfo::orchestrator::DataFlowOrchestrator;
use daqflow_dfo::source::ChannelDecisionSource;
use daqflow_dfo::transport::memory::InMemoryTransport;
use daqflow_dfo::transport::Transport;

const TOKEN_CONNECTION: &str = "trb_tokens";
const RUN: u32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogFormat::Pretty);

    let transport = Arc::new(InMemoryTransport::new());
    let (source, decisions) = ChannelDecisionSource::with_capacity(256);

    let config = DfoConfig::new(TOKEN_CONNECTION)
        .with_application(TrbConnection::with_capacity("trb-01", 4))
        .with_application(TrbConnection::with_capacity("trb-02", 4))
        .with_send_retries(3);

    let mut dfo = DataFlowOrchestrator::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(source),
    );
    dfo.conf(config).await?;
    dfo.start(RunNumber::new(RUN)).await?;

    // Simulated TRB workers: poll the transport log and acknowledge
    // each decision they find after a little assembly time.
    for connection in ["trb-01", "trb-02"] {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            let mut acknowledged = 0;
            loop {
                let sent = transport.sent_to(connection).unwrap_or_default();
                for payload in sent.iter().skip(acknowledged) {
                    let Ok(text) = std::str::from_utf8(payload) else {
                        continue;
                    };
                    let Ok(decision) = TriggerDecision::from_json(text) else {
                        continue;
                    };
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    let token = CompletionToken::new(
                        decision.run_number,
                        decision.trigger_number,
                        connection,
                    );
                    let _ = transport.deliver_token(TOKEN_CONNECTION, &token);
                    acknowledged += 1;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
    }

    // The trigger: one burst of decisions.
    for trigger in 1..=40u64 {
        let decision = TriggerDecision::new(TriggerNumber::new(trigger), RunNumber::new(RUN));
        if decisions.send(decision).await.is_err() {
            break;
        }
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    dfo.stop().await?;

    let snapshot = dfo.telemetry();
    tracing::info!(
        decisions_received = snapshot.decisions_received,
        decisions_sent = snapshot.decisions_sent,
        tokens_received = snapshot.tokens_received,
        "run finished"
    );

    dfo.scrap().await?;
    Ok(())
}
