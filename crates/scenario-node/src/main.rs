//! Scenario node entry point.
//!
//! Runs a demo room: every participant but one joins up front, the first of
//! them becomes coordinator and asks the generator for a scenario, and the
//! last participant joins once that has settled to exercise catch-up.

use std::error::Error;
use std::sync::Arc;

use scenario_core::clock::SystemClock;
use scenario_generator::HttpGeneratorClient;
use scenario_node::config::NodeConfig;
use scenario_node::loopback::LoopbackRoom;
use scenario_node::participant::{Participant, ParticipantDeps};
use scenario_node::presentation::TracingPresentationSink;
use scenario_sync::application::query_handlers;
use scenario_sync::domain::scenario::{ScenarioSource, ScenarioStatus};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = NodeConfig::from_env()?;
    tracing::info!(
        endpoint = %config.generator.endpoint,
        participants = config.participants,
        "Starting scenario node"
    );

    let deps = ParticipantDeps {
        generator: Arc::new(HttpGeneratorClient::new(&config.generator)?),
        clock: Arc::new(SystemClock),
        settings: config.protocol.clone(),
    };
    let room = LoopbackRoom::new();

    let mut participants: Vec<Participant> = (1..=config.participants)
        .map(|n| {
            let name = format!("participant-{n}");
            let sink = Arc::new(TracingPresentationSink::new(name.clone()));
            Participant::spawn(name, &room, &deps, sink)
        })
        .collect();

    // The first participant to join is the coordinator.
    let late = participants.len() - 1;
    for participant in &participants[..late.max(1)] {
        participant.join()?;
    }
    let settled = participants[0]
        .wait_until_settled(config.ready_timeout)
        .await?;
    tracing::info!(status = settled.status.as_str(), "coordinator settled");
    if late > 0 {
        participants[late].join()?;
    }

    let generated = settled.status == ScenarioStatus::Ready;
    for participant in &mut participants {
        // Without a generated scenario the others have nothing to wait for.
        let converged = if generated {
            participant.wait_for_ready(config.ready_timeout).await.map(drop)
        } else {
            Ok(())
        };
        if let Err(err) = converged {
            tracing::warn!(
                participant = participant.name(),
                error = %err,
                "participant did not converge"
            );
        }
        report(participant);
    }

    for participant in participants {
        participant.shutdown().await;
    }
    tracing::info!("Scenario node stopped");

    Ok(())
}

fn report(participant: &Participant) {
    let view = query_handlers::get_scenario(participant.scenario());
    tracing::info!(
        participant = participant.name(),
        can_proceed = view.readiness.can_proceed(),
        status = view.message,
        source = view.source.map(ScenarioSource::label),
        text = view.text.as_deref(),
        "participant state"
    );
}
