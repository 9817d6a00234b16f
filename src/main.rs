use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Value, json};

use plan_coach::coaching::CoachingSession;
use plan_coach::config::EngineConfig;
use plan_coach::conversation::Message;
use plan_coach::persistence::{JsonFileSink, MemorySnapshotSink, SnapshotSink};
use plan_coach::workshop::WorkshopModule;

/// One step of a recorded workshop.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Step {
    Message(Message),
    Extract { module: WorkshopModule, data: Value },
    Advance { advance: bool },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: plan-coach <transcript.json>");
        eprintln!("  Set PLAN_COACH_SNAPSHOT_DIR to write state snapshots to disk.");
        eprintln!("  Set PLAN_COACH_REQUIREMENTS to load a requirement table from JSON.");
        std::process::exit(2);
    });

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read transcript {path}"))?;
    let steps: Vec<Step> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid transcript {path}"))?;

    let config = EngineConfig::try_from_env().context("Invalid PLAN_COACH_* configuration")?;

    let sink: Arc<dyn SnapshotSink> = match std::env::var("PLAN_COACH_SNAPSHOT_DIR") {
        Ok(dir) => Arc::new(JsonFileSink::new(dir)),
        Err(_) => Arc::new(MemorySnapshotSink::new()),
    };

    let mut session = CoachingSession::new(config, sink);
    if let Ok(requirements_path) = std::env::var("PLAN_COACH_REQUIREMENTS") {
        let json = tokio::fs::read_to_string(&requirements_path)
            .await
            .with_context(|| format!("Failed to read requirements {requirements_path}"))?;
        session = session
            .with_requirements_json(&json)
            .with_context(|| format!("Invalid requirements {requirements_path}"))?;
    }
    eprintln!("🧭 Plan Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Session: {}", session.session_id());
    eprintln!("   Steps: {}\n", steps.len());

    let mut history: Vec<Message> = Vec::new();
    for step in steps {
        let line = match step {
            Step::Message(message) => {
                history.push(message);
                let outcome = session.process_turn(&history).await;
                json!({ "turn": history.len(), "outcome": outcome })
            }
            Step::Extract { module, data } => {
                let completion = session.merge_extraction(module, &data).await;
                json!({ "extract": module, "completion": completion })
            }
            Step::Advance { advance: false } => continue,
            Step::Advance { advance: true } => match session.advance_module().await {
                Ok(advance) => json!({ "advance": advance }),
                Err(e) => json!({ "advance": null, "refused": e.to_string() }),
            },
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    let summary = json!({
        "module": session.current_module(),
        "progress": session.overall_progress(),
        "eligibility": session.grant_eligibility(),
        "state": session.state(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
