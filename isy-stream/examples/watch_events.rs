//! Watch Events - prints every routed event from an ISY controller
//!
//! Connects to the subscription socket, logs status changes and prints each
//! routed event as JSON until Ctrl-C, then disconnects cleanly.
//!
//! Run with:
//! ISY_HOST=192.168.1.20 ISY_USERNAME=admin ISY_PASSWORD=admin \
//!     cargo run -p isy-sdk-stream --example watch_events

use std::env;

use isy_stream::{NodeChange, ProgressReport, StreamConfig, StreamController, SystemStatus, Topic};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("isy_stream=info".parse()?),
        )
        .init();

    let host = env::var("ISY_HOST").unwrap_or_else(|_| "localhost".to_string());
    let tls = env::var("ISY_TLS").map(|v| v == "1").unwrap_or(false);
    let config = StreamConfig::for_host(&host, tls).with_credentials(
        env::var("ISY_USERNAME").unwrap_or_default(),
        env::var("ISY_PASSWORD").unwrap_or_default(),
    );

    println!("=== ISY event stream: {} ===\n", config.url);
    let controller = StreamController::new(config)?;

    controller.subscribe_status(|status| println!("[status] {status}"));

    controller.subscribe_all(|event| match serde_json::to_string(event) {
        Ok(json) => println!("[{}] {json}", event.topic),
        Err(e) => eprintln!("could not serialize event: {e}"),
    });

    controller.subscribe(Topic::NodeChanged, |envelope| {
        if let Some(change) = NodeChange::from_envelope(envelope) {
            println!("  node {} {}", change.address, change.action);
        }
    });
    controller.subscribe(Topic::SystemStatus, |envelope| {
        if let Some(status) = SystemStatus::from_envelope(envelope) {
            println!("  system is {status}");
        }
    });
    controller.subscribe(Topic::ProgressReport, |envelope| {
        if let Some(report) = ProgressReport::from_envelope(envelope) {
            println!("  progress [{}] {}", report.address, report.message);
        }
    });

    controller.start(0);

    tokio::signal::ctrl_c().await?;
    println!("\nDisconnecting...");
    controller.disconnect().await;

    Ok(())
}
