//! FluxDM headless entry point — demonstrates embedding the engine without
//! building a UI on top of it: constructs an `Engine`, prints every event
//! it broadcasts, and exits on Ctrl-C.

use engine::Engine;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = storage::Config::load().await.expect("failed to load configuration");
    let (engine, handle) = Engine::new(&config).await;
    tokio::spawn(engine.run());

    let (mut events, snapshot) = handle.subscribe().await;
    info!(count = snapshot.len(), "loaded existing downloads");
    for entry in &snapshot {
        println!("[{}] {} - {:?}", entry.id, entry.filename, entry.status);
    }

    println!("FluxDM engine running. Press Ctrl-C to exit.");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => println!("{event:?}"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        println!("missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("shutting down");
                break;
            }
        }
    }
}
