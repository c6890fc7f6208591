//! Watch live traffic for one PPPoE user
//!
//! Run with: cargo run --example watch_traffic <PPPOE_USERNAME>
//!
//! The device is configured through the usual environment variables
//! (`MIKROTIK_HOST`, `MIKROTIK_USER`, `MIKROTIK_PASS`, ...). Samples are
//! printed as they arrive and also relayed through the bus to a local
//! viewer, whose messages are printed as JSON.

use std::sync::Arc;

use ros_telemetry::{Config, MemoryDirectory, Subscriber, TelemetryService};
use tokio_util::sync::CancellationToken;

fn print_usage() {
    eprintln!("Usage: watch_traffic <PPPOE_USERNAME>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  MIKROTIK_HOST=192.168.88.1 MIKROTIK_PASS=secret watch_traffic alice");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let Some(username) = args.get(1).cloned() else {
        print_usage();
        std::process::exit(1);
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ros_telemetry=info".parse()?)
                .add_directive("watch_traffic=debug".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    println!("Connecting to {}", config.device.addr());

    let directory = Arc::new(MemoryDirectory::with_subscribers([Subscriber::pppoe(
        username.clone(),
        username.clone(),
        username.clone(),
    )]));
    let service = TelemetryService::start(config, directory).await?;

    let (_, mut viewer) = service.hub().channel_connection("stdout").await;
    tokio::spawn(async move {
        while let Some(message) = viewer.recv().await {
            println!("[bus] {message}");
        }
    });

    let cancel = CancellationToken::new();
    let mut subscription = service.registry().subscribe(&cancel, &username).await?;
    println!("Watching {username}, press Ctrl+C to stop");

    loop {
        tokio::select! {
            sample = subscription.recv() => match sample {
                Some(sample) if sample.terminal => {
                    println!("Monitor gave up on {}", sample.interface);
                    break;
                }
                Some(sample) => println!(
                    "{:<24} down {:>14}  up {:>14}",
                    sample.interface, sample.download_speed, sample.upload_speed
                ),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    cancel.cancel();
    service.shutdown().await;
    Ok(())
}
