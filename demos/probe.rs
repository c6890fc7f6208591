//! Ping an address through the router
//!
//! Run with: cargo run --example probe <ADDRESS> [COUNT]
//!
//! Without COUNT the ping streams until Ctrl+C and then prints a summary.
//! With COUNT a one-shot ping is sent and only the summary is printed.

use std::sync::Arc;

use ros_telemetry::{ping_once, start_probe, Config, DeviceLink, ProbeEvent, ProbeOptions};
use tokio_util::sync::CancellationToken;

fn print_usage() {
    eprintln!("Usage: probe <ADDRESS> [COUNT]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  probe 10.0.0.5        # stream until Ctrl+C");
    eprintln!("  probe 10.0.0.5 4      # four pings, summary only");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let Some(address) = args.get(1).cloned() else {
        print_usage();
        std::process::exit(1);
    };
    let count: Option<u32> = match args.get(2) {
        Some(count) => Some(count.parse()?),
        None => None,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ros_telemetry=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let link = Arc::new(DeviceLink::connect(config.device).await?);

    if let Some(count) = count {
        let summary = ping_once(link.as_ref(), &address, count).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        link.close().await;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut events = start_probe(link.clone(), cancel.clone(), &address, ProbeOptions::default());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ProbeEvent::Summary { summary }) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    break;
                }
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => cancel.cancel(),
        }
    }

    link.close().await;
    Ok(())
}
