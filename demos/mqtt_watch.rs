// SPDX-License-Identifier: MPL-2.0

//! Watch MQTT topics and print every change, logging them to JSON lines.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example mqtt_watch -- <broker_url> <log_dir> <topic>...
//! ```
//!
//! # Example
//!
//! ```bash
//! cargo run --example mqtt_watch -- mqtt://192.168.1.50:1883 ./tag-logs sensor/temp plant/line1/speed
//! ```
//!
//! Stop with Ctrl+C. Set `RUST_LOG=tagwatch=debug` to see dispatch decisions.

use std::env;
use std::sync::Arc;

use tagwatch::protocol::{MqttDriver, MqttDriverConfig, SubscribeOptions};
use tagwatch::subscription::{JsonLinesSink, ValueSink, callback};
use tagwatch::{Client, ClientEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <broker_url> <log_dir> <topic>...", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --example mqtt_watch -- mqtt://192.168.1.50:1883 ./tag-logs sensor/temp");
        std::process::exit(1);
    }

    let config = MqttDriverConfig::from_url(&args[1])?;
    let sink: Arc<dyn ValueSink> = Arc::new(JsonLinesSink::create(&args[2])?);
    let topics = &args[3..];

    let client = Client::new(MqttDriver::new(config));
    let mut events = client.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.is_error() {
                eprintln!("[event] {event}");
            } else if event == ClientEvent::Disconnected {
                println!("[event] {event}");
                break;
            } else {
                println!("[event] {event}");
            }
        }
    });

    println!("Connecting to {}...", args[1]);
    client.connect().await?;

    for topic in topics {
        client
            .subscribe(
                topic.as_str(),
                SubscribeOptions::passthrough(),
                Some(callback(|key, value| println!("{key} = {value}"))),
            )
            .await?;
        client.registry().enable_value_log(topic, Arc::clone(&sink));
    }
    println!("Watching {} topic(s), Ctrl+C to stop", topics.len());

    tokio::signal::ctrl_c().await?;

    for snapshot in client.registry().snapshots() {
        println!(
            "{}: last = {:?}, updated {}",
            snapshot.key, snapshot.last_value, snapshot.updated_at
        );
    }

    println!("Disconnecting...");
    client.disconnect().await?;
    println!("Done!");
    Ok(())
}
