//! Receive a stream and log frame arrivals
//!
//! Run with: cargo run --example receive [ADDR]
//!
//! Examples:
//!   cargo run --example receive                    # connects to 127.0.0.1:15001
//!   cargo run --example receive 10.0.0.5:16000

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use avlink::{Receiver, ReceiverConfig, DEFAULT_PORT};

fn parse_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");
    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }
    Err(format!("Invalid address: '{}'. Expected IP:PORT, IP or 'localhost'", arg))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: receive [ADDR]   (default: 127.0.0.1:{})", DEFAULT_PORT);
        return Ok(());
    }

    let addr = match args.get(1) {
        Some(arg) => parse_addr(arg)?,
        None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("avlink=info".parse()?)
                .add_directive("receive=info".parse()?),
        )
        .init();

    let receiver = Receiver::connect(ReceiverConfig::with_addr(addr))?;
    println!("Receiving from {}", addr);

    let mut last_report = Instant::now();
    let mut frames = 0u64;
    while receiver.is_running() {
        let Some(frame) = receiver.get_timeout(Duration::from_millis(500)) else {
            continue;
        };
        frames += 1;
        tracing::debug!(
            geometry = %frame.geometry(),
            pts = frame.pts(),
            "Frame received"
        );

        if last_report.elapsed() >= Duration::from_secs(5) {
            let snap = receiver.stats().snapshot();
            tracing::info!(
                frames,
                decode_errors = snap.decode_errors,
                skipped = snap.cycles_skipped,
                kbps = snap.bitrate() / 1000,
                "Stats"
            );
            last_report = Instant::now();
        }
    }

    Ok(())
}
