//! Publish a moving test pattern
//!
//! Run with: cargo run --example stream_pattern [BIND_ADDR] [FPS]
//!
//! Examples:
//!   cargo run --example stream_pattern                     # binds to 0.0.0.0:15001, 30 fps
//!   cargo run --example stream_pattern localhost:16000 10  # binds to 127.0.0.1:16000, 10 fps
//!
//! Receive it with: cargo run --example receive [ADDR]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use avlink::{CodecConfig, EncodeWorker, Frame, Geometry, PixelFormat, Transmitter, TransmitterConfig, DEFAULT_PORT};

const GEOMETRY: Geometry = Geometry::new(640, 480);

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

fn print_usage() {
    eprintln!("Usage: stream_pattern [BIND_ADDR] [FPS]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to publish on (default: 0.0.0.0:{})", DEFAULT_PORT);
    eprintln!("  FPS          Frame rate (default: 30)");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(arg) => parse_addr(arg).map_err(|e| {
            print_usage();
            e
        })?,
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
    };
    let fps: u32 = match args.get(2) {
        Some(arg) => arg.parse::<u32>()?.max(1),
        None => 30,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("avlink=info".parse()?)
                .add_directive("stream_pattern=info".parse()?),
        )
        .init();

    let config = TransmitterConfig::with_addr(bind_addr).codec(CodecConfig::default().fps(fps));
    let transmitter = Transmitter::bind(config)?;
    let worker = EncodeWorker::spawn(transmitter, 2)?;

    println!("Publishing {} pattern at {} fps on {}", GEOMETRY, fps, bind_addr);

    let interval = Duration::from_secs(1) / fps;
    let mut next = Instant::now();
    let mut printed_sdp = false;
    for i in 0u64.. {
        let frame = Frame::pattern(GEOMETRY, (i % 256) as u8, PixelFormat::Bgr24);
        if !worker.observe(frame) {
            tracing::debug!(frame = i, "Encoder busy, frame dropped");
        }

        if !printed_sdp {
            if let Some(sdp) = worker.session_descriptor() {
                println!("\n{}", sdp);
                printed_sdp = true;
            }
        }

        if i % (fps as u64 * 5) == 0 {
            let snap = worker.stats().snapshot();
            tracing::info!(
                frames = snap.frames_encoded,
                dropped = worker.dropped(),
                kbps = snap.bitrate() / 1000,
                "Stats"
            );
        }

        next += interval;
        std::thread::sleep(next.saturating_duration_since(Instant::now()));
    }

    Ok(())
}
