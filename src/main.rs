use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bistro_bridge::api::ApiServer;
use bistro_bridge::audio::{AudioFrame, encode_pcm16};
use bistro_bridge::client::{self, MicCapture, pcm_to_wav};
use bistro_bridge::config::AudioConfig;
use bistro_bridge::playback::{AudioSink, DeviceSink, PlaybackScheduler};
use bistro_bridge::Config;

/// Bistro - realtime voice bridge for restaurant ordering and reservations
#[derive(Parser)]
#[command(name = "bistro", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "BISTRO_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Place a call through the bridge with this machine's mic and speakers
    Call,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Write the captured audio to a WAV file
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,bistro_bridge=info",
        1 => "info,bistro_bridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Call => call(cli.port).await,
            Command::TestMic { duration, save } => test_mic(duration, save).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        engine = %config.engine.url,
        "starting bistro bridge"
    );

    ApiServer::new(Arc::new(config)).run().await?;

    Ok(())
}

/// Place a call through the bridge using local audio hardware
#[allow(clippy::future_not_send)]
async fn call(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = port_override {
        config.server.port = port;
    }

    println!("Dialing {}...", client::bridge_url(&config));
    println!("Speak once the session starts. Ctrl-C hangs up.\n");

    client::run(&config).await?;

    println!("Call ended.");
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, save: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let audio = AudioConfig::default();
    let mut capture = MicCapture::new(audio.sample_rate)?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    let mut recorded: Vec<f32> = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);

        recorded.extend_from_slice(&samples);
    }

    capture.stop();

    if let Some(path) = save {
        let wav = pcm_to_wav(&encode_pcm16(&recorded), sample_rate)?;
        std::fs::write(&path, wav)?;
        println!("\nSaved capture to {}", path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let audio = AudioConfig::default();
    let mut scheduler = PlaybackScheduler::new(audio.sample_rate, audio.lookahead_secs());
    let mut sink = DeviceSink::new(audio.sample_rate)?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let rate = audio.sample_rate as f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (rate * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let tone = AudioFrame::new(encode_pcm16(&samples), audio.sample_rate);
    let payload = tone.to_le_bytes();
    println!("Playing {num_samples} samples at {} Hz...", audio.sample_rate);

    let scheduled = scheduler
        .schedule(&payload, sink.now())
        .ok_or_else(|| anyhow::anyhow!("tone produced no playable audio"))?;
    sink.begin(&scheduled.unit, &scheduled.samples)?;

    tokio::time::sleep(Duration::from_secs_f32(duration_secs + 0.5)).await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
