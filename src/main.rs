use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cosy_tts_bridge::{AudioSink, CosyTTS, TTSConfig};

/// Wait for the first chunk of a segment, which includes connection setup.
const FIRST_CHUNK_TIMEOUT: Duration = Duration::from_secs(15);

/// cosy-tts - Synthesize text with CosyVoice into a WAV file
#[derive(Parser, Debug)]
#[command(name = "cosy-tts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output WAV file
    #[arg(short = 'o', long = "output", value_name = "FILE", default_value = "out.wav")]
    output: PathBuf,

    /// Text to synthesize (reads stdin lines as segments if not given)
    #[arg(short = 't', long = "text")]
    text: Option<String>,

    /// Quiet period that ends a segment, in milliseconds
    #[arg(long = "idle-ms", default_value_t = 1500)]
    idle_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize crypto provider for TLS connections
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TTSConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TTSConfig::from_env().context("Failed to load config from environment")?,
    };
    let sample_rate = config.sample_rate;

    let mut tts = CosyTTS::new(config)?;
    info!("Using {} transport", tts.mode());

    let segments = match cli.text {
        Some(text) => vec![text],
        None => read_stdin_segments().await?,
    };

    let sink = tts.sink();
    let idle = Duration::from_millis(cli.idle_ms);
    let mut pcm = Vec::new();

    for segment in &segments {
        tts.submit(segment, true);
        let received = drain_segment(&sink, idle, &mut pcm).await;
        if received == 0 {
            warn!("No audio received for segment: {:?}", segment);
        }
    }

    write_wav(&cli.output, sample_rate, &pcm)?;
    info!(
        "Wrote {} bytes of audio to {}",
        pcm.len(),
        cli.output.display()
    );

    Ok(())
}

async fn read_stdin_segments() -> anyhow::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut segments = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            segments.push(line.to_string());
        }
    }

    Ok(segments)
}

/// Collect chunks until nothing arrives for `idle`. Returns the byte count.
async fn drain_segment(sink: &AudioSink, idle: Duration, pcm: &mut Vec<u8>) -> usize {
    let mut received = 0;
    let mut wait = FIRST_CHUNK_TIMEOUT.max(idle);

    while let Some(chunk) = sink.read_timeout(wait).await {
        received += chunk.len();
        pcm.extend_from_slice(&chunk);
        wait = idle;
    }

    received
}

fn write_wav(path: &Path, sample_rate: u32, pcm: &[u8]) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    if pcm.len() % 2 != 0 {
        warn!("Dropping trailing odd byte of {} bytes of PCM", pcm.len());
    }

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;

    Ok(())
}
