//! pmmg-stream - pMMG telemetry recorder
//!
//! Records the device's ASCII telemetry stream to a session file while
//! keeping a live window for display.
//!
//! # Usage
//!
//! ```bash
//! # Serial port bridged to stdin
//! stty -F /dev/ttyUSB0 921600 raw && ./pmmg-stream --stdin < /dev/ttyUSB0
//!
//! # Serial-over-TCP bridge (e.g. ser2net), text layout
//! ./pmmg-stream --tcp 192.168.1.20:4000 --format text
//!
//! # Replay a captured file, printing snapshots as JSON lines
//! ./pmmg-stream --replay capture.csv --skip-header --render json --output replayed.csv
//!
//! # Summarise a recorded session
//! ./pmmg-stream summary data/pmmg_20260101_120000.csv
//! ```
//!
//! # Environment Variables
//!
//! - `PMMG_CONFIG`: Path to a `pmmg_stream.toml` config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pmmg_stream::acquisition::{ByteSource, ReplaySource, StreamSource};
use pmmg_stream::config::{defaults, StreamConfig};
use pmmg_stream::pipeline::{
    DriverCommand, JsonLinesRenderer, LogRenderer, NullRenderer, PipelineRunner, Renderer,
};
use pmmg_stream::storage::{read_session, SessionSummary, SessionTarget, SinkFormat};
use pmmg_stream::ChannelSet;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pmmg-stream")]
#[command(about = "pMMG telemetry recorder")]
#[command(version)]
struct CliArgs {
    /// Read raw telemetry from stdin
    #[arg(long, conflicts_with_all = ["tcp", "replay"])]
    stdin: bool,

    /// Connect to a serial-over-TCP bridge
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "replay")]
    tcp: Option<String>,

    /// Replay a captured or previously recorded file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Skip the first line of the replay file (a session header)
    #[arg(long, requires = "replay")]
    skip_header: bool,

    /// Session file (default: <output_dir>/<prefix>_<YYYYmmdd_HHMMSS>.<ext>)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Session layout: csv or text
    #[arg(long)]
    format: Option<SinkFormat>,

    /// Overwrite the session file if it already exists
    #[arg(long)]
    force: bool,

    /// Live window length in milliseconds
    #[arg(long, value_name = "MS")]
    horizon_ms: Option<f64>,

    /// Channels to render, e.g. "p1,p2,fsr_l", "pressure" or "all"
    #[arg(long, value_name = "LIST")]
    channels: Option<String>,

    /// How live snapshots are shown
    #[arg(long, value_enum, default_value_t = RenderMode::Log)]
    render: RenderMode,

    /// Stop recording after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,

    /// Config file (overrides the default search)
    #[arg(long, value_name = "PATH", env = "PMMG_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Print per-channel statistics of a recorded session
    Summary {
        /// Session file (csv or text layout)
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RenderMode {
    /// Periodic summary in the log
    Log,
    /// One JSON snapshot per render tick on stdout
    Json,
    /// No live output
    None,
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // stdout is reserved for snapshot output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(args: &CliArgs) -> Result<StreamConfig> {
    let mut config = match args.config {
        Some(ref path) => StreamConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StreamConfig::load(),
    };

    if let Some(horizon) = args.horizon_ms {
        config.window.horizon_ms = horizon;
    }
    if let Some(ref list) = args.channels {
        config.render.channels = list.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(format) = args.format {
        config.recording.format = format;
    } else if let Some(ref output) = args.output {
        config.recording.format = SinkFormat::from_path(output);
    }
    if args.force {
        config.recording.overwrite = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn session_target(args: &CliArgs, config: &StreamConfig) -> SessionTarget {
    let rec = &config.recording;
    let target = match args.output {
        Some(ref path) => SessionTarget::new(path, rec.format),
        None => SessionTarget::timestamped(&rec.output_dir, &rec.file_prefix, rec.format),
    };
    target.with_overwrite(rec.overwrite)
}

async fn open_source(args: &CliArgs, config: &StreamConfig) -> Result<Box<dyn ByteSource>> {
    let read_timeout = config.read_timeout();
    let max_read = config.source.max_read_bytes;

    if let Some(ref addr) = args.tcp {
        info!("📥 Input: TCP ({})", addr);
        let source = StreamSource::connect_tcp(addr, Duration::from_secs(defaults::TCP_CONNECT_TIMEOUT_SECS))
            .await
            .with_context(|| format!("Failed to connect to {addr}"))?;
        return Ok(Box::new(source.with_read_timeout(read_timeout).with_max_read_bytes(max_read)));
    }

    if let Some(ref path) = args.replay {
        info!("📥 Input: replay ({})", path.display());
        let source = ReplaySource::open(path, config.source.replay_chunk_bytes, args.skip_header)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        return Ok(Box::new(source));
    }

    if args.stdin {
        info!("📥 Input: stdin");
        return Ok(Box::new(
            StreamSource::stdin().with_read_timeout(read_timeout).with_max_read_bytes(max_read),
        ));
    }

    bail!("No input selected: use --stdin, --tcp HOST:PORT or --replay FILE")
}

fn build_renderer(mode: RenderMode, channels: ChannelSet) -> Box<dyn Renderer> {
    match mode {
        RenderMode::Log => Box::new(LogRenderer::new(channels)),
        RenderMode::Json => Box::new(JsonLinesRenderer::new(std::io::stdout(), channels)),
        RenderMode::None => Box::new(NullRenderer),
    }
}

// ============================================================================
// Summary Subcommand
// ============================================================================

fn run_summary(path: &Path, json: bool) -> Result<()> {
    let records = read_session(path).with_context(|| format!("Failed to read session {}", path.display()))?;
    let summary = SessionSummary::from_records(&records);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Session: {}", path.display());
        print!("{summary}");
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// How long shutdown waits for blocking reads (an idle stdin) to return.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Run `future` on a current-thread runtime, then shut the runtime down
/// without waiting indefinitely on blocking tasks.
///
/// `tokio::io::stdin()` reads on a blocking thread that cannot be cancelled;
/// on an idle device that read never returns and a plain runtime drop would
/// hang after Ctrl+C.
fn block_on_bounded<F: std::future::Future>(future: F, grace: Duration) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    if let Some(SubCommand::Summary { ref file, json }) = args.command {
        return run_summary(file, json);
    }

    block_on_bounded(record(args), RUNTIME_SHUTDOWN_GRACE)?
}

async fn record(args: CliArgs) -> Result<()> {
    let config = load_config(&args)?;
    let target = session_target(&args, &config);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  pmmg-stream - pMMG Telemetry Recorder");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("💾 Output: {} ({})", target.path.display(), target.format);
    info!("⏱️  Window: {} ms", config.window.horizon_ms);

    let source = open_source(&args, &config).await?;
    let renderer = build_renderer(args.render, config.render_channels());

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, stopping recording...");
        shutdown_token.cancel();
    });

    let (runner, commands) = PipelineRunner::new(&config, source, renderer, cancel_token);
    let runner = runner.exit_when_session_ends(true);

    commands
        .send(DriverCommand::StartRecording(target))
        .await
        .context("Pipeline command channel closed")?;

    if let Some(secs) = args.duration {
        let duration = Duration::try_from_secs_f64(secs).context("Invalid --duration")?;
        let timer_commands = commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            info!("⏱️  Duration of {:.1}s reached", duration.as_secs_f64());
            let _ = timer_commands.send(DriverCommand::StopRecording).await;
        });
    }

    let report = runner.run().await.context("Recording failed")?;
    drop(commands);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📊 FINAL STATISTICS ({:?})", report.end);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("   Bytes Received:     {}", report.totals.bytes_received);
    info!("   Lines Received:     {}", report.totals.lines_received);
    info!("   Records Recorded:   {}", report.totals.records_accepted);
    info!("   Malformed Lines:    {}", report.totals.malformed_lines());
    info!("   Empty Lines:        {}", report.totals.empty_lines);
    if report.totals.fragment_bytes_dropped > 0 {
        warn!("   Oversized Fragments: {} bytes dropped", report.totals.fragment_bytes_dropped);
    }
    for session in &report.sessions {
        info!("   Session: {}", session);
    }

    if let Some(failed) = report.sessions.iter().find(|s| s.sink_error.is_some()) {
        error!("Session file write failed: {}", failed);
        bail!("Recording ended early because the session file could not be written");
    }

    Ok(())
}
