//! pMMG Telemetry Simulator
//!
//! Emits synthetic device telemetry in the wire format the recorder expects:
//! eight pMMG pressure channels following a gait cycle plus two alternating
//! force-sensing resistors. Optional fault injection exercises the
//! recorder's tolerance for truncated lines, garbage fields and NUL bytes.
//!
//! # Usage
//! ```bash
//! ./pmmg-sim --rate 500 --seconds 30 | ./pmmg-stream --stdin
//! ./pmmg-sim --listen 127.0.0.1:4000 --garbage-prob 0.01 &
//! ./pmmg-stream --tcp 127.0.0.1:4000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::f64::consts::TAU;
use std::io::{self, BufWriter, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};

// ============================================================================
// Signal Constants
// ============================================================================

/// Resting pressure of each bladder (kPa)
const BASELINE_KPA: [f64; 8] = [101.2, 101.5, 100.9, 101.8, 101.1, 100.7, 101.4, 101.0];
/// Peak contraction swing (kPa)
const CONTRACTION_KPA: f64 = 6.0;
/// Full FSR reading under heel strike (raw ADC)
const FSR_PEAK: f64 = 900.0;
/// Emit cadence: lines are written in batches this far apart
const BATCH_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pmmg-sim")]
#[command(about = "Synthetic pMMG telemetry for pmmg-stream testing")]
#[command(version)]
struct Args {
    /// Lines per second
    #[arg(short, long, default_value = "500", value_parser = clap::value_parser!(u32).range(1..=20_000))]
    rate: u32,

    /// Stop after this many seconds (default: run until interrupted)
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Gait cycles per second
    #[arg(long, default_value = "1.0")]
    cadence_hz: f64,

    /// Serve one TCP client at this address instead of writing to stdout
    #[arg(long, value_name = "HOST:PORT")]
    listen: Option<String>,

    /// Probability a line is cut short
    #[arg(long, default_value = "0.0")]
    truncate_prob: f64,

    /// Probability a field is replaced with non-numeric text
    #[arg(long, default_value = "0.0")]
    garbage_prob: f64,

    /// Probability NUL bytes are injected into a line
    #[arg(long, default_value = "0.0")]
    nul_prob: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress progress messages on stderr
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Faults
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct FaultRates {
    truncate: f64,
    garbage: f64,
    nul: f64,
}

#[derive(Debug, Default)]
struct FaultCounts {
    truncated: u64,
    garbage: u64,
    nul: u64,
}

// ============================================================================
// Generator
// ============================================================================

struct Generator {
    rng: StdRng,
    noise: Normal<f64>,
    fsr_noise: Normal<f64>,
    sample_period_ms: f64,
    cadence_hz: f64,
    time_ms: f64,
    faults: FaultRates,
    fault_counts: FaultCounts,
    lines: u64,
}

impl Generator {
    fn new(rate: u32, cadence_hz: f64, faults: FaultRates, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            noise: Normal::new(0.0, 0.15).context("pressure noise")?,
            fsr_noise: Normal::new(0.0, 8.0).context("FSR noise")?,
            sample_period_ms: 1000.0 / f64::from(rate),
            cadence_hz,
            time_ms: 0.0,
            faults,
            fault_counts: FaultCounts::default(),
            lines: 0,
        })
    }

    /// Values for the current instant, in wire order after the timestamp.
    fn sample(&mut self) -> [f64; 10] {
        let phase = (self.time_ms / 1000.0 * self.cadence_hz).fract();
        let mut values = [0.0; 10];

        // Channels 1-4 fire in stance, 5-8 in swing, each slightly delayed
        for (i, value) in values[..8].iter_mut().enumerate() {
            let offset = if i < 4 { 0.0 } else { 0.5 } + (i % 4) as f64 * 0.03;
            let activation = (TAU * (phase - offset)).sin().max(0.0);
            *value = BASELINE_KPA[i] + CONTRACTION_KPA * activation.powi(2) + self.noise.sample(&mut self.rng);
        }

        // Left heel loaded in the first half of the cycle, right in the second
        let left = if phase < 0.5 { (TAU * phase).sin() } else { 0.0 };
        let right = if phase >= 0.5 { -(TAU * phase).sin() } else { 0.0 };
        values[8] = (FSR_PEAK * left + self.fsr_noise.sample(&mut self.rng)).max(0.0).round();
        values[9] = (FSR_PEAK * right + self.fsr_noise.sample(&mut self.rng)).max(0.0).round();
        values
    }

    /// Next line including its terminator, with faults applied.
    fn next_line(&mut self) -> Vec<u8> {
        let values = self.sample();
        let mut fields: Vec<String> = Vec::with_capacity(11);
        fields.push(format!("{:.0}", self.time_ms));
        fields.extend(values.iter().map(|v| format!("{v:.2}")));
        self.time_ms += self.sample_period_ms;
        self.lines += 1;

        if self.rng.gen_bool(self.faults.garbage.clamp(0.0, 1.0)) {
            let field = self.rng.gen_range(0..fields.len());
            fields[field] = "ERR".to_string();
            self.fault_counts.garbage += 1;
        }

        let mut line = fields.join(",").into_bytes();

        if self.rng.gen_bool(self.faults.truncate.clamp(0.0, 1.0)) {
            let keep = self.rng.gen_range(1..line.len());
            line.truncate(keep);
            self.fault_counts.truncated += 1;
        }

        if self.rng.gen_bool(self.faults.nul.clamp(0.0, 1.0)) {
            let at = self.rng.gen_range(0..=line.len());
            line.splice(at..at, [0u8, 0u8]);
            self.fault_counts.nul += 1;
        }

        line.extend_from_slice(b"\r\n");
        line
    }
}

// ============================================================================
// Output
// ============================================================================

fn log_status(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[pmmg-sim] {message}");
    }
}

fn open_output(listen: Option<&str>, quiet: bool) -> Result<Box<dyn Write>> {
    match listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr).with_context(|| format!("Failed to bind {addr}"))?;
            log_status(&format!("Waiting for a client on {addr}"), quiet);
            let (stream, peer) = listener.accept().context("Failed to accept client")?;
            stream.set_nodelay(true).ok();
            log_status(&format!("Client connected from {peer}"), quiet);
            Ok(Box::new(BufWriter::new(stream)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    let faults = FaultRates {
        truncate: args.truncate_prob,
        garbage: args.garbage_prob,
        nul: args.nul_prob,
    };
    let mut generator = Generator::new(args.rate, args.cadence_hz, faults, args.seed)?;

    log_status(
        &format!(
            "{} lines/s, gait {:.2} Hz, faults: truncate {:.3} garbage {:.3} nul {:.3}",
            args.rate, args.cadence_hz, faults.truncate, faults.garbage, faults.nul
        ),
        args.quiet,
    );

    let mut out = open_output(args.listen.as_deref(), args.quiet)?;

    let start = Instant::now();
    let lines_per_batch = (f64::from(args.rate) * BATCH_INTERVAL.as_secs_f64()).max(1.0);
    let mut owed = 0.0_f64;
    let mut next_batch = start;

    loop {
        if args.seconds.is_some_and(|s| start.elapsed().as_secs_f64() >= s) {
            break;
        }

        owed += lines_per_batch;
        while owed >= 1.0 {
            let line = generator.next_line();
            if let Err(e) = out.write_all(&line) {
                // Reader went away
                if e.kind() == io::ErrorKind::BrokenPipe {
                    log_status("Output closed", args.quiet);
                    return Ok(());
                }
                return Err(e).context("Failed to write telemetry");
            }
            owed -= 1.0;
        }
        out.flush().context("Failed to flush telemetry")?;

        next_batch += BATCH_INTERVAL;
        if let Some(wait) = next_batch.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    out.flush()?;
    let counts = &generator.fault_counts;
    log_status(
        &format!(
            "Done: {} lines ({} truncated, {} garbage, {} with NUL)",
            generator.lines, counts.truncated, counts.garbage, counts.nul
        ),
        args.quiet,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_lines_parse() {
        let mut generator = Generator::new(500, 1.0, FaultRates::default(), Some(7)).unwrap();
        for i in 0..1000 {
            let line = generator.next_line();
            let text = String::from_utf8(line).unwrap();
            let record = pmmg_stream::parse_line(&text).unwrap();
            assert_eq!(record.timestamp_ms, (f64::from(i) * 2.0).round());
            assert!(record.fsr_left >= 0.0 && record.fsr_right >= 0.0);
        }
    }

    #[test]
    fn test_garbage_lines_are_rejected() {
        let faults = FaultRates {
            garbage: 1.0,
            ..FaultRates::default()
        };
        let mut generator = Generator::new(500, 1.0, faults, Some(7)).unwrap();
        for _ in 0..50 {
            let text = String::from_utf8(generator.next_line()).unwrap();
            assert!(pmmg_stream::parse_line(&text).is_err());
        }
        assert_eq!(generator.fault_counts.garbage, 50);
    }
}
