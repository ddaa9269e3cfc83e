//! loopdeck - beat-synchronized loop playback demo.
//!
//! Builds a small two-combination composition from synthesized buffers and
//! plays it while performing the live edits the engine exists for: a note
//! inserted mid-playback, a tempo change, and an atomic combination switch.
//!
//! # Usage
//!
//! ```bash
//! cargo run                     # play through the default audio device
//! cargo run -- --simulate      # no audio: print the issued schedule
//! cargo run -- --seconds 12    # play/simulate for 12 seconds
//! ```
//!
//! Set `RUST_LOG=debug` to watch scheduling passes.

use anyhow::{Context, Result};
use loopdeck::audio::capture::CaptureGraph;
use loopdeck::audio::rodio_out::RodioGraph;
use loopdeck::{
    AudioGraph, Combination, Composition, Engine, Keyboard, MelodicTrack, SampleBuffer,
    SampleTrack, TrackId,
};
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 44_100;

/// Command-line options for the demo.
struct CliOptions {
    /// Capture commands instead of playing audio.
    simulate: bool,
    /// How long to run, in seconds.
    seconds: f64,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--simulate` or `-s`: no audio device, print the issued schedule
    /// - `--seconds <n>`: run duration (default 8)
    /// - `--help` or `-h`: print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut simulate = false;
        let mut seconds = 8.0;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--simulate" | "-s" => simulate = true,
                "--seconds" => {
                    i += 1;
                    let value = args.get(i).context("--seconds requires a number")?;
                    seconds = value
                        .parse()
                        .with_context(|| format!("invalid --seconds value: {value}"))?;
                }
                "--help" | "-h" => {
                    eprintln!("loopdeck - beat-synchronized loop playback demo");
                    eprintln!();
                    eprintln!(
                        "Usage: {} [OPTIONS]",
                        args.first().map(String::as_str).unwrap_or("loopdeck")
                    );
                    eprintln!();
                    eprintln!("Options:");
                    eprintln!("  -s, --simulate     Capture the schedule instead of playing audio");
                    eprintln!("      --seconds N    Run for N seconds (default 8)");
                    eprintln!("  -h, --help         Print this help message");
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown option: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Ok(Self { simulate, seconds })
    }
}

/// One-second mono sine at `freq`, with a short linear fade-out to avoid
/// clicks at note ends.
fn sine_buffer(freq: f64) -> SampleBuffer {
    let frames = SAMPLE_RATE as usize;
    let fade = frames / 10;
    let data: Vec<f32> = (0..frames)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let envelope = if i >= frames - fade {
                (frames - i) as f32 / fade as f32
            } else {
                1.0
            };
            (0.25 * (std::f64::consts::TAU * freq * t).sin()) as f32 * envelope
        })
        .collect();
    SampleBuffer::new(data, 1, SAMPLE_RATE)
}

/// Two seconds of decaying noise bursts, one per half-second: a stand-in
/// drum loop.
fn drum_loop_buffer() -> SampleBuffer {
    let frames = SAMPLE_RATE as usize * 2;
    let burst = SAMPLE_RATE as usize / 8;
    let mut rng: u32 = 0x2545_f491;
    let data: Vec<f32> = (0..frames)
        .map(|i| {
            let in_burst = i % (SAMPLE_RATE as usize / 2);
            if in_burst >= burst {
                return 0.0;
            }
            // xorshift noise, decaying over the burst
            rng ^= rng << 13;
            rng ^= rng >> 17;
            rng ^= rng << 5;
            let noise = (rng as f32 / u32::MAX as f32) - 0.5;
            let decay = 1.0 - in_burst as f32 / burst as f32;
            0.4 * noise * decay * decay
        })
        .collect();
    SampleBuffer::new(data, 1, SAMPLE_RATE)
}

/// C-major keyboard, one octave.
fn demo_keyboard() -> Keyboard {
    let freqs = [
        261.63, 293.66, 329.63, 349.23, 392.0, 440.0, 493.88, 523.25,
    ];
    Keyboard::new("sine octave", freqs.iter().map(|&f| sine_buffer(f)).collect())
}

/// Two combinations: a melodic "verse" and a "chorus" pairing a drum loop
/// with an arpeggio.
fn demo_composition() -> (Composition, TrackId) {
    let mut composition = Composition::new("demo session");

    let mut verse = Combination::new("verse");
    let mut lead = MelodicTrack::new("lead", demo_keyboard(), 1, 4);
    lead.insert_note(0, 0.0, 1.0);
    lead.insert_note(2, 1.0, 2.0);
    lead.insert_note(4, 2.0, 3.0);
    lead.insert_note(7, 3.0, 4.0);
    let lead_id = verse.add_melodic_track(lead);

    let mut chorus = Combination::new("chorus");
    chorus.add_sample_track(SampleTrack::new("drums", drum_loop_buffer(), 4));
    let mut arp = MelodicTrack::new("arp", demo_keyboard(), 1, 4);
    arp.insert_note(0, 0.0, 0.5);
    arp.insert_note(4, 0.5, 1.0);
    arp.insert_note(7, 1.0, 1.5);
    arp.insert_note(4, 1.5, 2.0);
    chorus.add_melodic_track(arp);

    composition.add_combination(verse);
    composition.add_combination(chorus);
    (composition, lead_id)
}

/// The demo's scripted live edits, triggered as playback time passes each
/// threshold.
fn apply_edits<G: AudioGraph>(
    engine: &mut Engine<G>,
    lead: TrackId,
    elapsed: f64,
    applied: &mut u32,
) {
    if *applied == 0 && elapsed >= 2.0 {
        *applied = 1;
        println!("[{elapsed:5.2}s] inserting a note mid-playback");
        if let Err(e) = engine.add_note(lead, 5, 2.5, 3.5) {
            eprintln!("insert failed: {e}");
        }
    }
    if *applied == 1 && elapsed >= 4.0 {
        *applied = 2;
        println!("[{elapsed:5.2}s] tempo change 120 -> 90 bpm");
        engine.set_bpm(90.0);
    }
    if *applied == 2 && elapsed >= 6.0 {
        *applied = 3;
        println!("[{elapsed:5.2}s] switching to the chorus combination");
        if let Err(e) = engine.play_combination(1) {
            eprintln!("switch failed: {e}");
        }
    }
}

/// Plays through the default output device in real time.
fn run_live(seconds: f64) -> Result<()> {
    let graph = RodioGraph::new()?;
    let (composition, lead) = demo_composition();
    let mut engine = Engine::new(graph, composition);

    engine
        .play_combination(0)
        .map_err(|e| anyhow::anyhow!("failed to start playback: {e}"))?;
    println!("playing \"verse\" at 120 bpm");

    let started = Instant::now();
    let mut applied = 0;
    while started.elapsed().as_secs_f64() < seconds {
        engine.pump();
        apply_edits(&mut engine, lead, started.elapsed().as_secs_f64(), &mut applied);
        std::thread::sleep(Duration::from_millis(10));
    }
    engine.stop_playing();
    Ok(())
}

/// Runs the same script against the capture graph and prints every command
/// the schedulers issued.
fn run_simulated(seconds: f64) -> Result<()> {
    let graph = CaptureGraph::new();
    let (composition, lead) = demo_composition();
    let mut engine = Engine::new(graph, composition);

    engine
        .play_combination(0)
        .map_err(|e| anyhow::anyhow!("failed to start playback: {e}"))?;
    println!("simulating \"verse\" at 120 bpm");

    let step = 0.05;
    let mut elapsed = 0.0;
    let mut applied = 0;
    while elapsed < seconds {
        engine.graph_mut().advance(step);
        elapsed += step;
        engine.pump();
        apply_edits(&mut engine, lead, elapsed, &mut applied);
    }
    engine.stop_playing();

    println!();
    println!(
        "issued schedule ({} commands):",
        engine.graph().commands().len()
    );
    for command in engine.graph().commands() {
        println!(
            "  node {:>3?}  at {:>7.3}s  duration {:<10} frames {:>6}{}",
            command.node,
            command.at.seconds(),
            command
                .duration
                .map(|d| format!("{d:.3}s"))
                .unwrap_or_else(|| "full".to_string()),
            command.frames,
            if command.cancelled { "  (flushed)" } else { "" },
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    // Initialize logging (optional, for debugging)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if cli.simulate {
        run_simulated(cli.seconds)
    } else {
        run_live(cli.seconds)
    }
}
