//! emostab CLI
//!
//! Usage:
//!   emostab --replay session.jsonl          # Replay a classification script through the loop
//!   emostab --interactive                   # Type "label confidence" lines
//!   emostab --serve                         # HTTP API server
//!   emostab --replay f.jsonl --json         # JSON output

use clap::Parser;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use emostab::core::{run_server, Control, EmotionEngine, FnSink, ProcessingLoop, ScriptedSource};
use emostab::logging::init_logging;
use emostab::types::{
    ConfigOverrides, DeviceClass, EmotionLabel, EmotionSample, Emission, EngineConfig,
    EngineError, EngineResult, Modality, SinkError,
};
use emostab::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "emostab",
    version = VERSION,
    about = "Emotion stabilization engine - stable emotional state from noisy classifications",
    long_about = "emostab turns a stream of noisy emotion classifications into a\n\
                  temporally stable, confidence-scored emotional state.\n\n\
                  Modes:\n  \
                  --replay FILE  JSON lines ({\"label\":\"happy\",\"confidence\":0.8,\"delay_ms\":0})\n  \
                  --interactive  Type 'label confidence' per line ('reset', 'quit')\n  \
                  --serve        HTTP API server mode\n\n\
                  Modalities:\n  \
                  video  per-frame, temporal voting with hysteresis\n  \
                  audio  per-utterance, sliding window with stability count"
)]
struct Args {
    /// Replay a JSON-lines script through the processing loop
    #[arg(short, long)]
    replay: Option<String>,

    /// Interactive mode - read "label confidence" lines from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Modality preset: video or audio
    #[arg(short, long, default_value = "video")]
    modality: String,

    /// Use mobile cadence and timeouts
    #[arg(long)]
    mobile: bool,

    /// Config overrides, inline JSON or a path to a JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Show held state after each line
    #[arg(long)]
    verbose: bool,

    /// Log level or filter directive (EMOSTAB_LOG overrides)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }
    if let Err(e) = init_logging(&args.log_level, args.json) {
        eprintln!("{}", e);
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let result = if args.serve {
        block_on(run_serve(&args))
    } else if let Some(ref path) = args.replay {
        block_on(run_replay(path, config, &args))
    } else {
        run_interactive(config, &args)
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Multi-threaded runtime for the async modes; interactive mode runs without one
fn block_on<F>(mode: F) -> EngineResult<()>
where
    F: std::future::Future<Output = EngineResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(mode)
}

fn device(args: &Args) -> DeviceClass {
    if args.mobile {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}

/// Preset for the chosen modality with overrides applied
fn build_config(args: &Args) -> EngineResult<EngineConfig> {
    let modality = match args.modality.to_lowercase().as_str() {
        "video" => Modality::Video,
        "audio" => Modality::Audio,
        other => {
            return Err(EngineError::Config(format!(
                "unknown modality {:?} (expected video or audio)",
                other
            )))
        }
    };
    let base = EngineConfig::for_modality(modality, device(args));

    match &args.config {
        None => Ok(base),
        Some(raw) => {
            let json = if raw.trim_start().starts_with('{') {
                raw.clone()
            } else {
                std::fs::read_to_string(raw)?
            };
            ConfigOverrides::from_json(&json)?.apply(&base)
        }
    }
}

fn print_emission(emission: &Emission, args: &Args) {
    if args.json {
        match serde_json::to_string(emission) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
    } else if args.no_color {
        println!("{}", emission.to_parseable_string());
    } else {
        println!("{}", emission.to_terminal_string());
    }
}

/// Replay a script through a full processing loop
async fn run_replay(path: &str, config: EngineConfig, args: &Args) -> EngineResult<()> {
    let source = Arc::new(ScriptedSource::from_path(path)?);
    let poll = config.cadence();
    let settle = config.cadence() + config.sample_timeout();

    if !args.json {
        print_header("Replay", args.no_color);
        println!("{} entries from {} ({})", source.total(), path, config.modality);
        println!();
    }

    let json = args.json;
    let no_color = args.no_color;
    let sink = FnSink(move |emission: &Emission| -> Result<(), SinkError> {
        if json {
            let line = serde_json::to_string(emission).map_err(|e| SinkError::Rejected(e.to_string()))?;
            println!("{}", line);
        } else if no_color {
            println!("{}", emission.to_parseable_string());
        } else {
            println!("{}", emission.to_terminal_string());
        }
        Ok(())
    });

    let processing = ProcessingLoop::new(EmotionEngine::try_new(config)?, Box::new(sink));
    let (control, control_rx) = mpsc::channel(8);
    // cannot fail: the receiver is alive and the buffer is empty
    let _ = control.try_send(Control::Start(Some("replay".to_string())));
    let task = tokio::spawn(processing.run(Arc::clone(&source), control_rx));

    while !source.is_exhausted() {
        tokio::time::sleep(poll).await;
    }
    tokio::time::sleep(settle).await;
    let _ = control.send(Control::Shutdown).await;

    let stats = task
        .await
        .map_err(|e| EngineError::InvalidSample(format!("replay task failed: {}", e)))?;

    if args.json {
        if let Ok(json) = serde_json::to_string(&stats) {
            eprintln!("{}", json);
        }
    } else {
        println!();
        println!(
            "Replay done. samples={} misses={} emissions={} soft_resets={} watchdog_resets={}",
            stats.samples, stats.misses, stats.emissions, stats.soft_resets, stats.watchdog_resets
        );
    }
    Ok(())
}

/// Push lines straight into an engine
fn run_interactive(config: EngineConfig, args: &Args) -> EngineResult<()> {
    let mut engine = EmotionEngine::try_new(config)?;
    engine.set_session(Some("interactive".to_string()));

    print_header("Interactive", args.no_color);
    println!("Enter 'label confidence' (e.g. 'happy 0.8'). 'reset' clears state, 'quit' exits.");
    println!("Labels: {}", EmotionLabel::ALL.map(|l| l.as_str()).join(", "));
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{}", format_prompt(&engine, args.no_color));
        stdout.flush()?;

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            println!("\nSession ended. Samples: {}", engine.observed());
            break;
        }
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("reset") {
            engine.reset();
            println!("state cleared");
            continue;
        }

        let sample = match parse_sample_line(line) {
            Ok(sample) => sample,
            Err(e) => {
                let msg = format!("⚠ {}", e);
                println!("{}", if args.no_color { msg.normal() } else { msg.yellow() });
                continue;
            }
        };

        let now = Instant::now();
        match engine.observe(sample, now) {
            Some(emission) => print_emission(&emission, args),
            None if args.verbose => {
                let state = engine.state();
                println!(
                    "  held={} conf={:.2} count={} buffered={}",
                    state.label.map(|l| l.as_str()).unwrap_or("-"),
                    state.confidence,
                    state.stability_count,
                    engine.buffered()
                );
            }
            None => {}
        }
    }
    Ok(())
}

/// "label confidence" → sample; the last token is the confidence
fn parse_sample_line(line: &str) -> EngineResult<EmotionSample> {
    let (label, confidence) = line
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| EngineError::InvalidSample(format!("expected 'label confidence', got {:?}", line)))?;
    let label: EmotionLabel = label.trim().parse()?;
    let confidence: f64 = confidence
        .parse()
        .map_err(|_| EngineError::InvalidSample(format!("bad confidence {:?}", confidence)))?;
    Ok(EmotionSample::new(label, confidence))
}

/// Print header
fn print_header(mode: &str, no_color: bool) {
    let title = format!("emostab v{} - {}", VERSION, mode);
    if no_color {
        println!("========================================");
        println!("  {}", title);
        println!("========================================");
    } else {
        println!("{}", "════════════════════════════════════════".bold());
        println!("  {}", title.bold());
        println!("{}", "════════════════════════════════════════".bold());
    }
    println!();
}

/// Prompt showing the held emotion
fn format_prompt(engine: &EmotionEngine, no_color: bool) -> String {
    match engine.state().label {
        None => "[-] > ".to_string(),
        Some(label) if no_color => format!("[{}] > ", label),
        Some(label) => format!(
            "{} {} > ",
            label.emoji(),
            format!("[{}]", label).color(label.color())
        ),
    }
}

/// Run HTTP API server
async fn run_serve(args: &Args) -> EngineResult<()> {
    if !args.no_color {
        println!("{}", format!("emostab API server v{}", VERSION).bold());
        println!();
    }
    run_server(&args.addr, device(args))
        .await
        .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_line() {
        let sample = parse_sample_line("happy 0.8").unwrap();
        assert_eq!(sample.label, EmotionLabel::Happy);
        assert!((sample.confidence - 0.8).abs() < 1e-9);

        let sample = parse_sample_line("too noisy 0.5").unwrap();
        assert_eq!(sample.label, EmotionLabel::TooNoisy);

        assert!(parse_sample_line("happy").is_err());
        assert!(parse_sample_line("bored 0.5").is_err());
        assert!(parse_sample_line("sad lots").is_err());
    }

    #[test]
    fn test_async_modes_get_their_own_runtime() {
        // called from a plain thread: no ambient runtime exists here
        assert!(tokio::runtime::Handle::try_current().is_err());
        let result = block_on(async {
            assert!(tokio::runtime::Handle::try_current().is_ok());
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            Err(EngineError::Config("stop".into()))
        });
        assert!(matches!(result, Err(EngineError::Config(ref msg)) if msg == "stop"));
    }
}
