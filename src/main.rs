use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_vad::audio;
use beacon_vad::options::OptionScope;
use beacon_vad::{Config, MicDetectorFactory, OptionKey, VadController, VadState};

/// Beacon VAD - Microphone voice activity detection
#[derive(Parser)]
#[command(name = "beacon-vad", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a controller against the microphone, driven from stdin
    Listen {
        /// Directory to write speech segments to as WAV files
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Option override (repeatable), e.g. `-o start_on_ready=false`
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
    /// List audio input devices
    Devices,
    /// List recognized options
    Options,
}

/// Speech events forwarded from the audio thread to the console loop
enum SpeechEvent {
    Start,
    End(Vec<f32>),
    Misfire,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_vad=info",
        1 => "info,beacon_vad=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Listen { save_dir, options } => listen(save_dir, &options).await,
        Command::Devices => list_devices(),
        Command::Options => {
            list_options();
            Ok(())
        }
    }
}

async fn listen(save_dir: Option<PathBuf>, pairs: &[String]) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    config.apply_pairs(pairs)?;

    let save_dir = save_dir.or(config.save_dir);
    if let Some(dir) = &save_dir {
        std::fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "saving speech segments");
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let overrides = {
        let start_tx = events_tx.clone();
        let end_tx = events_tx.clone();
        config
            .options
            .clone()
            .on_speech_start(move || {
                let _ = start_tx.send(SpeechEvent::Start);
            })
            .on_speech_end(move |audio| {
                let _ = end_tx.send(SpeechEvent::End(audio));
            })
            .on_misfire(move || {
                let _ = events_tx.send(SpeechEvent::Misfire);
            })
    };

    let controller = VadController::mount(Arc::new(MicDetectorFactory::new()), &overrides);
    let mut state_rx = controller.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut segments = 0usize;

    print_help();
    print_state(&controller.state());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "init" | "initialize" => {
                        // Keep reading commands while the detector is built
                        let controller = Arc::clone(&controller);
                        tokio::spawn(async move {
                            controller.initialize().await;
                        });
                    }
                    "start" => controller.start(),
                    "pause" => controller.pause(),
                    "toggle" => controller.toggle(),
                    "terminate" => controller.terminate(),
                    "status" => println!("{}", controller.state().to_json()?),
                    "help" => print_help(),
                    "quit" | "exit" => break,
                    other => println!("unknown command: {other} (try `help`)"),
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                print_state(&state);
            }
            Some(event) = events_rx.recv() => match event {
                SpeechEvent::Start => println!("speech start"),
                SpeechEvent::Misfire => println!("vad misfire"),
                SpeechEvent::End(samples) => {
                    segments += 1;
                    #[allow(clippy::cast_precision_loss)]
                    let secs = samples.len() as f32 / audio::SAMPLE_RATE as f32;
                    println!("speech end: segment {segments} ({secs:.2}s)");

                    if let Some(dir) = &save_dir {
                        let path = dir.join(format!("segment-{segments:04}.wav"));
                        if let Err(e) = audio::write_wav(&path, &samples) {
                            tracing::error!(path = %path.display(), error = %e, "failed to save segment");
                        }
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.unmount();
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let devices = audio::list_input_devices()?;
    if devices.is_empty() {
        println!("no input devices found");
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{marker} {}", device.name);
    }
    Ok(())
}

fn list_options() {
    for key in OptionKey::ALL {
        let scope = match key.scope() {
            OptionScope::Controller => "controller",
            OptionScope::Detector => "detector",
        };
        let note = if key.is_callback() { " (programmatic only)" } else { "" };
        println!("{:<30} {scope}{note}", key.as_str());
    }
}

fn print_help() {
    println!("commands: init, start, pause, toggle, terminate, status, help, quit");
}

fn print_state(state: &VadState) {
    match &state.error {
        Some(error) => println!("state: {} ({error})", state.phase()),
        None => println!(
            "state: {} ready={} listening={} speaking={}",
            state.phase(),
            u8::from(state.ready),
            u8::from(state.listening),
            u8::from(state.user_speaking),
        ),
    }
}
