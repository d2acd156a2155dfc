//! Myco - a polyphonic keyboard synth

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use log::LevelFilter;
use myco::audio::{AudioDevice, RenderDevice, SharedDevice};
use myco::config::{self, SynthConfig};
use myco::engine::{
    list_output_devices, open_output, NoteScript, NullObserver, Player, Recorder, SynthEngine,
};
use myco::input::{self, TerminalObserver};
use myco::keymap;

mod cli;

use cli::{Cli, Commands};

/// Host loop period while no keyboard session is running
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Play => {
            let cfg = config::load_or_default(&cli.config)?;
            let (shared, mut player) = start_output(&cfg);

            let mut engine = SynthEngine::from_config(shared, TerminalObserver, &cfg);
            if engine.is_inert() {
                player.stop();
                bail!("No audio output available");
            }

            println!(
                "Myco ready. Master volume {:.0}%, {} waveform.",
                engine.master_volume() * 100.0,
                engine.waveform()
            );
            print_keys();
            println!();

            let result = input::run(&mut engine, &cfg.keyboard);
            player.stop();
            result?;
        }

        Commands::TestTone { waveform } => {
            let cfg = config::load_or_default(&cli.config)?;
            let (shared, mut player) = start_output(&cfg);

            let mut engine = SynthEngine::from_config(shared, NullObserver, &cfg);
            let waveform = waveform.unwrap_or(engine.waveform());
            let Some(tone) = keymap::binding(keymap::TEST_TONE) else {
                bail!("Test tone note {} is not bound", keymap::TEST_TONE);
            };

            println!("Playing {} ({} Hz, {})...", tone.note, tone.frequency, waveform);
            engine.note_on_with(tone.note, tone.frequency, waveform)?;
            poll_for(&mut engine, Duration::from_millis(cfg.keyboard.test_tone_ms));
            engine.note_off(tone.note);

            // Let the release finish, bounded in case the stream stalls
            let release = Duration::from_secs_f64(engine.envelope().release);
            let give_up = Instant::now() + release + Duration::from_secs(1);
            while engine.has(tone.note) && Instant::now() < give_up {
                thread::sleep(POLL_INTERVAL);
                engine.poll();
            }
            engine.panic();
            player.stop();
            println!("Done.");
        }

        Commands::Record { output, script, waveform } => {
            let mut cfg = config::load_or_default(&cli.config)?;
            if let Some(waveform) = waveform {
                cfg.master.waveform = waveform;
            }
            let script: NoteScript = script.parse()?;
            let sample_rate = cfg.audio.sample_rate;

            println!(
                "Recording {} steps ({:.1}s + release) to {:?}...",
                script.steps().len(),
                script.duration(),
                output
            );

            let device = RenderDevice::new(sample_rate);
            let mut engine = SynthEngine::from_config(device, NullObserver, &cfg);
            let mut recorder = Recorder::create(&output, sample_rate)?;
            script.render(&mut engine, cfg.audio.buffer_size, |block| {
                recorder.write_buffer(block)
            })?;

            let summary = recorder.finalize()?;
            println!(
                "Recorded {:.2}s ({} samples, peak {:.3}) to {:?}",
                summary.duration_secs, summary.samples, summary.peak, output
            );
        }

        Commands::Devices => {
            println!("Available audio devices:\n");

            match open_output(None) {
                Ok(target) => {
                    println!("Default output: {}", target.name());
                    println!(
                        "  Sample rate: {} Hz, Channels: {}",
                        target.sample_rate(),
                        target.channels()
                    );
                }
                Err(e) => println!("Default output: none ({})", e),
            }
            println!();

            println!("Output devices:");
            let devices = list_output_devices();
            if devices.is_empty() {
                println!("  (none)");
            }
            for (name, config) in devices {
                println!("  - {} ({} Hz, {} ch)", name, config.sample_rate.0, config.channels);
            }
        }

        Commands::Keys => print_keys(),

        Commands::Check => {
            println!("Checking configuration at {:?}...", cli.config);

            match config::load_config(&cli.config) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  Sample rate: {} Hz", cfg.audio.sample_rate);
                    println!("  Buffer size: {}", cfg.audio.buffer_size);
                    let device = cfg.audio.device.as_deref().unwrap_or("default");
                    println!("  Output device: {}", device);
                    println!("  Master volume: {:.0}%", cfg.master.volume * 100.0);
                    println!("  Waveform: {}", cfg.master.waveform);
                    let env = &cfg.envelope;
                    println!(
                        "  Envelope: attack {}ms to {}, decay {}ms to {}, release {}ms to {}",
                        env.attack_ms,
                        env.peak,
                        env.decay_ms,
                        env.sustain,
                        env.release_ms,
                        env.release_floor
                    );
                    println!(
                        "  Keyboard: hold {}ms, test tone {}ms",
                        cfg.keyboard.hold_ms, cfg.keyboard.test_tone_ms
                    );
                }
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            let path = &cli.config;
            if path.exists() {
                println!("{:?} already exists. Not overwriting.", path);
            } else {
                std::fs::write(path, config::EXAMPLE_CONFIG)?;
                println!("Created {:?} with example configuration.", path);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    // Raw-mode terminals need an explicit carriage return
    builder.format(|buf, record| {
        write!(buf, "[{} {}] {}\r\n", record.level(), record.target(), record.args())
    });
    builder.init();
}

/// Render into the output device. Without a usable output the device is
/// failed, so the engine built on it starts inert and reports why.
fn start_output(cfg: &SynthConfig) -> (SharedDevice, Player) {
    let mut player = Player::new();

    match open_output(cfg.audio.device.as_deref()) {
        Ok(target) => {
            let shared = SharedDevice::new(RenderDevice::new(target.sample_rate()));
            if let Err(e) = player.start(target, shared.clone()) {
                shared.fail(format!("{:#}", e));
            }
            (shared, player)
        }
        Err(e) => {
            let shared = SharedDevice::new(RenderDevice::new(cfg.audio.sample_rate));
            shared.fail(format!("{:#}", e));
            (shared, player)
        }
    }
}

fn poll_for<D: AudioDevice>(engine: &mut SynthEngine<D, NullObserver>, duration: Duration) {
    let until = Instant::now() + duration;
    while Instant::now() < until {
        thread::sleep(POLL_INTERVAL);
        engine.poll();
    }
}

fn print_keys() {
    let row = |sharp: bool| -> String {
        keymap::BINDINGS
            .iter()
            .filter(|b| keymap::is_sharp(b.note) == sharp)
            .map(|b| format!("{}={}", b.key.to_ascii_uppercase(), b.note))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("Sharps:  {}", row(true));
    println!("Notes:   {}", row(false));
    println!("1-4 waveform (sine, square, sawtooth, triangle)   +/- volume");
    println!("space test tone   0 panic   q/Esc quit");
}
