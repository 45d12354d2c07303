//! Render cue sheets to MIDI click tracks.
//!
//! `click_track sheet.ron [more.ron …]` renders each sheet and exits.
//! Without arguments an interactive menu runs.  `CLICK_CONFIG` may name a
//! RON [`ClickConfig`] file; `RUST_LOG` controls log output.

use click_midi::{ClickConfig, ClickError, ClickTrack, CueSheet};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let sheets: Vec<String> = std::env::args().skip(1).collect();
    if !sheets.is_empty() {
        let mut failed = false;
        for path in &sheets {
            if let Err(e) = render_sheet(path, &config) {
                error!(sheet = %path, "{}", e);
                failed = true;
            }
        }
        return if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }

    menu(&config);
    ExitCode::SUCCESS
}

fn load_config() -> Result<ClickConfig, ClickError> {
    match std::env::var_os("CLICK_CONFIG") {
        Some(path) => ClickConfig::load(path),
        None => Ok(ClickConfig::default()),
    }
}

fn render_sheet(path: &str, config: &ClickConfig) -> Result<(), ClickError> {
    let sheet = CueSheet::load(path)?;
    let out = sheet.render_to_file(config.clone())?;
    println!("  ✓  {} → {}", path, out.display());
    Ok(())
}

fn menu(config: &ClickConfig) {
    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║               MIDI Click Track Builder                   ║");
    println!("║  count-ins · tempo ramps · vamps · Go cues               ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();
    println!("  Output folder: {}", config.output_folder.display());
    println!();

    loop {
        println!("  Main menu:");
        println!("    1. Render a cue sheet (.ron)");
        println!("    2. Print a cue sheet's events");
        println!("    3. Quick demo (4/4 @ 120, 2-bar count-in, vamp, Go)");
        println!("    q. Quit");
        println!();

        match read_line("Choice: ").trim() {
            "1" => {
                let path = read_line("  Cue sheet path: ").trim().to_string();
                if let Err(e) = render_sheet(&path, config) {
                    println!("  ⚠  {}", e);
                }
            }
            "2" => print_events(config),
            "3" => quick_demo(config),
            "q" | "quit" => { println!("\nGoodbye!\n"); break; }
            _   => println!("  ⚠  Enter 1–3 or q.\n"),
        }
        println!();
    }
}

fn print_events(config: &ClickConfig) {
    let path = read_line("  Cue sheet path: ").trim().to_string();
    let track = match CueSheet::load(&path).and_then(|s| s.render(config.clone())) {
        Ok(track) => track,
        Err(e)    => { println!("  ⚠  {}", e); return; }
    };
    let mut tick: u64 = 0;
    for event in track.events() {
        tick += event.delta_ticks() as u64;
        println!("    {:>8}  {}", tick, event);
    }
    println!("  {} events, ends at measure {}", track.events().len(), track.current_measure());
}

fn quick_demo(config: &ClickConfig) {
    let filename = read_line("  Output name (default: demo): ").trim().to_string();
    let filename = if filename.is_empty() { "demo".to_string() } else { filename };

    let built = ClickTrack::with_config(config.clone()).and_then(|mut track| {
        track
            .initialize()
            .set_time_signature(4, 4)?
            .set_tempo(120.0)?
            .count_in(2)?
            .rehearsal_marker(None)
            .insert_measures(8)?
            .vamp(4)?
            .go()?;
        Ok(track)
    });

    match built.and_then(|track| track.save(&filename)) {
        Ok(path) => println!("  ✓  Written to '{}'\n", path.display()),
        Err(e)   => println!("  ⚠  {}", e),
    }
}

fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf
}
