//! Demonstrates click_midi: count-ins, tempo changes, ramps, vamps and cues.

use click_midi::{ClickConfig, ClickTrack, Cue, CueSheet};
use click_timeline::Voice;

fn main() {
    println!("\n=== Click Track Demo ===\n");

    // ── 1. The basics: 4/4 count-in, a vamp, then Go ──────────────────────
    println!("1. 4/4 @ 120, 2-bar count-in, 8 bars, 4-bar vamp, Go");
    let mut track = ClickTrack::new();
    track.initialize()
        .set_time_signature(4, 4).unwrap()
        .set_tempo(120.0).unwrap()
        .count_in(2).unwrap()
        .rehearsal_marker(None)
        .insert_measures(8).unwrap()
        .vamp(4).unwrap()
        .go().unwrap()
        .rehearsal_marker(None);
    let path = track.save("01_basic_vamp").unwrap();
    println!("   → {}  (ends at m.{})\n", path.display(), track.current_measure());

    // ── 2. Accelerando across a meter change ──────────────────────────────
    println!("2. 3/4 @ 90, ramp to 132 over 4 bars, then 6/8");
    let mut track = ClickTrack::new();
    track.initialize()
        .set_time_signature(3, 4).unwrap()
        .set_tempo(90.0).unwrap()
        .count_in(1).unwrap()
        .apply_tempo_ramp(90.0, 132.0, 4).unwrap()
        .skip_measures(4)
        .set_time_signature(6, 8).unwrap()
        .rehearsal_marker(None)
        .insert_measures(4).unwrap();
    let path = track.save("02_accel_meter_change").unwrap();
    println!("   → {}\n", path.display());

    // ── 3. Starting mid-show: skip to bar 57 ──────────────────────────────
    println!("3. Pickup at m.57 with a ritardando into the vamp");
    let mut track = ClickTrack::new();
    track.initialize()
        .set_time_signature(4, 4).unwrap()
        .skip_measures(56)
        .rehearsal_marker(None)
        .set_tempo(140.0).unwrap()
        .insert_measures(4).unwrap()
        .apply_tempo_ramp(140.0, 100.0, 2).unwrap()
        .skip_measures(2)
        .vamp(2).unwrap()
        .go().unwrap();
    let path = track.save("03_mid_show_pickup").unwrap();
    println!("   → {}\n", path.display());

    // ── 4. Custom voicing on the drum channel ─────────────────────────────
    println!("4. Side stick click + cowbell Go on channel 10, 960 ticks/beat");
    let config = ClickConfig {
        ticks_per_beat: 960,
        channel:        9,
        click:          Voice::new(37, 100),
        cue:            Voice::new(56, 127),
        ..ClickConfig::default()
    };
    let mut track = ClickTrack::with_config(config).unwrap();
    track.initialize()
        .set_time_signature(5, 4).unwrap()
        .set_tempo(104.0).unwrap()
        .count_in(2).unwrap()
        .vamp(2).unwrap()
        .go().unwrap();
    let path = track.save("04_drum_channel").unwrap();
    println!("   → {}\n", path.display());

    // ── 5. The same idea as data ──────────────────────────────────────────
    println!("5. Cue sheet built in code");
    let sheet = CueSheet {
        name: "05_cue_sheet".to_string(),
        cues: vec![
            Cue::TimeSignature(4, 4),
            Cue::Tempo(76.0),
            Cue::CountIn(1),
            Cue::Marker(None),
            Cue::Measures(16),
            Cue::TempoRamp { from: 76.0, to: 96.0, measures: 2 },
            Cue::Skip(2),
            Cue::Vamp(4),
            Cue::Go,
        ],
    };
    let path = sheet.render_to_file(ClickConfig::default()).unwrap();
    println!("   → {}\n", path.display());

    println!("All files written.  Load any .midi into your playback rig or DAW.\n");
}
