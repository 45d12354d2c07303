//! # click_midi
//!
//! Build click tracks for live performance and write them as standard MIDI
//! files (Type 0, single track):
//!
//! * **Count-ins** and **measures** → one click pulse per measure
//! * **Tempo ramps** → one tempo change plus a click per beat
//! * **Vamps** and **Go** cues → markers plus pulses a playback rig can follow
//!
//! The timeline logic lives in [`click_timeline`]; this crate accumulates
//! its steps in a [`ClickTrack`], encodes them with `midly`, and handles
//! configuration and cue sheets.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use click_midi::ClickTrack;
//!
//! # fn main() -> Result<(), click_midi::ClickError> {
//! let mut track = ClickTrack::new();
//! track
//!     .initialize()
//!     .set_time_signature(4, 4)?
//!     .set_tempo(120.0)?
//!     .count_in(2)?
//!     .rehearsal_marker(None)
//!     .vamp(4)?
//!     .go()?;
//!
//! let path = track.save("opener")?;   // MidiFiles/opener.midi
//! # let _ = path;
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use click_timeline::{Cursor, Event, Step, TimelineError, Voice, Voicing};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use click_timeline;

// ════════════════════════════════════════════════════════════════════════════
// ClickError
// ════════════════════════════════════════════════════════════════════════════

/// Everything that can go wrong building, encoding or saving a click track.
#[derive(Debug, thiserror::Error)]
pub enum ClickError {
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode MIDI: {0}")]
    Encode(#[source] std::io::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path:   PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ClickError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ClickError + '_ {
    move |source| ClickError::Io { path: path.to_path_buf(), source }
}

// ════════════════════════════════════════════════════════════════════════════
// ClickConfig
// ════════════════════════════════════════════════════════════════════════════

/// Output and voicing settings for a [`ClickTrack`].
///
/// Every field has a default, so a RON file only needs the fields it
/// changes:
///
/// ```ron
/// (
///     output_folder: "renders",
///     cue: (pitch: 76, velocity: 120),
/// )
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    /// Folder files are written to; created on save if missing.
    pub output_folder:  PathBuf,
    /// File extension, without the dot.
    pub extension:      String,
    /// MIDI resolution (ticks per quarter-note beat).
    pub ticks_per_beat: u16,
    /// MIDI channel (0–15) for click and cue notes.
    pub channel:        u8,
    /// Voice for measure, count-in, vamp and ramp clicks.
    pub click:          Voice,
    /// Voice for the Go cue.
    pub cue:            Voice,
}

impl Default for ClickConfig {
    fn default() -> Self {
        ClickConfig {
            output_folder:  PathBuf::from("MidiFiles"),
            extension:      "midi".to_string(),
            ticks_per_beat: click_timeline::DEFAULT_TICKS_PER_BEAT,
            channel:        0,
            click:          Voice::CLICK,
            cue:            Voice::CUE,
        }
    }
}

impl ClickConfig {
    /// Read a RON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        let config: ClickConfig = ron::from_str(&text)
            .map_err(|source| ClickError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field fits its MIDI range.
    pub fn validate(&self) -> Result<()> {
        if self.ticks_per_beat == 0 || self.ticks_per_beat > 0x7FFF {
            return Err(ClickError::InvalidConfig(format!(
                "ticks_per_beat must be 1–32767, got {}", self.ticks_per_beat)));
        }
        if self.channel > 15 {
            return Err(ClickError::InvalidConfig(format!(
                "channel must be 0–15, got {}", self.channel)));
        }
        for (name, voice) in [("click", self.click), ("cue", self.cue)] {
            if voice.pitch > 127 || voice.velocity > 127 {
                return Err(ClickError::InvalidConfig(format!(
                    "{} voice out of range: pitch {} velocity {}",
                    name, voice.pitch, voice.velocity)));
            }
        }
        if self.extension.is_empty() {
            return Err(ClickError::InvalidConfig("extension must not be empty".into()));
        }
        Ok(())
    }

    pub fn voicing(&self) -> Voicing {
        Voicing { click: self.click, cue: self.cue }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ClickTrack — the builder
// ════════════════════════════════════════════════════════════════════════════

/// Accumulates timeline steps into one event list and writes it out.
///
/// Operations that can fail return `Result<&mut Self>` so a whole cue list
/// chains with `?`.  A failing operation appends nothing.
///
/// # Builder pattern
///
/// ```rust
/// use click_midi::ClickTrack;
///
/// let mut track = ClickTrack::new();
/// track.initialize();
/// track.set_time_signature(3, 4).unwrap()
///      .insert_measures(2).unwrap();
///
/// assert_eq!(track.current_measure(), 3);
/// assert_eq!(track.events().len(), 2 + 1 + 4);
/// ```
#[derive(Clone, Debug)]
pub struct ClickTrack {
    config: ClickConfig,
    cursor: Cursor,
    events: Vec<Event>,
}

impl Default for ClickTrack {
    fn default() -> Self {
        ClickTrack::new()
    }
}

impl ClickTrack {
    /// An empty track with the default [`ClickConfig`].
    ///
    /// Call [`initialize`](Self::initialize) to lay down the default tempo
    /// and time signature.
    pub fn new() -> Self {
        let config = ClickConfig::default();
        let cursor = Cursor::new(config.ticks_per_beat).with_voicing(config.voicing());
        ClickTrack { config, cursor, events: Vec::new() }
    }

    /// An empty track using `config`, which is validated first.
    pub fn with_config(config: ClickConfig) -> Result<Self> {
        config.validate()?;
        let cursor = Cursor::new(config.ticks_per_beat).with_voicing(config.voicing());
        Ok(ClickTrack { config, cursor, events: Vec::new() })
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &ClickConfig { &self.config }

    pub fn cursor(&self) -> Cursor { self.cursor }

    pub fn events(&self) -> &[Event] { &self.events }

    pub fn current_measure(&self) -> i32 { self.cursor.current_measure() }

    pub fn beats_per_measure(&self) -> u8 { self.cursor.beats_per_measure() }

    pub fn ticks_per_beat(&self) -> u16 { self.cursor.ticks_per_beat() }

    /// Length of the track in ticks.
    pub fn total_ticks(&self) -> u64 {
        self.events.iter().map(|e| e.delta_ticks() as u64).sum()
    }

    fn apply(&mut self, op: &'static str, step: Step) -> &mut Self {
        debug!(
            op,
            events  = step.events.len(),
            measure = step.cursor.current_measure(),
            "timeline step"
        );
        self.cursor = step.cursor;
        self.events.extend(step.events);
        self
    }

    // ── operations ────────────────────────────────────────────────────────

    /// Discard all events and start over with 120 BPM, 4/4 at time 0.
    /// The measure counter returns to 1; a time signature set earlier is kept.
    pub fn initialize(&mut self) -> &mut Self {
        self.events.clear();
        let step = self.cursor.initialize();
        self.apply("initialize", step)
    }

    /// Tempo change in BPM; `bpm` must be positive.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<&mut Self> {
        let step = self.cursor.set_tempo(bpm)?;
        Ok(self.apply("set_tempo", step))
    }

    /// Linear tempo change from `start_bpm` to `end_bpm` over `measures`,
    /// one tempo event and click per beat.
    pub fn apply_tempo_ramp(&mut self, start_bpm: f64, end_bpm: f64, measures: u32)
        -> Result<&mut Self>
    {
        let step = self.cursor.tempo_ramp(start_bpm, end_bpm, measures)?;
        Ok(self.apply("apply_tempo_ramp", step))
    }

    pub fn set_time_signature(&mut self, beats_per_measure: u8, note_value: u8)
        -> Result<&mut Self>
    {
        let step = self.cursor.set_time_signature(beats_per_measure, note_value)?;
        Ok(self.apply("set_time_signature", step))
    }

    /// Count-in pulses; the measure counter stays put.
    pub fn count_in(&mut self, measures: u32) -> Result<&mut Self> {
        let step = self.cursor.count_in(measures)?;
        Ok(self.apply("count_in", step))
    }

    pub fn insert_measures(&mut self, measures: u32) -> Result<&mut Self> {
        let step = self.cursor.insert_measures(measures)?;
        Ok(self.apply("insert_measures", step))
    }

    pub fn skip_measures(&mut self, measures: u32) -> &mut Self {
        let step = self.cursor.skip_measures(measures);
        self.apply("skip_measures", step)
    }

    pub fn unskip_measures(&mut self, measures: u32) -> &mut Self {
        let step = self.cursor.unskip_measures(measures);
        self.apply("unskip_measures", step)
    }

    /// Marker `"m.<measure>"`; `None` uses the current measure.
    pub fn rehearsal_marker(&mut self, measure: Option<i32>) -> &mut Self {
        let step = self.cursor.rehearsal_marker(measure);
        self.apply("rehearsal_marker", step)
    }

    pub fn vamp(&mut self, measures: u32) -> Result<&mut Self> {
        let step = self.cursor.vamp(measures)?;
        Ok(self.apply("vamp", step))
    }

    pub fn go(&mut self) -> Result<&mut Self> {
        let step = self.cursor.go()?;
        Ok(self.apply("go", step))
    }

    // ── serialisation ─────────────────────────────────────────────────────

    /// Build the `midly` representation: format 0, one track, metrical
    /// timing at the configured ticks per beat, closed by End-of-Track.
    pub fn to_smf(&self) -> Smf<'_> {
        let header = Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(self.config.ticks_per_beat)),
        );
        let channel = u4::new(self.config.channel);

        let mut track: Vec<TrackEvent<'_>> = self.events.iter()
            .map(|event| TrackEvent {
                delta: u28::new(event.delta_ticks()),
                kind:  track_event_kind(event, channel),
            })
            .collect();
        track.push(TrackEvent {
            delta: u28::new(0),
            kind:  TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        Smf { header, tracks: vec![track] }
    }

    /// Serialise to a `Vec<u8>` containing a standard MIDI file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.to_smf().write_std(&mut out).map_err(ClickError::Encode)?;
        Ok(out)
    }

    /// `<output_folder>/<filename>.<extension>`.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.config.output_folder
            .join(format!("{}.{}", filename, self.config.extension))
    }

    /// Write the track to [`output_path`](Self::output_path), creating the
    /// output folder if needed.
    ///
    /// The file appears only once fully written: bytes go to a `.part`
    /// sibling which is then renamed into place, and is removed again if
    /// either step fails.
    pub fn save(&self, filename: &str) -> Result<PathBuf> {
        let folder = &self.config.output_folder;
        fs::create_dir_all(folder).map_err(io_error(folder))?;

        let bytes = self.to_bytes()?;
        let path = self.output_path(filename);
        let partial = path.with_extension(format!("{}.part", self.config.extension));

        let written = fs::File::create(&partial)
            .and_then(|mut f| {
                f.write_all(&bytes)?;
                f.sync_all()
            })
            .map_err(io_error(&partial))
            .and_then(|()| fs::rename(&partial, &path).map_err(io_error(&path)));
        if let Err(e) = written {
            // best effort; the write or rename error is the one reported
            fs::remove_file(&partial).ok();
            return Err(e);
        }

        info!(
            path   = %path.display(),
            events = self.events.len(),
            ticks  = self.total_ticks(),
            "saved click track"
        );
        Ok(path)
    }
}

fn track_event_kind(event: &Event, channel: u4) -> TrackEventKind<'_> {
    match event {
        Event::Tempo { micros_per_beat } =>
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(*micros_per_beat))),
        Event::TimeSignature { numerator, denominator } =>
            // 24 MIDI clocks per click, 8 thirty-second notes per quarter
            TrackEventKind::Meta(MetaMessage::TimeSignature(
                *numerator, denominator.trailing_zeros() as u8, 24, 8)),
        Event::NoteOn { pitch, velocity } => TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOn { key: u7::new(*pitch), vel: u7::new(*velocity) },
        },
        Event::NoteOff { pitch, velocity, .. } => TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOff { key: u7::new(*pitch), vel: u7::new(*velocity) },
        },
        Event::Marker(text) =>
            TrackEventKind::Meta(MetaMessage::Marker(text.as_bytes())),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CueSheet — a click track described as data
// ════════════════════════════════════════════════════════════════════════════

/// One builder operation, as written in a cue sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cue {
    /// `TimeSignature(beats_per_measure, note_value)`
    TimeSignature(u8, u8),
    /// `Tempo(bpm)`
    Tempo(f64),
    TempoRamp { from: f64, to: f64, measures: u32 },
    CountIn(u32),
    Measures(u32),
    Skip(u32),
    Unskip(u32),
    /// Rehearsal marker; `None` uses the current measure.
    Marker(Option<i32>),
    Vamp(u32),
    Go,
}

impl Cue {
    /// Apply this cue to `track`.
    pub fn apply(&self, track: &mut ClickTrack) -> Result<()> {
        match *self {
            Cue::TimeSignature(beats, note) => { track.set_time_signature(beats, note)?; }
            Cue::Tempo(bpm)                 => { track.set_tempo(bpm)?; }
            Cue::TempoRamp { from, to, measures } => {
                track.apply_tempo_ramp(from, to, measures)?;
            }
            Cue::CountIn(n)  => { track.count_in(n)?; }
            Cue::Measures(n) => { track.insert_measures(n)?; }
            Cue::Skip(n)     => { track.skip_measures(n); }
            Cue::Unskip(n)   => { track.unskip_measures(n); }
            Cue::Marker(m)   => { track.rehearsal_marker(m); }
            Cue::Vamp(n)     => { track.vamp(n)?; }
            Cue::Go          => { track.go()?; }
        }
        Ok(())
    }
}

/// A named, ordered list of [`Cue`]s.
///
/// ```rust
/// use click_midi::{CueSheet, ClickConfig};
///
/// let sheet = CueSheet::from_ron(r#"
///     (
///         name: "opener",
///         cues: [
///             TimeSignature(4, 4),
///             Tempo(132.0),
///             CountIn(2),
///             Marker(None),
///             Vamp(4),
///             Go,
///         ],
///     )
/// "#).unwrap();
///
/// let track = sheet.render(ClickConfig::default()).unwrap();
/// assert_eq!(track.current_measure(), 6);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CueSheet {
    /// Output file name, without extension.
    pub name: String,
    pub cues: Vec<Cue>,
}

impl CueSheet {
    pub fn from_ron(text: &str) -> std::result::Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Read a cue sheet from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        CueSheet::from_ron(&text)
            .map_err(|source| ClickError::Parse { path: path.to_path_buf(), source })
    }

    /// Initialise a track with `config` and replay every cue in order.
    pub fn render(&self, config: ClickConfig) -> Result<ClickTrack> {
        let mut track = ClickTrack::with_config(config)?;
        track.initialize();
        for (i, cue) in self.cues.iter().enumerate() {
            debug!(sheet = %self.name, index = i, ?cue, "applying cue");
            cue.apply(&mut track)?;
        }
        Ok(track)
    }

    /// Render and save as `<name>.<extension>` in the configured folder.
    pub fn render_to_file(&self, config: ClickConfig) -> Result<PathBuf> {
        self.render(config)?.save(&self.name)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> ClickConfig {
        ClickConfig { output_folder: dir.join("MidiFiles"), ..ClickConfig::default() }
    }

    fn four_four() -> ClickTrack {
        let mut track = ClickTrack::new();
        track.initialize().set_time_signature(4, 4).unwrap();
        track
    }

    fn folder_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir).unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn pulses(events: &[Event]) -> usize {
        events.iter().filter(|e| matches!(e, Event::NoteOn { .. })).count()
    }

    // ── builder ──────────────────────────────────────────────────────────
    #[test]
    fn initialize_clears_previous_events() {
        let mut track = four_four();
        track.count_in(4).unwrap();
        track.initialize();
        assert_eq!(track.events(), &[
            Event::Tempo { micros_per_beat: 500_000 },
            Event::TimeSignature { numerator: 4, denominator: 4 },
        ]);
        assert_eq!(track.current_measure(), 1);
    }

    #[test]
    fn initialize_keeps_earlier_time_signature() {
        let mut track = ClickTrack::new();
        track.set_time_signature(3, 4).unwrap();
        track.initialize();
        track.insert_measures(2).unwrap();
        assert_eq!(track.current_measure(), 3);
        let offs: Vec<u32> = track.events().iter()
            .filter(|e| matches!(e, Event::NoteOff { .. }))
            .map(Event::delta_ticks)
            .collect();
        assert_eq!(offs, vec![3 * 480, 3 * 480]);
    }

    #[test]
    fn last_tempo_matches_bpm() {
        let mut track = four_four();
        for bpm in [40.0, 72.5, 96.0, 144.0, 208.0] {
            track.set_tempo(bpm).unwrap();
            let Some(Event::Tempo { micros_per_beat }) = track.events().last() else {
                panic!("last event is not a tempo change");
            };
            let expected = (60_000_000.0_f64 / bpm).round();
            assert!((*micros_per_beat as f64 - expected).abs() <= 1.0);
        }
    }

    #[test]
    fn failed_operation_appends_nothing() {
        let mut track = ClickTrack::new();
        track.initialize();
        let before = track.events().len();
        assert!(matches!(
            track.count_in(2),
            Err(ClickError::Timeline(TimelineError::TimeSignatureUnset))
        ));
        assert!(track.set_tempo(0.0).is_err());
        assert_eq!(track.events().len(), before);
    }

    #[test]
    fn degenerate_ramp_is_an_error() {
        let mut track = ClickTrack::new();
        track.initialize().set_time_signature(1, 4).unwrap();
        let err = track.apply_tempo_ramp(90.0, 120.0, 1).unwrap_err();
        assert!(matches!(err, ClickError::Timeline(TimelineError::DegenerateRamp { beats: 1 })));
    }

    #[test]
    fn insert_measures_three_four() {
        let mut track = ClickTrack::new();
        track.initialize().set_time_signature(3, 4).unwrap();
        let before = track.events().len();
        track.insert_measures(2).unwrap();
        let added = &track.events()[before..];
        assert_eq!(track.current_measure(), 3);
        assert_eq!(pulses(added), 2);
        for e in added.iter().filter(|e| matches!(e, Event::NoteOff { .. })) {
            assert_eq!(e.delta_ticks(), 3 * 480);
        }
    }

    #[test]
    fn skip_unskip_round_trip() {
        let mut track = four_four();
        let (measure, len) = (track.current_measure(), track.events().len());
        track.skip_measures(7).unskip_measures(7);
        assert_eq!(track.current_measure(), measure);
        assert_eq!(track.events().len(), len);
    }

    #[test]
    fn vamp_then_go() {
        let mut track = four_four();
        track.insert_measures(8).unwrap();
        let before = track.events().len();
        track.vamp(4).unwrap();
        assert_eq!(track.events()[before].marker_text(), Some("Vamp m.9"));
        assert_eq!(pulses(&track.events()[before..]), 4);
        assert_eq!(track.current_measure(), 13);

        track.go().unwrap();
        assert_eq!(track.current_measure(), 14);
        let n = track.events().len();
        assert_eq!(track.events()[n - 3].marker_text(), Some("Go"));
        assert_eq!(track.events()[n - 2], Event::NoteOn { pitch: 73, velocity: 127 });
    }

    #[test]
    fn total_ticks_counts_measures_and_ramps() {
        let mut track = four_four();
        track.count_in(2).unwrap()
             .apply_tempo_ramp(100.0, 120.0, 1).unwrap();
        assert_eq!(track.total_ticks(), 2 * 1920 + 4 * 480);
    }

    #[test]
    fn custom_voicing_is_used() {
        let config = ClickConfig {
            click: Voice::new(37, 90),
            cue:   Voice::new(81, 100),
            ..ClickConfig::default()
        };
        let mut track = ClickTrack::with_config(config).unwrap();
        track.initialize().set_time_signature(2, 4).unwrap()
             .insert_measures(1).unwrap()
             .go().unwrap();
        let notes: Vec<_> = track.events().iter()
            .filter_map(|e| match e {
                Event::NoteOn { pitch, velocity } => Some((*pitch, *velocity)),
                _ => None,
            })
            .collect();
        assert_eq!(notes, vec![(37, 90), (81, 100)]);
    }

    // ── config ───────────────────────────────────────────────────────────
    #[test]
    fn default_output_path() {
        let track = ClickTrack::new();
        assert_eq!(track.output_path("test"), PathBuf::from("MidiFiles/test.midi"));
    }

    #[test]
    fn config_validation() {
        let bad_channel = ClickConfig { channel: 16, ..ClickConfig::default() };
        assert!(matches!(ClickTrack::with_config(bad_channel), Err(ClickError::InvalidConfig(_))));

        let bad_voice = ClickConfig { cue: Voice::new(128, 10), ..ClickConfig::default() };
        assert!(bad_voice.validate().is_err());

        let bad_tpb = ClickConfig { ticks_per_beat: 0, ..ClickConfig::default() };
        assert!(bad_tpb.validate().is_err());

        assert!(ClickConfig::default().validate().is_ok());
    }

    #[test]
    fn config_from_partial_ron() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.ron");
        fs::write(&path, r#"(output_folder: "renders", ticks_per_beat: 960, cue: (pitch: 76, velocity: 120))"#)
            .unwrap();
        let config = ClickConfig::load(&path).unwrap();
        assert_eq!(config.output_folder, PathBuf::from("renders"));
        assert_eq!(config.ticks_per_beat, 960);
        assert_eq!(config.cue, Voice::new(76, 120));
        assert_eq!(config.click, Voice::CLICK);
        assert_eq!(config.extension, "midi");
    }

    #[test]
    fn config_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        fs::write(&path, "(channel: ").unwrap();
        assert!(matches!(ClickConfig::load(&path), Err(ClickError::Parse { .. })));
        assert!(matches!(
            ClickConfig::load(dir.path().join("missing.ron")),
            Err(ClickError::Io { .. })
        ));
    }

    // ── MIDI file structure ──────────────────────────────────────────────
    #[test]
    fn midi_bytes_header() {
        let bytes = four_four().to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
        // format 0, one track, 480 ticks per beat
        assert_eq!(&bytes[8..10],  &[0, 0]);
        assert_eq!(&bytes[10..12], &[0, 1]);
        assert_eq!(&bytes[12..14], &480u16.to_be_bytes());
        assert_eq!(&bytes[14..18], b"MTrk");
    }

    #[test]
    fn midi_bytes_ends_with_eot() {
        let bytes = four_four().to_bytes().unwrap();
        let n = bytes.len();
        assert_eq!(&bytes[n - 3..], &[0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn smf_time_signature_uses_power_of_two() {
        let mut track = ClickTrack::new();
        track.set_time_signature(6, 8).unwrap();
        let smf = track.to_smf();
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(6, 3, 24, 8))
        );
    }

    #[test]
    fn smf_uses_configured_channel() {
        let config = ClickConfig { channel: 9, ..ClickConfig::default() };
        let mut track = ClickTrack::with_config(config).unwrap();
        track.set_time_signature(4, 4).unwrap().count_in(1).unwrap();
        let smf = track.to_smf();
        let TrackEventKind::Midi { channel, .. } = smf.tracks[0][1].kind else {
            panic!("expected a channel event");
        };
        assert_eq!(channel.as_int(), 9);
    }

    // ── save ─────────────────────────────────────────────────────────────
    #[test]
    fn end_to_end_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut track = ClickTrack::with_config(config_in(dir.path())).unwrap();
        track.initialize()
             .set_time_signature(4, 4).unwrap()
             .set_tempo(120.0).unwrap()
             .count_in(2).unwrap()
             .go().unwrap();
        let path = track.save("test").unwrap();

        assert_eq!(path, dir.path().join("MidiFiles").join("test.midi"));
        assert_eq!(track.current_measure(), 2);

        let bytes = fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(smf.tracks.len(), 1);

        let on  = |key: u8, vel: u8| TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) },
        };
        let off = |key: u8, vel: u8| TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(vel) },
        };
        let expected: Vec<(u32, TrackEventKind<'_>)> = vec![
            (0,    TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
            (0,    TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))),
            (0,    TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))),
            (0,    TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
            (0,    on(60, 64)),
            (1920, off(60, 64)),
            (0,    on(60, 64)),
            (1920, off(60, 64)),
            (0,    TrackEventKind::Meta(MetaMessage::Marker(b"Go"))),
            (0,    on(73, 127)),
            (1920, off(73, 127)),
            (0,    TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let got: Vec<(u32, TrackEventKind<'_>)> = smf.tracks[0].iter()
            .map(|e| (e.delta.as_int(), e.kind))
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn save_creates_nested_folder_and_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClickConfig {
            output_folder: dir.path().join("a").join("b"),
            ..ClickConfig::default()
        };
        let mut track = ClickTrack::with_config(config).unwrap();
        track.initialize();
        let path = track.save("nested").unwrap();
        assert!(path.exists());
        let names: Vec<_> = fs::read_dir(dir.path().join("a").join("b")).unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("nested.midi")]);
    }

    #[test]
    fn save_into_a_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("MidiFiles");
        fs::write(&blocker, b"not a folder").unwrap();
        let mut track = ClickTrack::with_config(config_in(dir.path())).unwrap();
        track.initialize();
        assert!(matches!(track.save("x"), Err(ClickError::Io { .. })));
        assert_eq!(folder_entries(dir.path()), vec!["MidiFiles".to_string()]);
        assert_eq!(fs::read(&blocker).unwrap(), b"not a folder");
    }

    #[test]
    fn failed_rename_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("MidiFiles");
        // a directory squatting on the target name makes the rename fail
        fs::create_dir_all(folder.join("x.midi").join("occupied")).unwrap();
        let mut track = ClickTrack::with_config(config_in(dir.path())).unwrap();
        track.initialize();
        assert!(matches!(track.save("x"), Err(ClickError::Io { .. })));
        assert_eq!(folder_entries(&folder), vec!["x.midi".to_string()]);
        assert!(folder.join("x.midi").is_dir());
    }

    // ── cue sheets ───────────────────────────────────────────────────────
    const SHEET: &str = r#"
        (
            name: "second_act",
            cues: [
                TimeSignature(3, 4),
                Tempo(96.0),
                CountIn(1),
                Marker(Some(40)),
                Skip(39),
                Measures(4),
                TempoRamp(from: 96.0, to: 120.0, measures: 2),
                Vamp(2),
                Go,
                Unskip(1),
                Marker(None),
            ],
        )
    "#;

    #[test]
    fn cue_sheet_parses() {
        let sheet = CueSheet::from_ron(SHEET).unwrap();
        assert_eq!(sheet.name, "second_act");
        assert_eq!(sheet.cues.len(), 11);
        assert_eq!(sheet.cues[6], Cue::TempoRamp { from: 96.0, to: 120.0, measures: 2 });
        assert_eq!(sheet.cues[3], Cue::Marker(Some(40)));
    }

    #[test]
    fn cue_sheet_renders_like_the_builder() {
        let sheet = CueSheet::from_ron(SHEET).unwrap();
        let rendered = sheet.render(ClickConfig::default()).unwrap();

        let mut manual = ClickTrack::new();
        manual.initialize()
              .set_time_signature(3, 4).unwrap()
              .set_tempo(96.0).unwrap()
              .count_in(1).unwrap()
              .rehearsal_marker(Some(40))
              .skip_measures(39)
              .insert_measures(4).unwrap()
              .apply_tempo_ramp(96.0, 120.0, 2).unwrap()
              .vamp(2).unwrap()
              .go().unwrap()
              .unskip_measures(1)
              .rehearsal_marker(None);

        assert_eq!(rendered.events(), manual.events());
        // 1 + 39 + 4 + 2 + 1 - 1
        assert_eq!(rendered.current_measure(), 46);
        assert_eq!(rendered.events().last().and_then(Event::marker_text), Some("m.46"));
    }

    #[test]
    fn cue_sheet_surfaces_timeline_errors() {
        let sheet = CueSheet { name: "bad".into(), cues: vec![Cue::Vamp(2)] };
        assert!(matches!(
            sheet.render(ClickConfig::default()),
            Err(ClickError::Timeline(TimelineError::TimeSignatureUnset))
        ));
    }

    #[test]
    fn cue_sheet_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let sheet_path = dir.path().join("act2.ron");
        fs::write(&sheet_path, SHEET).unwrap();

        let sheet = CueSheet::load(&sheet_path).unwrap();
        let out = sheet.render_to_file(config_in(dir.path())).unwrap();
        assert_eq!(out.file_name().unwrap(), "second_act.midi");
        assert!(Smf::parse(&fs::read(&out).unwrap()).is_ok());
    }
}
