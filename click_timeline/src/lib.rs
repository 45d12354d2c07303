//! # click_timeline
//!
//! The event timeline behind a click track.  A [`Cursor`] carries the
//! running position (current measure, beats per measure, ticks per beat)
//! and every operation consumes it and returns a [`Step`]: the next cursor
//! plus the [`Event`]s the operation emitted.
//!
//! Nothing here touches the filesystem or the MIDI byte format; see the
//! `click_midi` crate for the builder that accumulates steps and writes
//! standard MIDI files.
//!
//! ## Quick start
//!
//! ```rust
//! use click_timeline::{Cursor, Event};
//!
//! let init  = Cursor::new(480).initialize();
//! let sig   = init.cursor.set_time_signature(3, 4).unwrap();
//! let bars  = sig.cursor.insert_measures(2).unwrap();
//!
//! assert_eq!(bars.cursor.current_measure(), 3);
//! assert_eq!(bars.events.len(), 4);                     // 2 × (on, off)
//! assert_eq!(bars.events[1].delta_ticks(), 3 * 480);    // one 3/4 bar
//! ```

use std::fmt;

// ════════════════════════════════════════════════════════════════════════════
// Constants
// ════════════════════════════════════════════════════════════════════════════

/// Microseconds in one minute; tempo meta-events store µs per beat.
pub const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Largest value the 24-bit MIDI tempo field can hold.
pub const MAX_MICROS_PER_BEAT: u32 = 0x00FF_FFFF;

/// Tempo written by [`Cursor::initialize`]: 120 BPM.
pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

/// Ticks per beat used by [`Cursor::default`].
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// Largest time-signature note value accepted (a 64th note).
pub const MAX_NOTE_VALUE: u8 = 64;

/// Most click pulses a single operation may emit.
pub const MAX_PULSES_PER_STEP: u64 = 65_536;

// ════════════════════════════════════════════════════════════════════════════
// TimelineError
// ════════════════════════════════════════════════════════════════════════════

/// Precondition failures raised by [`Cursor`] operations.
///
/// An error means the step produced nothing; the caller's previous cursor
/// and events are still valid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("time signature must be set before measure-based operations")]
    TimeSignatureUnset,

    #[error("tempo ramp needs at least two beats, got {beats}")]
    DegenerateRamp { beats: u32 },

    #[error("tempo must be a positive, finite BPM value, got {bpm}")]
    InvalidTempo { bpm: f64 },

    #[error("tempo {bpm} BPM does not fit a MIDI tempo event")]
    TempoOutOfRange { bpm: f64 },

    #[error("invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("{pulses} pulses in one operation exceeds the limit of {}", MAX_PULSES_PER_STEP)]
    TooManyPulses { pulses: u64 },
}

pub type Result<T> = std::result::Result<T, TimelineError>;

// ════════════════════════════════════════════════════════════════════════════
// Tempo math
// ════════════════════════════════════════════════════════════════════════════

/// Convert a BPM value to microseconds per beat, rounded to the nearest µs.
///
/// ```rust
/// use click_timeline::bpm_to_micros;
///
/// assert_eq!(bpm_to_micros(120.0).unwrap(), 500_000);
/// assert_eq!(bpm_to_micros(90.0).unwrap(),  666_667);
/// assert!(bpm_to_micros(0.0).is_err());
/// ```
pub fn bpm_to_micros(bpm: f64) -> Result<u32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(TimelineError::InvalidTempo { bpm });
    }
    let micros = (MICROS_PER_MINUTE / bpm).round();
    if micros < 1.0 || micros > MAX_MICROS_PER_BEAT as f64 {
        return Err(TimelineError::TempoOutOfRange { bpm });
    }
    Ok(micros as u32)
}

/// Inverse of [`bpm_to_micros`], for display and tests.
pub fn micros_to_bpm(micros_per_beat: u32) -> f64 {
    MICROS_PER_MINUTE / micros_per_beat as f64
}

// ════════════════════════════════════════════════════════════════════════════
// Event
// ════════════════════════════════════════════════════════════════════════════

/// One entry on the click track.
///
/// Order in the event list is temporal order.  Only [`Event::NoteOff`]
/// advances time; everything else sits at delta 0 relative to the
/// previous event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Set-tempo meta-event.
    Tempo { micros_per_beat: u32 },
    /// Time-signature meta-event.  `denominator` is the note value (4 = quarter).
    TimeSignature { numerator: u8, denominator: u8 },
    NoteOn  { pitch: u8, velocity: u8 },
    /// Closes the pulse opened by the preceding `NoteOn`, `delta_ticks` later.
    NoteOff { pitch: u8, velocity: u8, delta_ticks: u32 },
    /// Marker meta-event (rehearsal numbers, "Vamp m.N", "Go").
    Marker(String),
}

impl Event {
    /// Delta time in ticks from the previous event.
    pub fn delta_ticks(&self) -> u32 {
        match self {
            Event::NoteOff { delta_ticks, .. } => *delta_ticks,
            _ => 0,
        }
    }

    /// `true` for note-on/note-off events.
    pub fn is_note(&self) -> bool {
        matches!(self, Event::NoteOn { .. } | Event::NoteOff { .. })
    }

    /// Marker text, if this is a marker.
    pub fn marker_text(&self) -> Option<&str> {
        match self {
            Event::Marker(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Tempo { micros_per_beat } => write!(
                f, "tempo {} µs/beat ({:.2} BPM)",
                micros_per_beat, micros_to_bpm(*micros_per_beat)),
            Event::TimeSignature { numerator, denominator } =>
                write!(f, "time signature {}/{}", numerator, denominator),
            Event::NoteOn { pitch, velocity } =>
                write!(f, "note on  {:>3} vel {:>3}", pitch, velocity),
            Event::NoteOff { pitch, velocity, delta_ticks } =>
                write!(f, "note off {:>3} vel {:>3} +{} ticks", pitch, velocity, delta_ticks),
            Event::Marker(text) => write!(f, "marker \"{}\"", text),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Voice / Voicing — what a pulse sounds like
// ════════════════════════════════════════════════════════════════════════════

/// Pitch and velocity of a click pulse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Voice {
    /// MIDI note number (0–127).
    pub pitch:    u8,
    /// MIDI velocity (0–127).
    pub velocity: u8,
}

impl Voice {
    /// Measure, count-in, vamp and ramp clicks: middle C at velocity 64.
    pub const CLICK: Voice = Voice { pitch: 60, velocity: 64 };
    /// The Go cue: C#5 at full velocity, so it stands out from the click.
    pub const CUE:   Voice = Voice { pitch: 73, velocity: 127 };

    pub fn new(pitch: u8, velocity: u8) -> Self {
        Voice { pitch, velocity }
    }

    /// A note-on/note-off pair lasting `ticks`.
    pub fn pulse(self, ticks: u32) -> [Event; 2] {
        [
            Event::NoteOn  { pitch: self.pitch, velocity: self.velocity },
            Event::NoteOff { pitch: self.pitch, velocity: self.velocity, delta_ticks: ticks },
        ]
    }
}

/// The pair of voices a cursor uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voicing {
    pub click: Voice,
    pub cue:   Voice,
}

impl Default for Voicing {
    fn default() -> Self {
        Voicing { click: Voice::CLICK, cue: Voice::CUE }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Step — the result of one operation
// ════════════════════════════════════════════════════════════════════════════

/// The cursor after an operation, plus the events that operation emitted.
#[derive(Clone, Debug, PartialEq)]
#[must_use = "a Step carries the next cursor; dropping it loses the operation"]
pub struct Step {
    pub cursor: Cursor,
    pub events: Vec<Event>,
}

impl Step {
    fn new(cursor: Cursor, events: Vec<Event>) -> Self {
        Step { cursor, events }
    }

    fn silent(cursor: Cursor) -> Self {
        Step { cursor, events: Vec::new() }
    }

    /// Number of note-on/note-off pairs in this step.
    pub fn pulse_count(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, Event::NoteOn { .. })).count()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Cursor
// ════════════════════════════════════════════════════════════════════════════

/// Position state threaded through every timeline operation.
///
/// `Cursor` is `Copy`; operations take it by value and hand back the next
/// one inside a [`Step`], so an earlier cursor is never mutated behind the
/// caller's back.
///
/// # Example
/// ```rust
/// use click_timeline::Cursor;
///
/// let c = Cursor::new(480);
/// assert_eq!(c.current_measure(), 1);
/// assert_eq!(c.beats_per_measure(), 0);        // unset
/// assert!(c.count_in(1).is_err());             // needs a time signature
///
/// let c = c.set_time_signature(4, 4).unwrap().cursor;
/// let step = c.vamp(2).unwrap();
/// assert_eq!(step.events[0].marker_text(), Some("Vamp m.1"));
/// assert_eq!(step.cursor.current_measure(), 3);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    ticks_per_beat:    u16,
    beats_per_measure: u8,
    current_measure:   i32,
    voicing:           Voicing,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::new(DEFAULT_TICKS_PER_BEAT)
    }
}

impl Cursor {
    /// A fresh cursor at measure 1 with no time signature.
    pub fn new(ticks_per_beat: u16) -> Self {
        Cursor {
            ticks_per_beat,
            beats_per_measure: 0,
            current_measure:   1,
            voicing:           Voicing::default(),
        }
    }

    /// Replace the click and cue voices.
    pub fn with_voicing(mut self, voicing: Voicing) -> Self {
        self.voicing = voicing;
        self
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn ticks_per_beat(&self) -> u16 { self.ticks_per_beat }

    /// Beats per measure; 0 until a time signature is set.
    pub fn beats_per_measure(&self) -> u8 { self.beats_per_measure }

    pub fn current_measure(&self) -> i32 { self.current_measure }

    pub fn voicing(&self) -> Voicing { self.voicing }

    /// Length of one measure in ticks, or an error while no time
    /// signature is set.
    pub fn measure_ticks(&self) -> Result<u32> {
        if self.beats_per_measure == 0 {
            return Err(TimelineError::TimeSignatureUnset);
        }
        Ok(self.ticks_per_beat as u32 * self.beats_per_measure as u32)
    }

    fn advanced(mut self, measures: u32) -> Self {
        self.current_measure = self.current_measure.saturating_add_unsigned(measures);
        self
    }

    fn rewound(mut self, measures: u32) -> Self {
        self.current_measure = self.current_measure.saturating_sub_unsigned(measures);
        self
    }

    fn measure_pulses(&self, voice: Voice, measures: u32) -> Result<Vec<Event>> {
        let ticks = self.measure_ticks()?;
        check_pulses(measures as u64)?;
        Ok((0..measures).flat_map(|_| voice.pulse(ticks)).collect())
    }

    // ── operations ────────────────────────────────────────────────────────

    /// Start over at measure 1 with the default 120 BPM tempo and 4/4 time
    /// signature at time 0.
    ///
    /// Only the position resets.  The default 4/4 is written to the track
    /// but does not arm the cursor: beats per measure stay whatever
    /// [`set_time_signature`](Self::set_time_signature) last recorded.
    pub fn initialize(mut self) -> Step {
        self.current_measure = 1;
        let cursor = self;
        let events = vec![
            Event::Tempo { micros_per_beat: DEFAULT_MICROS_PER_BEAT },
            Event::TimeSignature { numerator: 4, denominator: 4 },
        ];
        Step::new(cursor, events)
    }

    /// Emit a tempo change of `round(60_000_000 / bpm)` µs per beat.
    pub fn set_tempo(self, bpm: f64) -> Result<Step> {
        let micros_per_beat = bpm_to_micros(bpm)?;
        Ok(Step::new(self, vec![Event::Tempo { micros_per_beat }]))
    }

    /// Linear accelerando/ritardando from `start_bpm` to `end_bpm` over
    /// `measures` measures.
    ///
    /// One tempo change per beat, each followed by a one-beat click so the
    /// change is audible.  The first beat is at `start_bpm`, the last at
    /// `end_bpm`.  The measure counter does not move.
    pub fn tempo_ramp(self, start_bpm: f64, end_bpm: f64, measures: u32) -> Result<Step> {
        if self.beats_per_measure == 0 {
            return Err(TimelineError::TimeSignatureUnset);
        }
        let beats = measures as u64 * self.beats_per_measure as u64;
        if beats < 2 {
            return Err(TimelineError::DegenerateRamp { beats: beats as u32 });
        }
        check_pulses(beats)?;
        let beats = beats as u32;
        let step_bpm = (end_bpm - start_bpm) / (beats - 1) as f64;
        let ticks = self.ticks_per_beat as u32;

        let mut events = Vec::with_capacity(beats as usize * 3);
        for i in 0..beats {
            let micros_per_beat = bpm_to_micros(start_bpm + step_bpm * i as f64)?;
            events.push(Event::Tempo { micros_per_beat });
            events.extend(self.voicing.click.pulse(ticks));
        }
        Ok(Step::new(self, events))
    }

    /// Record the beats per measure and emit a time-signature change.
    ///
    /// `note_value` must be a power of two up to [`MAX_NOTE_VALUE`].
    pub fn set_time_signature(mut self, beats_per_measure: u8, note_value: u8) -> Result<Step> {
        let valid_note = note_value.is_power_of_two() && note_value <= MAX_NOTE_VALUE;
        if beats_per_measure == 0 || !valid_note {
            return Err(TimelineError::InvalidTimeSignature {
                numerator:   beats_per_measure,
                denominator: note_value,
            });
        }
        self.beats_per_measure = beats_per_measure;
        let event = Event::TimeSignature { numerator: beats_per_measure, denominator: note_value };
        Ok(Step::new(self, vec![event]))
    }

    /// `measures` count-in pulses, one per measure.  The measure counter
    /// does not move: count-in bars precede bar 1.
    pub fn count_in(self, measures: u32) -> Result<Step> {
        let events = self.measure_pulses(self.voicing.click, measures)?;
        Ok(Step::new(self, events))
    }

    /// `measures` measure pulses, advancing the measure counter.
    pub fn insert_measures(self, measures: u32) -> Result<Step> {
        let events = self.measure_pulses(self.voicing.click, measures)?;
        Ok(Step::new(self.advanced(measures), events))
    }

    /// Move the measure counter forward without emitting anything.
    pub fn skip_measures(self, measures: u32) -> Step {
        Step::silent(self.advanced(measures))
    }

    /// Move the measure counter back without emitting anything.
    pub fn unskip_measures(self, measures: u32) -> Step {
        Step::silent(self.rewound(measures))
    }

    /// Marker `"m.<measure>"`, defaulting to the current measure.
    pub fn rehearsal_marker(self, measure: Option<i32>) -> Step {
        let measure = measure.unwrap_or(self.current_measure);
        Step::new(self, vec![Event::Marker(format!("m.{}", measure))])
    }

    /// Marker `"Vamp m.<current>"` followed by `measures` measure pulses.
    pub fn vamp(self, measures: u32) -> Result<Step> {
        let mut events = vec![Event::Marker(format!("Vamp m.{}", self.current_measure))];
        events.extend(self.measure_pulses(self.voicing.click, measures)?);
        Ok(Step::new(self.advanced(measures), events))
    }

    /// Marker `"Go"` followed by one measure-long pulse in the cue voice.
    pub fn go(self) -> Result<Step> {
        let mut events = vec![Event::Marker("Go".to_string())];
        events.extend(self.measure_pulses(self.voicing.cue, 1)?);
        Ok(Step::new(self.advanced(1), events))
    }
}

fn check_pulses(pulses: u64) -> Result<()> {
    if pulses > MAX_PULSES_PER_STEP {
        return Err(TimelineError::TooManyPulses { pulses });
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
