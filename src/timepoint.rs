//! Word-level timing data shared by the synthesis pipeline and the player.
//!
//! A `Timepoint` pairs a spoken word (or a paragraph-boundary sentinel) with
//! its absolute offset in the stitched audio. The sequence is built once per
//! synthesis pass and never mutated afterwards.

/// Sentinel mark name denoting a paragraph boundary. Carries no displayable
/// word; presentation code uses it for line/paragraph grouping.
pub const PARAGRAPH_BREAK: &str = "PARAGRAPH_BREAK";

/// A single (word-or-sentinel, absolute-time) pair.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Timepoint {
    /// The literal word text (entities already decoded), or [`PARAGRAPH_BREAK`].
    pub mark_name: String,
    /// Offset from the start of the stitched audio, in seconds.
    pub time_seconds: f64,
}

impl Timepoint {
    pub fn word(mark_name: impl Into<String>, time_seconds: f64) -> Self {
        Self {
            mark_name: mark_name.into(),
            time_seconds,
        }
    }

    pub fn paragraph_break(time_seconds: f64) -> Self {
        Self {
            mark_name: PARAGRAPH_BREAK.to_string(),
            time_seconds,
        }
    }

    pub fn is_paragraph_break(&self) -> bool {
        self.mark_name == PARAGRAPH_BREAK
    }
}

/// An ordered, finite list of timepoints with non-decreasing `time_seconds`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TimepointSequence(Vec<Timepoint>);

impl TimepointSequence {
    pub fn new(points: Vec<Timepoint>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Timepoint> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Timepoint> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Timepoint] {
        &self.0
    }

    /// Last entry's offset, or 0.0 for an empty sequence.
    pub fn last_time_seconds(&self) -> f64 {
        self.0.last().map(|tp| tp.time_seconds).unwrap_or(0.0)
    }

    /// Whether `time_seconds` is non-decreasing in array order.
    pub fn is_monotonic(&self) -> bool {
        self.0
            .windows(2)
            .all(|w| w[0].time_seconds <= w[1].time_seconds)
    }

    /// Index of the last entry whose time is <= `time_seconds` (floor search).
    ///
    /// Binary search: the tick rate may be high relative to the sequence
    /// length for long documents.
    pub fn floor_index(&self, time_seconds: f64) -> Option<usize> {
        let upper = self
            .0
            .partition_point(|tp| tp.time_seconds <= time_seconds);
        upper.checked_sub(1)
    }

    /// Index of the currently spoken word at `time_seconds`.
    ///
    /// Same floor search as [`floor_index`](Self::floor_index), but sentinel
    /// entries are skipped backwards so a paragraph break is never reported
    /// as the active word.
    pub fn active_word_index(&self, time_seconds: f64) -> Option<usize> {
        let mut idx = self.floor_index(time_seconds)?;
        while self.0[idx].is_paragraph_break() {
            idx = idx.checked_sub(1)?;
        }
        Some(idx)
    }
}

impl From<Vec<Timepoint>> for TimepointSequence {
    fn from(points: Vec<Timepoint>) -> Self {
        Self(points)
    }
}

impl<'a> IntoIterator for &'a TimepointSequence {
    type Item = &'a Timepoint;
    type IntoIter = std::slice::Iter<'a, Timepoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The immutable (audio, timepoints) pair produced by one synthesis pass.
///
/// `audio` holds a complete LINEAR16 WAV stream. Created once per synthesis
/// request (pre-generated at ingestion time or on demand at read time) and
/// discarded when playback moves to different source text.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub audio: Vec<u8>,
    pub timepoints: TimepointSequence,
}

impl AudioAsset {
    pub fn new(audio: Vec<u8>, timepoints: TimepointSequence) -> Self {
        Self { audio, timepoints }
    }
}
