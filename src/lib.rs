//! Aloud - auditory reading assistant
//!
//! Turns raw text into synchronized {audio, timepoints} assets through a
//! chunk/markup/synthesize/stitch pipeline, serves them over HTTP, and plays
//! them back with word-level highlighting through a race-guarded session
//! state machine.

pub mod config;
pub mod player;
pub mod sanitize;
pub mod server;
pub mod timepoint;
pub mod tts;

pub use config::Settings;
pub use player::{
    AssetResolver, PlaybackEngine, PlaybackSession, PlaybackStatus, Resolution, SourceRef,
};
pub use timepoint::{AudioAsset, Timepoint, TimepointSequence, PARAGRAPH_BREAK};
