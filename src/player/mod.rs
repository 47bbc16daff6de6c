//! Client-side playback: asset resolution, the audio-output seam and the
//! session state machine.

pub mod engine;
pub mod output;
pub mod resolver;

pub use engine::{PlaybackEngine, PlaybackError, PlaybackSession, PlaybackStatus};
pub use output::{AudioOutput, NullOutput, OutputError, RodioOutput};
pub use resolver::{AssetResolver, Resolution, ResolveAssets, ResolverError, SourceRef};
