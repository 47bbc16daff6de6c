//! Server-side speech pipeline: chunking, markup, synthesis and stitching.

pub mod chunker;
pub mod markup;
pub mod stitch;
pub mod synth;
pub mod wav;

pub use chunker::{chunk_text, Chunk};
pub use markup::{build_markup, decode_mark_name, escape_mark_name, ChunkMarkup, ExpectedMark};
pub use stitch::synthesize_document;
pub use synth::{
    ChunkAudio, ChunkRequest, HttpSynthesisBackend, MarkOffset, SynthesisBackend, SynthesisError,
    VoiceParams,
};
pub use wav::{decode_wav, PcmAudio, WavError};
