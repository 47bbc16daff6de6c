//! Audio-output seam for the playback engine.
//!
//! rodio's `OutputStream` is not `Send`, so the real implementation runs a
//! dedicated audio thread that owns the stream and sink and takes commands
//! over a channel. `NullOutput` drives the same interface without a device,
//! for tests and headless environments.

use crossbeam_channel::{Receiver, Sender};
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Poll interval for the audio thread between commands.
const POLL_INTERVAL_MS: u64 = 25;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to create audio output stream: {0}")]
    Stream(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("audio thread is gone")]
    Disconnected,
}

/// The single audio resource a playback session owns.
///
/// `load` replaces whatever was playing; the implementations stop the prior
/// source synchronously before accepting the new one.
pub trait AudioOutput: Send + Sync {
    fn load(&self, wav_data: Vec<u8>) -> Result<(), OutputError>;
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn seek(&self, position: Duration);
    /// True once a loaded track has played to its end.
    fn is_finished(&self) -> bool;
}

type WavDecoder = Decoder<Cursor<Vec<u8>>>;

enum OutputCmd {
    Load(WavDecoder),
    Play,
    Pause,
    Stop,
    Seek(Duration),
}

#[derive(Default)]
struct OutputStatus {
    loaded: AtomicBool,
    finished: AtomicBool,
}

/// rodio-backed output on a dedicated audio thread.
pub struct RodioOutput {
    tx: Sender<OutputCmd>,
    status: Arc<OutputStatus>,
}

impl RodioOutput {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<OutputCmd>();
        let status = Arc::new(OutputStatus::default());

        let status_for_thread = Arc::clone(&status);
        thread::spawn(move || audio_thread_main(rx, status_for_thread));

        Self { tx, status }
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn load(&self, wav_data: Vec<u8>) -> Result<(), OutputError> {
        // Decode on the caller so failures surface synchronously.
        let decoder =
            Decoder::new(Cursor::new(wav_data)).map_err(|e| OutputError::Decode(e.to_string()))?;
        self.status.finished.store(false, Ordering::SeqCst);
        self.status.loaded.store(true, Ordering::SeqCst);
        self.tx
            .send(OutputCmd::Load(decoder))
            .map_err(|_| OutputError::Disconnected)
    }

    fn play(&self) {
        let _ = self.tx.send(OutputCmd::Play);
    }

    fn pause(&self) {
        let _ = self.tx.send(OutputCmd::Pause);
    }

    fn stop(&self) {
        self.status.loaded.store(false, Ordering::SeqCst);
        self.status.finished.store(false, Ordering::SeqCst);
        let _ = self.tx.send(OutputCmd::Stop);
    }

    fn seek(&self, position: Duration) {
        self.status.finished.store(false, Ordering::SeqCst);
        let _ = self.tx.send(OutputCmd::Seek(position));
    }

    fn is_finished(&self) -> bool {
        self.status.finished.load(Ordering::SeqCst)
    }
}

fn audio_thread_main(rx: Receiver<OutputCmd>, status: Arc<OutputStatus>) {
    // Create the output stream once for the lifetime of the thread
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(v) => v,
        Err(e) => {
            log::error!("failed to create audio output stream: {}", e);
            return;
        }
    };

    let mut sink: Option<Sink> = None;

    loop {
        let cmd = match rx.recv_timeout(Duration::from_millis(POLL_INTERVAL_MS)) {
            Ok(cmd) => Some(cmd),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        if let Some(cmd) = cmd {
            match cmd {
                OutputCmd::Load(decoder) => {
                    // Release the previous holder before the new source starts.
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    match Sink::try_new(&stream_handle) {
                        Ok(new_sink) => {
                            new_sink.pause();
                            new_sink.append(decoder);
                            sink = Some(new_sink);
                        }
                        Err(e) => {
                            log::error!("failed to create audio sink: {}", e);
                            status.loaded.store(false, Ordering::SeqCst);
                        }
                    }
                }
                OutputCmd::Play => {
                    if let Some(s) = sink.as_ref() {
                        s.play();
                    }
                }
                OutputCmd::Pause => {
                    if let Some(s) = sink.as_ref() {
                        s.pause();
                    }
                }
                OutputCmd::Stop => {
                    if let Some(s) = sink.take() {
                        s.stop();
                    }
                }
                OutputCmd::Seek(position) => {
                    if let Some(s) = sink.as_ref() {
                        if let Err(e) = s.try_seek(position) {
                            log::warn!("seek to {:?} failed: {}", position, e);
                        }
                    }
                }
            }
        }

        // A loaded track whose sink drained has played to the end.
        if status.loaded.load(Ordering::SeqCst) {
            if let Some(s) = sink.as_ref() {
                if s.empty() {
                    status.finished.store(true, Ordering::SeqCst);
                }
            }
        }
    }
}

/// Headless output: tracks state, produces no sound.
///
/// Used by tests and by environments without an audio device; the engine's
/// clock drives highlighting either way.
#[derive(Default)]
pub struct NullOutput {
    loaded: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Mark the loaded track as played out (test hook).
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}

impl AudioOutput for NullOutput {
    fn load(&self, wav_data: Vec<u8>) -> Result<(), OutputError> {
        if wav_data.is_empty() {
            return Err(OutputError::Decode("empty audio".to_string()));
        }
        self.loaded.store(true, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self) {
        if self.loaded.load(Ordering::SeqCst) {
            self.playing.store(true, Ordering::SeqCst);
        }
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.loaded.store(false, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
    }

    fn seek(&self, _position: Duration) {
        self.finished.store(false, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_output_tracks_state() {
        let out = NullOutput::new();
        assert!(out.load(vec![1, 2, 3]).is_ok());
        assert!(out.is_loaded());
        out.play();
        assert!(out.is_playing());
        out.pause();
        assert!(!out.is_playing());
        out.stop();
        assert!(!out.is_loaded());
    }

    #[test]
    fn null_output_rejects_empty_audio() {
        let out = NullOutput::new();
        assert!(matches!(out.load(Vec::new()), Err(OutputError::Decode(_))));
    }
}
