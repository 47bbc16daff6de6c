//! Playback state machine over a resolved `AudioAsset`.
//!
//! One engine owns one audio-output resource. Every new session bumps a
//! generation counter; in-flight resolver calls and the periodic highlight
//! tick both re-check the counter before touching state, so a stale callback
//! from an abandoned session can never overwrite the current one. Session
//! snapshots go out over a `watch` channel; presentation code subscribes and
//! renders whatever the latest snapshot says.

use crate::player::output::{AudioOutput, OutputError};
use crate::player::resolver::{Resolution, ResolveAssets, SourceRef};
use crate::timepoint::AudioAsset;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// Highlight tick period while audio plays.
const TICK_INTERVAL_MS: u64 = 100;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("could not resolve audio for this source: {0}")]
    Resolve(String),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("no audio loaded")]
    NoAsset,
    #[error("no source to resolve")]
    NoSource,
    #[error("timepoint index {0} out of range")]
    TimepointOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Snapshot of the current session, published on every transition and on
/// every highlight tick.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlaybackSession {
    pub status: PlaybackStatus,
    pub current_time_seconds: f64,
    /// Index into the asset's timepoint sequence of the word being spoken.
    /// Never points at a paragraph sentinel.
    pub active_timepoint_index: Option<usize>,
    /// What this session is reading; survives stop so presentation code can
    /// offer restart/click-to-seek from idle.
    pub source: Option<SourceRef>,
    /// Terminal error from the last failed play attempt, cleared on the next
    /// successful transition.
    pub error: Option<String>,
    pub generation: u64,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_time_seconds: 0.0,
            active_timepoint_index: None,
            source: None,
            error: None,
            generation: 0,
        }
    }
}

/// Wall-clock position tracker. rodio reports no playback position, so the
/// engine keeps its own clock: a frozen base offset plus, while running, the
/// time elapsed since the last start.
#[derive(Debug, Default)]
struct AudioClock {
    base: Duration,
    started_at: Option<Instant>,
}

impl AudioClock {
    fn position(&self) -> Duration {
        match self.started_at {
            Some(started) => self.base + started.elapsed(),
            None => self.base,
        }
    }

    fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.base = self.position();
        self.started_at = None;
    }

    /// Jump to `position`, preserving the running/frozen state.
    fn seek(&mut self, position: Duration) {
        self.base = position;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn reset(&mut self) {
        self.base = Duration::ZERO;
        self.started_at = None;
    }
}

struct EngineState {
    status: PlaybackStatus,
    asset: Option<Arc<AudioAsset>>,
    /// Remembered across stop so click-to-seek can restart from idle.
    source: Option<SourceRef>,
    clock: AudioClock,
    error: Option<String>,
}

struct EngineInner {
    output: Arc<dyn AudioOutput>,
    resolver: Arc<dyn ResolveAssets>,
    generation: AtomicU64,
    state: Mutex<EngineState>,
    sessions: watch::Sender<PlaybackSession>,
}

/// Cheap-to-clone handle; all clones drive the same session.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, resolver: Arc<dyn ResolveAssets>) -> Self {
        let (sessions, _) = watch::channel(PlaybackSession::default());
        Self {
            inner: Arc::new(EngineInner {
                output,
                resolver,
                generation: AtomicU64::new(0),
                state: Mutex::new(EngineState {
                    status: PlaybackStatus::Idle,
                    asset: None,
                    source: None,
                    clock: AudioClock::default(),
                    error: None,
                }),
                sessions,
            }),
        }
    }

    /// Subscribe to session snapshots. The receiver always holds the latest
    /// snapshot; intermediate ones may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.inner.sessions.subscribe()
    }

    pub fn session(&self) -> PlaybackSession {
        self.inner.sessions.borrow().clone()
    }

    /// The asset behind the current session, if one is loaded. Presentation
    /// code maps `active_timepoint_index` through its timepoints and uses the
    /// sentinel entries for paragraph grouping.
    pub fn asset(&self) -> Option<Arc<AudioAsset>> {
        self.inner.state.lock().asset.clone()
    }

    /// Resolve `source` and start playing from the beginning.
    ///
    /// Resolution failures move the session back to idle with the error on
    /// the snapshot; they are also returned for callers that want to react
    /// inline. A session superseded while loading returns `Ok` and changes
    /// nothing.
    pub async fn play(&self, source: SourceRef) -> Result<(), PlaybackError> {
        let generation = self.begin_session(Some(source.clone()));
        let resolution = self.inner.resolver.resolve(&source).await;
        self.finish_resolution(generation, resolution, 0.0)
    }

    /// Start playing an already-resolved asset from the beginning.
    pub fn play_asset(&self, asset: AudioAsset) -> Result<(), PlaybackError> {
        let generation = self.begin_session(None);
        self.start_playback(generation, Arc::new(asset), 0.0)
    }

    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if state.status == PlaybackStatus::Playing {
            self.inner.output.pause();
            state.clock.pause();
            state.status = PlaybackStatus::Paused;
            self.publish(&state);
        }
    }

    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if state.status == PlaybackStatus::Paused {
            self.inner.output.play();
            state.clock.start();
            state.status = PlaybackStatus::Playing;
            self.publish(&state);
        }
    }

    /// Return to idle from any state. Always wins over an in-flight play:
    /// the generation bump makes any pending resolution stale.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.output.stop();
        let mut state = self.inner.state.lock();
        state.status = PlaybackStatus::Idle;
        state.asset = None;
        state.clock.reset();
        state.error = None;
        self.publish(&state);
    }

    /// Jump the audio clock to `time_seconds` and play. Valid whenever an
    /// asset is loaded; the active timepoint is recomputed immediately so
    /// the highlight never shows the pre-seek word.
    pub fn seek_to_time(&self, time_seconds: f64) -> Result<(), PlaybackError> {
        let mut state = self.inner.state.lock();
        if state.asset.is_none() {
            return Err(PlaybackError::NoAsset);
        }
        let position = Duration::from_secs_f64(time_seconds.max(0.0));
        self.inner.output.seek(position);
        state.clock.seek(position);
        if state.status != PlaybackStatus::Playing {
            self.inner.output.play();
            state.clock.start();
            state.status = PlaybackStatus::Playing;
        }
        self.publish(&state);
        Ok(())
    }

    /// Word-click contract: seek to the given timepoint and play, from any
    /// prior state. From idle the resolver path runs first, reusing the last
    /// played source.
    pub async fn seek_to_timepoint(&self, index: usize) -> Result<(), PlaybackError> {
        let (asset, source) = {
            let state = self.inner.state.lock();
            (state.asset.clone(), state.source.clone())
        };

        if let Some(asset) = asset {
            let target = asset
                .timepoints
                .get(index)
                .ok_or(PlaybackError::TimepointOutOfRange(index))?
                .time_seconds;
            return self.seek_to_time(target);
        }

        let source = source.ok_or(PlaybackError::NoSource)?;
        let generation = self.begin_session(Some(source.clone()));
        let resolution = self.inner.resolver.resolve(&source).await;

        // A re-resolved asset may have fewer timepoints than the one the
        // click was made against; a bad index must not strand the session in
        // loading.
        let start = match &resolution {
            Resolution::Resolved(asset) | Resolution::Fallback(asset) => {
                match asset.timepoints.get(index) {
                    Some(tp) => tp.time_seconds,
                    None => {
                        let err = PlaybackError::TimepointOutOfRange(index);
                        self.fail_to_idle(generation, err.to_string());
                        return Err(err);
                    }
                }
            }
            Resolution::Failed(_) => 0.0,
        };
        self.finish_resolution(generation, resolution, start)
    }

    /// Open a new session: supersede the old one, release the audio resource
    /// before anything else can claim it, and publish `loading`.
    fn begin_session(&self, source: Option<SourceRef>) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.output.stop();
        let mut state = self.inner.state.lock();
        state.status = PlaybackStatus::Loading;
        state.asset = None;
        state.clock.reset();
        state.error = None;
        if source.is_some() {
            state.source = source;
        }
        self.publish_with_generation(&state, generation);
        generation
    }

    fn finish_resolution(
        &self,
        generation: u64,
        resolution: Resolution,
        start_seconds: f64,
    ) -> Result<(), PlaybackError> {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            log::debug!("discarding resolution for superseded session {}", generation);
            return Ok(());
        }
        match resolution {
            Resolution::Resolved(asset) => {
                self.start_playback(generation, Arc::new(asset), start_seconds)
            }
            Resolution::Fallback(asset) => {
                log::info!("playing on-demand fallback audio");
                self.start_playback(generation, Arc::new(asset), start_seconds)
            }
            Resolution::Failed(e) => {
                let message = e.to_string();
                self.fail_to_idle(generation, message.clone());
                Err(PlaybackError::Resolve(message))
            }
        }
    }

    fn start_playback(
        &self,
        generation: u64,
        asset: Arc<AudioAsset>,
        start_seconds: f64,
    ) -> Result<(), PlaybackError> {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return Ok(());
        }

        if let Err(e) = self.inner.output.load(asset.audio.clone()) {
            self.fail_to_idle(generation, e.to_string());
            return Err(e.into());
        }

        let position = Duration::from_secs_f64(start_seconds.max(0.0));
        if !position.is_zero() {
            self.inner.output.seek(position);
        }
        self.inner.output.play();

        {
            let mut state = self.inner.state.lock();
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return Ok(());
            }
            state.status = PlaybackStatus::Playing;
            state.asset = Some(asset);
            state.clock.reset();
            state.clock.seek(position);
            state.clock.start();
            state.error = None;
            self.publish_with_generation(&state, generation);
        }

        self.spawn_ticker(generation);
        Ok(())
    }

    fn fail_to_idle(&self, generation: u64, message: String) {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        log::warn!("playback failed: {}", message);
        self.inner.output.stop();
        let mut state = self.inner.state.lock();
        state.status = PlaybackStatus::Idle;
        state.asset = None;
        state.clock.reset();
        state.error = Some(message);
        self.publish_with_generation(&state, generation);
    }

    /// Periodic highlight tick, one task per session. Exits as soon as the
    /// generation moves on, so an abandoned session's tick can never touch
    /// the current one.
    fn spawn_ticker(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let finished = inner.output.is_finished();
                let mut state = inner.state.lock();
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                match state.status {
                    PlaybackStatus::Playing => {
                        if finished {
                            inner.output.stop();
                            state.status = PlaybackStatus::Idle;
                            state.asset = None;
                            state.clock.reset();
                            publish_snapshot(&inner, &state, generation);
                            return;
                        }
                        publish_snapshot(&inner, &state, generation);
                    }
                    // Paused keeps the session alive; nothing moves.
                    PlaybackStatus::Paused => {}
                    PlaybackStatus::Idle | PlaybackStatus::Loading => return,
                }
            }
        });
    }

    fn publish(&self, state: &EngineState) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.publish_with_generation(state, generation);
    }

    fn publish_with_generation(&self, state: &EngineState, generation: u64) {
        publish_snapshot(&self.inner, state, generation);
    }
}

fn publish_snapshot(inner: &EngineInner, state: &EngineState, generation: u64) {
    let current_time_seconds = state.clock.position().as_secs_f64();
    let active_timepoint_index = state
        .asset
        .as_ref()
        .and_then(|asset| asset.timepoints.active_word_index(current_time_seconds));
    inner.sessions.send_replace(PlaybackSession {
        status: state.status,
        current_time_seconds,
        active_timepoint_index,
        source: state.source.clone(),
        error: state.error.clone(),
        generation,
    });
}
