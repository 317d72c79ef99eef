//! Playback controller
//!
//! Turns a stream of `play(key)` / `stop()` requests into at most one current
//! preview session on the shared output.
//!
//! Session lifecycle: `Requested → (Loading) → Playing → FadingOut → Idle`.
//! A newer request fades the current voice out over the supersede fade and
//! moves it off "current" immediately; the faded voice halts and disconnects
//! itself once its ramp has finished.
//!
//! All bookkeeping lives behind one mutex that is never held across an
//! `.await`. Timers are runtime tasks selected against a cancellation token
//! that `teardown()` cancels, so nothing fires after teardown.

use crate::audio::mixer::Voice;
use crate::audio::output::{OutputDevice, PREFERRED_SAMPLE_RATE};
use crate::cache::{CacheState, ResourceCache};
use crate::config::PreviewConfig;
use crate::events::{EventBus, FadeReason, PreviewEvent};
use crate::playback::device::DeviceOutputManager;
use crate::playback::session::{envelope, plan_window, PlaybackSession, SessionId, SessionInfo};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sonicmap_common::Catalog;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a `play` request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A new session is current
    Started(SessionId),
    /// Same key as the last accepted request, inside the debounce window
    Debounced,
    /// No output could be constructed
    Inert,
    /// Key is not in the catalog
    UnknownKey,
    /// Clip is still loading elsewhere or failed to load
    Unavailable,
    /// A newer request or a stop arrived while the clip was loading
    Stale,
    /// The engine has been torn down
    TornDown,
}

/// Latest accepted request, used to discard stale loads
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestToken {
    seq: u64,
    key: String,
}

struct ControllerState {
    current: Option<PlaybackSession>,
    /// Superseded or stopped voices still ramping down
    fading: HashMap<SessionId, Arc<Voice>>,
    last_key: Option<String>,
    last_play_at: Option<Instant>,
    request: Option<RequestToken>,
    next_request: u64,
    next_session: u64,
    rng: StdRng,
    torn_down: bool,
}

impl ControllerState {
    fn new(rng_seed: Option<u64>) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            current: None,
            fading: HashMap::new(),
            last_key: None,
            last_play_at: None,
            request: None,
            next_request: 0,
            next_session: 0,
            rng,
            torn_down: false,
        }
    }

    fn is_debounced(&self, key: &str, now: Instant, window: Duration) -> bool {
        match (&self.last_key, self.last_play_at) {
            (Some(last_key), Some(at)) => last_key == key && now.duration_since(at) < window,
            _ => false,
        }
    }

    fn issue_request(&mut self, key: &str) -> RequestToken {
        self.next_request += 1;
        let token = RequestToken {
            seq: self.next_request,
            key: key.to_string(),
        };
        self.request = Some(token.clone());
        token
    }

    /// A load may start a session only if the latest request still wants
    /// the same key.
    fn is_still_wanted(&self, token: &RequestToken) -> bool {
        !self.torn_down
            && self
                .request
                .as_ref()
                .is_some_and(|latest| latest.key == token.key)
    }

    fn next_session_id(&mut self) -> SessionId {
        self.next_session += 1;
        SessionId::new(self.next_session)
    }
}

type SharedState = Arc<Mutex<ControllerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PlaybackController {
    catalog: Catalog,
    config: PreviewConfig,
    device: DeviceOutputManager,
    cache: ResourceCache,
    events: EventBus,
    state: SharedState,
    /// Parent of every timer's token
    shutdown: CancellationToken,
    runtime: Handle,
}

impl PlaybackController {
    pub fn new(
        catalog: Catalog,
        config: PreviewConfig,
        device: DeviceOutputManager,
        cache: ResourceCache,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        let state = ControllerState::new(config.rng_seed);
        Self {
            catalog,
            config,
            device,
            cache,
            events,
            state: Arc::new(Mutex::new(state)),
            shutdown: CancellationToken::new(),
            runtime,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn device(&self) -> &DeviceOutputManager {
        &self.device
    }

    pub fn is_torn_down(&self) -> bool {
        lock(&self.state).torn_down
    }

    /// Build or resume the output. No-op after teardown.
    pub fn activate(&self) -> bool {
        if self.is_torn_down() {
            return false;
        }
        self.device.activate().is_some()
    }

    pub async fn play(&self, key: &str) -> PlayOutcome {
        if self.is_torn_down() {
            return PlayOutcome::TornDown;
        }

        // Activation also resumes a suspended output
        let Some(output) = self.device.activate() else {
            debug!("Ignoring play('{}'): no audio output", key);
            return PlayOutcome::Inert;
        };

        let token = {
            let mut state = lock(&self.state);
            if state.torn_down {
                return PlayOutcome::TornDown;
            }

            let now = Instant::now();
            if state.is_debounced(key, now, self.config.debounce()) {
                debug!("Debounced play('{}')", key);
                return PlayOutcome::Debounced;
            }
            state.last_key = Some(key.to_string());
            state.last_play_at = Some(now);

            if let Some(previous) = state.current.take() {
                self.begin_fade(
                    &mut state,
                    previous,
                    &output,
                    self.config.supersede_fade(),
                    FadeReason::Superseded,
                );
            }

            state.issue_request(key)
        };

        let Some(descriptor) = self.catalog.get(key) else {
            debug!("No preview for '{}'", key);
            return PlayOutcome::UnknownKey;
        };

        let Some(clip) = self.cache.load(descriptor, output.sample_rate()).await else {
            if self.cache.state(key) == CacheState::Failed {
                self.emit_unless_torn_down(PreviewEvent::LoadFailed {
                    key: key.to_string(),
                });
            }
            return PlayOutcome::Unavailable;
        };

        let mut state = lock(&self.state);
        if !state.is_still_wanted(&token) {
            debug!("Discarding stale load of '{}' (request {})", key, token.seq);
            return PlayOutcome::Stale;
        }
        state.request = None;

        // A concurrent request may have started a session while we loaded
        if let Some(previous) = state.current.take() {
            self.begin_fade(
                &mut state,
                previous,
                &output,
                self.config.supersede_fade(),
                FadeReason::Superseded,
            );
        }

        let window = plan_window(clip.duration_secs(), &self.config, &mut state.rng);
        let id = state.next_session_id();
        let started_at = output.current_time();
        let gain = envelope(descriptor.target_gain, started_at, window.duration_secs, &self.config);

        let voice = Arc::new(Voice::new(
            id.get(),
            clip,
            started_at,
            window.offset_secs,
            window.duration_secs,
            output.sample_rate(),
            gain,
        ));
        output.connect(Arc::clone(&voice));

        let info = SessionInfo {
            id,
            key: key.to_string(),
            started_at,
            planned_end: started_at + window.duration_secs,
            offset_secs: window.offset_secs,
            duration_secs: window.duration_secs,
            target_gain: descriptor.target_gain,
        };
        info!(
            "Preview '{}' started ({}, offset {:.2}s, {:.2}s)",
            key, id, window.offset_secs, window.duration_secs
        );

        let completion = self.shutdown.child_token();
        self.spawn_completion(&info, Arc::clone(&voice), Arc::clone(&output), completion.clone());

        state.current = Some(PlaybackSession {
            info: info.clone(),
            voice,
            completion,
        });
        self.events.emit(PreviewEvent::SessionStarted { info });

        PlayOutcome::Started(id)
    }

    /// Fade out the current session. Pending loads are dropped too.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.torn_down {
            return;
        }
        state.request = None;

        let Some(session) = state.current.take() else {
            return;
        };

        match self.device.output() {
            Some(output) => {
                debug!("Stopping {}", session.info.id);
                self.begin_fade(
                    &mut state,
                    session,
                    &output,
                    self.config.stop_fade(),
                    FadeReason::Stopped,
                );
            }
            None => {
                session.completion.cancel();
                session.voice.halt();
            }
        }
    }

    /// Silence everything, cancel every timer and close the output.
    pub fn teardown(&self) {
        {
            let mut state = lock(&self.state);
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.request = None;
            self.shutdown.cancel();

            if let Some(session) = state.current.take() {
                session.voice.halt();
            }
            for (_, voice) in state.fading.drain() {
                voice.halt();
            }
        }

        self.device.teardown();
        info!("Preview engine torn down");
        self.events.emit(PreviewEvent::TornDown);
    }

    /// Warm the cache for `key` without playing it.
    pub async fn preload(&self, key: &str) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let Some(descriptor) = self.catalog.get(key) else {
            return false;
        };
        let rate = self
            .device
            .output()
            .map(|output| output.sample_rate())
            .unwrap_or(PREFERRED_SAMPLE_RATE);
        self.cache.load(descriptor, rate).await.is_some()
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        lock(&self.state)
            .current
            .as_ref()
            .map(|session| session.info.clone())
    }

    /// Sessions still ramping down after a supersede or stop
    pub fn fading_count(&self) -> usize {
        lock(&self.state).fading.len()
    }

    fn emit_unless_torn_down(&self, event: PreviewEvent) {
        let state = lock(&self.state);
        if !state.torn_down {
            self.events.emit(event);
        }
    }

    /// Ramp `session` to zero over `fade`, then halt and disconnect it.
    fn begin_fade(
        &self,
        state: &mut ControllerState,
        session: PlaybackSession,
        output: &Arc<dyn OutputDevice>,
        fade: Duration,
        reason: FadeReason,
    ) {
        let PlaybackSession {
            info,
            voice,
            completion,
        } = session;
        completion.cancel();

        let now = output.current_time();
        voice.gain().ramp_from_now(0.0, now, now + fade.as_secs_f64());
        state.fading.insert(info.id, Arc::clone(&voice));

        debug!("Fading out {} ({:?})", info.id, reason);
        self.events.emit(PreviewEvent::SessionFading {
            session: info.id,
            reason,
        });

        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        let output = Arc::clone(output);
        let cancel = self.shutdown.child_token();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(fade) => {}
            }

            let mut state = lock(&shared);
            if state.torn_down {
                return;
            }
            voice.halt();
            output.disconnect(voice.id());
            state.fading.remove(&info.id);
            events.emit(PreviewEvent::SessionEnded {
                session: info.id,
                key: info.key,
            });
        });
    }

    /// Disconnect the voice at its planned end and clear "current" if it is
    /// still this session.
    fn spawn_completion(
        &self,
        info: &SessionInfo,
        voice: Arc<Voice>,
        output: Arc<dyn OutputDevice>,
        cancel: CancellationToken,
    ) {
        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        let session = info.id;
        let key = info.key.clone();
        let duration = Duration::from_secs_f64(info.duration_secs);

        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(duration) => {}
            }

            let mut state = lock(&shared);
            if state.torn_down {
                return;
            }
            output.disconnect(voice.id());
            if state
                .current
                .as_ref()
                .is_some_and(|current| current.info.id == session)
            {
                state.current = None;
            }
            debug!("{} finished", session);
            events.emit(PreviewEvent::SessionEnded { session, key });
        });
    }
}
