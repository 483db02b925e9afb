//! Session lifecycle
//!
//! Two halves. `SessionAudioState` is the audio aggregate one voice session
//! owns for its whole life; it is created at session start, mutated only by
//! the loop driving that session, and dropped at session end. Nothing in it
//! is shared between sessions. `SessionRegistry` is the server-side view:
//! admission against a capacity cap, last-activity tracking, and a periodic
//! sweep that expires idle sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::audio::{CaptureEncoder, TransportChunker};
use crate::config::{AudioConfig, SessionConfig};
use crate::playback::PlaybackScheduler;
use crate::protocol::ControlEnvelope;
use crate::relay::Outbound;
use crate::{Error, Result};

/// How often the background sweeper looks for idle sessions
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Live audio state for one voice session
pub struct SessionAudioState {
    /// Capture side: raw samples to fixed windows
    pub encoder: CaptureEncoder,
    /// Send side: windows to wire-safe chunks
    pub chunker: TransportChunker,
    /// Receive side: buffers to gapless scheduled units
    pub scheduler: PlaybackScheduler,
}

impl SessionAudioState {
    /// Build fresh audio state from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the configured window or ceiling is unusable.
    pub fn new(audio: &AudioConfig) -> Result<Self> {
        Ok(Self {
            encoder: CaptureEncoder::new(audio.chunk_window, audio.sample_rate)?,
            chunker: TransportChunker::new(
                audio.transport_ceiling,
                audio.frames_per_chunk,
                0,
            )?,
            scheduler: PlaybackScheduler::new(audio.sample_rate, audio.lookahead_secs()),
        })
    }
}

/// One admitted session as the registry sees it
#[derive(Debug)]
pub struct LiveSession {
    /// Identifier surfaced to the client in `session_started`
    pub id: Uuid,
    outbound: mpsc::Sender<Outbound>,
    close_tx: watch::Sender<bool>,
    last_activity: Mutex<Instant>,
}

impl LiveSession {
    /// Record client activity, deferring the idle sweep.
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map_or(Duration::ZERO, |at| at.elapsed())
    }

    /// Push a final error envelope and signal the session loop to stop.
    fn expire(&self) {
        let _ = self.outbound.try_send(Outbound::Envelope(ControlEnvelope::Error {
            message: "session timed out".to_string(),
        }));
        let _ = self.close_tx.send(true);
    }
}

/// Server-side registry of live voice sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<LiveSession>>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    /// Create a registry with the given cap and idle timeout.
    #[must_use]
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            idle_timeout,
        }
    }

    /// Create a registry from the session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.max_sessions,
            Duration::from_secs(config.idle_timeout_secs),
        )
    }

    /// Admit a new session.
    ///
    /// Returns the registry entry plus a close signal the session loop must
    /// watch; the signal fires when the sweeper expires the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` when the registry is full even after
    /// expiring idle sessions.
    pub async fn admit(
        &self,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(Arc<LiveSession>, watch::Receiver<bool>)> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.max_sessions {
            Self::sweep_locked(&mut sessions, self.idle_timeout);
            if sessions.len() >= self.max_sessions {
                return Err(Error::Session(format!(
                    "session limit of {} reached",
                    self.max_sessions
                )));
            }
        }

        let (close_tx, close_rx) = watch::channel(false);
        let session = Arc::new(LiveSession {
            id: Uuid::new_v4(),
            outbound,
            close_tx,
            last_activity: Mutex::new(Instant::now()),
        });
        sessions.insert(session.id, Arc::clone(&session));
        tracing::info!(id = %session.id, live = sessions.len(), "session admitted");

        Ok((session, close_rx))
    }

    /// Drop a session from the registry at normal end of life.
    pub async fn release(&self, id: Uuid) {
        if self.sessions.write().await.remove(&id).is_some() {
            tracing::debug!(%id, "session released");
        }
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Expire every session idle past the timeout, returning how many.
    pub async fn sweep_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        Self::sweep_locked(&mut sessions, self.idle_timeout)
    }

    fn sweep_locked(
        sessions: &mut HashMap<Uuid, Arc<LiveSession>>,
        idle_timeout: Duration,
    ) -> usize {
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for() > idle_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                session.expire();
                tracing::info!(%id, "expired idle session");
            }
        }
        expired.len()
    }

    /// Spawn the periodic idle sweeper for this registry.
    pub fn start_sweeper(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let expired = registry.sweep_idle().await;
                if expired > 0 {
                    tracing::info!(expired, "idle sweep");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::playback::SchedulerState;

    fn registry(max: usize, idle: Duration) -> SessionRegistry {
        SessionRegistry::new(max, idle)
    }

    fn outbound() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(8)
    }

    #[test]
    fn audio_state_builds_from_default_config() {
        let state = SessionAudioState::new(&Config::default().audio).unwrap();
        assert_eq!(state.encoder.window(), 1024);
        assert_eq!(state.scheduler.state(), SchedulerState::Idle);
        assert_eq!(state.chunker.pending_len(), 0);
    }

    #[tokio::test]
    async fn admit_assigns_distinct_ids() {
        let registry = registry(10, Duration::from_secs(300));
        let (a, _rx_a) = registry.admit(outbound().0).await.unwrap();
        let (b, _rx_b) = registry.admit(outbound().0).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn capacity_cap_rejects_admission() {
        let registry = registry(1, Duration::from_secs(300));
        let _held = registry.admit(outbound().0).await.unwrap();

        let err = registry.admit(outbound().0).await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }

    #[tokio::test]
    async fn released_slot_is_reusable() {
        let registry = registry(1, Duration::from_secs(300));
        let (session, _rx) = registry.admit(outbound().0).await.unwrap();
        registry.release(session.id).await;

        assert!(registry.admit(outbound().0).await.is_ok());
    }

    #[tokio::test]
    async fn idle_sessions_are_swept_with_final_error() {
        let registry = registry(10, Duration::from_millis(10));
        let (tx, mut rx) = outbound();
        let (_session, mut close_rx) = registry.admit(tx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.sweep_idle().await, 1);
        assert_eq!(registry.count().await, 0);

        let frame = rx.try_recv().unwrap();
        assert!(matches!(
            frame,
            Outbound::Envelope(ControlEnvelope::Error { .. })
        ));
        close_rx.changed().await.unwrap();
        assert!(*close_rx.borrow());
    }

    #[tokio::test]
    async fn touch_defers_the_sweep() {
        let registry = registry(10, Duration::from_millis(200));
        let (session, _rx) = registry.admit(outbound().0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        session.touch();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(registry.sweep_idle().await, 0);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn full_registry_expires_idle_to_make_room() {
        let registry = registry(1, Duration::from_millis(10));
        let (_stale, _rx) = registry.admit(outbound().0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(registry.admit(outbound().0).await.is_ok());
        assert_eq!(registry.count().await, 1);
    }
}
